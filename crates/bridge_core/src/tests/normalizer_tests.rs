use super::*;
use serde_json::json;

fn defaults() -> CanonicalNotification {
    CanonicalNotification {
        title: "Notification".into(),
        message: String::new(),
        priority: 0,
    }
}

#[test]
fn normalizes_mixed_case_keys() {
    let record = PayloadNormalizer::default().normalize(&json!({
        "Title": "Hi",
        "Body": "Text",
        "Level": 3,
    }));

    assert_eq!(
        record,
        CanonicalNotification {
            title: "Hi".into(),
            message: "Text".into(),
            priority: 3,
        }
    );
}

#[test]
fn empty_object_yields_defaults() {
    assert_eq!(PayloadNormalizer::default().normalize(&json!({})), defaults());
}

#[test]
fn non_object_payloads_yield_defaults() {
    let normalizer = PayloadNormalizer::default();
    for payload in [
        Value::Null,
        json!("just a string"),
        json!(42),
        json!(true),
        json!(["title", "message"]),
    ] {
        assert_eq!(normalizer.normalize(&payload), defaults(), "payload {payload}");
    }
}

#[test]
fn first_present_key_wins_even_when_later_keys_exist() {
    let payload = json!({ "msg": "first", "content": "second", "Body": "third" });

    assert_eq!(
        extract_field(&payload, MESSAGE_KEYS, FieldValue::text("")),
        FieldValue::text("first")
    );
}

#[test]
fn null_values_are_skipped_in_favor_of_later_keys() {
    let payload = json!({ "title": null, "Subject": "from subject" });

    assert_eq!(
        extract_field(&payload, TITLE_KEYS, FieldValue::text("fallback")),
        FieldValue::text("from subject")
    );
}

#[test]
fn blank_text_falls_back_without_consulting_later_keys() {
    let payload = json!({ "title": "   ", "Title": "ignored" });

    assert_eq!(
        extract_field(&payload, TITLE_KEYS, FieldValue::text("fallback")),
        FieldValue::text("fallback")
    );
}

#[test]
fn numbers_are_returned_unchanged() {
    let payload = json!({ "priority": 7.5 });

    assert_eq!(
        extract_field(&payload, PRIORITY_KEYS, FieldValue::from(0)),
        FieldValue::Number(Number::from_f64(7.5).expect("finite"))
    );
}

#[test]
fn other_types_become_text() {
    let payload = json!({
        "title": true,
        "message": { "text": "nested" },
        "Subject": ["a", 1],
    });

    assert_eq!(
        extract_field(&payload, &["title"], FieldValue::text("")),
        FieldValue::text("true")
    );
    assert_eq!(
        extract_field(&payload, &["message"], FieldValue::text("")),
        FieldValue::text(r#"{"text":"nested"}"#)
    );
    assert_eq!(
        extract_field(&payload, &["Subject"], FieldValue::text("")),
        FieldValue::text(r#"["a",1]"#)
    );
}

#[test]
fn priority_defaults_to_zero_when_absent() {
    let record = PayloadNormalizer::default().normalize(&json!({
        "title": "Disk almost full",
        "message": "93% used",
    }));

    assert_eq!(record.priority, 0);
    assert_eq!(record.title, "Disk almost full");
}

#[test]
fn numeric_text_priority_is_parsed() {
    let normalizer = PayloadNormalizer::default();

    assert_eq!(normalizer.normalize(&json!({ "priority": "5" })).priority, 5);
    assert_eq!(normalizer.normalize(&json!({ "Priority": " 8 " })).priority, 8);
    assert_eq!(normalizer.normalize(&json!({ "level": "2.9" })).priority, 2);
    assert_eq!(normalizer.normalize(&json!({ "Level": "urgent" })).priority, 0);
}

#[test]
fn out_of_range_priorities_saturate() {
    assert_eq!(FieldValue::Number(Number::from(u64::MAX)).to_priority(), i64::MAX);
    assert_eq!(
        FieldValue::Number(Number::from_f64(-1e30).expect("finite")).to_priority(),
        i64::MIN
    );
    assert_eq!(FieldValue::text("inf").to_priority(), 0);
}

#[test]
fn numeric_title_renders_as_text() {
    let record = PayloadNormalizer::default().normalize(&json!({ "title": 404, "body": "" }));

    assert_eq!(record.title, "404");
    assert_eq!(record.message, "");
}

#[test]
fn custom_fallback_title_is_used() {
    let record = PayloadNormalizer::new("Gotify").normalize(&json!({ "message": "hello" }));

    assert_eq!(record.title, "Gotify");
    assert_eq!(record.message, "hello");
}

#[test]
fn envelope_unwraps_first_message() {
    let frame = json!({
        "messages": [
            { "title": "first" },
            { "title": "second" },
        ],
    });

    assert_eq!(unwrap_envelope(frame), json!({ "title": "first" }));
}

#[test]
fn envelope_without_messages_passes_through() {
    let plain = json!({ "title": "direct", "priority": 4 });
    assert_eq!(unwrap_envelope(plain.clone()), plain);

    let empty = json!({ "messages": [] });
    assert_eq!(unwrap_envelope(empty.clone()), empty);

    let not_array = json!({ "messages": "oops" });
    assert_eq!(unwrap_envelope(not_array.clone()), not_array);
}
