// Verify the JSON shapes exchanged with the queue publisher and the Send API.
// Messenger rejects unknown or null fields, so absent options must stay absent.

use parley_core::types::{InboundEvent, OutboundPayload, SenderId};

#[test]
fn inbound_event_from_webhook_publisher() {
    let raw = r#"{
        "sender": {"id": "1254459154682919"},
        "recipient": {"id": "682498302938465"},
        "timestamp": 1511360453223,
        "message": {"mid": "mid.$cAAJ", "seq": 12, "text": "hello bot"}
    }"#;
    let event = InboundEvent::decode(raw.as_bytes()).unwrap();
    assert_eq!(event.sender_id(), &SenderId::from("1254459154682919"));
    assert_eq!(event.text(), "hello bot");
}

#[test]
fn quick_replies_payload_shape() {
    let payload = OutboundPayload::quick_replies(
        &SenderId::from("99"),
        "Pick one",
        &["Yes".to_string(), "No".to_string()],
    );
    let json = serde_json::to_value(&payload).unwrap();

    assert_eq!(
        json,
        serde_json::json!({
            "recipient": {"id": "99"},
            "message": {
                "text": "Pick one",
                "quick_replies": [
                    {"content_type": "text", "title": "Yes", "payload": "Yes"},
                    {"content_type": "text", "title": "No", "payload": "No"}
                ]
            }
        })
    );
}

#[test]
fn text_payload_has_no_null_fields() {
    let payload = OutboundPayload::text(&SenderId::from("99"), "hi there");
    let json = serde_json::to_string(&payload).unwrap();

    assert!(json.contains(r#""text":"hi there""#));
    assert!(!json.contains("quick_replies"));
    assert!(!json.contains("null"));
}

#[test]
fn payload_round_trips_through_send_api_body() {
    let body = r#"{"recipient":{"id":"5"},"message":{"text":"Pick","quick_replies":[{"content_type":"text","title":"A","payload":"A"}]}}"#;
    let payload: OutboundPayload = serde_json::from_str(body).unwrap();
    assert_eq!(payload.recipient.id.as_str(), "5");
    assert_eq!(serde_json::to_string(&payload).unwrap(), body);
}
