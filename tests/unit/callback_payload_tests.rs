use kabanda::channel::{parse_callback_payload, Button, CallbackAction};
use kabanda::AppError;

#[test]
fn payload_splits_on_first_underscore() {
    let (action, task_id) = parse_callback_payload("snooze_3f2a_b").expect("valid payload");
    assert_eq!(action, CallbackAction::Snooze);
    assert_eq!(task_id, "3f2a_b");
}

#[test]
fn every_action_parses() {
    for action in [CallbackAction::Complete, CallbackAction::Snooze, CallbackAction::Delete] {
        let payload = format!("{}_t1", action.as_str());
        assert_eq!(
            parse_callback_payload(&payload).expect("valid payload"),
            (action, "t1".to_owned())
        );
    }
}

#[test]
fn bad_payloads_are_rejected() {
    for payload in ["complete", "archive_t1", "complete_", ""] {
        assert!(
            matches!(parse_callback_payload(payload), Err(AppError::InvalidInput(_))),
            "{payload:?} should be rejected"
        );
    }
}

#[test]
fn task_buttons_carry_payload() {
    let button = Button::for_task("✅ Complete", CallbackAction::Complete, "t1");
    assert_eq!(button.label, "✅ Complete");
    assert_eq!(button.payload, "complete_t1");
}
