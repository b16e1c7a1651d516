//! Pressed-button message tracking for Slack acknowledgements.

use kabanda::slack::client::CallbackTargets;
use slack_morphism::prelude::{SlackChannelId, SlackTs};

#[tokio::test]
async fn taken_target_is_gone() {
    let targets = CallbackTargets::default();
    targets
        .register("trig-1:complete", SlackChannelId("D1".into()), SlackTs("1.2".into()))
        .await;

    let taken = targets.take("trig-1:complete").await;

    assert_eq!(
        taken,
        Some((SlackChannelId("D1".into()), SlackTs("1.2".into())))
    );
    assert_eq!(targets.take("trig-1:complete").await, None);
    assert_eq!(targets.pending().await, 0);
}

#[tokio::test]
async fn unrelated_presses_stay_registered() {
    let targets = CallbackTargets::default();
    targets
        .register("trig-1:snooze", SlackChannelId("D1".into()), SlackTs("1.2".into()))
        .await;
    targets
        .register("trig-2:delete", SlackChannelId("D1".into()), SlackTs("3.4".into()))
        .await;

    assert_eq!(targets.take("trig-3:complete").await, None);
    targets.take("trig-1:snooze").await;

    assert_eq!(targets.pending().await, 1);
}
