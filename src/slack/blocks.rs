//! Slack Block Kit message builders.
//!
//! Reminder buttons carry the callback payload (`action_taskId`) as both
//! their action id and their value.

use slack_morphism::prelude::{
    SlackActionBlockElement, SlackActionId, SlackActionsBlock, SlackBlock, SlackBlockButtonElement,
    SlackBlockId, SlackBlockPlainTextOnly, SlackBlockText, SlackSectionBlock,
};

use crate::channel::{Button, LocationPin};

/// Build a plain text section block.
#[must_use]
pub fn text_section(text: &str) -> SlackBlock {
    SlackBlock::Section(SlackSectionBlock::new().with_text(SlackBlockText::MarkDown(text.into())))
}

/// Build an actions block with the given buttons.
#[must_use]
pub fn action_buttons(block_id: &str, buttons: &[Button]) -> SlackBlock {
    let elements: Vec<SlackActionBlockElement> = buttons
        .iter()
        .map(|button| {
            SlackActionBlockElement::Button(
                SlackBlockButtonElement::new(
                    SlackActionId(button.payload.clone()),
                    SlackBlockPlainTextOnly::from(button.label.as_str()),
                )
                .with_value(button.payload.clone()),
            )
        })
        .collect();
    SlackBlock::Actions(
        SlackActionsBlock::new(elements).with_block_id(SlackBlockId(block_id.into())),
    )
}

/// Text section followed by buttons, if any.
#[must_use]
pub fn message_blocks(text: &str, buttons: &[Button]) -> Vec<SlackBlock> {
    let mut blocks = vec![text_section(text)];
    if let Some(first) = buttons.first() {
        blocks.push(action_buttons(&format!("actions_{}", first.payload), buttons));
    }
    blocks
}

/// Maps link for a location pin.
#[must_use]
pub fn maps_link(pin: &LocationPin) -> String {
    format!(
        "https://www.google.com/maps/search/?api=1&query={},{}",
        pin.lat, pin.lng
    )
}

/// Markdown rendering of a location pin.
#[must_use]
pub fn location_text(pin: &LocationPin) -> String {
    let mut text = format!("📍 *{}*", pin.title.as_deref().unwrap_or("Location"));
    if let Some(address) = pin.address.as_deref().filter(|a| !a.is_empty()) {
        text.push('\n');
        text.push_str(address);
    }
    text.push_str(&format!("\n<{}|Open in Maps>", maps_link(pin)));
    text
}
