//! Intent extraction over an OpenAI-compatible chat completions API.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{IntentContext, IntentExtractor, IntentPayload, ParsedMessage};
use crate::config::IntentConfig;
use crate::{AppError, Result};

const SYSTEM_PROMPT: &str = "You are Kabanda, a personal assistant. You parse user messages \
and extract task information. Always respond with valid JSON only, no markdown formatting.";

#[derive(Debug, Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: String,
}

/// Extractor backed by a chat completions endpoint.
#[derive(Clone)]
pub struct HttpIntentExtractor {
    client: reqwest::Client,
    endpoint: String,
    model: String,
    api_key: String,
}

impl HttpIntentExtractor {
    /// Build a client with the configured request timeout.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if no API key is configured, or
    /// `AppError::External` if the HTTP client cannot be built.
    pub fn new(config: &IntentConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(AppError::Config("intent api key is not configured".into()));
        }
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }

    async fn complete(&self, text: &str, context: &IntentContext) -> Result<ParsedMessage> {
        let body = json!({
            "model": self.model,
            "temperature": 0.3,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                { "role": "user", "content": build_prompt(text, context) },
            ],
        });

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AppError::External(format!(
                "intent service returned {status}: {detail}"
            )));
        }

        let completion: Completion = response.json().await?;
        let content = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| AppError::External("intent service returned no choices".into()))?;
        debug!(chars = content.len(), "intent service replied");

        let payload: IntentPayload = serde_json::from_str(strip_fences(&content))?;
        payload.validate(text, context.now)
    }
}

impl IntentExtractor for HttpIntentExtractor {
    fn parse<'a>(
        &'a self,
        text: &'a str,
        context: &'a IntentContext,
    ) -> Pin<Box<dyn Future<Output = Result<ParsedMessage>> + Send + 'a>> {
        Box::pin(self.complete(text, context))
    }
}

/// Remove a surrounding Markdown code fence, if any.
#[must_use]
pub fn strip_fences(raw: &str) -> &str {
    let mut text = raw.trim();
    if let Some(rest) = text.strip_prefix("```json") {
        text = rest;
    } else if let Some(rest) = text.strip_prefix("```") {
        text = rest;
    }
    if let Some(rest) = text.strip_suffix("```") {
        text = rest;
    }
    text.trim()
}

fn build_prompt(text: &str, context: &IntentContext) -> String {
    let mut prompt = format!(
        "Analyze this message and extract task information.\n\n\
         Current date/time: {} (UTC{})\n",
        context.now.format("%Y-%m-%d %H:%M"),
        context.now.offset()
    );
    if let Some(home) = &context.home_location {
        prompt.push_str(&format!("User's usual area: {home}\n"));
    }
    let history = context.history_text();
    if !history.is_empty() {
        prompt.push('\n');
        prompt.push_str(&history);
        prompt.push('\n');
    }
    if context.awaiting_location {
        prompt.push_str(
            "\nThe assistant just asked the user where they are. Unless the message is \
             clearly something else, the intent is \"location_query_needed\".\n",
        );
    }
    prompt.push_str(&format!("\nUser message: \"{text}\"\n"));
    prompt.push_str(
        r#"
Extract the following in JSON format:
{
    "intent": "new_task|new_tasks|modify_task|delete_task|query_tasks|location_query_needed|general_question",
    "tasks": [{
        "title": "Brief title (max 100 chars)",
        "description": "Details if provided",
        "priority": "low|medium|high|urgent",
        "due_at": "ISO 8601 datetime with the user's UTC offset",
        "requires_location": false,
        "location_query": "what to search for, if a place is needed",
        "location_type": "restaurant|bar|cafe|..."
    }],
    "query_type": "today|morning|afternoon|evening|week|upcoming|all",
    "confidence": 0.0,
    "clarification_needed": "Question to ask if time/details are unclear",
    "conversational_response": "Natural reply to the user",
    "needs_location_input": false,
    "location_prompt": "Question asking where the user is, if needed"
}

Rules:
- Consider the conversation history for vague references like "that" or "it"
- Parse natural time expressions like "in 20 mins", "at 5 PM", "tomorrow"
- If time is vague ("later", "soon"), set due_at to 2 hours from now and set clarification_needed
- "remind me to X" is new_task; several tasks in one message is new_tasks
- "move that to...", "change...", "update..." is modify_task
- "delete...", "cancel...", "remove...", "forget..." is delete_task
- "what do I have...", "list my tasks" is query_tasks
- Asking for a place to go (dinner, drinks, hangout) sets requires_location
- Greetings and questions are general_question with a helpful conversational_response

Return ONLY valid JSON, no markdown or explanations."#,
    );
    prompt
}
