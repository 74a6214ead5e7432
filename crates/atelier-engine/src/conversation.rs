use anyhow::Result;
use atelier_contracts::transcript::{ChatRole, ChatTurn};
use serde_json::{json, Value};

use crate::gemini::{self, GeminiTransport, DEFAULT_TEXT_MODEL};

const SYSTEM_INSTRUCTION: &str = "You are an expert fashion photography assistant and stylist. \
     You help users refine prompts for image generation, suggest camera angles and advise on \
     styling. Keep answers concise and helpful.";

const EMPTY_REPLY_FALLBACK: &str = "I couldn't process that.";

/// Stateless chat adapter: the full prior transcript travels with every
/// call, nothing is remembered between calls.
pub trait ConversationClient: Send + Sync {
    fn name(&self) -> &str;

    fn continue_chat(&self, prior_turns: &[ChatTurn], message: &str) -> Result<String>;
}

pub struct GeminiConversationClient {
    transport: GeminiTransport,
    model: String,
}

impl GeminiConversationClient {
    pub fn new(model: Option<String>) -> Self {
        Self {
            transport: GeminiTransport::new(),
            model: model.unwrap_or_else(|| DEFAULT_TEXT_MODEL.to_string()),
        }
    }
}

impl ConversationClient for GeminiConversationClient {
    fn name(&self) -> &str {
        "gemini"
    }

    fn continue_chat(&self, prior_turns: &[ChatTurn], message: &str) -> Result<String> {
        let payload = chat_request_payload(prior_turns, message);
        let response = self.transport.generate_content(&self.model, &payload)?;
        Ok(reply_from_response(&response))
    }
}

fn chat_request_payload(prior_turns: &[ChatTurn], message: &str) -> Value {
    let mut contents: Vec<Value> = prior_turns.iter().map(turn_content).collect();
    contents.push(json!({ "role": "user", "parts": [{ "text": message }] }));
    json!({
        "contents": contents,
        "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] },
    })
}

fn turn_content(turn: &ChatTurn) -> Value {
    let role = match turn.role {
        ChatRole::User => "user",
        ChatRole::Assistant => "model",
    };
    json!({ "role": role, "parts": [{ "text": turn.text }] })
}

fn reply_from_response(response: &Value) -> String {
    gemini::extract_text(response).unwrap_or_else(|| EMPTY_REPLY_FALLBACK.to_string())
}

/// Offline stand-in: cycles through canned styling tips, keyed off the
/// transcript length so a session sees varied advice.
pub struct DryrunConversationClient;

const CANNED_REPLIES: &[&str] = &[
    "Try a low angle for a stronger silhouette.",
    "A 3:4 ratio keeps the eye on the outfit.",
    "Name the fabric in the style prompt; it sharpens the render.",
    "Side profile works well with structured jackets.",
];

impl ConversationClient for DryrunConversationClient {
    fn name(&self) -> &str {
        "dryrun"
    }

    fn continue_chat(&self, prior_turns: &[ChatTurn], _message: &str) -> Result<String> {
        Ok(CANNED_REPLIES[prior_turns.len() % CANNED_REPLIES.len()].to_string())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn payload_maps_roles_and_appends_the_new_message() {
        let prior = vec![
            ChatTurn::assistant("Hi! What are we shooting?"),
            ChatTurn::user("a summer dress"),
        ];
        let payload = chat_request_payload(&prior, "which angle?");

        let contents = payload["contents"].as_array().cloned().unwrap_or_default();
        assert_eq!(contents.len(), 3);
        assert_eq!(contents[0]["role"], "model");
        assert_eq!(contents[1]["role"], "user");
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["text"], "which angle?");

        let instruction = payload["systemInstruction"]["parts"][0]["text"]
            .as_str()
            .unwrap_or_default();
        assert!(instruction.contains("fashion photography assistant"));
    }

    #[test]
    fn empty_reply_falls_back_to_a_stock_line() {
        let blank = json!({
            "candidates": [
                { "content": { "role": "model", "parts": [] } }
            ]
        });
        assert_eq!(reply_from_response(&blank), EMPTY_REPLY_FALLBACK);

        let reply = json!({
            "candidates": [
                { "content": { "role": "model", "parts": [{ "text": "Go wide." }] } }
            ]
        });
        assert_eq!(reply_from_response(&reply), "Go wide.");
    }

    #[test]
    fn dryrun_cycles_canned_tips() -> anyhow::Result<()> {
        let client = DryrunConversationClient;
        let first = client.continue_chat(&[], "anything")?;
        let second = client.continue_chat(&[ChatTurn::user("anything")], "again")?;
        assert_ne!(first, second);
        assert_eq!(first, CANNED_REPLIES[0]);
        Ok(())
    }
}
