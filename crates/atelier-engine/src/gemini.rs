use std::env;

use anyhow::{bail, Context, Result};
use atelier_contracts::image::EncodedImage;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use reqwest::blocking::{Client as HttpClient, Response as HttpResponse};
use serde_json::{json, Value};

pub const DEFAULT_IMAGE_MODEL: &str = "gemini-3-pro-image-preview";
pub const DEFAULT_TEXT_MODEL: &str = "gemini-3-pro-preview";

/// Marker for a well-formed service response that carried no image part.
/// Callers tell it apart from transport failures by walking the error
/// chain; the user-facing message stays the same for both.
#[derive(Debug)]
pub struct NoImagePayload;

impl std::fmt::Display for NoImagePayload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "response contained no image data")
    }
}

impl std::error::Error for NoImagePayload {}

pub fn is_missing_payload_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<NoImagePayload>().is_some())
}

pub fn is_transport_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        cause
            .downcast_ref::<reqwest::Error>()
            .map(|reqwest_err| {
                reqwest_err.is_timeout() || reqwest_err.is_connect() || reqwest_err.is_request()
            })
            .unwrap_or(false)
    })
}

/// Blocking `generateContent` transport shared by the generation and
/// conversation clients.
pub(crate) struct GeminiTransport {
    api_base: String,
    http: HttpClient,
}

impl GeminiTransport {
    pub(crate) fn new() -> Self {
        Self {
            api_base: env::var("GEMINI_API_BASE")
                .ok()
                .map(|value| value.trim().trim_end_matches('/').to_string())
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "https://generativelanguage.googleapis.com/v1beta".to_string()),
            http: HttpClient::new(),
        }
    }

    pub(crate) fn api_key() -> Option<String> {
        non_empty_env("GEMINI_API_KEY").or_else(|| non_empty_env("GOOGLE_API_KEY"))
    }

    fn endpoint_for_model(&self, model: &str) -> String {
        let trimmed = model.trim();
        let model_path = if trimmed.starts_with("models/") {
            trimmed.to_string()
        } else {
            format!("models/{trimmed}")
        };
        format!("{}/{}:generateContent", self.api_base, model_path)
    }

    /// Single-shot POST. The missing-credential check runs before any
    /// network traffic; a failed attempt surfaces directly, no retries.
    pub(crate) fn generate_content(&self, model: &str, payload: &Value) -> Result<Value> {
        let Some(api_key) = Self::api_key() else {
            bail!("GEMINI_API_KEY or GOOGLE_API_KEY not set");
        };
        let endpoint = self.endpoint_for_model(model);
        let response = self
            .http
            .post(&endpoint)
            .query(&[("key", api_key.as_str())])
            .json(payload)
            .send()
            .with_context(|| format!("Gemini request failed ({endpoint})"))?;
        response_json_or_error("Gemini", response)
    }
}

pub(crate) fn text_part(text: &str) -> Value {
    json!({ "text": text })
}

pub(crate) fn image_part(image: &EncodedImage) -> Value {
    json!({
        "inlineData": {
            "mimeType": image.mime_type,
            "data": image.base64_data(),
        }
    })
}

pub(crate) fn user_content(parts: Vec<Value>) -> Value {
    json!({ "role": "user", "parts": parts })
}

/// First inlined image among the first candidate's parts, if any.
pub(crate) fn extract_inline_image(response_payload: &Value) -> Result<Option<EncodedImage>> {
    for part in candidate_parts(response_payload) {
        let inline = part
            .get("inlineData")
            .or_else(|| part.get("inline_data"))
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();
        let data = inline
            .get("data")
            .and_then(Value::as_str)
            .unwrap_or_default();
        if data.is_empty() {
            continue;
        }
        let bytes = BASE64
            .decode(data.as_bytes())
            .context("Gemini image base64 decode failed")?;
        let mime_type = inline
            .get("mimeType")
            .or_else(|| inline.get("mime_type"))
            .and_then(Value::as_str)
            .unwrap_or("image/png");
        return Ok(Some(EncodedImage::new(mime_type, bytes)));
    }
    Ok(None)
}

/// Concatenated text parts of the first candidate.
pub(crate) fn extract_text(response_payload: &Value) -> Option<String> {
    let mut out = String::new();
    for part in candidate_parts(response_payload) {
        if let Some(text) = part.get("text").and_then(Value::as_str) {
            out.push_str(text);
        }
    }
    let trimmed = out.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn candidate_parts(response_payload: &Value) -> Vec<Value> {
    response_payload
        .get("candidates")
        .and_then(Value::as_array)
        .and_then(|candidates| candidates.first())
        .and_then(|candidate| candidate.get("content"))
        .and_then(Value::as_object)
        .and_then(|content| content.get("parts"))
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

fn response_json_or_error(provider: &str, response: HttpResponse) -> Result<Value> {
    let status = response.status();
    let code = status.as_u16();
    let body = response
        .text()
        .with_context(|| format!("{provider} response body read failed"))?;
    if !status.is_success() {
        bail!(
            "{provider} request failed ({code}): {}",
            truncate_text(&body, 512)
        );
    }
    let parsed: Value = serde_json::from_str(&body)
        .with_context(|| format!("{provider} returned invalid JSON payload"))?;
    Ok(parsed)
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

pub(crate) fn error_chain_text(err: &anyhow::Error, max_chars: usize) -> String {
    let mut parts = Vec::new();
    for cause in err.chain() {
        let text = cause.to_string();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        if parts
            .last()
            .map(|existing| existing == trimmed)
            .unwrap_or(false)
        {
            continue;
        }
        parts.push(trimmed.to_string());
    }
    if parts.is_empty() {
        return truncate_text(&err.to_string(), max_chars);
    }
    truncate_text(&parts.join(" | caused by: "), max_chars)
}

fn truncate_text(value: &str, max_chars: usize) -> String {
    if value.chars().count() <= max_chars {
        return value.to_string();
    }
    value.chars().take(max_chars).collect::<String>() + "…"
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response_with_parts(parts: Value) -> Value {
        json!({
            "candidates": [
                { "content": { "role": "model", "parts": parts } }
            ]
        })
    }

    #[test]
    fn endpoint_paths_are_normalized() {
        let transport = GeminiTransport {
            api_base: "https://example.test/v1beta".to_string(),
            http: HttpClient::new(),
        };
        assert_eq!(
            transport.endpoint_for_model("gemini-3-pro-image-preview"),
            "https://example.test/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
        assert_eq!(
            transport.endpoint_for_model("models/gemini-3-pro-preview"),
            "https://example.test/v1beta/models/gemini-3-pro-preview:generateContent"
        );
    }

    #[test]
    fn extracts_first_inline_image() -> anyhow::Result<()> {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;

        let response = response_with_parts(json!([
            { "text": "here you go" },
            { "inlineData": { "mimeType": "image/jpeg", "data": BASE64.encode([1u8, 2, 3]) } },
            { "inlineData": { "mimeType": "image/png", "data": BASE64.encode([9u8]) } }
        ]));

        let image = extract_inline_image(&response)?.ok_or_else(|| anyhow::anyhow!("no image"))?;
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.bytes, vec![1, 2, 3]);
        Ok(())
    }

    #[test]
    fn accepts_snake_case_inline_data() -> anyhow::Result<()> {
        use base64::engine::general_purpose::STANDARD as BASE64;
        use base64::Engine as _;

        let response = response_with_parts(json!([
            { "inline_data": { "mime_type": "image/webp", "data": BASE64.encode([7u8, 7]) } }
        ]));

        let image = extract_inline_image(&response)?.ok_or_else(|| anyhow::anyhow!("no image"))?;
        assert_eq!(image.mime_type, "image/webp");
        Ok(())
    }

    #[test]
    fn text_only_response_has_no_image() -> anyhow::Result<()> {
        let response = response_with_parts(json!([{ "text": "cannot help with that" }]));
        assert!(extract_inline_image(&response)?.is_none());
        assert!(extract_inline_image(&json!({}))?.is_none());
        Ok(())
    }

    #[test]
    fn extract_text_concatenates_parts() {
        let response = response_with_parts(json!([
            { "text": "Use a low angle" },
            { "text": " for drama." }
        ]));
        assert_eq!(
            extract_text(&response).as_deref(),
            Some("Use a low angle for drama.")
        );
        assert_eq!(extract_text(&response_with_parts(json!([]))), None);
    }

    #[test]
    fn missing_payload_marker_is_detectable_on_the_chain() {
        let err = anyhow::Error::new(NoImagePayload).context("pose render failed");
        assert!(is_missing_payload_error(&err));
        assert!(!is_transport_error(&err));

        let plain = anyhow::anyhow!("some other failure");
        assert!(!is_missing_payload_error(&plain));
    }

    #[test]
    fn error_chain_text_joins_and_dedupes() {
        let err = anyhow::anyhow!("root cause")
            .context("root cause")
            .context("outer frame");
        let text = error_chain_text(&err, 200);
        assert_eq!(text, "outer frame | caused by: root cause");
    }

    #[test]
    fn truncate_text_respects_char_budget() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefgh", 3), "abc…");
    }
}
