//! Gemini `generateContent` request bodies and reply envelopes.
//!
//! The model's own output is a JSON document *inside* a JSON envelope:
//!
//! ```text
//! { "candidates": [ { "content": { "parts": [ { "text": "```json {…} ```" } ] } } ],
//!   "usageMetadata": { "promptTokenCount": 812, "candidatesTokenCount": 240 } }
//! ```
//!
//! [`extract_reply`] unwraps the envelope; the inner text goes through
//! [`crate::pipeline::sanitize`].

use crate::config::StudyConfig;
use crate::error::ApiError;
use crate::pipeline::encode::InlineImage;
use crate::pipeline::transport::ApiRequest;
use serde::Deserialize;
use serde_json::{json, Value};

/// Generation settings sent with every request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationOptions {
    pub temperature: f32,
    pub max_output_tokens: u32,
}

impl GenerationOptions {
    pub fn from_config(config: &StudyConfig) -> Self {
        Self {
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    fn to_json(self) -> Value {
        json!({
            "temperature": self.temperature,
            "maxOutputTokens": self.max_output_tokens,
            "responseMimeType": "application/json",
        })
    }
}

/// Prompt followed by a block of document text.
pub fn text_request(model: &str, prompt: &str, content: &str, options: GenerationOptions) -> ApiRequest {
    ApiRequest {
        model: model.to_string(),
        body: json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    { "text": content },
                ],
            }],
            "generationConfig": options.to_json(),
        }),
    }
}

/// Prompt followed by one inline image.
pub fn image_request(
    model: &str,
    prompt: &str,
    image: &InlineImage,
    options: GenerationOptions,
) -> ApiRequest {
    ApiRequest {
        model: model.to_string(),
        body: json!({
            "contents": [{
                "role": "user",
                "parts": [
                    { "text": prompt },
                    { "inlineData": { "mimeType": image.mime_type, "data": image.data } },
                ],
            }],
            "generationConfig": options.to_json(),
        }),
    }
}

/// The unwrapped model output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelReply {
    pub text: String,
    pub input_tokens: u32,
    pub output_tokens: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Envelope {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    usage_metadata: Option<Usage>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<Content>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Usage {
    #[serde(default)]
    prompt_token_count: u32,
    #[serde(default)]
    candidates_token_count: u32,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

/// Unwrap a `generateContent` response body.
pub fn extract_reply(body: &str) -> Result<ModelReply, ApiError> {
    let envelope: Envelope =
        serde_json::from_str(body).map_err(|e| ApiError::MalformedResponse {
            reason: format!("invalid response envelope: {e}"),
            raw: body.to_string(),
        })?;

    if let Some(reason) = envelope.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(ApiError::MalformedResponse {
            reason: format!("prompt blocked: {reason}"),
            raw: body.to_string(),
        });
    }

    let candidate = envelope
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ApiError::MalformedResponse {
            reason: "no candidates in response".to_string(),
            raw: body.to_string(),
        })?;

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        let reason = match candidate.finish_reason {
            Some(r) => format!("empty candidate (finish reason {r})"),
            None => "empty candidate".to_string(),
        };
        return Err(ApiError::MalformedResponse {
            reason,
            raw: body.to_string(),
        });
    }

    let (input_tokens, output_tokens) = envelope
        .usage_metadata
        .map(|u| (u.prompt_token_count, u.candidates_token_count))
        .unwrap_or((0, 0));

    Ok(ModelReply {
        text,
        input_tokens,
        output_tokens,
    })
}

/// Wrap `text` in a minimal successful envelope.
///
/// Mock transports use this to answer like the real API.
pub fn reply_envelope(text: &str) -> String {
    json!({
        "candidates": [{
            "content": { "role": "model", "parts": [{ "text": text }] },
            "finishReason": "STOP",
        }],
        "usageMetadata": { "promptTokenCount": 100, "candidatesTokenCount": 50 },
    })
    .to_string()
}
