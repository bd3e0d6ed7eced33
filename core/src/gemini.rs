//! Gemini `generateContent` wire types.

use serde::{Deserialize, Serialize};

use crate::advice::{GenerationError, GenerationParams};

pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";
pub const API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateRequest {
    pub contents: Vec<Content>,
    pub generation_config: GenerationConfig,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Content {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Part {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub max_output_tokens: u32,
    pub top_p: f32,
    pub top_k: u32,
}

impl From<GenerationParams> for GenerationConfig {
    fn from(p: GenerationParams) -> Self {
        Self {
            temperature: p.temperature,
            max_output_tokens: p.max_output_tokens,
            top_p: p.top_p,
            top_k: p.top_k,
        }
    }
}

impl GenerateRequest {
    #[must_use]
    pub fn new(prompt: &str, params: GenerationParams) -> Self {
        Self {
            contents: vec![Content {
                role: None,
                parts: vec![Part {
                    text: Some(prompt.to_string()),
                }],
            }],
            generation_config: params.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub candidates: Option<Vec<Candidate>>,
    #[serde(default)]
    pub error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    #[serde(default)]
    pub content: Option<Content>,
}

#[derive(Debug, Deserialize)]
pub struct ApiError {
    #[serde(default)]
    pub message: String,
}

impl GenerateResponse {
    /// Text of the first part of the first candidate.
    pub fn into_text(self) -> Result<String, GenerationError> {
        self.candidates
            .and_then(|c| c.into_iter().next())
            .and_then(|c| c.content)
            .and_then(|c| c.parts.into_iter().next())
            .and_then(|p| p.text)
            .ok_or(GenerationError::InvalidResponse)
    }
}

/// Map a non-success HTTP status and body to an error category.
#[must_use]
pub fn error_for_status(status: u16, body: &str) -> GenerationError {
    match status {
        404 => GenerationError::NotFound,
        401 | 403 => GenerationError::Forbidden,
        429 => GenerationError::RateLimited,
        _ => {
            let message = serde_json::from_str::<GenerateResponse>(body)
                .ok()
                .and_then(|r| r.error)
                .map_or_else(|| body.to_string(), |e| e.message);
            GenerationError::Other(format!("HTTP {status}: {message}"))
        }
    }
}
