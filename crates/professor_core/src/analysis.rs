//! crates/professor_core/src/analysis.rs
//!
//! The analysis request pipeline: one backend call per request, strict
//! validation of the returned document, and classification of failures into
//! the fixed set of kinds the UI knows how to explain.

use std::sync::Arc;
use tracing::{error, info};

use crate::domain::{AnalysisResult, AnalysisSession};
use crate::history::HistoryStore;
use crate::ports::{Clock, ContentAnalysisService};

/// The instruction sent along with the content on every analysis call.
pub const ANALYSIS_INSTRUCTIONS: &str = r#"Analyze the following academic content. Your task is to act as an expert professor.
1. Identify all the major chapters, units, or main sections.
2. Within each chapter, identify all important topics or key concepts.
3. For each topic, provide a detailed, comprehensive explanation as if you were teaching it to a university student. The explanation should be thorough, clear, and easy to understand.
4. Structure the final output strictly as the requested JSON object.
5. **Formatting Instructions for Explanations**: Use markdown for all explanations. Use markdown headings (e.g., '### Sub-heading') to structure longer explanations. Emphasize **any important keywords or key terms** by making them bold."#;

/// Builds the full prompt for one piece of content.
pub fn analysis_prompt(content_text: &str) -> String {
    format!("{}\n\nContent:\n---\n{}\n---", ANALYSIS_INSTRUCTIONS, content_text)
}

/// JSON schema of the document the backend must return.
pub fn analysis_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "chapters": {
                "type": "array",
                "description": "An array of chapters, each containing topics from the content.",
                "items": {
                    "type": "object",
                    "properties": {
                        "chapterTitle": {
                            "type": "string",
                            "description": "The title of the chapter or main unit."
                        },
                        "topics": {
                            "type": "array",
                            "description": "An array of topics within this chapter.",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "title": {
                                        "type": "string",
                                        "description": "The name of the specific topic or concept."
                                    },
                                    "explanation": {
                                        "type": "string",
                                        "description": "A detailed, professor-like explanation of the topic, written in markdown format. It should include headings for structure and have key terms in **bold**."
                                    }
                                },
                                "required": ["title", "explanation"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["chapterTitle", "topics"],
                    "additionalProperties": false
                }
            }
        },
        "required": ["chapters"],
        "additionalProperties": false
    })
}

//=========================================================================================
// Errors
//=========================================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnalysisErrorKind {
    InvalidKey,
    BillingDisabled,
    QuotaExceeded,
    RegionUnsupported,
    Unknown,
}

impl AnalysisErrorKind {
    /// Classifies a backend error message. The checks run in a fixed priority order.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        if lower.contains("api_key") || lower.contains("api key not valid") {
            Self::InvalidKey
        } else if lower.contains("billing") {
            Self::BillingDisabled
        } else if lower.contains("quota") {
            Self::QuotaExceeded
        } else if lower.contains("location is not supported") {
            Self::RegionUnsupported
        } else {
            Self::Unknown
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            Self::InvalidKey => "The AI API key is not configured correctly or is invalid. If you are the owner of this site, please check your environment variables.",
            Self::BillingDisabled => "Billing is not enabled for the project associated with the API key. The site owner needs to enable billing to use this feature.",
            Self::QuotaExceeded => "The application has exceeded its API quota. Please try again later.",
            Self::RegionUnsupported => "The AI model is not available in the region where your request is being made from. This can sometimes happen with server locations on hosting platforms.",
            Self::Unknown => "An error occurred while analyzing the content. Please try again.",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalysisError {
    /// Rejected before any network call.
    #[error("Please paste your content first.")]
    EmptyInput,
    #[error("Analysis failed ({kind:?}): {detail}")]
    Failed { kind: AnalysisErrorKind, detail: String },
}

impl AnalysisError {
    fn failed(kind: AnalysisErrorKind, detail: impl Into<String>) -> Self {
        Self::Failed { kind, detail: detail.into() }
    }

    pub fn kind(&self) -> Option<AnalysisErrorKind> {
        match self {
            Self::EmptyInput => None,
            Self::Failed { kind, .. } => Some(*kind),
        }
    }

    /// The text shown on the error screen.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::EmptyInput => "Please paste your content first.",
            Self::Failed { kind, .. } => kind.user_message(),
        }
    }
}

//=========================================================================================
// Response parsing
//=========================================================================================

/// Parses and validates the backend's JSON document.
pub fn parse_analysis(raw: &str) -> Result<AnalysisResult, AnalysisError> {
    let json = strip_code_fence(raw.trim());
    serde_json::from_str::<AnalysisResult>(json).map_err(|e| {
        error!("AI response did not match the analysis schema: {}", e);
        AnalysisError::failed(
            AnalysisErrorKind::Unknown,
            format!("Failed to get a valid response from the AI model: {}", e),
        )
    })
}

// Some models wrap JSON answers in ```json fences even in JSON mode.
fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

//=========================================================================================
// Pipeline
//=========================================================================================

pub struct AnalysisPipeline {
    service: Arc<dyn ContentAnalysisService>,
    clock: Arc<dyn Clock>,
}

impl AnalysisPipeline {
    pub fn new(service: Arc<dyn ContentAnalysisService>, clock: Arc<dyn Clock>) -> Self {
        Self { service, clock }
    }

    /// Runs one analysis. Never retries.
    pub async fn analyze(&self, content_text: &str) -> Result<AnalysisResult, AnalysisError> {
        if content_text.trim().is_empty() {
            return Err(AnalysisError::EmptyInput);
        }

        info!("Requesting analysis of {} characters.", content_text.len());
        let raw = self
            .service
            .analyze_content(content_text)
            .await
            .map_err(|e| {
                let message = e.to_string();
                error!("Analysis call failed: {}", message);
                AnalysisError::failed(AnalysisErrorKind::classify(&message), message)
            })?;

        let result = parse_analysis(&raw)?;
        info!(
            "Analysis produced {} chapters and {} topics.",
            result.chapters.len(),
            result.topic_count()
        );
        Ok(result)
    }

    /// Runs one analysis and prepends it to the active user's history.
    pub async fn analyze_and_record(
        &self,
        content_text: &str,
        history: &mut HistoryStore,
    ) -> Result<AnalysisSession, AnalysisError> {
        let result = self.analyze(content_text).await?;
        Ok(self.record(content_text, result, history).await)
    }

    /// Stamps a successful result and prepends it to the active user's history.
    pub async fn record(
        &self,
        content_text: &str,
        result: AnalysisResult,
        history: &mut HistoryStore,
    ) -> AnalysisSession {
        let session = AnalysisSession {
            timestamp: self.clock.now_millis(),
            content_text: content_text.to_string(),
            analysis_result: result,
        };
        history.append_analysis(session.clone()).await;
        session
    }
}
