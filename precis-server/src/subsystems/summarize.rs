//! Summarization gateway: validate input, call the text generator, record the
//! exchange in history.

use std::sync::Arc;

use precis_core::{GenerateError, HistoryError, HistoryRecord, HistoryStore, TextGenerator};
use thiserror::Error;

pub const PROMPT_PREFIX: &str = "Summarize this:\n\n";
pub const NO_SUMMARY_PLACEHOLDER: &str = "No summary found.";

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Text is required for summarization.")]
    Validation,

    #[error("Gemini API call failed.")]
    Upstream(#[source] GenerateError),

    #[error("Failed to load history.")]
    StoreRead(#[source] HistoryError),

    #[error("Failed to save history.")]
    StoreWrite(#[source] HistoryError),
}

/// Outcome of a summarization. `history_error` is set when the summary was
/// produced but could not be recorded.
#[derive(Debug)]
pub struct SummaryResult {
    pub summary: String,
    pub history_error: Option<GatewayError>,
}

impl SummaryResult {
    pub fn persisted(&self) -> bool {
        self.history_error.is_none()
    }
}

#[derive(Clone)]
pub struct SummarizationGateway {
    generator: Arc<dyn TextGenerator>,
    history: Arc<HistoryStore>,
}

impl SummarizationGateway {
    pub fn new(generator: Arc<dyn TextGenerator>, history: Arc<HistoryStore>) -> Self {
        Self { generator, history }
    }

    pub fn history(&self) -> &HistoryStore {
        &self.history
    }

    pub fn generator_name(&self) -> &str {
        self.generator.name()
    }

    pub async fn summarize(&self, text: Option<&str>) -> Result<SummaryResult, GatewayError> {
        let text = match text {
            Some(t) if !t.trim().is_empty() => t,
            _ => return Err(GatewayError::Validation),
        };

        let prompt = format!("{}{}", PROMPT_PREFIX, text);
        let generated = self.generator.generate(&prompt).await.map_err(|e| {
            tracing::error!(generator = self.generator.name(), error = %e, "Summarization failed");
            GatewayError::Upstream(e)
        })?;

        let summary = generated.unwrap_or_else(|| NO_SUMMARY_PLACEHOLDER.to_string());

        // The summary is returned even when it cannot be recorded.
        let history_error = match self
            .history
            .append(HistoryRecord::now(text, summary.clone()))
            .await
        {
            Ok(()) => None,
            Err(e) => {
                tracing::error!(
                    path = %self.history.path().display(),
                    error = %e,
                    "Summary computed but not saved to history"
                );
                Some(GatewayError::StoreWrite(e))
            }
        };

        tracing::info!(
            input_chars = text.chars().count(),
            summary_chars = summary.chars().count(),
            persisted = history_error.is_none(),
            "Summarized text"
        );

        Ok(SummaryResult {
            summary,
            history_error,
        })
    }

    pub async fn list_history(&self) -> Result<Vec<HistoryRecord>, GatewayError> {
        self.history.read_all().await.map_err(|e| {
            tracing::error!(error = %e, "History read failed");
            GatewayError::StoreRead(e)
        })
    }
}
