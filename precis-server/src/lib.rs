pub mod http;
pub mod subsystems;

use std::sync::Arc;

use precis_core::history::Validation;
use precis_core::{GeminiClient, HistoryStore, PrecisConfig, PrecisError};

use crate::subsystems::summarize::SummarizationGateway;

/// Load the TOML file at `path` with `PRECIS_*` overrides applied.
pub fn load_config(path: &str) -> Result<PrecisConfig, PrecisError> {
    Ok(PrecisConfig::load(path)?)
}

/// Wire the Gemini client and history store described by `config`.
///
/// Fails when no API key is configured; the history file itself is not
/// touched until the first request or an explicit `ensure_valid`.
pub fn build_gateway(config: &PrecisConfig) -> Result<SummarizationGateway, PrecisError> {
    let generator = GeminiClient::from_config(&config.gemini)?;
    tracing::info!(
        model = generator.model(),
        timeout_secs = config.gemini.timeout_seconds,
        "Gemini client ready"
    );

    let history = HistoryStore::from_config(&config.history);
    Ok(SummarizationGateway::new(Arc::new(generator), Arc::new(history)))
}

/// Build the gateway and make sure its history file is usable before the
/// first request arrives.
pub async fn start_gateway(
    config: &PrecisConfig,
) -> Result<(SummarizationGateway, Validation), PrecisError> {
    let gateway = build_gateway(config)?;
    let validation = gateway.history().ensure_valid().await?;
    Ok((gateway, validation))
}
