use thiserror::Error;

#[derive(Error, Debug)]
pub enum PrecisError {
    #[error("Config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("History error: {0}")]
    History(#[from] crate::history::HistoryError),

    #[error("Generation error: {0}")]
    Generate(#[from] crate::gemini::GenerateError),
}
