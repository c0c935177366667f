pub mod config;
pub mod error;
pub mod gemini;
pub mod history;

pub use config::PrecisConfig;
pub use error::PrecisError;
pub use gemini::{GeminiClient, GenerateError, TextGenerator};
pub use history::{HistoryError, HistoryRecord, HistoryStore};
