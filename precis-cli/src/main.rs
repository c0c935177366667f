//! precis-cli — command-line client for the Precis summarization service
//!
//! # Subcommands
//! - `summarize [TEXT] [--file PATH] [--json]` — summarize text (argument, file, or stdin)
//! - `history [-n <limit>] [--json]`            — list past summaries, newest first
//! - `status`                                    — show server health

use std::io::Read;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

const DEFAULT_SERVER: &str = "http://127.0.0.1:5000";
const PREVIEW_CHARS: usize = 80;

// ============================================================================
// CLI Definition
// ============================================================================

#[derive(Debug, Parser)]
#[command(
    name = "precis-cli",
    version,
    about = "Precis summarization service — command-line client"
)]
struct Cli {
    /// Precis HTTP server URL (overrides PRECIS_HTTP_URL env var)
    #[arg(long, env = "PRECIS_HTTP_URL", default_value = DEFAULT_SERVER)]
    server: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Summarize text; reads stdin when neither TEXT nor --file is given
    Summarize {
        /// Text to summarize
        text: Option<String>,

        /// Read the text from a file instead
        #[arg(short, long, conflicts_with = "text")]
        file: Option<std::path::PathBuf>,

        /// Print the raw JSON response
        #[arg(long)]
        json: bool,
    },

    /// List past summaries, newest first
    History {
        /// Maximum number of entries to show
        #[arg(short = 'n', long)]
        limit: Option<usize>,

        /// Print the raw JSON array
        #[arg(long)]
        json: bool,
    },

    /// Show Precis server status
    Status,
}

// ============================================================================
// API Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SummarizeResponse {
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    pub message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    pub content: String,
}

impl SummarizeResponse {
    pub fn summary(&self) -> Option<&str> {
        self.choices.first().map(|c| c.message.content.as_str())
    }
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct HistoryEntry {
    pub text: String,
    pub summary: String,
    pub timestamp: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

/// Server error message from a `{ "message": ... }` body, raw body otherwise.
pub fn error_message(body: &str) -> String {
    serde_json::from_str::<ErrorBody>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| body.to_string())
}

/// One-line preview: whitespace collapsed, capped at `max` chars.
pub fn preview(text: &str, max: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max {
        return collapsed;
    }
    let mut out: String = collapsed.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

pub fn format_entry(entry: &HistoryEntry) -> String {
    format!(
        "{}  {}\n  → {}\n",
        entry.timestamp,
        preview(&entry.text, PREVIEW_CHARS),
        entry.summary.trim()
    )
}

// ============================================================================
// HTTP Client Calls
// ============================================================================

fn client(timeout_secs: u64) -> anyhow::Result<reqwest::blocking::Client> {
    Ok(reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()?)
}

fn read_input(text: Option<String>, file: Option<std::path::PathBuf>) -> anyhow::Result<String> {
    if let Some(t) = text {
        return Ok(t);
    }
    if let Some(path) = file {
        return std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("cannot read {}: {}", path.display(), e));
    }
    let mut buf = String::new();
    std::io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

/// Summarize text via POST /summarize.
fn do_summarize(server: &str, text: &str, json_output: bool) -> anyhow::Result<()> {
    // Generation on large documents can take a while.
    let client = client(120)?;
    let url = format!("{}/summarize", server);

    let resp = match client
        .post(&url)
        .json(&serde_json::json!({ "text": text }))
        .send()
    {
        Ok(r) => r,
        Err(e) => {
            eprintln!("precis-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    let status = resp.status();
    let history_failed = resp
        .headers()
        .get("x-precis-history")
        .map(|v| v == "failed")
        .unwrap_or(false);
    let body = resp.text().unwrap_or_default();

    if !status.is_success() {
        eprintln!("precis-cli: server returned {}: {}", status, error_message(&body));
        std::process::exit(1);
    }

    if json_output {
        println!("{}", body);
    } else {
        let parsed: SummarizeResponse = serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("failed to parse summarize response: {}", e))?;
        println!("{}", parsed.summary().unwrap_or_default());
    }

    if history_failed {
        eprintln!("precis-cli: warning: summary was not saved to history");
    }

    Ok(())
}

/// List history via GET /history.
fn do_history(server: &str, limit: Option<usize>, json_output: bool) -> anyhow::Result<()> {
    let client = client(30)?;
    let url = format!("{}/history", server);

    let resp = match client.get(&url).send() {
        Ok(r) => r,
        Err(e) => {
            eprintln!("precis-cli: connection failed to {}: {}", url, e);
            std::process::exit(1);
        }
    };

    if !resp.status().is_success() {
        let status = resp.status();
        let body = resp.text().unwrap_or_default();
        eprintln!("precis-cli: server returned {}: {}", status, error_message(&body));
        std::process::exit(1);
    }

    let mut entries: Vec<HistoryEntry> = resp
        .json()
        .map_err(|e| anyhow::anyhow!("failed to parse history response: {}", e))?;
    if let Some(n) = limit {
        entries.truncate(n);
    }

    if json_output {
        println!("{}", serde_json::to_string_pretty(&entries)?);
        return Ok(());
    }

    if entries.is_empty() {
        eprintln!("No summaries recorded yet.");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", format_entry(entry));
    }

    Ok(())
}

/// Show the server status by calling GET /health.
fn do_status(server: &str) -> anyhow::Result<()> {
    let client = client(10)?;
    let url = format!("{}/health", server);

    match client.get(&url).send() {
        Ok(r) if r.status().is_success() => {
            let body: serde_json::Value = r.json().unwrap_or_default();
            println!("Precis server: {}", body["status"].as_str().unwrap_or("unknown"));
            println!("Version:       {}", body["version"].as_str().unwrap_or("?"));
            println!("Generator:     {}", body["generator"].as_str().unwrap_or("?"));
            println!("History file:  {}", body["history"].as_str().unwrap_or("?"));
        }
        Ok(r) => {
            let status = r.status();
            eprintln!("precis-cli: server unhealthy (HTTP {})", status);
            std::process::exit(1);
        }
        Err(e) => {
            eprintln!("precis-cli: cannot reach {} — {}", url, e);
            std::process::exit(1);
        }
    }

    Ok(())
}

// ============================================================================
// Main
// ============================================================================

fn main() {
    let cli = Cli::parse();
    let server = cli.server.trim_end_matches('/').to_string();

    let result = match cli.command {
        Commands::Summarize { text, file, json } => {
            read_input(text, file).and_then(|input| do_summarize(&server, &input, json))
        }
        Commands::History { limit, json } => do_history(&server, limit, json),
        Commands::Status => do_status(&server),
    };

    if let Err(e) = result {
        eprintln!("precis-cli: {}", e);
        std::process::exit(1);
    }
}

// ============================================================================
// Tests
// ============================================================================
