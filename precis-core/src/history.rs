//! Durable summarization history.
//!
//! The whole log lives in one JSON array file, newest record first. Every
//! operation validates the file before touching it: a missing file is created
//! as `[]`, an unparseable one is reset to `[]` (optionally moved aside first),
//! so callers only ever observe a well-formed log.
//!
//! Writes replace the file wholesale through a sibling temp file and a rename,
//! so a failed write leaves the previous document in place. All operations on
//! one `HistoryStore` serialize on an internal mutex; separate processes
//! sharing a file are not coordinated and the last rename wins.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const EMPTY_LOG: &[u8] = b"[]";

/// One summarization event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub text: String,
    pub summary: String,
    /// RFC 3339 UTC, millisecond precision.
    pub timestamp: String,
}

impl HistoryRecord {
    /// Build a record stamped with the current time.
    pub fn now(text: impl Into<String>, summary: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            summary: summary.into(),
            timestamp: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        DateTime::parse_from_rfc3339(&self.timestamp)
            .ok()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Error, Debug)]
pub enum HistoryError {
    #[error("failed to read history at {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write history at {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode history: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl HistoryError {
    pub fn is_write(&self) -> bool {
        matches!(self, HistoryError::Write { .. } | HistoryError::Serialize(_))
    }
}

/// What `ensure_valid` found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Validation {
    Intact,
    Created,
    /// The file was unparseable and has been reset. `quarantined` holds the
    /// location of the preserved bytes when quarantine is enabled.
    Reset { quarantined: Option<PathBuf> },
}

pub struct HistoryStore {
    path: PathBuf,
    quarantine_corrupt: bool,
    lock: Mutex<()>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            quarantine_corrupt: true,
            lock: Mutex::new(()),
        }
    }

    /// Whether a corrupted file is kept next to the log before it is reset.
    pub fn with_quarantine(mut self, enabled: bool) -> Self {
        self.quarantine_corrupt = enabled;
        self
    }

    pub fn from_config(config: &crate::config::HistoryConfig) -> Self {
        Self::new(config.resolved_path()).with_quarantine(config.quarantine_corrupt)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure the backing file exists and holds a valid log.
    pub async fn ensure_valid(&self) -> Result<Validation, HistoryError> {
        let _guard = self.lock.lock().await;
        self.ensure_valid_locked().await.map(|(validation, _)| validation)
    }

    /// Full log, newest first.
    pub async fn read_all(&self) -> Result<Vec<HistoryRecord>, HistoryError> {
        let _guard = self.lock.lock().await;
        let (_, records) = self.ensure_valid_locked().await?;
        Ok(records)
    }

    /// Insert `record` at the front of the log and persist the whole log.
    pub async fn append(&self, record: HistoryRecord) -> Result<(), HistoryError> {
        let _guard = self.lock.lock().await;
        let (_, mut records) = self.ensure_valid_locked().await?;
        records.insert(0, record);

        let encoded = serde_json::to_vec_pretty(&records)?;
        self.replace(&encoded).await?;

        tracing::debug!(
            path = %self.path.display(),
            records = records.len(),
            "Appended history record"
        );
        Ok(())
    }

    /// Validates the file and hands back its parsed contents so callers
    /// holding the lock don't read it twice.
    async fn ensure_valid_locked(&self) -> Result<(Validation, Vec<HistoryRecord>), HistoryError> {
        let bytes = match fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    fs::create_dir_all(parent)
                        .await
                        .map_err(|source| self.write_err(source))?;
                }
                self.replace(EMPTY_LOG).await?;
                tracing::info!(path = %self.path.display(), "Created empty history file");
                return Ok((Validation::Created, Vec::new()));
            }
            Err(source) => {
                return Err(HistoryError::Read {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        match serde_json::from_slice::<Vec<HistoryRecord>>(&bytes) {
            Ok(records) => Ok((Validation::Intact, records)),
            Err(parse_err) => {
                let quarantined = if self.quarantine_corrupt {
                    Some(self.quarantine().await?)
                } else {
                    None
                };
                self.replace(EMPTY_LOG).await?;
                tracing::warn!(
                    path = %self.path.display(),
                    error = %parse_err,
                    quarantined = ?quarantined,
                    "History file was corrupted and has been reset to an empty log"
                );
                Ok((Validation::Reset { quarantined }, Vec::new()))
            }
        }
    }

    /// Move the current file aside as `<name>.corrupt-<stamp>`, adding a
    /// `-<n>` suffix when that name is already taken.
    async fn quarantine(&self) -> Result<PathBuf, HistoryError> {
        let stamp = Utc::now().format("%Y%m%dT%H%M%S%.3fZ");
        let mut base = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "history.json".into());
        base.push(format!(".corrupt-{}", stamp));

        // Claim the name first; rename would silently replace an earlier copy.
        let mut attempt: u32 = 0;
        let target = loop {
            let mut name = base.clone();
            if attempt > 0 {
                name.push(format!("-{}", attempt));
            }
            let candidate = self.path.with_file_name(name);
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&candidate)
                .await
            {
                Ok(_) => break candidate,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => attempt += 1,
                Err(source) => return Err(self.write_err(source)),
            }
        };

        fs::rename(&self.path, &target)
            .await
            .map_err(|source| self.write_err(source))?;
        Ok(target)
    }

    /// Write-then-rename so readers never see a half-written document.
    async fn replace(&self, contents: &[u8]) -> Result<(), HistoryError> {
        let tmp = self.temp_path();

        let written = async {
            let mut file = fs::File::create(&tmp).await?;
            file.write_all(contents).await?;
            file.sync_all().await?;
            drop(file);
            fs::rename(&tmp, &self.path).await
        }
        .await;

        if let Err(source) = written {
            let _ = fs::remove_file(&tmp).await;
            return Err(self.write_err(source));
        }
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "history.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn write_err(&self, source: std::io::Error) -> HistoryError {
        HistoryError::Write {
            path: self.path.clone(),
            source,
        }
    }
}
