use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::model::RunSummary;
use crate::output::{self, ExportDocument};

/// Analysis kind the engine saves its summaries under.
pub const ANALYSIS_KIND: &str = "api";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid analysis kind '{kind}'")]
    InvalidKind { kind: String },

    #[error("failed to create store directory {path}: {source}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize summary: {source}")]
    Serialize {
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Persistence boundary. Implementations own normalization and storage; the
/// engine only hands over a finished summary.
pub trait SummaryStore {
    fn save(&self, kind: &str, summary: &RunSummary) -> Result<PathBuf, StoreError>;
}

/// Writes each summary as `{root}/{kind}/{domain}-{unixMillis}.json`.
#[derive(Clone, Debug)]
pub struct JsonDirStore {
    root: PathBuf,
}

impl JsonDirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl SummaryStore for JsonDirStore {
    fn save(&self, kind: &str, summary: &RunSummary) -> Result<PathBuf, StoreError> {
        let kind = kind.trim();
        if kind.is_empty() || !kind.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(StoreError::InvalidKind {
                kind: kind.to_string(),
            });
        }
        let dir = self.root.join(kind);
        std::fs::create_dir_all(&dir).map_err(|e| StoreError::CreateDir {
            path: dir.display().to_string(),
            source: e,
        })?;

        let file_name = format!(
            "{}-{}.json",
            output::sanitize_domain(&summary.domain),
            summary.timestamp.timestamp_millis()
        );
        let path = dir.join(file_name);
        let doc = ExportDocument::from_summary(summary);
        let data =
            serde_json::to_vec_pretty(&doc).map_err(|e| StoreError::Serialize { source: e })?;
        std::fs::write(&path, data).map_err(|e| StoreError::Write {
            path: path.display().to_string(),
            source: e,
        })?;
        tracing::info!(path = %path.display(), kind, "saved run summary");
        Ok(path)
    }
}
