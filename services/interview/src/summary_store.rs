use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use interview_core::session::{SessionSummary, SummarySink};
use serde::{Deserialize, Serialize};

/// One persisted session: the summary plus a millisecond timestamp id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSummary {
    pub id: i64,
    #[serde(flatten)]
    pub summary: SessionSummary,
}

/// Appends finished sessions to a JSON array on disk.
#[derive(Debug, Clone)]
pub struct JsonFileSummaryStore {
    path: PathBuf,
}

impl JsonFileSummaryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Every stored session, oldest first. A missing file is an empty history.
    pub async fn load(&self) -> Result<Vec<StoredSummary>> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) if content.trim().is_empty() => Ok(Vec::new()),
            Ok(content) => serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse session history: {}", self.path.display())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e)
                .with_context(|| format!("Failed to read session history: {}", self.path.display())),
        }
    }
}

#[async_trait]
impl SummarySink for JsonFileSummaryStore {
    async fn persist(&self, summary: &SessionSummary) -> Result<()> {
        let mut history = self.load().await?;
        history.push(StoredSummary {
            id: Utc::now().timestamp_millis(),
            summary: summary.clone(),
        });

        let json = serde_json::to_string_pretty(&history)?;
        tokio::fs::write(&self.path, json)
            .await
            .with_context(|| format!("Failed to write session history: {}", self.path.display()))?;

        tracing::info!("Saved session to {}", self.path.display());
        Ok(())
    }
}
