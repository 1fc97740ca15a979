//! pending.rs: single durable slot holding a thread that could not be
//! published (rate limit) so the next run retries it first.
//!
//! `load` never fails: missing, corrupt or schema-mismatched state reads as `None`.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::candidate::DayMonth;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingThread {
    pub headline: String,
    pub followups: Vec<String>,
    /// `DD/MM` of the day this thread was written for.
    pub target_date_key: String,
    /// Set when the headline already went out: remaining follow-ups reply to this post.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reply_to: Option<String>,
}

impl PendingThread {
    pub fn new(headline: impl Into<String>, followups: Vec<String>, target: DayMonth) -> Self {
        Self {
            headline: headline.into(),
            followups,
            target_date_key: target.to_string(),
            reply_to: None,
        }
    }

    pub fn target(&self) -> Option<DayMonth> {
        self.target_date_key.parse().ok()
    }

    pub fn is_for(&self, today: DayMonth) -> bool {
        self.target() == Some(today)
    }
}

#[derive(Debug, Clone)]
pub struct PendingStore {
    path: PathBuf,
}

impl PendingStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Option<PendingThread> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(s) => s,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return None,
            Err(e) => {
                tracing::warn!(target: "pending", path = %self.path.display(), "unreadable pending state: {e}");
                return None;
            }
        };
        let thread: PendingThread = match serde_json::from_str(&raw) {
            Ok(t) => t,
            Err(e) => {
                tracing::warn!(target: "pending", path = %self.path.display(), "ignoring malformed pending state: {e}");
                return None;
            }
        };
        if thread.target().is_none() || thread.headline.trim().is_empty() {
            tracing::warn!(target: "pending", key = %thread.target_date_key, "ignoring pending state with invalid fields");
            return None;
        }
        Some(thread)
    }

    /// Atomic replace (write temp file, then rename).
    pub fn save(&self, thread: &PendingThread) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating state dir {}", dir.display()))?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let json = serde_json::to_vec_pretty(thread).context("serializing pending thread")?;
        let mut f = fs::File::create(&tmp)
            .with_context(|| format!("creating {}", tmp.display()))?;
        f.write_all(&json)?;
        f.sync_all()?;
        fs::rename(&tmp, &self.path)
            .with_context(|| format!("moving pending state into {}", self.path.display()))?;
        Ok(())
    }

    /// Removing an already-empty slot is fine.
    pub fn clear(&self) -> Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e).with_context(|| format!("removing {}", self.path.display())),
        }
    }
}
