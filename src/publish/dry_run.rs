// src/publish/dry_run.rs
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{Media, PostId, PublishError, Publisher};

/// Prints the thread to stdout instead of posting. Keeps a copy for inspection.
#[derive(Default)]
pub struct DryRunPublisher {
    seq: AtomicUsize,
    posted: Mutex<Vec<(Option<PostId>, String)>>,
}

impl DryRunPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// (parent, text) for everything "published" so far.
    pub fn posted(&self) -> Vec<(Option<PostId>, String)> {
        self.posted.lock().map(|v| v.clone()).unwrap_or_default()
    }

    fn record(&self, parent: Option<&PostId>, text: &str) -> PostId {
        let id = format!("dry-run-{}", self.seq.fetch_add(1, Ordering::SeqCst) + 1);
        match parent {
            None => println!("── {id}\n{text}\n"),
            Some(p) => println!("── {id} (reply to {p})\n{text}\n"),
        }
        if let Ok(mut v) = self.posted.lock() {
            v.push((parent.cloned(), text.to_string()));
        }
        id
    }
}

#[async_trait]
impl Publisher for DryRunPublisher {
    async fn publish(&self, text: &str, media: Option<&Media>) -> Result<PostId, PublishError> {
        if let Some(m) = media {
            tracing::info!(target: "publish", mime = %m.mime, bytes = m.bytes.len(), "dry run: media would be attached");
        }
        Ok(self.record(None, text))
    }

    async fn reply(&self, parent: &PostId, text: &str) -> Result<PostId, PublishError> {
        Ok(self.record(Some(parent), text))
    }

    fn name(&self) -> &'static str {
        "dry_run"
    }
}
