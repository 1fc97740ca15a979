use anyhow::{Context, Result};
use metrics::{describe_counter, describe_gauge, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::path::Path;

pub const ENV_METRICS_TEXTFILE: &str = "EFEMERIDES_METRICS_TEXTFILE";

pub struct Metrics {
    handle: PrometheusHandle,
}

impl Metrics {
    /// Install the global Prometheus recorder. The process is a one-shot job,
    /// so there is no scrape endpoint; see `export_from_env`.
    pub fn init() -> Result<Self> {
        let handle = PrometheusBuilder::new()
            .install_recorder()
            .context("prometheus: install recorder")?;
        describe();
        Ok(Self { handle })
    }

    pub fn from_handle(handle: PrometheusHandle) -> Self {
        Self { handle }
    }

    pub fn render(&self) -> String {
        self.handle.render()
    }

    /// Atomic write for the node-exporter textfile collector.
    pub fn write_textfile(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating metrics dir {}", dir.display()))?;
        }
        let tmp = path.with_extension("prom.tmp");
        std::fs::write(&tmp, self.render())
            .with_context(|| format!("writing {}", tmp.display()))?;
        std::fs::rename(&tmp, path)
            .with_context(|| format!("moving metrics into {}", path.display()))?;
        Ok(())
    }

    /// Write the textfile when `EFEMERIDES_METRICS_TEXTFILE` is set.
    pub fn export_from_env(&self) -> Result<()> {
        match std::env::var(ENV_METRICS_TEXTFILE) {
            Ok(p) if !p.trim().is_empty() => self.write_textfile(Path::new(p.trim())),
            _ => Ok(()),
        }
    }
}

fn describe() {
    describe_counter!("candidates_ingested_total", "Candidates entering selection.");
    describe_counter!(
        "candidates_repeated_total",
        "Candidates dropped as repeats of recent posts."
    );
    describe_counter!(
        "verify_rejected_total",
        "Candidates rejected by the date verifier, by reason."
    );
    describe_counter!("posts_published_total", "Posts (headlines and replies) published.");
    describe_counter!("pending_saved_total", "Threads saved for the next run.");
    describe_gauge!(
        "run_outcome",
        "Last run: 0 published, 1 pending published, 2 deferred, 3 nothing, -1 error."
    );
}

/// Gauge value for the `run_outcome` series.
pub fn set_run_outcome(code: i32) {
    gauge!("run_outcome").set(f64::from(code));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn textfile_contains_recorded_series() {
        let recorder = PrometheusBuilder::new().build_recorder();
        let m = Metrics::from_handle(recorder.handle());
        metrics::with_local_recorder(&recorder, || {
            metrics::counter!("posts_published_total").increment(2);
            set_run_outcome(0);
        });

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("efemerides.prom");
        m.write_textfile(&path).unwrap();
        let body = std::fs::read_to_string(&path).unwrap();
        assert!(body.contains("posts_published_total 2"));
        assert!(body.contains("run_outcome 0"));
    }
}
