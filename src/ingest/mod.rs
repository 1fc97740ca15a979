// src/ingest/mod.rs
pub mod providers;
pub mod types;

use crate::candidate::{CandidateEvent, DayMonth};
use crate::ingest::types::{RawCandidate, SourceProvider};
use metrics::{counter, describe_counter, histogram};
use once_cell::sync::OnceCell;

/// Same year and at least this normalized Levenshtein similarity → same event.
pub const MERGE_SIMILARITY: f64 = 0.85;

const MAX_TEXT_CHARS: usize = 1500;

fn ensure_metrics_described() {
    static ONCE: OnceCell<()> = OnceCell::new();
    ONCE.get_or_init(|| {
        describe_counter!(
            "candidates_ingested_total",
            "Candidates kept after normalization and merge."
        );
        describe_counter!(
            "ingest_provider_errors_total",
            "Provider fetch/parse errors (provider skipped)."
        );
        describe_counter!(
            "ingest_merged_total",
            "Candidates merged into an earlier near-identical one."
        );
    });
}

/// Normalize text: entity decode, tag strip, quote folding, whitespace collapse.
pub fn normalize_text(s: &str) -> String {
    // 1) HTML entity decode
    let mut out = html_escape::decode_html_entities(s).to_string();

    // 2) Strip HTML tags and wiki reference markers like [3]
    static RE_TAGS: OnceCell<regex::Regex> = OnceCell::new();
    let re_tags = RE_TAGS.get_or_init(|| regex::Regex::new(r"(?is)</?[^>]+>").unwrap());
    out = re_tags.replace_all(&out, "").to_string();
    static RE_REFS: OnceCell<regex::Regex> = OnceCell::new();
    let re_refs = RE_REFS.get_or_init(|| regex::Regex::new(r"\[\d+\]").unwrap());
    out = re_refs.replace_all(&out, "").to_string();

    // 3) “ ” « » → ", ‘ ’ → '
    out = out
        .replace(['\u{201C}', '\u{201D}', '\u{00AB}', '\u{00BB}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'");

    // 4) Collapse whitespace
    static RE_WS: OnceCell<regex::Regex> = OnceCell::new();
    let re_ws = RE_WS.get_or_init(|| regex::Regex::new(r"\s+").unwrap());
    out = re_ws.replace_all(&out, " ").trim().to_string();

    // 5) Drop a dangling separator left by list formatting
    while let Some(last) = out.chars().last() {
        if matches!(last, ',' | ';' | ':') {
            out.pop();
            out.truncate(out.trim_end().len());
        } else {
            break;
        }
    }

    if out.chars().count() > MAX_TEXT_CHARS {
        out = out.chars().take(MAX_TEXT_CHARS).collect();
    }
    out
}

/// Collapse near-identical candidates reported by several sources.
/// The first occurrence (source order) survives. Returns (kept, merged_count).
pub fn merge_near_duplicates(candidates: Vec<CandidateEvent>) -> (Vec<CandidateEvent>, usize) {
    let mut kept: Vec<CandidateEvent> = Vec::with_capacity(candidates.len());
    let mut lowered: Vec<String> = Vec::with_capacity(candidates.len());
    let mut merged = 0usize;

    for c in candidates {
        let low = c.text.to_lowercase();
        let dup = kept.iter().zip(&lowered).any(|(k, kl)| {
            k.year == c.year && strsim::normalized_levenshtein(kl, &low) >= MERGE_SIMILARITY
        });
        if dup {
            tracing::debug!(target: "ingest", id = %c.log_id(), year = c.year, source = c.source.as_str(), "merged near-duplicate");
            merged += 1;
            continue;
        }
        lowered.push(low);
        kept.push(c);
    }
    (kept, merged)
}

/// Normalize raw records; returns candidates and the number dropped as blank.
pub fn normalize_all(raw: Vec<RawCandidate>) -> (Vec<CandidateEvent>, usize) {
    let total = raw.len();
    let out: Vec<CandidateEvent> = raw.into_iter().filter_map(RawCandidate::into_candidate).collect();
    let dropped = total - out.len();
    (out, dropped)
}

/// Outcome of one ingest pass.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub candidates: Vec<CandidateEvent>,
    pub failed_providers: Vec<&'static str>,
    pub dropped: usize,
    pub merged: usize,
}

impl IngestReport {
    pub fn all_failed(&self, provider_count: usize) -> bool {
        provider_count > 0 && self.failed_providers.len() == provider_count
    }
}

/// Query every provider in order. A failing provider is logged and skipped.
pub async fn run_once(providers: &[Box<dyn SourceProvider>], today: DayMonth) -> IngestReport {
    ensure_metrics_described();

    let mut report = IngestReport::default();
    let mut raw = Vec::new();
    for p in providers {
        let t0 = std::time::Instant::now();
        match p.fetch(today).await {
            Ok(mut v) => {
                tracing::info!(target: "ingest", provider = p.name(), count = v.len(), "provider fetched");
                raw.append(&mut v);
            }
            Err(e) => {
                tracing::warn!(target: "ingest", error = %e, provider = p.name(), "provider error, skipping");
                counter!("ingest_provider_errors_total", "provider" => p.name()).increment(1);
                report.failed_providers.push(p.name());
            }
        }
        histogram!("ingest_fetch_ms", "provider" => p.name())
            .record(t0.elapsed().as_secs_f64() * 1_000.0);
    }

    let (normalized, dropped) = normalize_all(raw);
    let (kept, merged) = merge_near_duplicates(normalized);

    counter!("candidates_ingested_total").increment(kept.len() as u64);
    counter!("ingest_merged_total").increment(merged as u64);

    if report.all_failed(providers.len()) {
        tracing::warn!(target: "ingest", "every source failed");
    }

    report.candidates = kept;
    report.dropped = dropped;
    report.merged = merged;
    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::candidate::SourceTag;
    use crate::ingest::types::SourceError;

    #[test]
    fn normalize_text_collapses_ws_and_markup() {
        let s = "  <b>Batalla</b>&nbsp;de   Lepanto[2], ";
        assert_eq!(normalize_text(s), "Batalla de Lepanto");
        assert_eq!(normalize_text("«Toma» de ‘Granada’"), "\"Toma\" de 'Granada'");
    }

    #[test]
    fn normalize_text_keeps_final_period() {
        assert_eq!(normalize_text("Fin de la Reconquista."), "Fin de la Reconquista.");
    }

    #[test]
    fn merge_keeps_first_of_same_year_near_duplicates() {
        let a = CandidateEvent::new(1492, "Toma de Granada por los Reyes Católicos", SourceTag::KnowledgeGraph).unwrap();
        let b = CandidateEvent::new(1492, "Toma de Granada por los Reyes Catolicos.", SourceTag::Scraped).unwrap();
        let c = CandidateEvent::new(1493, "Toma de Granada por los Reyes Católicos", SourceTag::Scraped).unwrap();
        let (kept, merged) = merge_near_duplicates(vec![a.clone(), b, c.clone()]);
        assert_eq!(merged, 1);
        assert_eq!(kept, vec![a, c]);
    }

    struct Fixed(Vec<RawCandidate>);
    struct Broken;

    #[async_trait::async_trait]
    impl SourceProvider for Fixed {
        async fn fetch(&self, _today: DayMonth) -> Result<Vec<RawCandidate>, SourceError> {
            Ok(self.0.clone())
        }
        fn name(&self) -> &'static str {
            "fixed"
        }
    }

    #[async_trait::async_trait]
    impl SourceProvider for Broken {
        async fn fetch(&self, _today: DayMonth) -> Result<Vec<RawCandidate>, SourceError> {
            Err(SourceError::Parse("boom".into()))
        }
        fn name(&self) -> &'static str {
            "broken"
        }
    }

    #[tokio::test]
    async fn failing_provider_is_skipped() {
        let providers: Vec<Box<dyn SourceProvider>> = vec![
            Box::new(Broken),
            Box::new(Fixed(vec![RawCandidate::Scraped {
                site: "s".into(),
                year: 1808,
                text: "Dos de Mayo".into(),
            }])),
        ];
        let report = run_once(&providers, DayMonth::new(2, 5).unwrap()).await;
        assert_eq!(report.failed_providers, vec!["broken"]);
        assert_eq!(report.candidates.len(), 1);
        assert!(!report.all_failed(providers.len()));
    }

    #[tokio::test]
    async fn all_failing_yields_empty_report() {
        let providers: Vec<Box<dyn SourceProvider>> = vec![Box::new(Broken)];
        let report = run_once(&providers, DayMonth::new(2, 5).unwrap()).await;
        assert!(report.candidates.is_empty());
        assert!(report.all_failed(1));
    }
}
