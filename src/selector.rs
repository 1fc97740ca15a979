//! # Selector
//! filter repeats → score → stable sort → (optional) verify in rank order.
//!
//! "Nothing selected" is a normal outcome meaning "do not publish today".

use metrics::counter;
use tracing::{debug, info, warn};

use crate::analyze::{rank, DuplicateFilter, Lexicons, Scorer};
use crate::candidate::{CandidateEvent, DayMonth, ScoredCandidate};
use crate::verify::{CandidateVerifier, Verdict};

/// What happened during one selection pass.
#[derive(Debug, Clone, Default)]
pub struct SelectionReport {
    pub chosen: Option<ScoredCandidate>,
    pub considered: usize,
    pub repeated: usize,
    /// Verification rejections in rank order: (candidate log id, verdict).
    pub rejections: Vec<(String, Verdict)>,
}

pub struct Selector<'a> {
    lexicons: &'a Lexicons,
    verifier: Option<&'a dyn CandidateVerifier>,
}

impl<'a> Selector<'a> {
    pub fn new(lexicons: &'a Lexicons) -> Self {
        Self {
            lexicons,
            verifier: None,
        }
    }

    /// Enable strict mode: every non-prescoped candidate must pass the verifier.
    pub fn with_verifier(mut self, verifier: &'a dyn CandidateVerifier) -> Self {
        self.verifier = Some(verifier);
        self
    }

    pub async fn select(
        &self,
        candidates: Vec<CandidateEvent>,
        previous: &[String],
        today: DayMonth,
    ) -> Option<ScoredCandidate> {
        self.select_with_report(candidates, previous, today)
            .await
            .chosen
    }

    pub async fn select_with_report(
        &self,
        candidates: Vec<CandidateEvent>,
        previous: &[String],
        today: DayMonth,
    ) -> SelectionReport {
        let mut report = SelectionReport {
            considered: candidates.len(),
            ..Default::default()
        };

        // 1) duplicate filter
        let filter = DuplicateFilter::new(self.lexicons, previous);
        let mut survivors = Vec::with_capacity(candidates.len());
        for c in candidates {
            if let Some(shared) = filter.repeated_by(&c.text) {
                debug!(
                    target: "selector",
                    id = %c.log_id(),
                    year = c.year,
                    shared = ?shared,
                    "skipping repeated candidate"
                );
                report.repeated += 1;
                continue;
            }
            survivors.push(c);
        }
        counter!("candidates_repeated_total").increment(report.repeated as u64);

        // 2) score + 3) stable sort
        let mut scored = Scorer::new(self.lexicons).score_all(survivors);
        rank(&mut scored);

        if scored.is_empty() {
            info!(
                target: "selector",
                considered = report.considered,
                repeated = report.repeated,
                "no candidate survived filtering"
            );
            return report;
        }

        // 4) verification (strict mode) or top pick
        let Some(verifier) = self.verifier else {
            report.chosen = scored.into_iter().next();
            log_choice(&report);
            return report;
        };

        for s in scored {
            if s.candidate.source.is_prescoped() {
                report.chosen = Some(s);
                break;
            }
            let verdict = verifier.check(&s.candidate, today).await;
            if verdict.is_accepted() {
                report.chosen = Some(s);
                break;
            }
            warn!(
                target: "selector",
                id = %s.candidate.log_id(),
                year = s.candidate.year,
                score = s.score,
                verdict = %verdict,
                "candidate rejected by date verifier"
            );
            counter!("verify_rejected_total", "reason" => verdict.label()).increment(1);
            report.rejections.push((s.candidate.log_id(), verdict));
        }

        if report.chosen.is_none() {
            info!(
                target: "selector",
                rejected = report.rejections.len(),
                "no candidate passed verification"
            );
        } else {
            log_choice(&report);
        }
        report
    }
}

fn log_choice(report: &SelectionReport) {
    if let Some(s) = &report.chosen {
        info!(
            target: "selector",
            id = %s.candidate.log_id(),
            year = s.candidate.year,
            source = s.candidate.source.as_str(),
            score = s.score,
            reasons = ?s.reasons,
            considered = report.considered,
            repeated = report.repeated,
            rejected = report.rejections.len(),
            "candidate selected"
        );
    }
}
