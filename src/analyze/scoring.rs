//! Candidate scorer.
//!
//! score = Σ flag bonuses (actor, wide, theatre, military, diplomatic)
//!       − low_priority_each × (distinct low-priority hits)
//!       + era bonus when `era_start <= year <= era_end`
//!       − foreign_battle when military ∧ foreign ∧ ¬actor ∧ ¬diplomatic
//!
//! Pure function of `(text, year)`: no I/O, never fails.

use std::cmp::Ordering;

use super::lexicon::{Lexicon, Lexicons};
use crate::candidate::{CandidateEvent, CandidateFlags, ScoredCandidate};

/// Score + flags + contribution trace for one text.
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub score: f32,
    pub flags: CandidateFlags,
    pub reasons: Vec<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct Scorer<'a> {
    lexicons: &'a Lexicons,
}

impl<'a> Scorer<'a> {
    pub fn new(lexicons: &'a Lexicons) -> Self {
        Self { lexicons }
    }

    /// Lexicon membership only.
    pub fn flags(&self, text: &str) -> CandidateFlags {
        let lower = text.to_lowercase();
        self.flags_lower(&lower)
    }

    fn flags_lower(&self, lower: &str) -> CandidateFlags {
        let lx = self.lexicons;
        CandidateFlags {
            has_spanish_actor: lx.spanish_actor.matches(lower),
            has_spanish_wide: lx.spanish_wide.matches(lower),
            has_spanish_theatre: lx.spanish_theatre.matches(lower),
            has_military: lx.military.matches(lower),
            has_diplomatic: lx.diplomatic.matches(lower),
            has_foreign: lx.foreign_actor.matches(lower),
            low_priority_hits: lx.low_priority.matched(lower).len(),
        }
    }

    pub fn evaluate(&self, text: &str, year: i32) -> Evaluation {
        let lx = self.lexicons;
        let policy = &lx.policy;
        let lower = text.to_lowercase();
        let flags = self.flags_lower(&lower);

        let mut score = 0.0f32;
        let mut reasons = Vec::new();

        let mut bonus = |on: bool, lex: &Lexicon, score: &mut f32| {
            if on {
                *score += lex.weight;
                reasons.push(format!("{}:{:+}", lex.name, lex.weight));
            }
        };
        bonus(flags.has_spanish_actor, &lx.spanish_actor, &mut score);
        bonus(flags.has_spanish_wide, &lx.spanish_wide, &mut score);
        bonus(flags.has_spanish_theatre, &lx.spanish_theatre, &mut score);
        bonus(flags.has_military, &lx.military, &mut score);
        bonus(flags.has_diplomatic, &lx.diplomatic, &mut score);

        if flags.low_priority_hits > 0 {
            let delta = lx.low_priority.weight * flags.low_priority_hits as f32;
            score += delta;
            reasons.push(format!(
                "low_priority:{}x:{:+}",
                flags.low_priority_hits, delta
            ));
        }

        if (policy.era_start..=policy.era_end).contains(&year) {
            score += policy.era_bonus;
            reasons.push(format!("era:{:+}", policy.era_bonus));
        }

        if foreign_battle(&flags) {
            score -= policy.foreign_battle;
            reasons.push(format!("foreign_battle:{:+}", -policy.foreign_battle));
        }

        Evaluation {
            score,
            flags,
            reasons,
        }
    }

    pub fn score(&self, candidate: CandidateEvent) -> ScoredCandidate {
        let ev = self.evaluate(&candidate.text, candidate.year);
        tracing::debug!(
            target: "scoring",
            id = %candidate.log_id(),
            year = candidate.year,
            score = ev.score,
            reasons = ?ev.reasons,
            "scored candidate"
        );
        ScoredCandidate {
            candidate,
            score: ev.score,
            flags: ev.flags,
            reasons: ev.reasons,
        }
    }

    pub fn score_all(&self, candidates: Vec<CandidateEvent>) -> Vec<ScoredCandidate> {
        candidates.into_iter().map(|c| self.score(c)).collect()
    }
}

/// Military event between other nations that merely mentions a foreign belligerent.
pub fn foreign_battle(flags: &CandidateFlags) -> bool {
    flags.has_military && flags.has_foreign && !flags.has_spanish_actor && !flags.has_diplomatic
}

/// Stable descending sort: equal scores keep source order.
pub fn rank(scored: &mut [ScoredCandidate]) {
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
}

/// First maximum in source order.
pub fn best(scored: &[ScoredCandidate]) -> Option<&ScoredCandidate> {
    let mut top: Option<&ScoredCandidate> = None;
    for s in scored {
        match top {
            Some(t) if s.score <= t.score => {}
            _ => top = Some(s),
        }
    }
    top
}
