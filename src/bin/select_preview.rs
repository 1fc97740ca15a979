//! Offline ranking preview: reads candidates from a JSON file, runs the
//! selector without date verification and prints the ranked table.
//!
//! Usage: select-preview <candidates.json> [previous_posts.txt]
//!
//! Candidates: `[{"year": 1492, "text": "...", "source": "scraped"}, ...]`
//! (`source` defaults to `scraped`). Previous posts: one per line.

use anyhow::{Context, Result};
use serde::Deserialize;

use efemerides_bot::analyze::{rank, Lexicons, Scorer};
use efemerides_bot::{CandidateEvent, DayMonth, Selector, SourceTag};

#[derive(Deserialize)]
struct Item {
    year: i32,
    text: String,
    #[serde(default = "default_source")]
    source: SourceTag,
}

fn default_source() -> SourceTag {
    SourceTag::Scraped
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let mut args = std::env::args().skip(1);
    let path = args
        .next()
        .context("usage: select-preview <candidates.json> [previous_posts.txt]")?;
    let previous: Vec<String> = match args.next() {
        Some(p) => std::fs::read_to_string(&p)
            .with_context(|| format!("reading {p}"))?
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(str::to_lowercase)
            .collect(),
        None => Vec::new(),
    };

    let raw = std::fs::read_to_string(&path).with_context(|| format!("reading {path}"))?;
    let items: Vec<Item> = serde_json::from_str(&raw).context("parsing candidates JSON")?;
    let candidates: Vec<CandidateEvent> = items
        .into_iter()
        .filter_map(|i| CandidateEvent::new(i.year, i.text, i.source))
        .collect();

    let lexicons = Lexicons::load_default()?;

    let mut scored = Scorer::new(&lexicons).score_all(candidates.clone());
    rank(&mut scored);
    println!("{:>4}  {:>7}  {:>6}  text", "#", "score", "year");
    for (i, s) in scored.iter().enumerate() {
        let text: String = s.candidate.text.chars().take(70).collect();
        println!("{:>4}  {:>7.1}  {:>6}  {}", i + 1, s.score, s.candidate.year, text);
        println!("{:>22}{}", "", s.reasons.join(" "));
    }

    // Verification is off, so the date key only feeds logging.
    let today = DayMonth::new(1, 1).context("date key")?;
    let report = Selector::new(&lexicons)
        .select_with_report(candidates, &previous, today)
        .await;
    println!();
    println!("repeated: {}", report.repeated);
    match report.chosen {
        Some(c) => println!("selected: {} ({:+.1}) {}", c.candidate.year, c.score, c.candidate.text),
        None => println!("selected: none"),
    }
    Ok(())
}
