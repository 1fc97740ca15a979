// tests/selector_e2e.rs
use async_trait::async_trait;
use std::sync::Mutex;

use efemerides_bot::analyze::Lexicons;
use efemerides_bot::verify::{CandidateVerifier, Verdict};
use efemerides_bot::{CandidateEvent, DayMonth, Selector, SourceTag};

fn today() -> DayMonth {
    DayMonth::new(12, 10).unwrap()
}

fn scraped(year: i32, text: &str) -> CandidateEvent {
    CandidateEvent::new(year, text, SourceTag::Scraped).unwrap()
}

fn generated(year: i32, text: &str) -> CandidateEvent {
    CandidateEvent::new(year, text, SourceTag::Generated).unwrap()
}

/// Accepts only years in the allow-list and records every year it was asked about.
struct YearVerifier {
    accept: Vec<i32>,
    asked: Mutex<Vec<i32>>,
}

impl YearVerifier {
    fn new(accept: &[i32]) -> Self {
        Self {
            accept: accept.to_vec(),
            asked: Mutex::new(Vec::new()),
        }
    }

    fn asked(&self) -> Vec<i32> {
        self.asked.lock().unwrap().clone()
    }
}

#[async_trait]
impl CandidateVerifier for YearVerifier {
    async fn check(&self, candidate: &CandidateEvent, today: DayMonth) -> Verdict {
        self.asked.lock().unwrap().push(candidate.year);
        if self.accept.contains(&candidate.year) {
            Verdict::Accepted(today)
        } else {
            Verdict::NoEntityMatch
        }
    }
}

#[tokio::test]
async fn spanish_actor_beats_foreign_battle_with_builtin_lexicons() {
    let lx = Lexicons::builtin().unwrap();
    let candidates = vec![
        scraped(
            1805,
            "Batalla de Trafalgar: la flota británica vence a la francesa frente al cabo.",
        ),
        scraped(
            1492,
            "Descubrimiento de América: Colón llega a Guanahaní bajo el patrocinio de los Reyes Católicos.",
        ),
    ];
    let report = Selector::new(&lx)
        .select_with_report(candidates, &[], today())
        .await;
    let chosen = report.chosen.expect("a candidate");
    assert_eq!(chosen.candidate.year, 1492);
    assert_eq!(chosen.score, 40.0);
    assert_eq!(report.considered, 2);
    assert_eq!(report.repeated, 0);
}

#[test]
fn trafalgar_fixture_hits_the_foreign_battle_branch() {
    let lx = Lexicons::builtin().unwrap();
    let ev = efemerides_bot::analyze::Scorer::new(&lx).evaluate(
        "Batalla de Trafalgar: la flota británica vence a la francesa frente al cabo.",
        1805,
    );
    assert!(efemerides_bot::analyze::foreign_battle(&ev.flags));
    assert_eq!(ev.score, -18.0);
}

#[tokio::test]
async fn ties_go_to_the_first_in_source_order() {
    let lx = Lexicons::builtin().unwrap();
    let chosen = Selector::new(&lx)
        .select(
            vec![
                scraped(1200, "Fundación de una abadía en Castilla"),
                scraped(1210, "Fundación de un monasterio en Navarra"),
            ],
            &[],
            today(),
        )
        .await
        .unwrap();
    assert_eq!(chosen.candidate.year, 1200);
}

#[tokio::test]
async fn empty_input_selects_nothing() {
    let lx = Lexicons::builtin().unwrap();
    assert!(Selector::new(&lx).select(vec![], &[], today()).await.is_none());
}

#[tokio::test]
async fn everything_repeated_selects_nothing() {
    let lx = Lexicons::builtin().unwrap();
    let previous = vec!["🇪🇸 en tal día como hoy del año 1571, batalla de lepanto: la flota española y sus aliados".to_string()];
    let report = Selector::new(&lx)
        .select_with_report(
            vec![scraped(1571, "Batalla de Lepanto, victoria de la flota española")],
            &previous,
            today(),
        )
        .await;
    assert!(report.chosen.is_none());
    assert_eq!(report.repeated, 1);
}

#[tokio::test]
async fn verifier_walks_down_the_ranking() {
    let lx = Lexicons::builtin().unwrap();
    let verifier = YearVerifier::new(&[1808]);
    let report = Selector::new(&lx)
        .with_verifier(&verifier)
        .select_with_report(
            vec![
                generated(1700, "Felipe V llega a Madrid"),
                generated(1492, "Los Reyes Católicos toman Granada"),
                generated(1808, "Levantamiento en Madrid contra los franceses"),
            ],
            &[],
            today(),
        )
        .await;
    let chosen = report.chosen.expect("1808 passes");
    assert_eq!(chosen.candidate.year, 1808);
    assert_eq!(verifier.asked(), vec![1492, 1700, 1808]);
    assert_eq!(report.rejections.len(), 2);
}

#[tokio::test]
async fn prescoped_sources_skip_verification() {
    let lx = Lexicons::builtin().unwrap();
    let verifier = YearVerifier::new(&[]);
    let chosen = Selector::new(&lx)
        .with_verifier(&verifier)
        .select(
            vec![
                generated(1492, "Los Reyes Católicos toman Granada"),
                CandidateEvent::new(1808, "Levantamiento del Dos de Mayo en Madrid", SourceTag::KnowledgeGraph).unwrap(),
            ],
            &[],
            today(),
        )
        .await
        .expect("knowledge-graph candidate");
    assert_eq!(chosen.candidate.source, SourceTag::KnowledgeGraph);
    assert_eq!(verifier.asked(), vec![1492]);
}

#[tokio::test]
async fn all_rejected_selects_nothing() {
    let lx = Lexicons::builtin().unwrap();
    let verifier = YearVerifier::new(&[]);
    let report = Selector::new(&lx)
        .with_verifier(&verifier)
        .select_with_report(
            vec![generated(1492, "Los Reyes Católicos toman Granada")],
            &[],
            today(),
        )
        .await;
    assert!(report.chosen.is_none());
    assert_eq!(report.rejections.len(), 1);
}
