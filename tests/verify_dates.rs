// tests/verify_dates.rs
use async_trait::async_trait;
use efemerides_bot::verify::{
    DateFact, DateProperty, DateVerifier, KnowledgeBase, Verdict, VerifyError,
};
use efemerides_bot::{CandidateEvent, ClaimType, DayMonth, SourceTag};

/// One known entity ("Q1") with a fixed set of date facts.
struct FakeKb {
    name: &'static str,
    facts: Vec<DateFact>,
    down: bool,
}

impl FakeKb {
    fn with(facts: Vec<DateFact>) -> Self {
        Self {
            name: "Armada Invencible",
            facts,
            down: false,
        }
    }
}

#[async_trait]
impl KnowledgeBase for FakeKb {
    async fn resolve_entity(&self, name: &str) -> Result<Option<String>, VerifyError> {
        if self.down {
            return Err(VerifyError::Api("maxlag".into()));
        }
        Ok((name == self.name).then(|| "Q1".to_string()))
    }

    async fn date_facts(&self, entity_id: &str) -> Result<Vec<DateFact>, VerifyError> {
        assert_eq!(entity_id, "Q1");
        Ok(self.facts.clone())
    }
}

fn dm(d: u32, m: u32) -> DayMonth {
    DayMonth::new(d, m).unwrap()
}

fn event(entity: &str) -> CandidateEvent {
    CandidateEvent::new(1588, "La Armada Invencible avista Inglaterra", SourceTag::Generated)
        .unwrap()
        .with_entity(entity, ClaimType::Event)
}

fn fact(p: DateProperty, v: &str) -> DateFact {
    DateFact::new(p, v)
}

#[tokio::test]
async fn two_distinct_dates_are_rejected_even_if_one_matches() {
    let kb = FakeKb::with(vec![
        fact(DateProperty::PointInTime, "1588-07-31"),
        fact(DateProperty::PointInTime, "1588-08-08"),
    ]);
    let v = DateVerifier::new(kb);
    let verdict = v.check(&event("Armada Invencible"), dm(31, 7)).await;
    assert_eq!(verdict, Verdict::Ambiguous(vec![dm(31, 7), dm(8, 8)]));
    assert!(!v.verify(&event("Armada Invencible"), dm(31, 7)).await);
}

#[tokio::test]
async fn unique_exact_match_is_accepted() {
    let kb = FakeKb::with(vec![
        fact(DateProperty::PointInTime, "+1588-07-31T00:00:00Z").with_precision(11),
        // Same day/month twice is still one distinct value.
        fact(DateProperty::PointInTime, "1588-07-31"),
    ]);
    let v = DateVerifier::new(kb);
    assert_eq!(
        v.check(&event("Armada Invencible"), dm(31, 7)).await,
        Verdict::Accepted(dm(31, 7))
    );
}

#[tokio::test]
async fn unique_other_date_is_a_mismatch() {
    let kb = FakeKb::with(vec![fact(DateProperty::PointInTime, "1588-08-08")]);
    let v = DateVerifier::new(kb);
    assert_eq!(
        v.check(&event("Armada Invencible"), dm(31, 7)).await,
        Verdict::Mismatch(dm(8, 8))
    );
}

#[tokio::test]
async fn no_usable_dates_is_rejected() {
    let v = DateVerifier::new(FakeKb::with(vec![]));
    assert_eq!(
        v.check(&event("Armada Invencible"), dm(31, 7)).await,
        Verdict::NoExactDate
    );

    // Zero day and year-only precision are discarded before comparing.
    let v = DateVerifier::new(FakeKb::with(vec![
        fact(DateProperty::PointInTime, "+1588-07-00T00:00:00Z"),
        fact(DateProperty::PointInTime, "+1588-07-31T00:00:00Z").with_precision(9),
    ]));
    assert_eq!(
        v.check(&event("Armada Invencible"), dm(31, 7)).await,
        Verdict::NoExactDate
    );
}

#[tokio::test]
async fn unknown_or_missing_entity_is_rejected() {
    let v = DateVerifier::new(FakeKb::with(vec![fact(
        DateProperty::PointInTime,
        "1588-07-31",
    )]));
    assert_eq!(
        v.check(&event("Gran Armada"), dm(31, 7)).await,
        Verdict::NoEntityMatch
    );

    let bare = CandidateEvent::new(1588, "Sin entidad", SourceTag::Generated).unwrap();
    assert_eq!(v.check(&bare, dm(31, 7)).await, Verdict::MissingEntity);
}

#[tokio::test]
async fn first_property_with_values_decides() {
    // Ambiguous point in time wins over a clean start time.
    let kb = FakeKb::with(vec![
        fact(DateProperty::PointInTime, "1588-07-31"),
        fact(DateProperty::PointInTime, "1588-08-08"),
        fact(DateProperty::StartTime, "1588-07-31"),
    ]);
    let verdict = DateVerifier::new(kb)
        .check(&event("Armada Invencible"), dm(31, 7))
        .await;
    assert_eq!(verdict.label(), "ambiguous");

    // Without a point in time the start time is consulted.
    let kb = FakeKb::with(vec![
        fact(DateProperty::StartTime, "1588-07-31"),
        fact(DateProperty::EndTime, "1588-08-08"),
    ]);
    assert!(DateVerifier::new(kb)
        .verify(&event("Armada Invencible"), dm(31, 7))
        .await);
}

#[tokio::test]
async fn births_use_the_birth_property_only() {
    let kb = FakeKb {
        name: "Miguel de Cervantes",
        facts: vec![
            fact(DateProperty::DateOfBirth, "1547-09-29"),
            fact(DateProperty::DateOfDeath, "1616-04-22"),
        ],
        down: false,
    };
    let v = DateVerifier::new(kb);
    let birth = CandidateEvent::new(1547, "Nace Miguel de Cervantes", SourceTag::Generated)
        .unwrap()
        .with_entity("Miguel de Cervantes", ClaimType::Birth);
    assert!(v.verify(&birth, dm(29, 9)).await);
    assert!(!v.verify(&birth, dm(22, 4)).await);

    let death = birth.clone().with_entity("Miguel de Cervantes", ClaimType::Death);
    assert!(v.verify(&death, dm(22, 4)).await);
}

#[tokio::test]
async fn lookup_failure_rejects_without_erroring() {
    let mut kb = FakeKb::with(vec![fact(DateProperty::PointInTime, "1588-07-31")]);
    kb.down = true;
    let verdict = DateVerifier::new(kb)
        .check(&event("Armada Invencible"), dm(31, 7))
        .await;
    assert!(matches!(verdict, Verdict::Unavailable(_)));
    assert!(!verdict.is_accepted());
}
