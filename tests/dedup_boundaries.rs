// tests/dedup_boundaries.rs
use efemerides_bot::analyze::{is_repeated, DuplicateFilter, Lexicons};

fn lexicons() -> Lexicons {
    Lexicons::from_toml_str(
        r#"
[lexicons]
spanish_actor = ["tercios"]
spanish_wide = ["españa"]
spanish_theatre = ["trafalgar"]
military = ["batalla", "flota"]
diplomatic = ["tratado"]
foreign_actor = ["británic"]
"#,
    )
    .unwrap()
}

fn previous() -> Vec<String> {
    vec!["batalla de trafalgar con la flota británica".to_string()]
}

#[test]
fn one_shared_token_is_not_a_repeat() {
    let lx = lexicons();
    assert!(!is_repeated("Batalla de Lepanto, tercios", &previous(), &lx));
}

#[test]
fn two_shared_tokens_are_a_repeat() {
    let lx = lexicons();
    let filter = DuplicateFilter::new(&lx, previous());
    let shared = filter
        .repeated_by("Batalla naval: la flota británica")
        .expect("repeat");
    assert_eq!(shared, vec!["batalla", "flota"]);
}

#[test]
fn theatre_and_foreign_tokens_do_not_count() {
    let lx = lexicons();
    // "batalla" + "trafalgar" + "británic": only one thematic token is shared.
    assert!(!is_repeated(
        "Batalla de Trafalgar, victoria británica",
        &previous(),
        &lx
    ));
}

#[test]
fn tokens_are_not_aggregated_across_previous_posts() {
    let lx = lexicons();
    let prev = vec![
        "la batalla de pavía".to_string(),
        "el tratado de utrecht".to_string(),
    ];
    assert!(!is_repeated("Batalla y tratado", &prev, &lx));

    let prev = vec!["batalla y posterior tratado".to_string()];
    assert!(is_repeated("Batalla y tratado", &prev, &lx));
}

#[test]
fn no_history_means_nothing_repeats() {
    let lx = lexicons();
    assert!(!is_repeated("Batalla, flota, tercios, España", &[], &lx));
    let filter = DuplicateFilter::new(&lx, ["   ", ""]);
    assert_eq!(filter.previous_len(), 0);
}

#[test]
fn comparison_ignores_case_on_both_sides() {
    let lx = lexicons();
    let filter = DuplicateFilter::new(&lx, ["LA FLOTA DE ESPAÑA"]);
    assert!(filter.is_repeated("la Flota zarpa de españa"));
}

#[test]
fn nested_builtin_tokens_are_one_word() {
    let lx = Lexicons::builtin().unwrap();
    let filter = DuplicateFilter::new(&lx, ["Hoy recordamos la gloria naval española"]);
    // "española" also contains "español"; that is still a single shared word.
    assert_eq!(filter.repeated_by("Se funda la Real Academia Española"), None);

    let filter = DuplicateFilter::new(&lx, ["El ejército español entra en la ciudad"]);
    assert!(!filter.is_repeated("El ejército español desembarca"));

    let filter = DuplicateFilter::new(&lx, ["Muere Carlos III en Madrid"]);
    assert_eq!(
        filter.repeated_by("Carlos III llega a Madrid").unwrap(),
        vec!["carlos iii", "madrid"]
    );
}
