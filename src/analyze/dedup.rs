//! Duplicate filter against previously published posts.
//!
//! A candidate repeats a previous post when at least `MIN_SHARED_TOKENS`
//! thematic tokens (actor + wide + military + diplomatic) appear in both the
//! candidate and one single previous text. One shared generic word is not
//! enough; there is no aggregation across previous texts.

use super::lexicon::Lexicons;

pub const MIN_SHARED_TOKENS: usize = 2;

#[derive(Debug, Clone)]
pub struct DuplicateFilter<'a> {
    tokens: Vec<&'a str>,
    previous: Vec<String>,
}

impl<'a> DuplicateFilter<'a> {
    /// `previous` texts are lowercased here; callers may pass raw post text.
    pub fn new<I, S>(lexicons: &'a Lexicons, previous: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            tokens: lexicons.thematic_tokens(),
            previous: previous
                .into_iter()
                .map(|s| s.as_ref().to_lowercase())
                .filter(|s| !s.trim().is_empty())
                .collect(),
        }
    }

    pub fn previous_len(&self) -> usize {
        self.previous.len()
    }

    /// Thematic tokens present in both texts (both already lowercase).
    /// A hit nested inside a longer hit ("español" in "española") is dropped,
    /// so one word never counts twice.
    fn shared<'t>(&'t self, cand_lower: &str, prev_lower: &str) -> Vec<&'t str> {
        let hits: Vec<&'t str> = self
            .tokens
            .iter()
            .copied()
            .filter(|t| cand_lower.contains(t) && prev_lower.contains(t))
            .collect();
        hits.iter()
            .copied()
            .filter(|t| !hits.iter().any(|u| *u != *t && u.contains(*t)))
            .collect()
    }

    /// Returns the shared tokens of the first previous post that repeats `text`.
    pub fn repeated_by(&self, text: &str) -> Option<Vec<&str>> {
        let cand = text.to_lowercase();
        self.previous.iter().find_map(|prev| {
            let shared = self.shared(&cand, prev);
            (shared.len() >= MIN_SHARED_TOKENS).then_some(shared)
        })
    }

    pub fn is_repeated(&self, text: &str) -> bool {
        self.repeated_by(text).is_some()
    }
}

/// Free-function form: no previous texts means nothing can repeat.
pub fn is_repeated(text: &str, previous: &[String], lexicons: &Lexicons) -> bool {
    DuplicateFilter::new(lexicons, previous).is_repeated(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lx() -> Lexicons {
        Lexicons::from_toml_str(
            r#"
[lexicons]
spanish_actor = ["tercios"]
spanish_wide = ["españa", "lepanto"]
spanish_theatre = ["trafalgar"]
military = ["batalla", "naval"]
diplomatic = ["tratado"]
foreign_actor = ["británic"]
"#,
        )
        .unwrap()
    }

    #[test]
    fn no_previous_posts_never_repeats() {
        let l = lx();
        assert!(!is_repeated("batalla naval de España", &[], &l));
    }

    #[test]
    fn theatre_and_foreign_tokens_do_not_count() {
        let l = lx();
        let prev = vec!["Batalla de Trafalgar, británico".to_string()];
        // shares "batalla" (thematic) + "trafalgar" (theatre) + "británic" (foreign)
        assert!(!is_repeated("La batalla de Trafalgar, flota británica", &prev, &l));
    }

    #[test]
    fn match_must_come_from_a_single_previous_text() {
        let l = lx();
        let prev = vec!["un tratado".to_string(), "una batalla".to_string()];
        assert!(!is_repeated("batalla y tratado", &prev, &l));
        let prev_one = vec!["batalla y tratado de paz".to_string()];
        assert!(is_repeated("Batalla y Tratado", &prev_one, &l));
    }

    #[test]
    fn reports_the_shared_tokens() {
        let l = lx();
        let f = DuplicateFilter::new(&l, ["Los tercios en la batalla de Lepanto"]);
        let shared = f.repeated_by("Lepanto: batalla").unwrap();
        assert_eq!(shared, vec!["lepanto", "batalla"]);
    }

    #[test]
    fn nested_tokens_count_once() {
        let l = Lexicons::from_toml_str(
            r#"
[lexicons]
spanish_wide = ["español", "española"]
military = ["batalla"]
"#,
        )
        .unwrap();
        let f = DuplicateFilter::new(&l, ["la gloria naval española"]);
        assert_eq!(f.repeated_by("Real Academia Española"), None);
        let f = DuplicateFilter::new(&l, ["batalla de la flota española"]);
        assert_eq!(
            f.repeated_by("otra batalla española").unwrap(),
            vec!["española", "batalla"]
        );
    }
}
