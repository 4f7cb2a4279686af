//! String family values

use fake::faker::lorem::en::{Word, Words};
use fake::Fake;
use rand::{Rng, RngCore};

use crate::schema::Facets;

const LANGUAGES: &[&str] = &["en", "en-US", "en-GB", "de", "fr", "nl", "es", "ja", "pt-BR"];

/// Lorem ipsum text fitted to the length facets
pub(crate) fn text(facets: &Facets, rng: &mut dyn RngCore) -> String {
    let words: Vec<String> = Words(1..5).fake_with_rng(rng);
    fit(words.join(" "), facets, rng)
}

/// An NCName-shaped word fitted to the length facets
///
/// Also serves `Name`, `NMTOKEN`, `ID` and `QName`, whose lexical spaces
/// all include NCNames.
pub(crate) fn name(facets: &Facets, rng: &mut dyn RngCore) -> String {
    let mut name: String = Word().fake_with_rng(rng);
    if rng.random_bool(0.3) {
        let suffix: String = Word().fake_with_rng(rng);
        name.push('_');
        name.push_str(&suffix);
    }
    fit(name, facets, rng)
}

/// A language tag
pub(crate) fn language(rng: &mut dyn RngCore) -> String {
    LANGUAGES[rng.random_range(0..LANGUAGES.len())].to_string()
}

/// Truncate or pad `value` into the `[min, max]` length window
///
/// Padding uses lowercase letters so names stay names and no trailing
/// space is introduced.
fn fit(mut value: String, facets: &Facets, rng: &mut dyn RngCore) -> String {
    let (min, max) = facets.length_range();
    if let Some(max) = max {
        if value.chars().count() > max {
            value = value.chars().take(max).collect();
            value.truncate(value.trim_end().len());
        }
    }
    while value.chars().count() < min {
        value.push(char::from(rng.random_range(b'a'..=b'z')));
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::BuiltinType;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    #[test]
    fn test_fit_exact_length() {
        let facets = Facets {
            length: Some(12),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(1);
        for _ in 0..50 {
            assert_eq!(text(&facets, &mut rng).chars().count(), 12);
            assert_eq!(name(&facets, &mut rng).chars().count(), 12);
        }
    }

    #[test]
    fn test_fit_range() {
        let facets = Facets {
            min_length: Some(20),
            max_length: Some(25),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(2);
        for _ in 0..50 {
            let len = text(&facets, &mut rng).chars().count();
            assert!((20..=25).contains(&len));
        }
    }

    #[test]
    fn test_names_are_ncnames() {
        let mut rng = XorShiftRng::seed_from_u64(3);
        for _ in 0..50 {
            let value = name(&Facets::default(), &mut rng);
            assert!(BuiltinType::NcName.is_valid_lexical(&value), "{value}");
        }
    }

    #[test]
    fn test_language_tags_valid() {
        let mut rng = XorShiftRng::seed_from_u64(4);
        for _ in 0..20 {
            assert!(BuiltinType::Language.is_valid_lexical(&language(&mut rng)));
        }
    }
}
