//! Value providers
//!
//! A [`ValueProvider`] produces the lexical text of simple-typed leaves and
//! attributes. [`DefaultValueProvider`] draws candidates from the type's
//! enumeration, its most derived pattern, or a per-builtin generator, then
//! keeps the first candidate that satisfies every facet of the type.

mod encoded;
mod numeric;
mod strings;
mod temporal;

use rand::{Rng, RngCore};
use tracing::trace;

use crate::error::{Error, Result};
use crate::options::GenerationOptions;
use crate::schema::{BuiltinType, Facets, SimpleValueType, Variety};

/// Source of simple values
pub trait ValueProvider {
    /// Produce a value that satisfies `value_type` and all of its facets
    fn generate(&self, value_type: &SimpleValueType, rng: &mut dyn RngCore) -> Result<String>;
}

/// Facet-aware provider backed by `fake`, `chrono` and `rand_regex`
#[derive(Debug, Clone)]
pub struct DefaultValueProvider {
    retries: u32,
    pattern_max_repeat: u32,
}

impl Default for DefaultValueProvider {
    fn default() -> Self {
        Self::new(&GenerationOptions::default())
    }
}

/// Where candidates of one type come from
enum Sampler<'t> {
    Enumeration(&'t [String]),
    Pattern(rand_regex::Regex),
    Lexical,
}

impl DefaultValueProvider {
    /// Create a provider using the pattern settings of `options`
    pub fn new(options: &GenerationOptions) -> Self {
        Self {
            retries: options.pattern_retries.max(1),
            pattern_max_repeat: options.pattern_max_repeat,
        }
    }

    fn sampler<'t>(&self, value_type: &'t SimpleValueType) -> Result<Sampler<'t>> {
        let facets = &value_type.facets;
        if !facets.enumeration.is_empty() {
            return Ok(Sampler::Enumeration(&facets.enumeration));
        }
        // Each derivation step contributes one pattern; the last is the
        // most specific and all of them are re-checked on the candidate.
        match facets.patterns.last() {
            Some(pattern) => {
                let regex =
                    rand_regex::Regex::compile(pattern.generator_source(), self.pattern_max_repeat)
                        .map_err(|e| {
                            Error::generation(format!(
                                "cannot build values for pattern '{}': {}",
                                pattern.source(),
                                e
                            ))
                        })?;
                Ok(Sampler::Pattern(regex))
            }
            None => Ok(Sampler::Lexical),
        }
    }

    fn candidate(
        &self,
        value_type: &SimpleValueType,
        sampler: &Sampler<'_>,
        rng: &mut dyn RngCore,
    ) -> Result<String> {
        match sampler {
            Sampler::Enumeration(values) => Ok(values[rng.random_range(0..values.len())].clone()),
            Sampler::Pattern(regex) => Ok(rng.sample::<String, _>(regex)),
            Sampler::Lexical => match &value_type.variety {
                Variety::Atomic(builtin) => lexical(*builtin, &value_type.facets, rng),
                Variety::List(item) => self.list(&value_type.facets, item, rng),
                Variety::Union(members) => {
                    if members.is_empty() {
                        return Err(Error::generation(format!(
                            "union {} has no member types",
                            value_type
                        )));
                    }
                    let member = &members[rng.random_range(0..members.len())];
                    self.generate(member, rng)
                }
            },
        }
    }

    fn list(
        &self,
        facets: &Facets,
        item: &SimpleValueType,
        rng: &mut dyn RngCore,
    ) -> Result<String> {
        let (min, max) = facets.length_range();
        let max = max.unwrap_or(min.max(1) + 2);
        let count = if min > max { min } else { rng.random_range(min..=max) };
        let mut items = Vec::with_capacity(count);
        for _ in 0..count {
            items.push(self.list_item(item, rng)?);
        }
        Ok(items.join(" "))
    }

    /// A single list item; items may not contain the separator
    fn list_item(&self, item: &SimpleValueType, rng: &mut dyn RngCore) -> Result<String> {
        for _ in 0..self.retries {
            let value = self.generate(item, rng)?;
            if !value.is_empty() && !value.contains(char::is_whitespace) {
                return Ok(value);
            }
        }
        Err(Error::generation(format!(
            "no whitespace-free item of {} after {} attempts",
            item, self.retries
        )))
    }
}

impl ValueProvider for DefaultValueProvider {
    fn generate(&self, value_type: &SimpleValueType, rng: &mut dyn RngCore) -> Result<String> {
        let sampler = self.sampler(value_type)?;
        let white_space = value_type.white_space();
        let mut last_error = None;
        for _ in 0..self.retries {
            let candidate = white_space.normalize(&self.candidate(value_type, &sampler, rng)?);
            if !candidate.chars().all(is_xml_char) {
                continue;
            }
            match value_type.check(&candidate) {
                Ok(()) => return Ok(candidate),
                Err(e) => {
                    trace!(value_type = %value_type, candidate = %candidate, "rejected candidate");
                    last_error = Some(e);
                }
            }
        }
        let reason = last_error.map(|e| format!(": {}", e)).unwrap_or_default();
        Err(Error::generation(format!(
            "no value of {} satisfies its facets after {} attempts{}",
            value_type, self.retries, reason
        )))
    }
}

/// Characters that survive serialization unchanged
///
/// Tab and line breaks are excluded since attribute value normalization
/// would rewrite them.
fn is_xml_char(c: char) -> bool {
    matches!(c, ' '..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}' | '\u{10000}'..='\u{10FFFF}')
}

/// A candidate for an atomic built-in honoring its range and length facets
fn lexical(builtin: BuiltinType, facets: &Facets, rng: &mut dyn RngCore) -> Result<String> {
    use BuiltinType::*;
    Ok(match builtin {
        AnyType | AnySimpleType | String | NormalizedString | Token => strings::text(facets, rng),
        Language => strings::language(rng),
        Name | NcName | Id | IdRef | IdRefs | Entity | Entities => strings::name(facets, rng),
        QName | Notation => strings::name(facets, rng),
        NmToken | NmTokens => strings::name(facets, rng),
        Boolean => (if rng.random_bool(0.5) { "true" } else { "false" }).to_string(),
        Decimal => numeric::decimal(facets, rng)?,
        Float | Double => numeric::float(facets, rng)?,
        Duration => temporal::duration(facets, rng)?,
        DateTime | Date | Time | GYearMonth | GYear | GMonthDay | GDay | GMonth => {
            temporal::value(builtin, facets, rng)?
        }
        HexBinary => encoded::hex(facets, rng),
        Base64Binary => encoded::base64(facets, rng),
        AnyUri => encoded::uri(facets, rng)?,
        Integer | Long | Int | Short | Byte | NonNegativeInteger | PositiveInteger
        | UnsignedLong | UnsignedInt | UnsignedShort | UnsignedByte | NonPositiveInteger
        | NegativeInteger => numeric::integer(builtin, facets, rng)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Pattern;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;
    use std::sync::Arc;

    fn restricted(builtin: BuiltinType, facets: Facets) -> SimpleValueType {
        SimpleValueType {
            name: None,
            variety: Variety::Atomic(builtin),
            facets,
        }
    }

    fn rng() -> XorShiftRng {
        XorShiftRng::seed_from_u64(7)
    }

    #[test]
    fn test_every_builtin_produces_valid_values() {
        let provider = DefaultValueProvider::default();
        let mut rng = rng();
        for name in [
            "string", "normalizedString", "token", "language", "Name", "NCName", "ID", "IDREF",
            "IDREFS", "ENTITY", "ENTITIES", "NMTOKEN", "NMTOKENS", "boolean", "decimal",
            "integer", "long", "int", "short", "byte", "nonNegativeInteger", "positiveInteger",
            "unsignedLong", "unsignedInt", "unsignedShort", "unsignedByte",
            "nonPositiveInteger", "negativeInteger", "float", "double", "duration", "dateTime",
            "time", "date", "gYearMonth", "gYear", "gMonthDay", "gDay", "gMonth", "hexBinary",
            "base64Binary", "anyURI", "QName", "NOTATION", "anySimpleType",
        ] {
            let builtin = BuiltinType::from_name(name).unwrap();
            let value_type = SimpleValueType::builtin(builtin);
            for _ in 0..20 {
                let value = provider.generate(&value_type, &mut rng).unwrap();
                assert!(value_type.check(&value).is_ok(), "{name}: {value:?}");
            }
        }
    }

    #[test]
    fn test_enumeration_sampled() {
        let provider = DefaultValueProvider::default();
        let value_type = restricted(
            BuiltinType::String,
            Facets {
                enumeration: vec!["red".into(), "green".into(), "blue".into()],
                ..Facets::default()
            },
        );
        let mut rng = rng();
        let mut seen = std::collections::HashSet::new();
        for _ in 0..60 {
            seen.insert(provider.generate(&value_type, &mut rng).unwrap());
        }
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_unicode_name_enumeration() {
        let provider = DefaultValueProvider::default();
        let value_type = restricted(
            BuiltinType::NcName,
            Facets {
                enumeration: vec!["café".into(), "naïve".into(), "Ελλάδα".into()],
                ..Facets::default()
            },
        );
        let mut rng = rng();
        for _ in 0..20 {
            let value = provider.generate(&value_type, &mut rng).unwrap();
            assert!(value_type.facets.enumeration.contains(&value), "{value}");
        }
    }

    #[test]
    fn test_pattern_values_match() {
        let provider = DefaultValueProvider::default();
        let value_type = restricted(
            BuiltinType::String,
            Facets {
                patterns: vec![Pattern::new(r"[A-Z]{3}-\d{4}").unwrap()],
                ..Facets::default()
            },
        );
        let mut rng = rng();
        for _ in 0..50 {
            let value = provider.generate(&value_type, &mut rng).unwrap();
            assert_eq!(value.len(), 8);
            assert!(value_type.facets.patterns[0].is_match(&value));
        }
    }

    #[test]
    fn test_unsatisfiable_facets_fail() {
        let provider = DefaultValueProvider::new(&GenerationOptions::new().with_pattern_retries(5));
        let value_type = restricted(
            BuiltinType::String,
            Facets {
                patterns: vec![Pattern::new("[a-z]+").unwrap(), Pattern::new("[0-9]+").unwrap()],
                ..Facets::default()
            },
        );
        let err = provider.generate(&value_type, &mut rng()).unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn test_list_length_counts_items() {
        let provider = DefaultValueProvider::default();
        let value_type = SimpleValueType {
            name: None,
            variety: Variety::List(Arc::new(SimpleValueType::builtin(BuiltinType::Int))),
            facets: Facets {
                length: Some(4),
                ..Facets::default()
            },
        };
        let value = provider.generate(&value_type, &mut rng()).unwrap();
        assert_eq!(value.split(' ').count(), 4);
    }

    #[test]
    fn test_union_members() {
        let provider = DefaultValueProvider::default();
        let value_type = SimpleValueType {
            name: None,
            variety: Variety::Union(vec![
                Arc::new(SimpleValueType::builtin(BuiltinType::Boolean)),
                Arc::new(SimpleValueType::builtin(BuiltinType::Date)),
            ]),
            facets: Facets::default(),
        };
        let mut rng = rng();
        for _ in 0..20 {
            let value = provider.generate(&value_type, &mut rng).unwrap();
            assert!(value_type.check(&value).is_ok());
        }
    }

    #[test]
    fn test_xml_chars() {
        assert!(is_xml_char('a'));
        assert!(is_xml_char('é'));
        assert!(!is_xml_char('\u{0}'));
        assert!(!is_xml_char('\r'));
        assert!(!is_xml_char('\u{FFFE}'));
    }
}
