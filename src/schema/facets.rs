//! XSD constraining facets
//!
//! A [`Facets`] bundle collects every facet a simple type carries after its
//! whole derivation chain has been flattened. [`Facets::check`] is the single
//! authority on whether a lexical value is acceptable; value providers run
//! their output through it.

use std::cmp::Ordering;

use base64::Engine;
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;

use super::builtins::{parse_decimal, BuiltinType, Primitive};
use crate::error::{Error, ParseError, Result};

/// White space handling modes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhiteSpace {
    /// Preserve all white space
    Preserve,
    /// Replace tabs and newlines with spaces
    Replace,
    /// Replace and collapse multiple spaces
    Collapse,
}

impl WhiteSpace {
    /// Parse from a `whiteSpace` facet value
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "preserve" => Some(WhiteSpace::Preserve),
            "replace" => Some(WhiteSpace::Replace),
            "collapse" => Some(WhiteSpace::Collapse),
            _ => None,
        }
    }

    /// Normalize a string according to this white space mode
    pub fn normalize(&self, s: &str) -> String {
        match self {
            WhiteSpace::Preserve => s.to_string(),
            WhiteSpace::Replace => s.replace(['\t', '\n', '\r'], " "),
            WhiteSpace::Collapse => s.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

/// A compiled `pattern` facet
///
/// XSD regular expressions are implicitly anchored, treat `^`/`$` as literals
/// and have their own escapes (`\i`, `\c`). Two translations are kept: a
/// matcher faithful to XSD semantics, and a generator source that only draws
/// from ASCII subsets of each escape so synthesized text stays readable.
/// Every string the generator source produces is accepted by the matcher.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    matcher: Regex,
    generator: String,
}

impl Pattern {
    /// Compile a single XSD pattern
    pub fn new(source: &str) -> Result<Self> {
        Self::union(&[source.to_string()])
    }

    /// Compile the patterns of one derivation step; a value must match any of them
    pub fn union(sources: &[String]) -> Result<Self> {
        let mut matcher = Vec::with_capacity(sources.len());
        let mut generator = Vec::with_capacity(sources.len());
        for source in sources {
            matcher.push(format!("(?:{})", translate(source, false)?));
            generator.push(format!("(?:{})", translate(source, true)?));
        }
        let source = sources.join("|");
        let matcher = Regex::new(&format!("^(?:{})$", matcher.join("|"))).map_err(|e| {
            ParseError::new(format!("Invalid pattern facet '{}': {}", source, e))
        })?;
        let generator = generator.join("|");
        Regex::new(&generator).map_err(|e| {
            ParseError::new(format!("Invalid pattern facet '{}': {}", source, e))
        })?;
        Ok(Self {
            source,
            matcher,
            generator,
        })
    }

    /// The pattern as written in the schema
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Regex syntax to drive constrained string construction
    pub fn generator_source(&self) -> &str {
        &self.generator
    }

    /// Check whether a whole value matches
    pub fn is_match(&self, value: &str) -> bool {
        self.matcher.is_match(value)
    }
}

/// Translate XSD regex syntax into `regex` crate syntax
fn translate(source: &str, ascii: bool) -> Result<String> {
    let mut out = String::with_capacity(source.len() + 8);
    let mut chars = source.chars().peekable();
    let mut class_depth = 0usize;

    while let Some(c) = chars.next() {
        let in_class = class_depth > 0;
        match c {
            '\\' => {
                let Some(escape) = chars.next() else {
                    return Err(ParseError::new(format!(
                        "Pattern '{}' ends with a dangling escape",
                        source
                    ))
                    .into());
                };
                let replacement = match (escape, in_class, ascii) {
                    ('d', false, true) => "[0-9]",
                    ('d', true, true) => "0-9",
                    ('D', false, true) => "[A-Za-z]",
                    ('s', false, _) => r"[ \t\n\r]",
                    ('s', true, _) => r" \t\n\r",
                    ('S', false, true) => "[!-~]",
                    ('S', false, false) => r"[^ \t\n\r]",
                    ('w', false, true) => "[A-Za-z0-9]",
                    ('w', true, true) => "A-Za-z0-9",
                    ('w', false, false) => r"[\p{L}\p{M}\p{N}\p{S}]",
                    ('w', true, false) => r"\p{L}\p{M}\p{N}\p{S}",
                    ('W', false, true) => r"[\-.,;:!?#]",
                    ('W', false, false) => r"[\p{P}\p{Z}\p{C}]",
                    ('W', true, _) => r"\p{P}\p{Z}\p{C}",
                    ('i', false, true) => "[_:A-Za-z]",
                    ('i', true, true) => "_:A-Za-z",
                    ('i', false, false) => r"[_:\p{L}]",
                    ('i', true, false) => r"_:\p{L}",
                    ('I', false, true) => r"[\-.0-9]",
                    ('I', false, false) => r"[^_:\p{L}]",
                    ('c', false, true) => r"[\-._:A-Za-z0-9]",
                    ('c', true, true) => r"\-._:A-Za-z0-9",
                    ('c', false, false) => r"[\-._:\p{L}\p{M}\p{N}]",
                    ('c', true, false) => r"\-._:\p{L}\p{M}\p{N}",
                    ('C', false, true) => "[ !#$%&()*+,/;<=>?@]",
                    ('C', false, false) => r"[^\-._:\p{L}\p{M}\p{N}]",
                    ('I' | 'C', true, _) => {
                        return Err(ParseError::new(format!(
                            "Pattern '{}' uses \\{} inside a character class",
                            source, escape
                        ))
                        .into())
                    }
                    ('p' | 'P', _, _) => {
                        let mut property = String::new();
                        for p in chars.by_ref() {
                            property.push(p);
                            if p == '}' {
                                break;
                            }
                        }
                        if property.starts_with("{Is") {
                            return Err(ParseError::new(format!(
                                "Pattern '{}' uses an unsupported block escape",
                                source
                            ))
                            .into());
                        }
                        out.push('\\');
                        out.push(escape);
                        out.push_str(&property);
                        continue;
                    }
                    _ => {
                        out.push('\\');
                        out.push(escape);
                        continue;
                    }
                };
                out.push_str(replacement);
            }
            '[' => {
                class_depth += 1;
                out.push('[');
                if chars.peek() == Some(&'^') {
                    chars.next();
                    out.push('^');
                }
            }
            ']' if in_class => {
                class_depth -= 1;
                out.push(']');
            }
            // Character class subtraction: [a-z-[aeiou]]
            '-' if in_class && chars.peek() == Some(&'[') => out.push_str("--"),
            '^' | '$' if !in_class => {
                out.push('\\');
                out.push(c);
            }
            '.' if !in_class => out.push_str(if ascii { "[ -~]" } else { r"[^\n\r]" }),
            _ => out.push(c),
        }
    }

    Ok(out)
}

/// Every facet of a simple type, flattened along its derivation chain
#[derive(Debug, Clone, Default)]
pub struct Facets {
    /// `length`
    pub length: Option<usize>,
    /// `minLength`
    pub min_length: Option<usize>,
    /// `maxLength`
    pub max_length: Option<usize>,
    /// One entry per derivation step; a value must match all of them
    pub patterns: Vec<Pattern>,
    /// `enumeration` values of the most derived step that declares any
    pub enumeration: Vec<String>,
    /// `whiteSpace`
    pub white_space: Option<WhiteSpace>,
    /// `minInclusive`
    pub min_inclusive: Option<String>,
    /// `maxInclusive`
    pub max_inclusive: Option<String>,
    /// `minExclusive`
    pub min_exclusive: Option<String>,
    /// `maxExclusive`
    pub max_exclusive: Option<String>,
    /// `totalDigits`
    pub total_digits: Option<u32>,
    /// `fractionDigits`
    pub fraction_digits: Option<u32>,
}

impl Facets {
    /// Check if no facet is set
    pub fn is_empty(&self) -> bool {
        self.length.is_none()
            && self.min_length.is_none()
            && self.max_length.is_none()
            && self.patterns.is_empty()
            && self.enumeration.is_empty()
            && self.white_space.is_none()
            && !self.has_bounds()
            && self.total_digits.is_none()
            && self.fraction_digits.is_none()
    }

    /// Check if any range facet is set
    pub fn has_bounds(&self) -> bool {
        self.min_inclusive.is_some()
            || self.max_inclusive.is_some()
            || self.min_exclusive.is_some()
            || self.max_exclusive.is_some()
    }

    /// Combine base facets with those of a restriction step
    ///
    /// Facets named by the step replace the base ones; patterns accumulate.
    pub fn restrict(&self, step: &Facets) -> Facets {
        let mut patterns = self.patterns.clone();
        patterns.extend(step.patterns.iter().cloned());
        Facets {
            length: step.length.or(self.length),
            min_length: step.min_length.or(self.min_length),
            max_length: step.max_length.or(self.max_length),
            patterns,
            enumeration: if step.enumeration.is_empty() {
                self.enumeration.clone()
            } else {
                step.enumeration.clone()
            },
            white_space: step.white_space.or(self.white_space),
            min_inclusive: step.min_inclusive.clone().or_else(|| self.min_inclusive.clone()),
            max_inclusive: step.max_inclusive.clone().or_else(|| self.max_inclusive.clone()),
            min_exclusive: step.min_exclusive.clone().or_else(|| self.min_exclusive.clone()),
            max_exclusive: step.max_exclusive.clone().or_else(|| self.max_exclusive.clone()),
            total_digits: step.total_digits.or(self.total_digits),
            fraction_digits: step.fraction_digits.or(self.fraction_digits),
        }
    }

    /// Check the facets are consistent for values of `builtin`
    pub fn validate(&self, builtin: BuiltinType) -> Result<()> {
        let primitive = builtin.primitive();
        for bound in [
            &self.min_inclusive,
            &self.max_inclusive,
            &self.min_exclusive,
            &self.max_exclusive,
        ]
        .into_iter()
        .flatten()
        {
            if compare(primitive, bound, bound).is_none() {
                return Err(ParseError::new(format!(
                    "Range facet value '{}' is not comparable as {}",
                    bound, builtin
                ))
                .into());
            }
        }
        if let (Some(min), Some(max)) = (self.min_length, self.max_length) {
            if min > max {
                return Err(ParseError::new(format!(
                    "minLength ({}) exceeds maxLength ({})",
                    min, max
                ))
                .into());
            }
        }
        if let (Some(fraction), Some(total)) = (self.fraction_digits, self.total_digits) {
            if fraction > total {
                return Err(ParseError::new(format!(
                    "fractionDigits ({}) exceeds totalDigits ({})",
                    fraction, total
                ))
                .into());
            }
        }
        Ok(())
    }

    /// Check an atomic value of type `builtin` against every facet
    pub fn check(&self, builtin: BuiltinType, value: &str) -> Result<()> {
        let violation = |facet: &str| {
            Err(Error::generation(format!(
                "value '{}' violates {} of {}",
                value, facet, builtin
            )))
        };

        if !builtin.is_valid_lexical(value) {
            return violation("the lexical space");
        }
        if !self.check_enumeration(value) {
            return violation("enumeration");
        }
        if let Some(pattern) = self.patterns.iter().find(|p| !p.is_match(value)) {
            return violation(&format!("pattern '{}'", pattern.source()));
        }

        let len = value_length(builtin.primitive(), value);
        if !self.check_length(len) {
            return violation("a length facet");
        }

        let primitive = builtin.primitive();
        let in_range = |bound: &Option<String>, accept: fn(Ordering) -> bool| {
            bound
                .as_ref()
                .map_or(true, |b| compare(primitive, value, b).is_some_and(accept))
        };
        if !in_range(&self.min_inclusive, |o| o != Ordering::Less) {
            return violation("minInclusive");
        }
        if !in_range(&self.max_inclusive, |o| o != Ordering::Greater) {
            return violation("maxInclusive");
        }
        if !in_range(&self.min_exclusive, |o| o == Ordering::Greater) {
            return violation("minExclusive");
        }
        if !in_range(&self.max_exclusive, |o| o == Ordering::Less) {
            return violation("maxExclusive");
        }

        if self.total_digits.is_some() || self.fraction_digits.is_some() {
            let Some(d) = parse_decimal(value) else {
                return violation("totalDigits");
            };
            let d = d.normalize();
            if let Some(total) = self.total_digits {
                if d.mantissa().unsigned_abs().to_string().len() > total as usize {
                    return violation("totalDigits");
                }
            }
            if let Some(fraction) = self.fraction_digits {
                if d.scale() > fraction {
                    return violation("fractionDigits");
                }
            }
        }

        Ok(())
    }

    /// Check a list value; length facets count items
    pub fn check_list(&self, value: &str) -> Result<()> {
        let items = value.split_whitespace().count();
        if !self.check_length(items) {
            return Err(Error::generation(format!(
                "list '{}' violates a length facet",
                value
            )));
        }
        if !self.check_enumeration(value) {
            return Err(Error::generation(format!(
                "list '{}' violates enumeration",
                value
            )));
        }
        if let Some(pattern) = self.patterns.iter().find(|p| !p.is_match(value)) {
            return Err(Error::generation(format!(
                "list '{}' violates pattern '{}'",
                value,
                pattern.source()
            )));
        }
        Ok(())
    }

    /// Check pattern and enumeration facets only
    pub fn check_lexical(&self, value: &str) -> Result<()> {
        if !self.check_enumeration(value) || self.patterns.iter().any(|p| !p.is_match(value)) {
            return Err(Error::generation(format!(
                "value '{}' violates a pattern or enumeration facet",
                value
            )));
        }
        Ok(())
    }

    /// Effective (min, max) length, combining `length` with the range facets
    pub fn length_range(&self) -> (usize, Option<usize>) {
        match self.length {
            Some(len) => (len, Some(len)),
            None => (self.min_length.unwrap_or(0), self.max_length),
        }
    }

    fn check_length(&self, len: usize) -> bool {
        self.length.map_or(true, |l| len == l)
            && self.min_length.map_or(true, |l| len >= l)
            && self.max_length.map_or(true, |l| len <= l)
    }

    fn check_enumeration(&self, value: &str) -> bool {
        self.enumeration.is_empty() || self.enumeration.iter().any(|e| e == value)
    }
}

/// Length of a value in the units its length facets count
fn value_length(primitive: Primitive, value: &str) -> usize {
    match primitive {
        Primitive::HexBinary => value.len() / 2,
        Primitive::Base64Binary => base64::engine::general_purpose::STANDARD
            .decode(value.split_whitespace().collect::<String>())
            .map(|bytes| bytes.len())
            .unwrap_or(usize::MAX),
        _ => value.chars().count(),
    }
}

/// Strip a trailing timezone designator
pub(crate) fn strip_timezone(value: &str) -> &str {
    if let Some(stripped) = value.strip_suffix('Z') {
        return stripped;
    }
    let split = value.len().saturating_sub(6);
    match (value.get(..split), value.get(split..)) {
        (Some(head), Some(tz))
            if !head.is_empty()
                && (tz.starts_with('+') || tz.starts_with('-'))
                && tz.as_bytes()[3] == b':' =>
        {
            head
        }
        _ => value,
    }
}

pub(crate) fn parse_float(value: &str) -> Option<f64> {
    match value {
        "INF" => Some(f64::INFINITY),
        "-INF" => Some(f64::NEG_INFINITY),
        "NaN" => None,
        _ => value.parse::<f64>().ok(),
    }
}

static DURATION_PARTS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"^(-)?P(?:([0-9]+)Y)?(?:([0-9]+)M)?(?:([0-9]+)D)?(?:T(?:([0-9]+)H)?(?:([0-9]+)M)?(?:([0-9]+(?:\.[0-9]+)?)S)?)?$",
    )
    .unwrap()
});

/// Split a duration into signed months and seconds
pub(crate) fn parse_duration(value: &str) -> Option<(i64, Decimal)> {
    let caps = DURATION_PARTS.captures(value.trim())?;
    let part = |i: usize| caps.get(i).map_or(Some(0i64), |m| m.as_str().parse().ok());
    let months = part(2)?.checked_mul(12)?.checked_add(part(3)?)?;
    let whole = part(4)?
        .checked_mul(86_400)?
        .checked_add(part(5)?.checked_mul(3_600)?)?
        .checked_add(part(6)?.checked_mul(60)?)?;
    let fraction = match caps.get(7) {
        Some(m) => parse_decimal(m.as_str())?,
        None => Decimal::ZERO,
    };
    let seconds = Decimal::from(whole).checked_add(fraction)?;
    if caps.get(1).is_some() {
        Some((-months, -seconds))
    } else {
        Some((months, seconds))
    }
}

/// Order two lexical values of the same primitive type
///
/// Returns `None` if either value cannot be parsed or the type is unordered.
pub fn compare(primitive: Primitive, a: &str, b: &str) -> Option<Ordering> {
    let (a, b) = (a.trim(), b.trim());
    match primitive {
        Primitive::Decimal => Some(parse_decimal(a)?.cmp(&parse_decimal(b)?)),
        Primitive::Float | Primitive::Double => parse_float(a)?.partial_cmp(&parse_float(b)?),
        Primitive::Date => {
            let parse = |s| NaiveDate::parse_from_str(strip_timezone(s), "%Y-%m-%d").ok();
            Some(parse(a)?.cmp(&parse(b)?))
        }
        Primitive::DateTime => {
            let parse =
                |s| NaiveDateTime::parse_from_str(strip_timezone(s), "%Y-%m-%dT%H:%M:%S%.f").ok();
            Some(parse(a)?.cmp(&parse(b)?))
        }
        Primitive::Time => {
            let parse = |s| NaiveTime::parse_from_str(strip_timezone(s), "%H:%M:%S%.f").ok();
            Some(parse(a)?.cmp(&parse(b)?))
        }
        Primitive::GYear => {
            let parse = |s| strip_timezone(s).parse::<i64>().ok();
            Some(parse(a)?.cmp(&parse(b)?))
        }
        Primitive::Duration => {
            // Months and seconds only order durations when they agree
            let (a_months, a_seconds) = parse_duration(a)?;
            let (b_months, b_seconds) = parse_duration(b)?;
            match (a_months.cmp(&b_months), a_seconds.cmp(&b_seconds)) {
                (months, seconds) if months == seconds => Some(months),
                (Ordering::Equal, seconds) => Some(seconds),
                (months, Ordering::Equal) => Some(months),
                _ => None,
            }
        }
        Primitive::GYearMonth | Primitive::GMonth | Primitive::GDay | Primitive::GMonthDay => {
            Some(strip_timezone(a).cmp(strip_timezone(b)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_white_space_normalize() {
        assert_eq!(WhiteSpace::Replace.normalize("a\tb\nc"), "a b c");
        assert_eq!(WhiteSpace::Collapse.normalize("  a   b \n c  "), "a b c");
        assert_eq!(WhiteSpace::Preserve.normalize(" a "), " a ");
    }

    #[test]
    fn test_pattern_is_anchored() {
        let pattern = Pattern::new(r"\d{6}").unwrap();
        assert!(pattern.is_match("123456"));
        assert!(!pattern.is_match("1234567"));
        assert!(!pattern.is_match("x123456"));
    }

    #[test]
    fn test_pattern_translation() {
        let pattern = Pattern::new(r"\i\c*").unwrap();
        assert!(pattern.is_match("_a-b.c"));
        assert!(!pattern.is_match("1abc"));
        assert_eq!(Pattern::new(r"\d").unwrap().generator_source(), "(?:[0-9])");

        let subtraction = Pattern::new("[a-z-[aeiou]]+").unwrap();
        assert!(subtraction.is_match("bcd"));
        assert!(!subtraction.is_match("bad"));

        let literal_caret = Pattern::new("a^b$").unwrap();
        assert!(literal_caret.is_match("a^b$"));
    }

    #[test]
    fn test_pattern_union() {
        let pattern = Pattern::union(&["[A-Z]{2}".to_string(), "[0-9]{3}".to_string()]).unwrap();
        assert!(pattern.is_match("AB"));
        assert!(pattern.is_match("123"));
        assert!(!pattern.is_match("AB1"));
    }

    #[test]
    fn test_invalid_pattern() {
        assert!(Pattern::new("[a-").is_err());
        assert!(Pattern::new(r"\p{IsBasicLatin}").is_err());
    }

    #[test]
    fn test_check_range() {
        let facets = Facets {
            min_inclusive: Some("10".into()),
            max_exclusive: Some("20".into()),
            ..Default::default()
        };
        assert!(facets.check(BuiltinType::Int, "10").is_ok());
        assert!(facets.check(BuiltinType::Int, "19").is_ok());
        assert!(facets.check(BuiltinType::Int, "20").is_err());
        assert!(facets.check(BuiltinType::Int, "9").is_err());
        assert!(facets.check(BuiltinType::Int, "abc").is_err());
    }

    #[test]
    fn test_check_digits() {
        let facets = Facets {
            total_digits: Some(5),
            fraction_digits: Some(2),
            ..Default::default()
        };
        assert!(facets.check(BuiltinType::Decimal, "123.45").is_ok());
        assert!(facets.check(BuiltinType::Decimal, "123.450").is_ok());
        assert!(facets.check(BuiltinType::Decimal, "1234.5").is_ok());
        assert!(facets.check(BuiltinType::Decimal, "1234.56").is_err());
        assert!(facets.check(BuiltinType::Decimal, "1.234").is_err());
    }

    #[test]
    fn test_check_length_and_enumeration() {
        let facets = Facets {
            min_length: Some(2),
            max_length: Some(3),
            ..Default::default()
        };
        assert!(facets.check(BuiltinType::String, "ab").is_ok());
        assert!(facets.check(BuiltinType::String, "abcd").is_err());

        let facets = Facets {
            enumeration: vec!["red".into(), "green".into()],
            ..Default::default()
        };
        assert!(facets.check(BuiltinType::String, "red").is_ok());
        assert!(facets.check(BuiltinType::String, "blue").is_err());
    }

    #[test]
    fn test_binary_length() {
        let facets = Facets {
            length: Some(2),
            ..Default::default()
        };
        assert!(facets.check(BuiltinType::HexBinary, "0AFF").is_ok());
        assert!(facets.check(BuiltinType::HexBinary, "0A").is_err());
    }

    #[test]
    fn test_restrict_keeps_base_patterns() {
        let base = Facets {
            patterns: vec![Pattern::new("[a-z]+").unwrap()],
            max_length: Some(10),
            ..Default::default()
        };
        let step = Facets {
            patterns: vec![Pattern::new("a.*").unwrap()],
            max_length: Some(4),
            ..Default::default()
        };
        let merged = base.restrict(&step);
        assert_eq!(merged.patterns.len(), 2);
        assert_eq!(merged.max_length, Some(4));
        assert!(merged.check(BuiltinType::String, "abc").is_ok());
        assert!(merged.check(BuiltinType::String, "bcd").is_err());
        assert!(merged.check(BuiltinType::String, "a1").is_err());
    }

    #[test]
    fn test_compare_dates() {
        assert_eq!(
            compare(Primitive::Date, "2024-01-01", "2024-01-02"),
            Some(Ordering::Less)
        );
        assert_eq!(
            compare(Primitive::DateTime, "2024-01-01T10:00:00Z", "2024-01-01T09:00:00"),
            Some(Ordering::Greater)
        );
        assert_eq!(
            compare(Primitive::Duration, "P1D", "PT23H"),
            Some(Ordering::Greater)
        );
        assert_eq!(compare(Primitive::Duration, "P1Y", "P12M"), Some(Ordering::Equal));
        assert_eq!(compare(Primitive::Duration, "-P1D", "PT1S"), Some(Ordering::Less));
        assert_eq!(compare(Primitive::Duration, "P1M", "P30D"), None);
    }

    #[test]
    fn test_validate_rejects_bad_bound() {
        let facets = Facets {
            min_inclusive: Some("ten".into()),
            ..Default::default()
        };
        assert!(facets.validate(BuiltinType::Int).is_err());
        assert!(Facets::default().validate(BuiltinType::Int).is_ok());
    }
}
