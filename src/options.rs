//! Generation options
//!
//! Knobs for a single generation run. Options can be built in code with the
//! `with_*` methods or deserialized from a JSON file; missing fields take
//! their default.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Options controlling instance generation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct GenerationOptions {
    /// Extra occurrences drawn above `minOccurs` for unbounded particles
    pub max_repeat: u32,

    /// Number of times a recursive symbol may appear on one ancestry path
    /// before its subtree is generated minimally
    ///
    /// The ceiling counts entries: once a symbol is active `n` times on the
    /// path, optional references to it are dropped and required ones are
    /// generated with minimal content. With a ceiling of 0 every recursive
    /// symbol, the root included, is generated minimally.
    pub recursion_ceiling: u32,

    /// Probability that an optional attribute is emitted
    pub attribute_inclusion_probability: f64,

    /// Candidate values tried for a pattern before giving up
    pub pattern_retries: u32,

    /// Repetition cap for unbounded pattern quantifiers (`*`, `+`, `{n,}`)
    pub pattern_max_repeat: u32,
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_repeat: 3,
            recursion_ceiling: 3,
            attribute_inclusion_probability: 0.5,
            pattern_retries: 100,
            pattern_max_repeat: 8,
        }
    }
}

impl GenerationOptions {
    /// Create options with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Small documents: minimal repetition and no optional attributes
    pub fn sparse() -> Self {
        Self {
            max_repeat: 0,
            recursion_ceiling: 1,
            attribute_inclusion_probability: 0.0,
            ..Self::default()
        }
    }

    /// Large documents: heavy repetition, deep recursion, every attribute
    pub fn dense() -> Self {
        Self {
            max_repeat: 8,
            recursion_ceiling: 5,
            attribute_inclusion_probability: 1.0,
            ..Self::default()
        }
    }

    /// Parse options from JSON text
    pub fn from_json(text: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(text)?;
        options.validate()?;
        Ok(options)
    }

    /// Set the extra repetition for unbounded particles
    pub fn with_max_repeat(mut self, max_repeat: u32) -> Self {
        self.max_repeat = max_repeat;
        self
    }

    /// Set the recursion ceiling
    pub fn with_recursion_ceiling(mut self, ceiling: u32) -> Self {
        self.recursion_ceiling = ceiling;
        self
    }

    /// Set the optional attribute probability
    pub fn with_attribute_inclusion_probability(mut self, probability: f64) -> Self {
        self.attribute_inclusion_probability = probability;
        self
    }

    /// Set the number of pattern attempts
    pub fn with_pattern_retries(mut self, retries: u32) -> Self {
        self.pattern_retries = retries;
        self
    }

    /// Set the repetition cap for unbounded pattern quantifiers
    pub fn with_pattern_max_repeat(mut self, max_repeat: u32) -> Self {
        self.pattern_max_repeat = max_repeat;
        self
    }

    /// Check every option is in range
    pub fn validate(&self) -> Result<()> {
        let p = self.attribute_inclusion_probability;
        if !(0.0..=1.0).contains(&p) {
            return Err(Error::InvalidOptions(format!(
                "attribute_inclusion_probability {} is not within [0, 1]",
                p
            )));
        }
        if self.pattern_retries == 0 {
            return Err(Error::InvalidOptions(
                "pattern_retries must be at least 1".to_string(),
            ));
        }
        if self.pattern_max_repeat == 0 {
            return Err(Error::InvalidOptions(
                "pattern_max_repeat must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = GenerationOptions::default();
        assert_eq!(options.max_repeat, 3);
        assert_eq!(options.recursion_ceiling, 3);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn test_presets_are_valid() {
        assert!(GenerationOptions::sparse().validate().is_ok());
        assert!(GenerationOptions::dense().validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let options = GenerationOptions::new()
            .with_max_repeat(10)
            .with_recursion_ceiling(0)
            .with_attribute_inclusion_probability(1.0);
        assert_eq!(options.max_repeat, 10);
        assert_eq!(options.recursion_ceiling, 0);
        assert_eq!(options.attribute_inclusion_probability, 1.0);
    }

    #[test]
    fn test_invalid_probability() {
        let options = GenerationOptions::new().with_attribute_inclusion_probability(1.5);
        assert!(matches!(options.validate(), Err(Error::InvalidOptions(_))));
        let options = GenerationOptions::new().with_attribute_inclusion_probability(f64::NAN);
        assert!(options.validate().is_err());
    }

    #[test]
    fn test_from_json_partial() {
        let options = GenerationOptions::from_json(r#"{"max_repeat": 7}"#).unwrap();
        assert_eq!(options.max_repeat, 7);
        assert_eq!(options.pattern_retries, 100);
    }

    #[test]
    fn test_from_json_rejects_unknown_and_invalid() {
        assert!(matches!(
            GenerationOptions::from_json(r#"{"repeat": 7}"#),
            Err(Error::Json(_))
        ));
        assert!(matches!(
            GenerationOptions::from_json(r#"{"pattern_retries": 0}"#),
            Err(Error::InvalidOptions(_))
        ));
    }
}
