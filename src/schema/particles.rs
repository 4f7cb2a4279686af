//! Particle occurrence bounds
//!
//! A particle's `minOccurs`/`maxOccurs` pair. Bounds of nested groups compose
//! multiplicatively with the bounds of the particles they contain.

use crate::error::{ParseError, Result};
use std::fmt;

/// Occurrence bounds for a particle (minOccurs, maxOccurs)
/// None for max means unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Occurs {
    /// Minimum number of occurrences (default 1)
    pub min: u32,
    /// Maximum number of occurrences (None = unbounded, default 1)
    pub max: Option<u32>,
}

impl Occurs {
    /// Create new occurrence bounds
    pub fn new(min: u32, max: Option<u32>) -> Self {
        Self { min, max }
    }

    /// Default occurrence (1, 1)
    pub fn once() -> Self {
        Self { min: 1, max: Some(1) }
    }

    /// Optional occurrence (0, 1)
    pub fn optional() -> Self {
        Self { min: 0, max: Some(1) }
    }

    /// Zero or more (0, unbounded)
    pub fn zero_or_more() -> Self {
        Self { min: 0, max: None }
    }

    /// One or more (1, unbounded)
    pub fn one_or_more() -> Self {
        Self { min: 1, max: None }
    }

    /// Check if this particle can be omitted (minOccurs == 0)
    pub fn is_emptiable(&self) -> bool {
        self.min == 0
    }

    /// Check if this particle can never occur (maxOccurs == 0)
    pub fn is_empty(&self) -> bool {
        self.max == Some(0)
    }

    /// Check if the particle must occur at least once
    pub fn is_mandatory(&self) -> bool {
        self.min >= 1
    }

    /// Check if maxOccurs is unbounded
    pub fn is_unbounded(&self) -> bool {
        self.max.is_none()
    }

    /// Compose with the bounds of an enclosing group
    pub fn multiply(self, outer: Occurs) -> Occurs {
        let min = self.min.saturating_mul(outer.min);
        let max = match (self.max, outer.max) {
            (Some(0), _) | (_, Some(0)) => Some(0),
            (Some(a), Some(b)) => Some(a.saturating_mul(b)),
            _ => None,
        };
        Occurs { min, max }
    }
}

impl Default for Occurs {
    fn default() -> Self {
        Self::once()
    }
}

impl fmt::Display for Occurs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.max {
            Some(max) => write!(f, "[{}, {}]", self.min, max),
            None => write!(f, "[{}, unbounded]", self.min),
        }
    }
}

/// Parse minOccurs/maxOccurs from XML attribute values
pub fn parse_occurs(min_occurs: Option<&str>, max_occurs: Option<&str>) -> Result<Occurs> {
    let mut occurs = Occurs::once();

    if let Some(min_str) = min_occurs {
        occurs.min = min_str.trim().parse::<u32>().map_err(|_| {
            ParseError::new(format!(
                "minOccurs value '{}' is not a valid non-negative integer",
                min_str
            ))
        })?;
    }

    match max_occurs.map(str::trim) {
        Some("unbounded") => occurs.max = None,
        Some(max_str) => {
            let max = max_str.parse::<u32>().map_err(|_| {
                ParseError::new(format!(
                    "maxOccurs value '{}' must be a non-negative integer or 'unbounded'",
                    max_str
                ))
            })?;
            if occurs.min > max {
                return Err(ParseError::new(format!(
                    "minOccurs ({}) must be lesser or equal than maxOccurs ({})",
                    occurs.min, max
                ))
                .into());
            }
            occurs.max = Some(max);
        }
        None => {
            // maxOccurs defaults to 1
            if occurs.min > 1 {
                return Err(ParseError::new(format!(
                    "minOccurs ({}) must be lesser or equal than maxOccurs (1)",
                    occurs.min
                ))
                .into());
            }
        }
    }

    Ok(occurs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_occurs_defaults() {
        let occurs = parse_occurs(None, None).unwrap();
        assert_eq!(occurs, Occurs::once());
        assert!(occurs.is_mandatory());
    }

    #[test]
    fn test_parse_unbounded() {
        let occurs = parse_occurs(Some("1"), Some("unbounded")).unwrap();
        assert_eq!(occurs, Occurs::one_or_more());
        assert!(occurs.is_unbounded());
    }

    #[test]
    fn test_parse_invalid_occurs() {
        assert!(parse_occurs(Some("-1"), None).is_err());
        assert!(parse_occurs(Some("abc"), None).is_err());
        assert!(parse_occurs(None, Some("many")).is_err());
        assert!(parse_occurs(Some("3"), Some("2")).is_err());
        assert!(parse_occurs(Some("2"), None).is_err());
    }

    #[test]
    fn test_zero_max() {
        let occurs = parse_occurs(Some("0"), Some("0")).unwrap();
        assert!(occurs.is_empty());
        assert!(occurs.is_emptiable());
    }

    #[test]
    fn test_multiply() {
        assert_eq!(
            Occurs::one_or_more().multiply(Occurs::optional()),
            Occurs::zero_or_more()
        );
        assert_eq!(
            Occurs::new(2, Some(3)).multiply(Occurs::new(1, Some(2))),
            Occurs::new(2, Some(6))
        );
        assert_eq!(
            Occurs::one_or_more().multiply(Occurs::new(0, Some(0))),
            Occurs::new(0, Some(0))
        );
    }

    #[test]
    fn test_display() {
        assert_eq!(Occurs::zero_or_more().to_string(), "[0, unbounded]");
        assert_eq!(Occurs::optional().to_string(), "[0, 1]");
    }
}
