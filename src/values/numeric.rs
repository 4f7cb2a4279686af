//! Numeric values
//!
//! Range facets are folded into inclusive integer bounds (on the scaled
//! mantissa for decimals) before sampling, so bounded types never need
//! rejection sampling.

use rand::{Rng, RngCore};
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::schema::builtins::{decimal_to_i128, parse_decimal};
use crate::schema::facets::parse_float;
use crate::schema::{BuiltinType, Facets};

/// Width of the window sampled when a side is unbounded
const SPAN: i128 = 10_000;

/// Default scale of generated decimals without `fractionDigits`
const DEFAULT_SCALE: u32 = 2;

/// Largest mantissa a `Decimal` can hold with room to spare
const MAX_MANTISSA: i128 = 10i128.pow(28) - 1;

/// Inclusive bounds on an integer; `None` is unbounded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Bounds {
    lo: Option<i128>,
    hi: Option<i128>,
}

impl Bounds {
    fn raise(&mut self, lo: i128) {
        self.lo = Some(self.lo.map_or(lo, |l| l.max(lo)));
    }

    fn lower(&mut self, hi: i128) {
        self.hi = Some(self.hi.map_or(hi, |h| h.min(hi)));
    }

    /// Apply the range facets to values scaled by `factor`
    fn apply_facets(&mut self, facets: &Facets, factor: Decimal) {
        let scaled = |bound: &Option<String>| {
            bound
                .as_deref()
                .and_then(parse_decimal)
                .and_then(|v| v.checked_mul(factor))
        };
        if let Some(v) = scaled(&facets.min_inclusive).and_then(|v| decimal_to_i128(v.ceil())) {
            self.raise(v);
        }
        if let Some(v) = scaled(&facets.min_exclusive).and_then(|v| decimal_to_i128(v.floor())) {
            self.raise(v + 1);
        }
        if let Some(v) = scaled(&facets.max_inclusive).and_then(|v| decimal_to_i128(v.floor())) {
            self.lower(v);
        }
        if let Some(v) = scaled(&facets.max_exclusive).and_then(|v| decimal_to_i128(v.ceil())) {
            self.lower(v - 1);
        }
        if let Some(total) = facets.total_digits.filter(|t| *t <= 38) {
            let limit = 10i128.pow(total) - 1;
            self.raise(-limit);
            self.lower(limit);
        }
    }

    /// Pick a sampling window of at most `span` values inside the bounds
    ///
    /// Windows prefer to start at zero so that values look natural.
    fn window(self, span: i128) -> Option<(i128, i128)> {
        let (lo, hi) = match (self.lo, self.hi) {
            (None, None) => (0, span),
            (Some(lo), None) => (lo, lo.saturating_add(span)),
            (None, Some(hi)) => (hi.saturating_sub(span), hi),
            (Some(lo), Some(hi)) => (lo, hi),
        };
        if lo > hi {
            return None;
        }
        if hi.saturating_sub(lo) <= span {
            return Some((lo, hi));
        }
        let start = 0i128.clamp(lo, hi);
        if start.saturating_add(span) <= hi {
            Some((start, start + span))
        } else {
            Some((hi - span, hi))
        }
    }
}

/// An integer of the integer family `builtin`
pub(crate) fn integer(
    builtin: BuiltinType,
    facets: &Facets,
    rng: &mut dyn RngCore,
) -> Result<String> {
    let (lo, hi) = builtin.integer_bounds();
    let mut bounds = Bounds { lo, hi };
    bounds.apply_facets(facets, Decimal::ONE);
    let (lo, hi) = bounds
        .window(SPAN)
        .ok_or_else(|| Error::generation(format!("range facets of {} admit no value", builtin)))?;
    Ok(rng.random_range(lo..=hi).to_string())
}

/// A decimal with `fractionDigits` digits after the point
///
/// Without `fractionDigits` the scale is the finer of two digits and the
/// scale of the range facets, refined further while exclusive bounds leave
/// no value at the current scale.
pub(crate) fn decimal(facets: &Facets, rng: &mut dyn RngCore) -> Result<String> {
    let ceiling = facets.total_digits.unwrap_or(u32::MAX).min(18);
    let mut scale = facets
        .fraction_digits
        .unwrap_or_else(|| DEFAULT_SCALE.max(bound_scale(facets)))
        .min(ceiling);

    let (lo, hi) = loop {
        let factor = Decimal::from(10i64.pow(scale));
        let mut bounds = Bounds {
            lo: Some(-MAX_MANTISSA),
            hi: Some(MAX_MANTISSA),
        };
        bounds.apply_facets(facets, factor);
        if let Some(window) = bounds.window(SPAN.saturating_mul(10i128.pow(scale))) {
            break window;
        }
        if facets.fraction_digits.is_some() || scale >= ceiling {
            return Err(Error::generation("range facets of xs:decimal admit no value"));
        }
        scale += 1;
    };

    let mantissa = rng.random_range(lo..=hi);
    Decimal::try_from_i128_with_scale(mantissa, scale)
        .map(|d| d.to_string())
        .map_err(|e| Error::generation(format!("decimal out of range: {}", e)))
}

/// Largest number of fraction digits among the range facets
fn bound_scale(facets: &Facets) -> u32 {
    [
        &facets.min_inclusive,
        &facets.min_exclusive,
        &facets.max_inclusive,
        &facets.max_exclusive,
    ]
    .into_iter()
    .filter_map(|bound| bound.as_deref().and_then(parse_decimal))
    .map(|d| d.normalize().scale())
    .max()
    .unwrap_or(0)
}

/// A float or double, rounded to two fraction digits when that stays in range
pub(crate) fn float(facets: &Facets, rng: &mut dyn RngCore) -> Result<String> {
    let finite = |bound: &Option<String>| {
        bound
            .as_deref()
            .and_then(parse_float)
            .filter(|v| v.is_finite())
    };
    // Exclusive bounds become the nearest representable inclusive ones
    let lo = tighter(
        finite(&facets.min_inclusive),
        finite(&facets.min_exclusive).map(f64::next_up),
        f64::max,
    );
    let hi = tighter(
        finite(&facets.max_inclusive),
        finite(&facets.max_exclusive).map(f64::next_down),
        f64::min,
    );
    let span = SPAN as f64;
    let (lo, hi) = match (lo, hi) {
        (None, None) => (0.0, span),
        (Some(lo), None) => (lo, lo + span),
        (None, Some(hi)) => (hi - span, hi),
        (Some(lo), Some(hi)) => (lo, hi),
    };
    if lo > hi {
        return Err(Error::generation("range facets of a floating point type admit no value"));
    }
    let (lo, hi) = if (hi - lo).is_finite() {
        (lo, hi)
    } else {
        (lo.max(-span), hi.min(span))
    };
    let value: f64 = rng.random_range(lo..=hi);
    let rounded = (value * 100.0).round() / 100.0;
    let value = if (lo..=hi).contains(&rounded) { rounded } else { value };
    Ok(value.to_string())
}

fn tighter(a: Option<f64>, b: Option<f64>, pick: fn(f64, f64) -> f64) -> Option<f64> {
    match (a, b) {
        (Some(a), Some(b)) => Some(pick(a, b)),
        (a, b) => a.or(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SimpleValueType;
    use crate::schema::Variety;
    use rand::SeedableRng;
    use rand_xorshift::XorShiftRng;

    fn check(builtin: BuiltinType, facets: &Facets, value: &str) {
        let value_type = SimpleValueType {
            name: None,
            variety: Variety::Atomic(builtin),
            facets: facets.clone(),
        };
        assert!(value_type.check(value).is_ok(), "{} rejected '{}'", builtin, value);
    }

    #[test]
    fn test_window() {
        let unbounded = Bounds { lo: None, hi: None };
        assert_eq!(unbounded.window(10), Some((0, 10)));
        let negative = Bounds {
            lo: None,
            hi: Some(-1),
        };
        assert_eq!(negative.window(10), Some((-11, -1)));
        let wide = Bounds {
            lo: Some(i64::MIN as i128),
            hi: Some(i64::MAX as i128),
        };
        assert_eq!(wide.window(10), Some((0, 10)));
        let empty = Bounds {
            lo: Some(5),
            hi: Some(4),
        };
        assert_eq!(empty.window(10), None);
    }

    #[test]
    fn test_integer_exclusive_bounds() {
        let facets = Facets {
            min_exclusive: Some("10".into()),
            max_exclusive: Some("13".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(11);
        for _ in 0..50 {
            let value: i128 = integer(BuiltinType::Int, &facets, &mut rng)
                .unwrap()
                .parse()
                .unwrap();
            assert!(value == 11 || value == 12);
        }
    }

    #[test]
    fn test_integer_empty_range() {
        let facets = Facets {
            min_inclusive: Some("5".into()),
            max_inclusive: Some("4".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(0);
        assert!(integer(BuiltinType::Integer, &facets, &mut rng).is_err());
    }

    #[test]
    fn test_decimal_digits() {
        let facets = Facets {
            total_digits: Some(5),
            fraction_digits: Some(2),
            min_inclusive: Some("-10.5".into()),
            max_inclusive: Some("99.99".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(12);
        for _ in 0..100 {
            let value = decimal(&facets, &mut rng).unwrap();
            check(BuiltinType::Decimal, &facets, &value);
        }
    }

    #[test]
    fn test_float_bounds() {
        let facets = Facets {
            min_inclusive: Some("0.5".into()),
            max_inclusive: Some("1.5".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(13);
        for _ in 0..100 {
            let value = float(&facets, &mut rng).unwrap();
            check(BuiltinType::Double, &facets, &value);
        }
    }

    #[test]
    fn test_float_tiny_exclusive_range() {
        let facets = Facets {
            min_exclusive: Some("0".into()),
            max_exclusive: Some("0.001".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(14);
        for _ in 0..100 {
            let value = float(&facets, &mut rng).unwrap();
            check(BuiltinType::Double, &facets, &value);
        }
    }

    #[test]
    fn test_float_exclusive_point_bounds() {
        let facets = Facets {
            min_exclusive: Some("1".into()),
            max_inclusive: Some("1.001".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(15);
        for _ in 0..100 {
            let value = float(&facets, &mut rng).unwrap();
            assert_ne!(value, "1");
            check(BuiltinType::Float, &facets, &value);
        }
    }

    #[test]
    fn test_decimal_scale_follows_facets() {
        let facets = Facets {
            min_inclusive: Some("0.001".into()),
            max_inclusive: Some("0.009".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(16);
        for _ in 0..50 {
            let value = decimal(&facets, &mut rng).unwrap();
            check(BuiltinType::Decimal, &facets, &value);
        }
    }

    #[test]
    fn test_decimal_refines_between_exclusive_bounds() {
        let facets = Facets {
            min_exclusive: Some("0".into()),
            max_exclusive: Some("0.01".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(17);
        for _ in 0..50 {
            let value = decimal(&facets, &mut rng).unwrap();
            check(BuiltinType::Decimal, &facets, &value);
        }
    }

    #[test]
    fn test_decimal_fixed_scale_empty_range() {
        let facets = Facets {
            fraction_digits: Some(1),
            min_exclusive: Some("0".into()),
            max_exclusive: Some("0.1".into()),
            ..Facets::default()
        };
        let mut rng = XorShiftRng::seed_from_u64(18);
        assert!(decimal(&facets, &mut rng).is_err());
    }
}
