//! XSD built-in types
//!
//! The built-in datatypes a schema can name in the XSD namespace, with the
//! properties value synthesis needs: the primitive they derive from, implicit
//! integer ranges, whitespace handling and lexical checks.

use base64::Engine;
use once_cell::sync::Lazy;
use regex::Regex;
use rust_decimal::Decimal;
use std::fmt;
use std::str::FromStr;

use super::facets::WhiteSpace;

/// XSD 1.0 Namespace
pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";

/// A built-in XSD datatype
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum BuiltinType {
    AnyType,
    AnySimpleType,
    String,
    NormalizedString,
    Token,
    Language,
    Name,
    NcName,
    Id,
    IdRef,
    IdRefs,
    Entity,
    Entities,
    NmToken,
    NmTokens,
    Boolean,
    Decimal,
    Integer,
    Long,
    Int,
    Short,
    Byte,
    NonNegativeInteger,
    PositiveInteger,
    UnsignedLong,
    UnsignedInt,
    UnsignedShort,
    UnsignedByte,
    NonPositiveInteger,
    NegativeInteger,
    Float,
    Double,
    Duration,
    DateTime,
    Time,
    Date,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
    HexBinary,
    Base64Binary,
    AnyUri,
    QName,
    Notation,
}

/// Primitive value space a built-in type belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[allow(missing_docs)]
pub enum Primitive {
    String,
    Boolean,
    Decimal,
    Float,
    Double,
    Duration,
    DateTime,
    Time,
    Date,
    GYearMonth,
    GYear,
    GMonthDay,
    GDay,
    GMonth,
    HexBinary,
    Base64Binary,
    AnyUri,
    QName,
}

const ALL: &[BuiltinType] = &[
    BuiltinType::AnyType,
    BuiltinType::AnySimpleType,
    BuiltinType::String,
    BuiltinType::NormalizedString,
    BuiltinType::Token,
    BuiltinType::Language,
    BuiltinType::Name,
    BuiltinType::NcName,
    BuiltinType::Id,
    BuiltinType::IdRef,
    BuiltinType::IdRefs,
    BuiltinType::Entity,
    BuiltinType::Entities,
    BuiltinType::NmToken,
    BuiltinType::NmTokens,
    BuiltinType::Boolean,
    BuiltinType::Decimal,
    BuiltinType::Integer,
    BuiltinType::Long,
    BuiltinType::Int,
    BuiltinType::Short,
    BuiltinType::Byte,
    BuiltinType::NonNegativeInteger,
    BuiltinType::PositiveInteger,
    BuiltinType::UnsignedLong,
    BuiltinType::UnsignedInt,
    BuiltinType::UnsignedShort,
    BuiltinType::UnsignedByte,
    BuiltinType::NonPositiveInteger,
    BuiltinType::NegativeInteger,
    BuiltinType::Float,
    BuiltinType::Double,
    BuiltinType::Duration,
    BuiltinType::DateTime,
    BuiltinType::Time,
    BuiltinType::Date,
    BuiltinType::GYearMonth,
    BuiltinType::GYear,
    BuiltinType::GMonthDay,
    BuiltinType::GDay,
    BuiltinType::GMonth,
    BuiltinType::HexBinary,
    BuiltinType::Base64Binary,
    BuiltinType::AnyUri,
    BuiltinType::QName,
    BuiltinType::Notation,
];

static LANGUAGE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z]{1,8}(-[a-zA-Z0-9]{1,8})*$").unwrap());
// XML NameStartChar and NameChar, approximated with Unicode categories
static NAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[_:\p{L}\p{Nl}][\-._:\p{L}\p{M}\p{N}\u{B7}]*$").unwrap());
static NCNAME: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[_\p{L}\p{Nl}][\-._\p{L}\p{M}\p{N}\u{B7}]*$").unwrap());
static NMTOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[\-._:\p{L}\p{M}\p{N}\u{B7}]+$").unwrap());
static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^-?P([0-9]+Y)?([0-9]+M)?([0-9]+D)?(T([0-9]+H)?([0-9]+M)?([0-9]+(\.[0-9]+)?S)?)?$")
        .unwrap()
});
const TIMEZONE: &str = r"(Z|[+-][0-9]{2}:[0-9]{2})?$";
static DATETIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^-?[0-9]{{4,}}-[0-9]{{2}}-[0-9]{{2}}T[0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}(\.[0-9]+)?{}",
        TIMEZONE
    ))
    .unwrap()
});
static DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"^-?[0-9]{{4,}}-[0-9]{{2}}-[0-9]{{2}}{}", TIMEZONE)).unwrap()
});
static TIME: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"^[0-9]{{2}}:[0-9]{{2}}:[0-9]{{2}}(\.[0-9]+)?{}",
        TIMEZONE
    ))
    .unwrap()
});
static GYEAR: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^-?[0-9]{{4,}}{}", TIMEZONE)).unwrap());
static GYEAR_MONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^-?[0-9]{{4,}}-[0-9]{{2}}{}", TIMEZONE)).unwrap());
static GMONTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^--[0-9]{{2}}{}", TIMEZONE)).unwrap());
static GDAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^---[0-9]{{2}}{}", TIMEZONE)).unwrap());
static GMONTH_DAY: Lazy<Regex> =
    Lazy::new(|| Regex::new(&format!(r"^--[0-9]{{2}}-[0-9]{{2}}{}", TIMEZONE)).unwrap());
static HEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([0-9a-fA-F]{2})*$").unwrap());
static FLOAT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)([eE][+-]?[0-9]+)?|-?INF|NaN)$").unwrap()
});

impl BuiltinType {
    /// Look up a built-in type by its local name in the XSD namespace
    pub fn from_name(local_name: &str) -> Option<Self> {
        ALL.iter().copied().find(|b| b.name() == local_name)
    }

    /// Local name of the type
    pub fn name(&self) -> &'static str {
        use BuiltinType::*;
        match self {
            AnyType => "anyType",
            AnySimpleType => "anySimpleType",
            String => "string",
            NormalizedString => "normalizedString",
            Token => "token",
            Language => "language",
            Name => "Name",
            NcName => "NCName",
            Id => "ID",
            IdRef => "IDREF",
            IdRefs => "IDREFS",
            Entity => "ENTITY",
            Entities => "ENTITIES",
            NmToken => "NMTOKEN",
            NmTokens => "NMTOKENS",
            Boolean => "boolean",
            Decimal => "decimal",
            Integer => "integer",
            Long => "long",
            Int => "int",
            Short => "short",
            Byte => "byte",
            NonNegativeInteger => "nonNegativeInteger",
            PositiveInteger => "positiveInteger",
            UnsignedLong => "unsignedLong",
            UnsignedInt => "unsignedInt",
            UnsignedShort => "unsignedShort",
            UnsignedByte => "unsignedByte",
            NonPositiveInteger => "nonPositiveInteger",
            NegativeInteger => "negativeInteger",
            Float => "float",
            Double => "double",
            Duration => "duration",
            DateTime => "dateTime",
            Time => "time",
            Date => "date",
            GYearMonth => "gYearMonth",
            GYear => "gYear",
            GMonthDay => "gMonthDay",
            GDay => "gDay",
            GMonth => "gMonth",
            HexBinary => "hexBinary",
            Base64Binary => "base64Binary",
            AnyUri => "anyURI",
            QName => "QName",
            Notation => "NOTATION",
        }
    }

    /// The primitive value space of this type
    pub fn primitive(&self) -> Primitive {
        use BuiltinType::*;
        match self {
            AnyType | AnySimpleType | String | NormalizedString | Token | Language | Name
            | NcName | Id | IdRef | IdRefs | Entity | Entities | NmToken | NmTokens => {
                Primitive::String
            }
            Boolean => Primitive::Boolean,
            Decimal | Integer | Long | Int | Short | Byte | NonNegativeInteger
            | PositiveInteger | UnsignedLong | UnsignedInt | UnsignedShort | UnsignedByte
            | NonPositiveInteger | NegativeInteger => Primitive::Decimal,
            Float => Primitive::Float,
            Double => Primitive::Double,
            Duration => Primitive::Duration,
            DateTime => Primitive::DateTime,
            Time => Primitive::Time,
            Date => Primitive::Date,
            GYearMonth => Primitive::GYearMonth,
            GYear => Primitive::GYear,
            GMonthDay => Primitive::GMonthDay,
            GDay => Primitive::GDay,
            GMonth => Primitive::GMonth,
            HexBinary => Primitive::HexBinary,
            Base64Binary => Primitive::Base64Binary,
            AnyUri => Primitive::AnyUri,
            QName | Notation => Primitive::QName,
        }
    }

    /// Check if this type is `xs:integer` or derived from it
    pub fn is_integer(&self) -> bool {
        self.primitive() == Primitive::Decimal && *self != BuiltinType::Decimal
    }

    /// Check if values compare numerically
    pub fn is_numeric(&self) -> bool {
        matches!(
            self.primitive(),
            Primitive::Decimal | Primitive::Float | Primitive::Double
        )
    }

    /// Implicit value range of integer types as (min, max)
    pub fn integer_bounds(&self) -> (Option<i128>, Option<i128>) {
        use BuiltinType::*;
        match self {
            Long => (Some(i64::MIN as i128), Some(i64::MAX as i128)),
            Int => (Some(i32::MIN as i128), Some(i32::MAX as i128)),
            Short => (Some(i16::MIN as i128), Some(i16::MAX as i128)),
            Byte => (Some(i8::MIN as i128), Some(i8::MAX as i128)),
            NonNegativeInteger => (Some(0), None),
            PositiveInteger => (Some(1), None),
            UnsignedLong => (Some(0), Some(u64::MAX as i128)),
            UnsignedInt => (Some(0), Some(u32::MAX as i128)),
            UnsignedShort => (Some(0), Some(u16::MAX as i128)),
            UnsignedByte => (Some(0), Some(u8::MAX as i128)),
            NonPositiveInteger => (None, Some(0)),
            NegativeInteger => (None, Some(-1)),
            _ => (None, None),
        }
    }

    /// Built-in list types and their item type
    pub fn list_item(&self) -> Option<BuiltinType> {
        match self {
            BuiltinType::IdRefs => Some(BuiltinType::IdRef),
            BuiltinType::Entities => Some(BuiltinType::Entity),
            BuiltinType::NmTokens => Some(BuiltinType::NmToken),
            _ => None,
        }
    }

    /// White space handling implied by the type
    pub fn white_space(&self) -> WhiteSpace {
        match self {
            BuiltinType::String | BuiltinType::AnySimpleType | BuiltinType::AnyType => {
                WhiteSpace::Preserve
            }
            BuiltinType::NormalizedString => WhiteSpace::Replace,
            _ => WhiteSpace::Collapse,
        }
    }

    /// Check that a value is in the lexical space of this type
    pub fn is_valid_lexical(&self, value: &str) -> bool {
        use BuiltinType::*;
        match self {
            AnyType | AnySimpleType | String => true,
            NormalizedString => !value.contains(['\r', '\n', '\t']),
            Token => {
                !value.contains(['\r', '\n', '\t'])
                    && !value.starts_with(' ')
                    && !value.ends_with(' ')
                    && !value.contains("  ")
            }
            Language => LANGUAGE.is_match(value),
            Name => NAME.is_match(value),
            NcName | Id | IdRef | Entity => NCNAME.is_match(value),
            NmToken => NMTOKEN.is_match(value),
            IdRefs | Entities | NmTokens => {
                let item = self.list_item().unwrap_or(String);
                let mut items = value.split_whitespace().peekable();
                items.peek().is_some() && items.all(|v| item.is_valid_lexical(v))
            }
            Boolean => matches!(value, "true" | "false" | "1" | "0"),
            Decimal => parse_decimal(value).is_some(),
            Float | Double => FLOAT.is_match(value),
            Duration => DURATION.is_match(value) && !value.ends_with('P') && !value.ends_with('T'),
            DateTime => DATETIME.is_match(value),
            Time => TIME.is_match(value),
            Date => DATE.is_match(value),
            GYearMonth => GYEAR_MONTH.is_match(value),
            GYear => GYEAR.is_match(value),
            GMonthDay => GMONTH_DAY.is_match(value),
            GDay => GDAY.is_match(value),
            GMonth => GMONTH.is_match(value),
            HexBinary => HEX.is_match(value),
            Base64Binary => base64::engine::general_purpose::STANDARD
                .decode(value.split_whitespace().collect::<std::string::String>())
                .is_ok(),
            AnyUri => !value.contains(['\n', '\r', '\t', ' ']),
            QName | Notation => match value.split_once(':') {
                Some((prefix, local)) => NCNAME.is_match(prefix) && NCNAME.is_match(local),
                None => NCNAME.is_match(value),
            },
            _ => {
                // Integer family
                if value.contains('.') {
                    return false;
                }
                let Some(n) = parse_decimal(value).and_then(decimal_to_i128) else {
                    return false;
                };
                let (lo, hi) = self.integer_bounds();
                lo.map_or(true, |lo| n >= lo) && hi.map_or(true, |hi| n <= hi)
            }
        }
    }
}

impl fmt::Display for BuiltinType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "xs:{}", self.name())
    }
}

/// Parse an XSD decimal lexical value
pub fn parse_decimal(value: &str) -> Option<Decimal> {
    let value = value.trim();
    let value = value.strip_prefix('+').unwrap_or(value);
    if value.is_empty() || value.contains(['e', 'E']) {
        return None;
    }
    Decimal::from_str(value).ok()
}

/// Convert an integral decimal to i128
pub fn decimal_to_i128(value: Decimal) -> Option<i128> {
    if value.fract().is_zero() {
        value.trunc().to_string().parse::<i128>().ok()
    } else {
        None
    }
}
