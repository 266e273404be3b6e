use std::{fmt, num::NonZeroUsize, str::FromStr};

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::{ModelError, ModelResult};

/// Ceiling on the number of workers that may execute at the same time.
///
/// - `Unbounded`: every item is dispatched immediately (the ceiling equals the item count).
/// - `Bounded(n)`: at most `n` workers are in flight at any instant.
///
/// Parsed from config as either a positive integer or one of `"unbounded"`, `"none"`, `""`.
#[derive(Default, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConcurrencyLimit {
    #[default]
    Unbounded,
    Bounded(NonZeroUsize),
}

impl ConcurrencyLimit {
    /// Build a bounded limit; `0` is rejected.
    pub fn bounded(n: usize) -> ModelResult<Self> {
        NonZeroUsize::new(n)
            .map(Self::Bounded)
            .ok_or_else(|| ModelError::InvalidLimit("limit must be at least 1".into()))
    }

    /// Sequential execution, one worker at a time.
    pub const fn serial() -> Self {
        Self::Bounded(NonZeroUsize::MIN)
    }

    /// Effective ceiling for a collection of `len` items.
    ///
    /// Never returns `0`, so an empty collection still resolves to a usable ceiling.
    #[inline]
    pub fn resolve(&self, len: usize) -> usize {
        match self {
            ConcurrencyLimit::Unbounded => len.max(1),
            ConcurrencyLimit::Bounded(n) => n.get(),
        }
    }

    #[inline]
    pub fn is_unbounded(&self) -> bool {
        matches!(self, ConcurrencyLimit::Unbounded)
    }
}

impl From<NonZeroUsize> for ConcurrencyLimit {
    fn from(n: NonZeroUsize) -> Self {
        Self::Bounded(n)
    }
}

impl FromStr for ConcurrencyLimit {
    type Err = ModelError;
    fn from_str(s: &str) -> ModelResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "none" | "unbounded" => Ok(ConcurrencyLimit::Unbounded),
            other => {
                let n: usize = other
                    .parse()
                    .map_err(|_| ModelError::InvalidLimit(s.to_string()))?;
                Self::bounded(n)
            }
        }
    }
}

impl fmt::Display for ConcurrencyLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConcurrencyLimit::Unbounded => f.write_str("unbounded"),
            ConcurrencyLimit::Bounded(n) => write!(f, "{n}"),
        }
    }
}

impl Serialize for ConcurrencyLimit {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            ConcurrencyLimit::Unbounded => serializer.serialize_str("unbounded"),
            ConcurrencyLimit::Bounded(n) => serializer.serialize_u64(n.get() as u64),
        }
    }
}

impl<'de> Deserialize<'de> for ConcurrencyLimit {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Count(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Count(n) => Self::bounded(n as usize).map_err(serde::de::Error::custom),
            Raw::Text(s) => Self::from_str(&s).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(feature = "schema")]
impl schemars::JsonSchema for ConcurrencyLimit {
    fn schema_name() -> std::borrow::Cow<'static, str> {
        "ConcurrencyLimit".into()
    }

    fn json_schema(_: &mut schemars::SchemaGenerator) -> schemars::Schema {
        schemars::json_schema!({
            "oneOf": [
                { "type": "integer", "minimum": 1 },
                { "type": "string", "enum": ["unbounded", "none", ""] }
            ]
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_unbounded() {
        assert_eq!(ConcurrencyLimit::default(), ConcurrencyLimit::Unbounded);
    }

    #[test]
    fn resolve_uses_item_count_when_unbounded() {
        assert_eq!(ConcurrencyLimit::Unbounded.resolve(5), 5);
        assert_eq!(ConcurrencyLimit::Unbounded.resolve(0), 1);
        assert_eq!(ConcurrencyLimit::bounded(3).unwrap().resolve(5), 3);
        assert_eq!(ConcurrencyLimit::serial().resolve(10), 1);
    }

    #[test]
    fn zero_is_rejected() {
        assert!(ConcurrencyLimit::bounded(0).is_err());
        assert!("0".parse::<ConcurrencyLimit>().is_err());
    }

    #[test]
    fn parses_keywords_and_numbers() {
        assert_eq!(
            "Unbounded".parse::<ConcurrencyLimit>().unwrap(),
            ConcurrencyLimit::Unbounded
        );
        assert_eq!(
            " none ".parse::<ConcurrencyLimit>().unwrap(),
            ConcurrencyLimit::Unbounded
        );
        assert_eq!(
            "4".parse::<ConcurrencyLimit>().unwrap(),
            ConcurrencyLimit::bounded(4).unwrap()
        );
        assert!("four".parse::<ConcurrencyLimit>().is_err());
        assert!("-1".parse::<ConcurrencyLimit>().is_err());
    }

    #[test]
    fn deserializes_from_integer_or_string() {
        let a: ConcurrencyLimit = serde_json::from_str("3").unwrap();
        let b: ConcurrencyLimit = serde_json::from_str(r#""3""#).unwrap();
        let c: ConcurrencyLimit = serde_json::from_str(r#""unbounded""#).unwrap();

        assert_eq!(a, ConcurrencyLimit::bounded(3).unwrap());
        assert_eq!(a, b);
        assert_eq!(c, ConcurrencyLimit::Unbounded);
        assert!(serde_json::from_str::<ConcurrencyLimit>("0").is_err());
    }

    #[test]
    fn serializes_bounded_as_integer() {
        let json = serde_json::to_string(&ConcurrencyLimit::bounded(7).unwrap()).unwrap();
        assert_eq!(json, "7");
        let json = serde_json::to_string(&ConcurrencyLimit::Unbounded).unwrap();
        assert_eq!(json, r#""unbounded""#);
    }
}
