//! Layer 0: Locators
//!
//! A `Locator` is an IRI reference used for topic map storage addresses,
//! item identifiers, subject identifiers and subject locators. Validation
//! only rejects values that can never address anything; full IRI syntax
//! checking is left to syntax codecs.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::InvalidLocator;

/// Well-known published subject identifiers and datatype IRIs.
pub mod psi {
    /// TMDM default name type subject.
    pub const TOPIC_NAME: &str = "http://psi.topicmaps.org/iso13250/model/topic-name";
    /// Default datatype for string-valued occurrences and variants.
    pub const XSD_STRING: &str = "http://www.w3.org/2001/XMLSchema#string";
    /// Datatype for locator-valued occurrences and variants.
    pub const XSD_ANY_URI: &str = "http://www.w3.org/2001/XMLSchema#anyURI";
}

/// IRI reference - non-empty, no whitespace.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Locator(String);

impl Locator {
    pub fn new(s: impl Into<String>) -> Result<Self, InvalidLocator> {
        let s = s.into();
        if s.is_empty() {
            return Err(InvalidLocator {
                raw: s,
                reason: "empty".into(),
            });
        }
        if s.chars().any(char::is_whitespace) {
            return Err(InvalidLocator {
                raw: s,
                reason: "contains whitespace".into(),
            });
        }
        Ok(Self(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Locator for the XSD string datatype.
    pub fn xsd_string() -> Self {
        Self(psi::XSD_STRING.to_string())
    }

    /// Locator for the XSD anyURI datatype.
    pub fn xsd_any_uri() -> Self {
        Self(psi::XSD_ANY_URI.to_string())
    }

    /// The TMDM `topic-name` subject identifier.
    pub fn topic_name_type() -> Self {
        Self(psi::TOPIC_NAME.to_string())
    }
}

impl fmt::Debug for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Locator({:?})", self.0)
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for Locator {
    type Error = InvalidLocator;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Locator::new(s)
    }
}

impl TryFrom<&str> for Locator {
    type Error = InvalidLocator;
    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Locator::new(s)
    }
}

impl From<Locator> for String {
    fn from(loc: Locator) -> String {
        loc.0
    }
}

impl AsRef<str> for Locator {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locator_accepts_iris_and_curie_like_refs() {
        for raw in ["http://example.org/map", "urn:uuid:1234", "sid:A", "file:/x#frag"] {
            let loc = Locator::new(raw).unwrap();
            assert_eq!(loc.as_str(), raw);
        }
    }

    #[test]
    fn locator_rejects_empty_and_whitespace() {
        assert!(Locator::new("").is_err());
        assert!(Locator::new("http://example.org/a b").is_err());
        assert!(Locator::new(" leading").is_err());
    }

    #[test]
    fn locator_serde_roundtrip_is_transparent() {
        let loc = Locator::new("http://example.org/t1").unwrap();
        let json = serde_json::to_string(&loc).unwrap();
        assert_eq!(json, "\"http://example.org/t1\"");
        let back: Locator = serde_json::from_str(&json).unwrap();
        assert_eq!(back, loc);
    }
}
