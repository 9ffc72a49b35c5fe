//! Category keyword to envelope-type lookup.
//!
//! Matching is done word by word on the lowercased category: a category word
//! matches a keyword when it starts with it, so "Utilities" matches "utilit" and
//! "Bills & Payments" matches "bill". The first table row with a matching keyword
//! wins; unmatched categories are standard envelopes.

use crate::entities::EnvelopeType;
use serde::{Deserialize, Serialize};

/// Keyword prefixes and the envelope type they imply, checked in order.
pub const CATEGORY_TYPE_TABLE: &[(&str, EnvelopeType)] = &[
    ("bill", EnvelopeType::Liability),
    ("rent", EnvelopeType::Liability),
    ("mortgage", EnvelopeType::Liability),
    ("utilit", EnvelopeType::Liability),
    ("insurance", EnvelopeType::Liability),
    ("loan", EnvelopeType::Liability),
    ("debt", EnvelopeType::Liability),
    ("subscription", EnvelopeType::Liability),
    ("phone", EnvelopeType::Liability),
    ("internet", EnvelopeType::Liability),
    ("saving", EnvelopeType::Goal),
    ("goal", EnvelopeType::Goal),
    ("emergency", EnvelopeType::Goal),
    ("vacation", EnvelopeType::Goal),
    ("investment", EnvelopeType::Goal),
    ("hsa", EnvelopeType::Supplemental),
    ("fsa", EnvelopeType::Supplemental),
    ("supplemental", EnvelopeType::Supplemental),
];

/// Picks an envelope type for a category.
#[must_use]
pub fn classify_category(category: &str) -> EnvelopeType {
    let lowered = category.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    CATEGORY_TYPE_TABLE
        .iter()
        .find(|(keyword, _)| words.iter().any(|w| w.starts_with(keyword)))
        .map_or(EnvelopeType::Standard, |(_, kind)| *kind)
}

/// How an envelope's monthly need is estimated when splitting cash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FundingClass {
    /// Fixed recurring payments
    Bill,
    /// Day-to-day spending with a monthly budget
    Variable,
    /// Money set aside toward a goal
    Savings,
}

impl From<EnvelopeType> for FundingClass {
    fn from(kind: EnvelopeType) -> Self {
        match kind {
            EnvelopeType::Liability => Self::Bill,
            EnvelopeType::Goal => Self::Savings,
            EnvelopeType::Standard | EnvelopeType::Supplemental => Self::Variable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_keywords() {
        assert_eq!(classify_category("Bills"), EnvelopeType::Liability);
        assert_eq!(classify_category("Housing / Rent"), EnvelopeType::Liability);
        assert_eq!(classify_category("utilities"), EnvelopeType::Liability);
        assert_eq!(classify_category("Emergency Fund"), EnvelopeType::Goal);
        assert_eq!(classify_category("Savings"), EnvelopeType::Goal);
        assert_eq!(classify_category("HSA"), EnvelopeType::Supplemental);
    }

    #[test]
    fn test_classify_defaults_to_standard() {
        assert_eq!(classify_category("Groceries"), EnvelopeType::Standard);
        assert_eq!(classify_category(""), EnvelopeType::Standard);
        // Only word prefixes count: "parent" is not rent
        assert_eq!(classify_category("Parenting"), EnvelopeType::Standard);
    }

    #[test]
    fn test_funding_class() {
        assert_eq!(FundingClass::from(EnvelopeType::Liability), FundingClass::Bill);
        assert_eq!(FundingClass::from(EnvelopeType::Goal), FundingClass::Savings);
        assert_eq!(
            FundingClass::from(EnvelopeType::Supplemental),
            FundingClass::Variable
        );
    }
}
