//! Canonical phone keys.
//!
//! The canonical key is the basis for contact deduplication on the CRM side,
//! so every rule here must be deterministic. Regional rules carry a version;
//! bump it whenever a rule's output changes for any input.

use crate::config::PhoneConfig;
use crate::error::ConfigError;
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;
use std::ops::RangeInclusive;
use std::sync::Arc;

static NON_DIGITS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^0-9]+").expect("static regex"));

/// A region-specific rewrite applied to an already-normalized E.164 digit string.
pub trait RegionalRule: Send + Sync + fmt::Debug {
    /// Stable rule identifier, as referenced from configuration.
    fn id(&self) -> &'static str;

    /// Rule version.
    fn version(&self) -> u32;

    /// Rewrite `digits` if the rule applies, `None` otherwise.
    fn merge(&self, digits: &str) -> Option<String>;
}

/// Brazilian mobile numbering: legacy 8-digit mobiles gained a leading `9`.
///
/// `55 AA NNNNNNNN` with `N[0]` in `6..=9` becomes `55 AA 9NNNNNNNN`.
/// Fixed lines (`N[0]` in `2..=5`) and numbers already in 9-digit form are left alone.
#[derive(Debug, Clone, Copy, Default)]
pub struct BrazilNinthDigit;

impl BrazilNinthDigit {
    pub const ID: &'static str = "br-ninth-digit";
}

impl RegionalRule for BrazilNinthDigit {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn version(&self) -> u32 {
        1
    }

    fn merge(&self, digits: &str) -> Option<String> {
        let bytes = digits.as_bytes();
        if bytes.len() != 12 || !digits.starts_with("55") {
            return None;
        }

        // Area codes never contain a zero.
        let area = &bytes[2..4];
        if area.iter().any(|b| *b == b'0') {
            return None;
        }

        if !matches!(bytes[4], b'6'..=b'9') {
            return None;
        }

        let mut merged = String::with_capacity(13);
        merged.push_str(&digits[..4]);
        merged.push('9');
        merged.push_str(&digits[4..]);
        Some(merged)
    }
}

/// Resolve a configured rule id into a rule instance.
pub fn rule_by_id(id: &str) -> Option<Arc<dyn RegionalRule>> {
    match id {
        BrazilNinthDigit::ID => Some(Arc::new(BrazilNinthDigit)),
        _ => None,
    }
}

/// Turns raw phone strings into canonical identity keys.
#[derive(Debug, Clone)]
pub struct PhoneNormalizer {
    default_country_code: String,
    national_len: RangeInclusive<usize>,
    rules: Vec<Arc<dyn RegionalRule>>,
}

impl Default for PhoneNormalizer {
    fn default() -> Self {
        Self::new("55")
    }
}

impl PhoneNormalizer {
    /// Create a normalizer without regional rules.
    pub fn new(default_country_code: impl Into<String>) -> Self {
        let default_country_code: String = default_country_code.into();
        Self {
            default_country_code: default_country_code
                .chars()
                .filter(|c| c.is_ascii_digit())
                .skip_while(|c| *c == '0')
                .collect(),
            national_len: 10..=11,
            rules: Vec::new(),
        }
    }

    /// Build a normalizer from configuration.
    pub fn from_config(config: &PhoneConfig) -> Result<Self, ConfigError> {
        let mut normalizer = Self::new(config.default_country_code.clone())
            .with_national_len(config.national_min_len..=config.national_max_len);
        for id in &config.regional_rules {
            let rule = rule_by_id(id).ok_or_else(|| ConfigError::UnknownPhoneRule(id.clone()))?;
            normalizer = normalizer.with_rule(rule);
        }
        Ok(normalizer)
    }

    /// Digit counts treated as national numbers lacking a country code.
    pub fn with_national_len(mut self, range: RangeInclusive<usize>) -> Self {
        self.national_len = range;
        self
    }

    /// Add a regional rule. Rules are tried in insertion order; the first match wins.
    pub fn with_rule(mut self, rule: Arc<dyn RegionalRule>) -> Self {
        self.rules.push(rule);
        self
    }

    /// Configured default country code.
    pub fn default_country_code(&self) -> &str {
        &self.default_country_code
    }

    /// Digits only, international/trunk prefix removed, default country code applied.
    ///
    /// Idempotent: a number that already reads as country code plus a
    /// national number is left alone, so a prefixed result is never prefixed again.
    pub fn normalize(&self, raw: &str) -> String {
        // JIDs carry the number before '@' and a device suffix after ':'.
        let raw = match raw.split_once('@') {
            Some((user, _)) => user.split(':').next().unwrap_or(user),
            None => raw,
        };
        let digits = NON_DIGITS.replace_all(raw, "");
        let digits = digits.trim_start_matches('0');

        if self.needs_country_code(digits) {
            format!("{}{}", self.default_country_code, digits)
        } else {
            digits.to_string()
        }
    }

    fn needs_country_code(&self, digits: &str) -> bool {
        let cc = &self.default_country_code;
        if cc.is_empty() || !self.national_len.contains(&digits.len()) {
            return false;
        }
        match digits.strip_prefix(cc.as_str()) {
            Some(national) => !self.national_len.contains(&national.len()),
            None => true,
        }
    }

    /// Apply the first matching regional rule to a normalized digit string.
    pub fn merge_regional_variant(&self, e164_digits: &str) -> String {
        self.rules
            .iter()
            .find_map(|rule| rule.merge(e164_digits))
            .unwrap_or_else(|| e164_digits.to_string())
    }

    /// The canonical identity key: normalized, then region-merged.
    pub fn canonical_key(&self, raw: &str) -> String {
        self.merge_regional_variant(&self.normalize(raw))
    }

    /// Identifies the rule set in effect, e.g. `br-ninth-digit@1`.
    pub fn ruleset_fingerprint(&self) -> String {
        self.rules
            .iter()
            .map(|r| format!("{}@{}", r.id(), r.version()))
            .collect::<Vec<_>>()
            .join(",")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn brazil() -> PhoneNormalizer {
        PhoneNormalizer::new("55").with_rule(Arc::new(BrazilNinthDigit))
    }

    #[test]
    fn test_normalize_strips_formatting() {
        let n = PhoneNormalizer::new("55");
        assert_eq!(n.normalize("+55 (11) 98765-4321"), "5511987654321");
        assert_eq!(n.normalize("0055 11 98765 4321"), "5511987654321");
        assert_eq!(n.normalize("5511987654321@s.whatsapp.net"), "5511987654321");
        assert_eq!(n.normalize("5511987654321:7@s.whatsapp.net"), "5511987654321");
    }

    #[test]
    fn test_normalize_prepends_default_country_code() {
        let n = PhoneNormalizer::new("55");
        assert_eq!(n.normalize("(11) 98765-4321"), "5511987654321");
        assert_eq!(n.normalize("011 98765-4321"), "5511987654321");
        assert_eq!(n.normalize("1133334444"), "551133334444");
    }

    #[test]
    fn test_normalize_leaves_short_codes() {
        let n = PhoneNormalizer::new("55");
        assert_eq!(n.normalize("12345"), "12345");
        assert_eq!(n.normalize(""), "");
    }

    #[test]
    fn test_normalize_idempotent() {
        let n = brazil();
        let inputs = [
            "+55 11 98765-4321",
            "11 9999-8888",
            "0000551199998888",
            "12345",
            "1 (202) 555-0100",
            "abc",
            "00",
            "987654321",
        ];
        for raw in inputs {
            let once = n.normalize(raw);
            assert_eq!(n.normalize(&once), once, "input {:?}", raw);
            let key = n.canonical_key(raw);
            assert_eq!(n.canonical_key(&key), key, "input {:?}", raw);
        }
    }

    #[test]
    fn test_normalize_idempotent_overlapping_range() {
        // "1" + 10 digits is still inside 10..=11.
        let n = PhoneNormalizer::new("1");
        assert_eq!(n.normalize("(202) 555-0100"), "12025550100");
        for raw in ["(202) 555-0100", "+1 202 555 0100", "20255501001", "5550100"] {
            let once = n.normalize(raw);
            assert_eq!(n.normalize(&once), once, "input {:?}", raw);
        }

        let n = PhoneNormalizer::new("44").with_national_len(9..=11);
        for raw in ["7911 123456", "020 7946 0958", "447911123456"] {
            let once = n.normalize(raw);
            assert_eq!(n.normalize(&once), once, "input {:?}", raw);
        }
    }

    #[test]
    fn test_country_code_leading_zeros_dropped() {
        let n = PhoneNormalizer::new("+044");
        assert_eq!(n.default_country_code(), "44");
        let once = n.normalize("7911123456");
        assert_eq!(once, "447911123456");
        assert_eq!(n.normalize(&once), once);
    }

    #[test]
    fn test_merge_legacy_mobile() {
        let n = brazil();
        let merged = n.merge_regional_variant("551199998888");
        assert_eq!(merged, "5511999998888");
        assert_eq!(merged.len(), "551199998888".len() + 1);
    }

    #[test]
    fn test_merge_leaves_modern_mobile() {
        let n = brazil();
        assert_eq!(n.merge_regional_variant("5511987654321"), "5511987654321");
    }

    #[test]
    fn test_merge_leaves_fixed_line() {
        let n = brazil();
        assert_eq!(n.merge_regional_variant("551133334444"), "551133334444");
        assert_eq!(n.merge_regional_variant("552145678901"), "552145678901");
    }

    #[test]
    fn test_merge_ignores_other_countries() {
        let n = brazil();
        assert_eq!(n.merge_regional_variant("351912345678"), "351912345678");
    }

    #[test]
    fn test_canonical_key_legacy_with_separator() {
        let n = brazil();
        assert_eq!(n.canonical_key("5511\\:99998888"), "5511999998888");
    }

    #[test]
    fn test_without_rules_no_merge() {
        let n = PhoneNormalizer::new("55");
        assert_eq!(n.canonical_key("551199998888"), "551199998888");
        assert_eq!(n.ruleset_fingerprint(), "");
    }

    #[test]
    fn test_from_config() {
        let config = PhoneConfig {
            default_country_code: "+55".to_string(),
            regional_rules: vec!["br-ninth-digit".to_string()],
            ..Default::default()
        };
        let n = PhoneNormalizer::from_config(&config).unwrap();
        assert_eq!(n.default_country_code(), "55");
        assert_eq!(n.ruleset_fingerprint(), "br-ninth-digit@1");

        let bad = PhoneConfig {
            regional_rules: vec!["xx-unknown".to_string()],
            ..Default::default()
        };
        assert!(matches!(
            PhoneNormalizer::from_config(&bad),
            Err(ConfigError::UnknownPhoneRule(_))
        ));
    }
}
