//! Phone canonicalization used as the comparison key for candidate lookup.
//!
//! Normalization is pure and deterministic: two raw strings that denote the
//! same subscriber must map to the same key. Strict mode validates against
//! region rules and emits an E.164-style `+<cc><national>` key; lenient mode
//! (no parsing capability configured) returns the cleaned digit string and
//! callers treat those keys as lower-confidence matches.

use serde::{Deserialize, Serialize};

/// Canonical phone key. `Display` renders the key itself.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NormalizedPhone(String);

impl NormalizedPhone {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Digits of the key without the leading `+`, for backends that store
    /// phones unprefixed.
    pub fn digits(&self) -> &str {
        self.0.strip_prefix('+').unwrap_or(&self.0)
    }
}

impl std::fmt::Display for NormalizedPhone {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Region {
    Br,
    Us,
}

impl Region {
    pub fn from_code(code: &str) -> Option<Self> {
        match code.trim().to_ascii_uppercase().as_str() {
            "BR" => Some(Self::Br),
            "US" => Some(Self::Us),
            _ => None,
        }
    }

    fn country_code(self) -> &'static str {
        match self {
            Self::Br => "55",
            Self::Us => "1",
        }
    }

    fn national_is_valid(self, national: &str) -> bool {
        match self {
            // Two-digit area code that cannot start with 0, then either an
            // 8-digit landline or a 9-prefixed 9-digit mobile number.
            Self::Br => {
                (national.len() == 10 || national.len() == 11)
                    && !national.starts_with('0')
                    && (national.len() == 10 || national.as_bytes().get(2) == Some(&b'9'))
            }
            Self::Us => national.len() == 10 && !national.starts_with(&['0', '1'][..]),
        }
    }
}

#[derive(Clone, Copy, Debug)]
enum Mode {
    Strict(Region),
    Lenient,
}

#[derive(Clone, Copy, Debug)]
pub struct PhoneNormalizer {
    mode: Mode,
}

impl PhoneNormalizer {
    pub fn new(region: Region) -> Self {
        Self { mode: Mode::Strict(region) }
    }

    /// Degraded mode: no validation, cleaned digit string passed through.
    pub fn lenient() -> Self {
        Self { mode: Mode::Lenient }
    }

    pub fn normalize(&self, raw: &str) -> Option<NormalizedPhone> {
        let cleaned = clean(raw)?;
        match self.mode {
            Mode::Lenient => Some(NormalizedPhone(cleaned)),
            Mode::Strict(region) => normalize_strict(&cleaned, region),
        }
    }
}

/// Strips formatting characters and keeps at most one leading `+`. Fails when
/// anything other than digits remains.
fn clean(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let (plus, rest) = match trimmed.strip_prefix('+') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let mut digits = String::with_capacity(rest.len());
    for ch in rest.chars() {
        match ch {
            '(' | ')' | ' ' | '-' | '.' => continue,
            '0'..='9' => digits.push(ch),
            _ => return None,
        }
    }

    if digits.is_empty() {
        return None;
    }

    Some(if plus { format!("+{digits}") } else { digits })
}

fn normalize_strict(cleaned: &str, region: Region) -> Option<NormalizedPhone> {
    let cc = region.country_code();

    if let Some(international) = cleaned.strip_prefix('+') {
        let national = international.strip_prefix(cc)?;
        return region
            .national_is_valid(national)
            .then(|| NormalizedPhone(format!("+{cc}{national}")));
    }

    // Country-code prefix written without `+`.
    if let Some(national) = cleaned.strip_prefix(cc) {
        if region.national_is_valid(national) {
            return Some(NormalizedPhone(format!("+{cc}{national}")));
        }
    }

    // National form, optionally with a trunk `0`.
    let national = cleaned.strip_prefix('0').unwrap_or(cleaned);
    region.national_is_valid(national).then(|| NormalizedPhone(format!("+{cc}{national}")))
}

#[cfg(test)]
mod tests {
    use super::{NormalizedPhone, PhoneNormalizer, Region};

    fn br() -> PhoneNormalizer {
        PhoneNormalizer::new(Region::Br)
    }

    #[test]
    fn formatting_variants_share_one_key() {
        let expected = Some(NormalizedPhone("+5565991234567".to_string()));
        assert_eq!(br().normalize("65991234567"), expected);
        assert_eq!(br().normalize("(65) 99123-4567"), expected);
        assert_eq!(br().normalize("+55 65 99123-4567"), expected);
        assert_eq!(br().normalize("5565991234567"), expected);
        assert_eq!(br().normalize("065 99123 4567"), expected);
    }

    #[test]
    fn normalization_is_idempotent_on_canonical_input() {
        let first = br().normalize("65 99123-4567").expect("valid number");
        let second = br().normalize(first.as_str()).expect("still valid");
        assert_eq!(first, second);
    }

    #[test]
    fn landline_length_is_accepted() {
        assert_eq!(
            br().normalize("(65) 3123-4567"),
            Some(NormalizedPhone("+556531234567".to_string()))
        );
    }

    #[test]
    fn invalid_numbers_are_absent_not_errors() {
        assert_eq!(br().normalize(""), None);
        assert_eq!(br().normalize("not a phone"), None);
        assert_eq!(br().normalize("12345"), None);
        // Eleven digits without the mobile 9 prefix.
        assert_eq!(br().normalize("65881234567"), None);
        // Wrong country code for the configured region.
        assert_eq!(br().normalize("+14155552671"), None);
    }

    #[test]
    fn us_region_rules() {
        let us = PhoneNormalizer::new(Region::Us);
        let expected = Some(NormalizedPhone("+14155552671".to_string()));
        assert_eq!(us.normalize("(415) 555-2671"), expected);
        assert_eq!(us.normalize("1-415-555-2671"), expected);
        assert_eq!(us.normalize("+1 415 555 2671"), expected);
        assert_eq!(us.normalize("055 555 2671"), None);
    }

    #[test]
    fn lenient_mode_passes_cleaned_digits_through() {
        let lenient = PhoneNormalizer::lenient();
        assert_eq!(lenient.normalize("(65) 99123-4567"), Some(NormalizedPhone("65991234567".to_string())));
        assert_eq!(lenient.normalize("12345"), Some(NormalizedPhone("12345".to_string())));
        assert_eq!(lenient.normalize("not a phone"), None);
    }

    #[test]
    fn digits_strips_the_plus_prefix() {
        let phone = br().normalize("65991234567").expect("valid number");
        assert_eq!(phone.digits(), "5565991234567");
    }

    #[test]
    fn unknown_region_codes_are_rejected_at_parse() {
        assert_eq!(Region::from_code("br"), Some(Region::Br));
        assert_eq!(Region::from_code(" US "), Some(Region::Us));
        assert_eq!(Region::from_code("ZZ"), None);
    }
}
