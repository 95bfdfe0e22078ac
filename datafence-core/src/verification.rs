// File: datafence-core/src/verification.rs
//! Verification functions applied after regex matching.
//!
//! A pattern may declare a verification function by name; the function is
//! resolved once at load time and bound onto the compiled definition. Each
//! function is a pure predicate over the matched substring (no surrounding
//! context) and rejects false positives that a regular expression alone
//! cannot express, such as checksum failures or timestamp-shaped digit runs.
//!
//! License: MIT OR APACHE 2.0

use std::collections::{HashMap, HashSet};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use log::warn;
use once_cell::sync::Lazy;
use regex::Regex;

/// Boxed verification predicate. Must be pure and total; a panicking
/// function is downgraded to a verification failure by [`run_verification`].
pub type VerifyFn = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Name table mapping verification-function names to predicates.
///
/// All builtin functions are pre-registered. Custom functions must be
/// registered *before* patterns referencing them are loaded; the loader
/// fails with `DetectError::UnknownVerification` otherwise.
#[derive(Clone)]
pub struct VerificationRegistry {
    functions: HashMap<String, VerifyFn>,
}

impl std::fmt::Debug for VerificationRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("VerificationRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl Default for VerificationRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl VerificationRegistry {
    /// Creates a registry with no functions registered at all.
    pub fn empty() -> Self {
        Self {
            functions: HashMap::new(),
        }
    }

    /// Creates a registry pre-populated with every builtin function.
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register("iban_mod97", |v| iban_mod97(v));
        registry.register("luhn", |v| luhn(v));
        registry.register("card_number", |v| card_number(v));
        registry.register("ssn", |v| ssn(v));
        registry.register("plausible_id_number", |v| plausible_id_number(v));
        registry.register("high_entropy_token", |v| high_entropy_token(v));
        registry.register("dms_coordinate", |v| dms_coordinate(v));
        registry
    }

    /// Registers a verification function under `name`, replacing any
    /// previous function with the same name.
    pub fn register<F>(&mut self, name: &str, func: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.functions.insert(name.to_string(), Arc::new(func));
    }

    /// Looks up a function by name.
    pub fn get(&self, name: &str) -> Option<VerifyFn> {
        self.functions.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

/// Runs a verification function, isolating panics.
///
/// A function that panics is treated as a verification failure for that
/// match only; the fault is logged and the scan of other patterns continues.
pub fn run_verification(name: &str, func: &VerifyFn, value: &str) -> bool {
    match catch_unwind(AssertUnwindSafe(|| func(value))) {
        Ok(verified) => verified,
        Err(_) => {
            warn!(
                "Verification function '{}' panicked on a {}-byte candidate; treating as failed",
                name,
                value.len()
            );
            false
        }
    }
}

/// Verifies an IBAN using the ISO 13616 mod-97 check.
///
/// The first four characters are moved to the end, letters are replaced with
/// numbers (A=10 .. Z=35), and the resulting digit string must be ≡ 1 mod 97.
///
/// # Arguments
///
/// * `value` - IBAN string, spaces allowed (e.g., "GB82 WEST 1234 5698 7654 32").
pub fn iban_mod97(value: &str) -> bool {
    let iban: String = value
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| c.to_ascii_uppercase())
        .collect();
    if iban.len() < 5 {
        return false;
    }

    let rearranged = format!("{}{}", &iban[4..], &iban[..4]);

    // Incremental mod-97 so arbitrarily long IBANs never overflow.
    let mut remainder: u64 = 0;
    for c in rearranged.chars() {
        if let Some(d) = c.to_digit(10) {
            remainder = (remainder * 10 + u64::from(d)) % 97;
        } else if c.is_ascii_uppercase() {
            let n = u64::from(c as u8 - b'A') + 10;
            remainder = (remainder * 100 + n) % 97;
        } else {
            return false;
        }
    }
    remainder == 1
}

/// Verifies the digit subsequence of `value` with the Luhn (mod-10) checksum.
///
/// Non-digit characters (separators, spaces) are ignored. An input with no
/// digits at all fails.
pub fn luhn(value: &str) -> bool {
    let mut sum = 0u32;
    let mut alternate = false;
    let mut digit_count = 0usize;

    for c in value.chars().rev() {
        let Some(mut digit) = c.to_digit(10) else {
            continue;
        };
        digit_count += 1;
        if alternate {
            digit *= 2;
            if digit > 9 {
                digit -= 9;
            }
        }
        sum += digit;
        alternate = !alternate;
    }

    digit_count > 0 && sum % 10 == 0
}

static CARD_PREFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    let mut set = HashSet::new();
    // Visa, Mastercard, Amex, Discover.
    set.extend(["4", "51", "52", "53", "54", "55", "34", "37", "6011", "65"]);
    set
});

/// Composite card-number check: known issuer prefix plus Luhn checksum.
///
/// The prefix allowlist covers the major issuers (Visa 4, Mastercard 51-55
/// and 2221-2720, Amex 34/37, Discover 6011/644-649/65). Length must be in
/// the 13-19 digit range shared by those networks.
pub fn card_number(value: &str) -> bool {
    let digits: String = value.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.len() < 13 || digits.len() > 19 {
        return false;
    }

    let known_prefix = CARD_PREFIXES
        .iter()
        .any(|prefix| digits.starts_with(prefix))
        || digits
            .get(..4)
            .and_then(|p| p.parse::<u32>().ok())
            .is_some_and(|p| (2221..=2720).contains(&p) || (6440..=6499).contains(&p));

    known_prefix && luhn(&digits)
}

/// Validates a US SSN against Social Security Administration issuing rules.
///
/// Expected shape "AAA-GG-SSSS". Area 000, 666 and 900-999, group 00 and
/// serial 0000 were never issued and are rejected.
pub fn ssn(value: &str) -> bool {
    let mut parts = value.split('-');
    let (Some(area), Some(group), Some(serial), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };

    if area.len() != 3 || group.len() != 2 || serial.len() != 4 {
        return false;
    }

    let (Ok(area_num), Ok(group_num), Ok(serial_num)) =
        (area.parse::<u16>(), group.parse::<u8>(), serial.parse::<u16>())
    else {
        return false;
    };

    let invalid_area = area_num == 0 || area_num == 666 || area_num >= 900;
    !(invalid_area || group_num == 0 || serial_num == 0)
}

/// Structural plausibility check for opaque numeric identifiers.
///
/// Rejects digit runs that are almost certainly not identifiers:
/// timestamp-shaped values (10-digit Unix seconds or 13-digit milliseconds
/// in the 2001-2033 range), monotonic or single-digit repetitions, and
/// suspiciously round numbers where at least half the digits are trailing
/// zeros.
pub fn plausible_id_number(value: &str) -> bool {
    let digits: Vec<u8> = value
        .chars()
        .filter_map(|c| c.to_digit(10).map(|d| d as u8))
        .collect();
    if digits.is_empty() {
        return false;
    }

    if looks_like_timestamp(&digits) {
        return false;
    }

    if digits.len() >= 4 {
        let ascending = digits.windows(2).all(|w| w[1] == (w[0] + 1) % 10);
        let descending = digits.windows(2).all(|w| w[1] == (w[0] + 9) % 10);
        let repeated = digits.iter().all(|&d| d == digits[0]);
        if ascending || descending || repeated {
            return false;
        }
    }

    let trailing_zeros = digits.iter().rev().take_while(|&&d| d == 0).count();
    if digits.len() >= 4 && trailing_zeros * 2 >= digits.len() {
        return false;
    }

    true
}

fn looks_like_timestamp(digits: &[u8]) -> bool {
    let value: u64 = match digits.len() {
        10 | 13 => digits.iter().fold(0u64, |acc, &d| acc * 10 + u64::from(d)),
        _ => return false,
    };
    // Unix seconds / milliseconds covering roughly 2001-2033.
    match digits.len() {
        10 => (1_000_000_000..2_000_000_000).contains(&value),
        13 => (1_000_000_000_000..2_000_000_000_000).contains(&value),
        _ => false,
    }
}

const TOKEN_ALPHABET: &str =
    "ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-+/=.";

/// Verifies a candidate secret has high-entropy token characteristics.
///
/// Requires at least 20 characters, no whitespace, a base64url/hex-style
/// alphabet (dots allowed for JWTs), and character-level Shannon entropy of
/// at least 4.0 bits, which filters repetitive strings while catching both
/// base64 and hex encoded material.
pub fn high_entropy_token(value: &str) -> bool {
    if value.len() < 20 {
        return false;
    }
    if !value.chars().all(|c| TOKEN_ALPHABET.contains(c)) {
        return false;
    }
    shannon_entropy(value) >= 4.0
}

/// Character-level Shannon entropy of `value`, in bits per character.
pub fn shannon_entropy(value: &str) -> f64 {
    if value.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<char, usize> = HashMap::new();
    for c in value.chars() {
        *counts.entry(c).or_insert(0) += 1;
    }
    let length = value.chars().count() as f64;
    -counts
        .values()
        .map(|&count| {
            let p = count as f64 / length;
            p * p.log2()
        })
        .sum::<f64>()
}

static DMS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"^(\d{1,3})°\s*(\d{1,2})′\s*(\d{1,2}(?:\.\d+)?)″\s*([NSEWnsew])$"#)
        .expect("dms regex is valid")
});

/// Verifies a degrees-minutes-seconds coordinate such as `37°46′29.7″N`.
///
/// Minutes must be 0-59, seconds below 60, and degrees within 90 for
/// latitude (N/S) or 180 for longitude (E/W).
pub fn dms_coordinate(value: &str) -> bool {
    let Some(caps) = DMS_RE.captures(value.trim()) else {
        return false;
    };

    let degrees: u32 = caps[1].parse().unwrap_or(u32::MAX);
    let minutes: u32 = caps[2].parse().unwrap_or(u32::MAX);
    let seconds: f64 = caps[3].parse().unwrap_or(f64::MAX);
    let direction = caps[4].to_ascii_uppercase();

    if minutes > 59 || seconds >= 60.0 {
        return false;
    }
    match direction.as_str() {
        "N" | "S" => degrees <= 90,
        "E" | "W" => degrees <= 180,
        _ => false,
    }
}
