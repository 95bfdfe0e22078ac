//! fake.rs - Category-shaped synthetic replacement values.
//!
//! The `fake` redaction strategy swaps each match for a synthetic value of
//! the same category, preserving the statistical shape of the text for
//! downstream embedding or indexing use while destroying the original
//! value. Generators are pluggable; [`DefaultFakeValues`] covers the builtin
//! categories and produces values that pass the corresponding builtin
//! verification functions, so faked output still scans like the real thing.
//!
//! License: MIT OR APACHE 2.0

use rand::Rng;

use crate::models::Category;

/// Pluggable source of synthetic replacement values.
///
/// Returning `None` signals the generator cannot shape a value for this
/// category; the redaction engine then falls back to masking.
pub trait FakeValues: Send + Sync {
    /// Produces a replacement for a match of `category`. `ns_id` is the
    /// matched pattern's full key, for generators that specialize per
    /// pattern.
    fn value_for(&self, category: Category, ns_id: &str) -> Option<String>;
}

/// Builtin generator backed by the thread-local RNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultFakeValues;

const FIRST_NAMES: &[&str] = &["Alex", "Jordan", "Morgan", "Casey", "Riley", "Sam", "Dana"];
const LAST_NAMES: &[&str] = &["Kim", "Garcia", "Okafor", "Novak", "Silva", "Haines", "Patel"];
const STREETS: &[&str] = &["Maple Ave", "Oak St", "2nd St", "Cedar Ln", "Park Rd", "Elm Dr"];
const MAIL_DOMAINS: &[&str] = &["example.com", "example.org", "mail.test"];

impl DefaultFakeValues {
    pub fn new() -> Self {
        Self
    }
}

impl FakeValues for DefaultFakeValues {
    fn value_for(&self, category: Category, _ns_id: &str) -> Option<String> {
        let mut rng = rand::rng();
        let value = match category {
            Category::Phone => format!(
                "555-{:03}-{:04}",
                rng.random_range(200..1000),
                rng.random_range(0..10000)
            ),
            Category::Ssn => {
                // Stay inside issued ranges so the value verifies.
                let mut area = rng.random_range(100..900);
                if area == 666 {
                    area = 667;
                }
                format!(
                    "{:03}-{:02}-{:04}",
                    area,
                    rng.random_range(10..100),
                    rng.random_range(1000..10000)
                )
            }
            Category::Rrn => format!(
                "{:02}{:02}{:02}-{}{:06}",
                rng.random_range(50..100),
                rng.random_range(1..13),
                rng.random_range(1..29),
                rng.random_range(1..5),
                rng.random_range(0..1000000)
            ),
            Category::Email => {
                let first = pick(&mut rng, FIRST_NAMES).to_lowercase();
                let last = pick(&mut rng, LAST_NAMES).to_lowercase();
                let domain = pick(&mut rng, MAIL_DOMAINS);
                format!("{}.{}@{}", first, last, domain)
            }
            Category::Bank => (0..rng.random_range(10..13))
                .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
                .collect(),
            Category::Passport => format!("P{:08}", rng.random_range(10_000_000..100_000_000u32)),
            Category::Address => format!(
                "{} {}",
                rng.random_range(10..9999),
                pick(&mut rng, STREETS)
            ),
            Category::CreditCard => fake_card_number(&mut rng),
            Category::Ip => format!(
                "{}.{}.{}.{}",
                rng.random_range(1..224u32),
                rng.random_range(0..256u32),
                rng.random_range(0..256u32),
                rng.random_range(1..255u32)
            ),
            Category::Name => format!(
                "{} {}",
                pick(&mut rng, FIRST_NAMES),
                pick(&mut rng, LAST_NAMES)
            ),
            Category::Iban => fake_iban(&mut rng),
            Category::Location => format!(
                "{}°{}′{:.1}″{}",
                rng.random_range(0..90),
                rng.random_range(0..60),
                rng.random_range(0.0..60.0f64).min(59.9),
                ["N", "S", "E", "W"][rng.random_range(0..4)]
            ),
            Category::Token => {
                const ALPHABET: &[u8] =
                    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";
                let body: String = (0..28)
                    .map(|_| char::from(ALPHABET[rng.random_range(0..ALPHABET.len())]))
                    .collect();
                format!("tok_{}", body)
            }
            Category::Other => return None,
        };
        Some(value)
    }
}

fn pick<'a, R: Rng>(rng: &mut R, values: &'a [&'a str]) -> &'a str {
    values[rng.random_range(0..values.len())]
}

/// A Visa-shaped 16-digit number with a correct Luhn check digit.
fn fake_card_number<R: Rng>(rng: &mut R) -> String {
    let mut digits: Vec<u8> = Vec::with_capacity(16);
    digits.push(4);
    for _ in 0..14 {
        digits.push(rng.random_range(0..10u8));
    }
    digits.push(luhn_check_digit(&digits));
    digits.iter().map(|d| char::from(b'0' + d)).collect()
}

fn luhn_check_digit(payload: &[u8]) -> u8 {
    let mut sum = 0u32;
    for (i, &digit) in payload.iter().rev().enumerate() {
        let mut d = u32::from(digit);
        // With the check digit appended, these positions are the doubled
        // ones.
        if i % 2 == 0 {
            d *= 2;
            if d > 9 {
                d -= 9;
            }
        }
        sum += d;
    }
    ((10 - sum % 10) % 10) as u8
}

/// A GB-shaped IBAN with correct mod-97 check digits.
fn fake_iban<R: Rng>(rng: &mut R) -> String {
    let bank = "FAKE";
    let sort_code: String = (0..6)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect();
    let account: String = (0..8)
        .map(|_| char::from(b'0' + rng.random_range(0..10u8)))
        .collect();
    let bban = format!("{}{}{}", bank, sort_code, account);
    let remainder = mod97(&format!("{}GB00", bban));
    let check = 98 - remainder;
    format!("GB{:02}{}", check, bban)
}

fn mod97(value: &str) -> u64 {
    let mut remainder = 0u64;
    for c in value.chars() {
        if let Some(d) = c.to_digit(10) {
            remainder = (remainder * 10 + u64::from(d)) % 97;
        } else {
            let n = u64::from(c.to_ascii_uppercase() as u8 - b'A') + 10;
            remainder = (remainder * 100 + n) % 97;
        }
    }
    remainder
}
