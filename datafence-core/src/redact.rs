//! redact.rs - Rendering of mask/hash/tokenize/fake output and token maps.
//!
//! Output is built left-to-right over matches sorted by start, alternating
//! "copy original span" / "copy replacement", so earlier length-changing
//! replacements can never shift later offsets. Tokenization is the only
//! reversible strategy: it accumulates a [`TokenMap`] that is handed to the
//! caller and never persisted by the engine.
//!
//! License: MIT OR APACHE 2.0

use std::collections::BTreeMap;
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::engine::{Engine, ScanRequest};
use crate::errors::DetectError;
use crate::fake::{DefaultFakeValues, FakeValues};
use crate::models::{Match, RedactionResult, RedactionStrategy};

/// Prefix used inside generated tokens: `[TOKEN:<ns>:<category>:<seq>]`.
pub const DEFAULT_TOKEN_PREFIX: &str = "TOKEN";

/// Mask character used when a pattern declares no mask template.
pub const DEFAULT_MASK_CHAR: char = '*';

/// Number of hex digits kept from the digest in `[HASH:...]` replacements.
const HASH_DIGEST_LEN: usize = 16;

/// Caller-owned mapping from opaque tokens back to original plaintext.
///
/// Scoped to one tokenize call. Ownership passes entirely to the caller,
/// who must persist and protect it separately; the engine keeps nothing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMap {
    tokens: BTreeMap<String, String>,
    /// SHA-256 digest of the sorted entries, for integrity checks in
    /// storage.
    #[serde(default)]
    pub digest: Option<String>,
}

impl TokenMap {
    pub fn insert(&mut self, token: String, original: String) {
        self.tokens.insert(token, original);
    }

    pub fn get(&self, token: &str) -> Option<&str> {
        self.tokens.get(token).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tokens.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Recomputes and stores the digest over the sorted entries.
    pub fn seal(&mut self) {
        let mut hasher = Sha256::new();
        for (token, original) in &self.tokens {
            hasher.update(token.as_bytes());
            hasher.update(b"=");
            hasher.update(original.as_bytes());
            hasher.update(b";");
        }
        self.digest = Some(hex::encode(hasher.finalize()));
    }
}

/// Renders redacted or tokenized output for matches found by an [`Engine`].
pub struct RedactionEngine<'a> {
    engine: &'a Engine,
    default_mask_char: char,
    token_prefix: String,
    fake: Arc<dyn FakeValues>,
}

impl<'a> RedactionEngine<'a> {
    pub fn new(engine: &'a Engine) -> Self {
        Self {
            engine,
            default_mask_char: DEFAULT_MASK_CHAR,
            token_prefix: DEFAULT_TOKEN_PREFIX.to_string(),
            fake: Arc::new(DefaultFakeValues::new()),
        }
    }

    pub fn with_mask_char(mut self, mask_char: char) -> Self {
        self.default_mask_char = mask_char;
        self
    }

    pub fn with_token_prefix(mut self, prefix: &str) -> Self {
        self.token_prefix = prefix.to_string();
        self
    }

    /// Swaps in a custom generator for the `fake` strategy.
    pub fn with_fake_values(mut self, fake: Arc<dyn FakeValues>) -> Self {
        self.fake = fake;
        self
    }

    /// Finds matches and rewrites them with `strategy`.
    ///
    /// For [`RedactionStrategy::Tokenize`] use [`RedactionEngine::tokenize`]
    /// instead; calling `redact` with it still works but discards the token
    /// map, making the result irreversible.
    pub fn redact(
        &self,
        text: &str,
        request: &ScanRequest,
        strategy: RedactionStrategy,
    ) -> RedactionResult {
        let (result, _) = self.apply(text, request, strategy);
        result
    }

    /// Tokenizes matches and returns the redaction result together with the
    /// token map needed to reverse it.
    pub fn tokenize(&self, text: &str, request: &ScanRequest) -> (RedactionResult, TokenMap) {
        self.apply(text, request, RedactionStrategy::Tokenize)
    }

    /// Exact substring-inverse of tokenize, using this engine's token
    /// prefix. Fails with `MissingToken` if the text contains a token
    /// absent from `map`.
    pub fn detokenize(&self, text: &str, map: &TokenMap) -> Result<String, DetectError> {
        detokenize_with_prefix(text, map, &self.token_prefix)
    }

    fn apply(
        &self,
        text: &str,
        request: &ScanRequest,
        strategy: RedactionStrategy,
    ) -> (RedactionResult, TokenMap) {
        let found = self.engine.find(text, request);
        let mut token_map = TokenMap::default();

        if !found.has_matches() {
            let result = RedactionResult {
                original_text: text.to_string(),
                redacted_text: text.to_string(),
                strategy,
                matches: Vec::new(),
                redaction_count: 0,
            };
            return (result, token_map);
        }

        let mut output = String::with_capacity(text.len());
        let mut last_end = 0usize;
        let mut sequence = 0usize;
        let mut redaction_count = 0usize;

        for m in &found.matches {
            // Overlapping matches can only appear in allow_overlaps mode;
            // the first one rewritten claims the region.
            if m.start < last_end {
                continue;
            }
            let original = &text[m.start..m.end];
            let replacement =
                self.replacement_for(original, m, strategy, &mut token_map, &mut sequence);
            output.push_str(&text[last_end..m.start]);
            output.push_str(&replacement);
            last_end = m.end;
            redaction_count += 1;
        }
        output.push_str(&text[last_end..]);

        if strategy == RedactionStrategy::Tokenize {
            token_map.seal();
        }
        debug!(
            "Applied {:?} strategy to {} of {} matches",
            strategy,
            redaction_count,
            found.match_count()
        );

        let result = RedactionResult {
            original_text: text.to_string(),
            redacted_text: output,
            strategy,
            matches: found.matches,
            redaction_count,
        };
        (result, token_map)
    }

    fn replacement_for(
        &self,
        original: &str,
        m: &Match,
        strategy: RedactionStrategy,
        token_map: &mut TokenMap,
        sequence: &mut usize,
    ) -> String {
        match strategy {
            RedactionStrategy::Mask => self.mask_replacement(original, m),
            RedactionStrategy::Hash => {
                let mut hasher = Sha256::new();
                hasher.update(original.as_bytes());
                let digest = hex::encode(hasher.finalize());
                format!("[HASH:{}]", &digest[..HASH_DIGEST_LEN])
            }
            RedactionStrategy::Tokenize => {
                let token = format!(
                    "[{}:{}:{}:{}]",
                    self.token_prefix, m.namespace, m.category, sequence
                );
                *sequence += 1;
                token_map.insert(token.clone(), original.to_string());
                token
            }
            RedactionStrategy::Fake => self
                .fake
                .value_for(m.category, &m.ns_id)
                .unwrap_or_else(|| self.mask_replacement(original, m)),
        }
    }

    fn mask_replacement(&self, original: &str, m: &Match) -> String {
        match &m.mask {
            Some(mask) => mask.clone(),
            None => self
                .default_mask_char
                .to_string()
                .repeat(original.chars().count()),
        }
    }
}

static DEFAULT_TOKEN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&token_pattern(DEFAULT_TOKEN_PREFIX)).expect("default token regex is valid")
});

fn token_pattern(prefix: &str) -> String {
    format!(r"\[{}:[^\[\]]*\]", regex::escape(prefix))
}

/// Reverses a tokenized text using the default token prefix.
///
/// Every token-shaped substring must have a map entry; an unmapped token
/// raises [`DetectError::MissingToken`] rather than being silently ignored.
pub fn detokenize(text: &str, map: &TokenMap) -> Result<String, DetectError> {
    detokenize_re(text, map, &DEFAULT_TOKEN_RE)
}

/// Reverses a tokenized text for a custom token prefix.
pub fn detokenize_with_prefix(
    text: &str,
    map: &TokenMap,
    prefix: &str,
) -> Result<String, DetectError> {
    if prefix == DEFAULT_TOKEN_PREFIX {
        return detokenize_re(text, map, &DEFAULT_TOKEN_RE);
    }
    let re = Regex::new(&token_pattern(prefix)).map_err(|e| DetectError::MalformedSource {
        source_id: "<token prefix>".to_string(),
        message: e.to_string(),
    })?;
    detokenize_re(text, map, &re)
}

fn detokenize_re(text: &str, map: &TokenMap, re: &Regex) -> Result<String, DetectError> {
    let mut output = String::with_capacity(text.len());
    let mut last_end = 0usize;
    for found in re.find_iter(text) {
        let token = found.as_str();
        let original = map
            .get(token)
            .ok_or_else(|| DetectError::MissingToken(token.to_string()))?;
        output.push_str(&text[last_end..found.start()]);
        output.push_str(original);
        last_end = found.end();
    }
    output.push_str(&text[last_end..]);
    Ok(output)
}
