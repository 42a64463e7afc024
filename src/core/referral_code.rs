//! Referral code generation
//!
//! Codes look like `JC-7QK2Z`: a configurable prefix, a dash and a suffix drawn
//! uniformly from `0-9A-Z`.

use rand::Rng;

const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Produces candidate referral codes
///
/// Uniqueness is not checked here; the account store's conditional write
/// rejects a colliding candidate and the caller draws another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferralCodeGenerator {
    prefix: String,
    length: usize,
}

impl ReferralCodeGenerator {
    pub fn new(prefix: impl Into<String>, length: usize) -> Self {
        Self {
            prefix: prefix.into(),
            length: length.max(1),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Draw a fresh candidate code
    pub fn generate(&self) -> String {
        let mut rng = rand::thread_rng();
        let suffix: String = (0..self.length)
            .map(|_| ALPHABET[rng.gen_range(0..ALPHABET.len())] as char)
            .collect();
        format!("{}-{}", self.prefix, suffix)
    }
}

impl Default for ReferralCodeGenerator {
    fn default() -> Self {
        Self::new("JC", 5)
    }
}

/// Normalize a user-supplied code
///
/// Returns `None` for blank input. Codes are matched case-insensitively by
/// upper-casing, since generated codes never contain lower-case letters.
pub fn normalize_code(code: &str) -> Option<String> {
    let trimmed = code.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_ascii_uppercase())
    }
}
