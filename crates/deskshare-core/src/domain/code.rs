//! Session codes: short, human-shareable registry keys.
//!
//! # Why a restricted alphabet? (for beginners)
//!
//! Session codes are read aloud, typed on phones, and copied from screens.
//! Characters that look alike in common fonts (`0` and `O`, `1` and `I`)
//! cause failed joins, so they are never generated.  The remaining alphabet
//! has 32 symbols; six of them give just over a billion combinations, which
//! is plenty for sessions that live one hour.
//!
//! # Case handling
//!
//! Codes are case-insensitive.  [`SessionCode::parse`] trims and uppercases
//! its input, so `" ab2cde "` and `"AB2CDE"` name the same session.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::domain::error::SessionError;

/// Symbols a session code may contain.
pub const SAFE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Length of freshly generated codes.
pub const GENERATED_CODE_LEN: usize = 6;

/// Shortest code accepted by [`SessionCode::parse`].
pub const MIN_CODE_LEN: usize = 6;

/// Longest code accepted by [`SessionCode::parse`].
pub const MAX_CODE_LEN: usize = 8;

/// A validated, uppercase session code.
///
/// The inner string is private: every `SessionCode` in the program went
/// through [`SessionCode::parse`] or [`SessionCode::generate`], so holding
/// one is proof that the format is valid.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionCode(String);

impl SessionCode {
    /// Draws a new random code of [`GENERATED_CODE_LEN`] symbols.
    ///
    /// Uniqueness is the registry's job; this only guarantees the format.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..GENERATED_CODE_LEN)
            .map(|_| SAFE_ALPHABET[rng.gen_range(0..SAFE_ALPHABET.len())] as char)
            .collect();
        Self(code)
    }

    /// Normalises and validates a user-supplied code.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::InvalidCode`] when the trimmed input is not
    /// 6–8 characters long or contains a symbol outside [`SAFE_ALPHABET`].
    pub fn parse(raw: &str) -> Result<Self, SessionError> {
        let normalized = raw.trim().to_ascii_uppercase();
        let len_ok = (MIN_CODE_LEN..=MAX_CODE_LEN).contains(&normalized.len());
        let chars_ok = normalized.bytes().all(|b| SAFE_ALPHABET.contains(&b));
        if len_ok && chars_ok {
            Ok(Self(normalized))
        } else {
            Err(SessionError::InvalidCode(raw.to_string()))
        }
    }

    /// Returns the code as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SessionCode {
    type Err = SessionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for SessionCode {
    type Error = SessionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<SessionCode> for String {
    fn from(code: SessionCode) -> Self {
        code.0
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
