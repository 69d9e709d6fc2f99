//! Sortable revision ids.
//!
//! A revision number is written in base 62 over `0-9A-Za-z` (ASCII order)
//! and prefixed with one character encoding the digit count, so byte-wise
//! string order equals numeric order: `0 → "A0"`, `61 → "Az"`, `62 → "B10"`.

use thiserror::Error;

const ALPHABET: &[u8; 62] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";
const BASE: u64 = 62;
/// Prefix of a one-digit id is `ALPHABET[1 + PREFIX_OFFSET]`, i.e. `'A'`.
const PREFIX_OFFSET: usize = 9;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RevisionIdError {
    #[error("empty revision id")]
    Empty,
    #[error("revision id {0:?} has a bad length prefix")]
    BadPrefix(String),
    #[error("revision id {0:?} contains a character outside the alphabet")]
    BadDigit(String),
    #[error("revision id {0:?} does not fit in 64 bits")]
    Overflow(String),
    #[error("revision id {0:?} is not in canonical form")]
    NonCanonical(String),
}

fn digit_value(c: u8) -> Option<u64> {
    match c {
        b'0'..=b'9' => Some((c - b'0') as u64),
        b'A'..=b'Z' => Some((c - b'A') as u64 + 10),
        b'a'..=b'z' => Some((c - b'a') as u64 + 36),
        _ => None,
    }
}

pub fn revision_to_id(revision: u64) -> String {
    let mut digits = Vec::with_capacity(12);
    let mut rest = revision;
    loop {
        digits.push(ALPHABET[(rest % BASE) as usize]);
        rest /= BASE;
        if rest == 0 {
            break;
        }
    }
    digits.push(ALPHABET[digits.len() + PREFIX_OFFSET]);
    digits.iter().rev().map(|&b| b as char).collect()
}

pub fn revision_from_id(id: &str) -> Result<u64, RevisionIdError> {
    let bytes = id.as_bytes();
    let Some((&prefix, digits)) = bytes.split_first() else {
        return Err(RevisionIdError::Empty);
    };
    if digits.is_empty() || ALPHABET.get(digits.len() + PREFIX_OFFSET) != Some(&prefix) {
        return Err(RevisionIdError::BadPrefix(id.to_owned()));
    }
    let mut revision: u64 = 0;
    for &c in digits {
        let value = digit_value(c).ok_or_else(|| RevisionIdError::BadDigit(id.to_owned()))?;
        revision = revision
            .checked_mul(BASE)
            .and_then(|r| r.checked_add(value))
            .ok_or_else(|| RevisionIdError::Overflow(id.to_owned()))?;
    }
    if digits.len() > 1 && digits[0] == b'0' {
        return Err(RevisionIdError::NonCanonical(id.to_owned()));
    }
    Ok(revision)
}
