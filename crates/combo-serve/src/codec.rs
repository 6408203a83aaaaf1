//! Radix-32 bitmask tokens.
//!
//! A token is the base-32 rendering (`0-9a-v`, case-insensitive) of an
//! integer whose set bits select database entries. Bit `b` (LSB = 0)
//! addresses index `len - 1 - b`, so writing the mask in binary padded to
//! `len` digits puts index 0 on the left. Decoding is arbitrary width.

use crate::database::{FileEntry, IndexDatabase};
use crate::error::DecodeError;

const RADIX_BITS: usize = 5;
const ALPHABET: &[u8; 32] = b"0123456789abcdefghijklmnopqrstuv";

/// Decoded bitmask, stored as little-endian 64-bit words.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bitmask {
    words: Vec<u64>,
}

impl Bitmask {
    /// Parse a radix-32 token.
    ///
    /// # Errors
    ///
    /// Returns `DecodeError::MalformedToken` for an empty token or any
    /// character outside the alphabet.
    pub fn from_token(token: &str) -> Result<Self, DecodeError> {
        if token.is_empty() {
            return Err(DecodeError::MalformedToken(token.to_string()));
        }

        let mut mask = Self::default();
        for (digit_pos, ch) in token.bytes().rev().enumerate() {
            let value = digit_value(ch)
                .ok_or_else(|| DecodeError::MalformedToken(token.to_string()))?;
            for i in 0..RADIX_BITS {
                if value & (1 << i) != 0 {
                    mask.set(digit_pos * RADIX_BITS + i);
                }
            }
        }
        Ok(mask)
    }

    /// Build a mask selecting `indices` out of an index space of `len`.
    ///
    /// Indices at or beyond `len` are ignored.
    #[must_use]
    pub fn from_indices(len: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut mask = Self::default();
        for index in indices.into_iter().filter(|&i| i < len) {
            mask.set(len - 1 - index);
        }
        mask
    }

    /// Render as the shortest radix-32 token (`"0"` for an empty mask).
    #[must_use]
    pub fn to_token(&self) -> String {
        let Some(highest) = self.highest_bit() else {
            return "0".to_string();
        };

        let digits = highest / RADIX_BITS + 1;
        (0..digits)
            .rev()
            .map(|digit_pos| {
                let value = (0..RADIX_BITS)
                    .filter(|i| self.is_set(digit_pos * RADIX_BITS + i))
                    .fold(0usize, |acc, i| acc | (1 << i));
                char::from(ALPHABET[value])
            })
            .collect()
    }

    /// Whether bit `bit` is set.
    #[must_use]
    pub fn is_set(&self, bit: usize) -> bool {
        self.words
            .get(bit / 64)
            .is_some_and(|word| word & (1 << (bit % 64)) != 0)
    }

    /// Position of the highest set bit, `None` when no bit is set.
    #[must_use]
    pub fn highest_bit(&self) -> Option<usize> {
        self.words
            .iter()
            .enumerate()
            .rev()
            .find(|(_, word)| **word != 0)
            .map(|(i, word)| i * 64 + 63 - word.leading_zeros() as usize)
    }

    /// Set bit positions, highest first.
    pub fn set_bits_descending(&self) -> impl Iterator<Item = usize> + '_ {
        let top = self.highest_bit().map_or(0, |b| b + 1);
        (0..top).rev().filter(|&b| self.is_set(b))
    }

    fn set(&mut self, bit: usize) {
        let word = bit / 64;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1 << (bit % 64);
    }
}

fn digit_value(ch: u8) -> Option<u8> {
    match ch {
        b'0'..=b'9' => Some(ch - b'0'),
        b'a'..=b'v' => Some(ch - b'a' + 10),
        b'A'..=b'V' => Some(ch - b'A' + 10),
        _ => None,
    }
}

/// Entries selected by a token, ascending by index. Never empty.
pub type DecodedSelection = Vec<FileEntry>;

/// Decode `token` against `db` into the selected entries, ascending by index.
///
/// # Errors
///
/// - `MalformedToken` for characters outside the radix-32 alphabet
/// - `EmptySelection` when no bit is set
/// - `IndexOutOfRange` when a bit addresses beyond the index space
/// - `UnknownIndex` when a selected index has no entry
pub fn decode(db: &IndexDatabase, token: &str) -> Result<DecodedSelection, DecodeError> {
    let mask = Bitmask::from_token(token)?;
    let highest = mask.highest_bit().ok_or(DecodeError::EmptySelection)?;

    let len = db.len();
    if highest >= len {
        return Err(DecodeError::IndexOutOfRange { bit: highest, len });
    }

    mask.set_bits_descending()
        .map(|bit| {
            let index = len - 1 - bit;
            db.get(index)
                .map(|path| FileEntry {
                    index,
                    path: path.to_string(),
                })
                .ok_or(DecodeError::UnknownIndex(index))
        })
        .collect()
}
