// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Text payload encodings for channel views.
// A view holds raw bytes; these conventions decide where the text ends.

use serde::{Deserialize, Serialize};

const PREFIX_LEN: usize = std::mem::size_of::<u32>();

/// How text is laid out inside a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Encoding {
    /// UTF-8 bytes followed by a single 0 byte.
    Utf8Nul,
    /// UTF-16LE code units followed by a 0 code unit.
    #[default]
    Utf16Nul,
    /// Little-endian `u32` byte count, then that many UTF-8 bytes.
    LengthPrefixed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PayloadError {
    #[error("text contains an interior NUL at byte {0}")]
    InteriorNul(usize),
    #[error("text of {0} bytes does not fit a u32 length prefix")]
    TooLong(usize),
    #[error("no terminator within {0} bytes")]
    Unterminated(usize),
    #[error("length prefix {declared} exceeds the {available} bytes that follow it")]
    Truncated { declared: usize, available: usize },
    #[error("invalid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("invalid UTF-16 at code unit {0}")]
    Utf16(usize),
}

impl Encoding {
    /// Number of bytes `text` occupies once encoded.
    pub fn encoded_len(&self, text: &str) -> usize {
        match self {
            Encoding::Utf8Nul => text.len() + 1,
            Encoding::Utf16Nul => (text.encode_utf16().count() + 1) * 2,
            Encoding::LengthPrefixed => PREFIX_LEN + text.len(),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u8>, PayloadError> {
        match self {
            Encoding::Utf8Nul => {
                if let Some(pos) = text.bytes().position(|b| b == 0) {
                    return Err(PayloadError::InteriorNul(pos));
                }
                let mut out = Vec::with_capacity(text.len() + 1);
                out.extend_from_slice(text.as_bytes());
                out.push(0);
                Ok(out)
            }
            Encoding::Utf16Nul => {
                if let Some(pos) = text.bytes().position(|b| b == 0) {
                    return Err(PayloadError::InteriorNul(pos));
                }
                let mut out = Vec::with_capacity(self.encoded_len(text));
                for unit in text.encode_utf16().chain(std::iter::once(0)) {
                    out.extend_from_slice(&unit.to_le_bytes());
                }
                Ok(out)
            }
            Encoding::LengthPrefixed => {
                let len = u32::try_from(text.len()).map_err(|_| PayloadError::TooLong(text.len()))?;
                let mut out = Vec::with_capacity(PREFIX_LEN + text.len());
                out.extend_from_slice(&len.to_le_bytes());
                out.extend_from_slice(text.as_bytes());
                Ok(out)
            }
        }
    }

    /// Decode the text at the start of `bytes`, ignoring whatever follows the
    /// terminator (or the prefixed length).
    pub fn decode(&self, bytes: &[u8]) -> Result<String, PayloadError> {
        match self {
            Encoding::Utf8Nul => {
                let end = bytes
                    .iter()
                    .position(|&b| b == 0)
                    .ok_or(PayloadError::Unterminated(bytes.len()))?;
                Ok(std::str::from_utf8(&bytes[..end])?.to_string())
            }
            Encoding::Utf16Nul => {
                let units: Vec<u16> = bytes
                    .chunks_exact(2)
                    .map(|c| u16::from_le_bytes([c[0], c[1]]))
                    .take_while(|&u| u != 0)
                    .collect();
                if units.len() * 2 + 2 > bytes.len() {
                    return Err(PayloadError::Unterminated(bytes.len()));
                }
                let mut text = String::with_capacity(units.len());
                for (i, ch) in char::decode_utf16(units.iter().copied()).enumerate() {
                    text.push(ch.map_err(|_| PayloadError::Utf16(i))?);
                }
                Ok(text)
            }
            Encoding::LengthPrefixed => {
                let (prefix, rest) = match bytes.split_first_chunk::<PREFIX_LEN>() {
                    Some(split) => split,
                    None => {
                        return Err(PayloadError::Truncated {
                            declared: PREFIX_LEN,
                            available: bytes.len(),
                        })
                    }
                };
                let declared = u32::from_le_bytes(*prefix) as usize;
                if declared > rest.len() {
                    return Err(PayloadError::Truncated {
                        declared,
                        available: rest.len(),
                    });
                }
                Ok(std::str::from_utf8(&rest[..declared])?.to_string())
            }
        }
    }
}
