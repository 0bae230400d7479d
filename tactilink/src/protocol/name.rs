//! 8.3 filename normalization.
//!
//! The device stores files on a FAT volume and addresses them by their
//! short name: up to eight characters, an optional dot and up to three
//! extension characters, all uppercase. Names are normalized locally so that
//! `shift.MP3` and `SHIFT.mp3` address the same remote file, and names that
//! cannot be expressed in that form are rejected before anything is sent.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Maximum length of the base name.
pub const MAX_STEM_LEN: usize = 8;

/// Maximum length of the extension.
pub const MAX_EXT_LEN: usize = 3;

/// Punctuation allowed in FAT short names besides `A-Z` and `0-9`.
const SPECIAL_CHARS: &[u8] = b"!#$%&'()-@^_`{}~";

/// A validated, uppercase 8.3 filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileName(String);

impl FileName {
    /// Normalize `raw` into an 8.3 name.
    pub fn parse(raw: &str) -> Result<Self> {
        let reject = |reason| Error::InvalidName {
            name: raw.to_string(),
            reason,
        };

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(reject("empty name"));
        }
        if !trimmed.is_ascii() {
            return Err(reject("non-ASCII characters"));
        }

        let upper = trimmed.to_ascii_uppercase();
        let (stem, ext) = match upper.split_once('.') {
            Some((_, ext)) if ext.contains('.') => return Err(reject("more than one dot")),
            Some((_, "")) => return Err(reject("empty extension")),
            Some((stem, ext)) => (stem, Some(ext)),
            None => (upper.as_str(), None),
        };

        if stem.is_empty() {
            return Err(reject("empty base name"));
        }
        if stem.len() > MAX_STEM_LEN {
            return Err(reject("base name longer than 8 characters"));
        }
        if ext.is_some_and(|e| e.len() > MAX_EXT_LEN) {
            return Err(reject("extension longer than 3 characters"));
        }
        let valid = |s: &str| s.bytes().all(is_short_name_char);
        if !valid(stem) || !ext.is_none_or(valid) {
            return Err(reject("character not allowed in 8.3 names"));
        }

        Ok(Self(upper))
    }

    /// The normalized name as transmitted.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Base name without the extension.
    pub fn stem(&self) -> &str {
        self.0
            .split_once('.')
            .map_or(self.0.as_str(), |(stem, _)| stem)
    }

    /// Extension without the dot, if any.
    pub fn extension(&self) -> Option<&str> {
        self.0.split_once('.').map(|(_, ext)| ext)
    }
}

fn is_short_name_char(b: u8) -> bool {
    b.is_ascii_uppercase() || b.is_ascii_digit() || SPECIAL_CHARS.contains(&b)
}

impl FromStr for FileName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for FileName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for FileName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0)
    }
}
