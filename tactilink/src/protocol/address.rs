//! Bank and key addressing.
//!
//! A remote directory is addressed by a [`Bank`] (recorded human audio or
//! synthesized audio) and a [`Key`] (one button or category). Both are closed
//! sets; free-form input is validated before any wire traffic.

use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Audio source bank.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    /// Human voice recordings (`/AUDIO/HUMAN`).
    Human,
    /// Synthesized speech (`/AUDIO/GENERA~1`).
    Generated,
}

impl Bank {
    /// All banks.
    pub const ALL: [Self; 2] = [Self::Human, Self::Generated];

    /// Directory name sent on the wire.
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::Human => "HUMAN",
            // FAT short name of GENERATED
            Self::Generated => "GENERA~1",
        }
    }

    /// Human-readable name.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Human => "human",
            Self::Generated => "generated",
        }
    }
}

impl FromStr for Bank {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "HUMAN" => Ok(Self::Human),
            "GENERATED" | "GENERA~1" => Ok(Self::Generated),
            _ => Err(Error::InvalidBank(s.to_string())),
        }
    }
}

impl fmt::Display for Bank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single uppercase ASCII letter key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Letter(u8);

impl Letter {
    /// Create a letter key; `c` may be either case.
    pub fn new(c: char) -> Option<Self> {
        if c.is_ascii_alphabetic() {
            #[allow(clippy::cast_possible_truncation)]
            Some(Self(c.to_ascii_uppercase() as u8))
        } else {
            None
        }
    }

    /// The uppercase letter.
    pub fn as_char(self) -> char {
        char::from(self.0)
    }
}

/// Button or category key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Letter button `A`..`Z`.
    Letter(Letter),
    /// Shift button.
    Shift,
    /// "Yes" button.
    Yes,
    /// "No" button.
    No,
    /// "Water" button.
    Water,
    /// Space bar.
    Space,
    /// Period button (cap shows `.`).
    Period,
}

impl Key {
    const NAMED: [(&'static str, Self); 6] = [
        ("SHIFT", Self::Shift),
        ("YES", Self::Yes),
        ("NO", Self::No),
        ("WATER", Self::Water),
        ("SPACE", Self::Space),
        ("PERIOD", Self::Period),
    ];

    /// Every key, letters first.
    pub fn all() -> impl Iterator<Item = Self> {
        ('A'..='Z')
            .filter_map(Letter::new)
            .map(Self::Letter)
            .chain(Self::NAMED.iter().map(|(_, key)| *key))
    }

    /// Directory name sent on the wire.
    pub fn wire_name(self) -> String {
        match self {
            Self::Letter(letter) => letter.as_char().to_string(),
            named => Self::NAMED
                .iter()
                .find(|(_, key)| *key == named)
                .map(|(name, _)| (*name).to_string())
                .unwrap_or_default(),
        }
    }
}

impl FromStr for Key {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "." {
            return Ok(Self::Period);
        }

        let mut chars = trimmed.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Letter::new(c)
                .map(Self::Letter)
                .ok_or_else(|| Error::InvalidKey(s.to_string()));
        }

        let upper = trimmed.to_ascii_uppercase();
        Self::NAMED
            .iter()
            .find(|(name, _)| *name == upper)
            .map(|(_, key)| *key)
            .ok_or_else(|| Error::InvalidKey(s.to_string()))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire_name())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Bank {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

#[cfg(feature = "serde")]
impl serde::Serialize for Key {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.wire_name())
    }
}
