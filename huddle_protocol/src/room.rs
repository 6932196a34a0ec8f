// Room codes: the short human-typed identifier for a hosted room.
//
// A code is 5 characters drawn uniformly (with replacement) from an alphabet
// that leaves out glyphs people confuse when reading a code aloud or off a
// screen: no `I`, `O`, `0`, or `1`. Codes are case-insensitive on input;
// `RoomCode::parse` uppercases before validating, so the stored form is always
// canonical.
//
// Generation takes any `rand::Rng` so tests can use a seeded generator. There
// is no uniqueness guarantee; a collision surfaces later as the transport
// refusing the derived address (see `huddle_session::SessionError`).

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 5;

/// Characters a room code may contain.
pub const ROOM_CODE_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Why a user-typed room code was refused.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RoomCodeError {
    #[error("room code must be {ROOM_CODE_LEN} characters, got {0}")]
    WrongLength(usize),
    #[error("room code contains invalid character {0:?}")]
    InvalidChar(char),
}

/// A validated, uppercase room code.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RoomCode(String);

impl RoomCode {
    /// Draw a fresh code from `rng`.
    pub fn generate<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let code = (0..ROOM_CODE_LEN)
            .map(|_| char::from(ROOM_CODE_ALPHABET[rng.gen_range(0..ROOM_CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Normalize and validate a user-supplied code.
    pub fn parse(input: &str) -> Result<Self, RoomCodeError> {
        let normalized = input.trim().to_ascii_uppercase();
        let len = normalized.chars().count();
        if len != ROOM_CODE_LEN {
            return Err(RoomCodeError::WrongLength(len));
        }
        if let Some(bad) = normalized
            .chars()
            .find(|c| !c.is_ascii() || !ROOM_CODE_ALPHABET.contains(&(*c as u8)))
        {
            return Err(RoomCodeError::InvalidChar(bad));
        }
        Ok(Self(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for RoomCode {
    type Error = RoomCodeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomCode> for String {
    fn from(code: RoomCode) -> Self {
        code.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
