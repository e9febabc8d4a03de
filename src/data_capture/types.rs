//! Common data types used across the data_capture subsystem.

use std::fmt;

use chrono::{DateTime, Utc};

/// One of the two programs a relay session connects.
///
/// A frame's direction is the side its bytes are travelling *toward*.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The program the relay connects out to.
    L,
    /// The program the relay spawns and which connects back.
    R,
}

impl Side {
    /// Tag byte used in capture records.
    pub fn tag(self) -> u8 {
        match self {
            Side::L => b'L',
            Side::R => b'R',
        }
    }

    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'L' => Some(Side::L),
            b'R' => Some(Side::R),
            _ => None,
        }
    }

    pub fn opposite(self) -> Self {
        match self {
            Side::L => Side::R,
            Side::R => Side::L,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Side::L => "L",
            Side::R => "R",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A chunk of transferred or replayed data.
///
/// Frames read off a live socket carry the time they were captured; frames
/// decoded from a capture file do not, since the file format has no room
/// for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    direction: Side,
    payload: Vec<u8>,
    captured_at: Option<DateTime<Utc>>,
}

impl Frame {
    pub fn new(direction: Side, payload: Vec<u8>) -> Self {
        Self {
            direction,
            payload,
            captured_at: None,
        }
    }

    /// A frame stamped with the current time.
    pub fn captured(direction: Side, payload: Vec<u8>) -> Self {
        Self {
            direction,
            payload,
            captured_at: Some(Utc::now()),
        }
    }

    pub fn direction(&self) -> Side {
        self.direction
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn captured_at(&self) -> Option<DateTime<Utc>> {
        self.captured_at
    }

    pub fn into_payload(self) -> Vec<u8> {
        self.payload
    }
}
