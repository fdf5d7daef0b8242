// =============================================================================
// Wave Labels — the eight-phase Elliott ring
// =============================================================================
//
//   1 → 2 → 3 → 4 → 5 → A → B → C → 1 → …
//
// In an uptrend-anchored count 1, 3, 5 and B move up; 2, 4, A and C move
// down. A downtrend-anchored count mirrors every direction. The sequence is a
// ring: the wave after C is a fresh 1, and distances wrap around.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::types::Direction;

/// Number of phases in one full cycle.
pub const CYCLE_LEN: usize = 8;

/// Canonical Elliott wave label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WaveLabel {
    #[serde(rename = "1")]
    One,
    #[serde(rename = "2")]
    Two,
    #[serde(rename = "3")]
    Three,
    #[serde(rename = "4")]
    Four,
    #[serde(rename = "5")]
    Five,
    A,
    B,
    C,
}

/// Structural role of a wave relative to the primary trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WaveKind {
    /// Moves with the larger trend (1, 3, 5).
    Impulsive,
    /// Moves against the larger trend (2, 4, A, C).
    Corrective,
    /// The B bounce: a with-trend move inside a correction.
    CounterTrend,
}

const RING: [WaveLabel; CYCLE_LEN] = [
    WaveLabel::One,
    WaveLabel::Two,
    WaveLabel::Three,
    WaveLabel::Four,
    WaveLabel::Five,
    WaveLabel::A,
    WaveLabel::B,
    WaveLabel::C,
];

impl WaveLabel {
    /// Zero-based position on the ring (1 => 0, C => 7).
    pub fn position(self) -> usize {
        match self {
            Self::One => 0,
            Self::Two => 1,
            Self::Three => 2,
            Self::Four => 3,
            Self::Five => 4,
            Self::A => 5,
            Self::B => 6,
            Self::C => 7,
        }
    }

    /// Label at ring position `pos` (wraps).
    pub fn from_position(pos: usize) -> Self {
        RING[pos % CYCLE_LEN]
    }

    /// Successor on the ring. C is followed by a new 1.
    pub fn next(self) -> Self {
        Self::from_position(self.position() + 1)
    }

    /// Signed shortest ring distance from `self` to `other`, in [-4, 3].
    pub fn ring_delta(self, other: Self) -> i32 {
        let raw = (other.position() as i32 - self.position() as i32).rem_euclid(CYCLE_LEN as i32);
        if raw >= 4 {
            raw - CYCLE_LEN as i32
        } else {
            raw
        }
    }

    /// Label `steps` positions away on the ring (negative steps go back).
    pub fn offset(self, steps: i32) -> Self {
        let pos = (self.position() as i32 + steps).rem_euclid(CYCLE_LEN as i32);
        Self::from_position(pos as usize)
    }

    pub fn kind(self) -> WaveKind {
        match self {
            Self::One | Self::Three | Self::Five => WaveKind::Impulsive,
            Self::Two | Self::Four | Self::A | Self::C => WaveKind::Corrective,
            Self::B => WaveKind::CounterTrend,
        }
    }

    /// Whether this label moves with the primary trend (1, 3, 5, B).
    pub fn is_with_trend(self) -> bool {
        self.position() % 2 == 0
    }

    /// Inside the five-wave impulse (1..=5) rather than the ABC correction.
    pub fn in_impulse(self) -> bool {
        self.position() < 5
    }

    /// Expected price direction for this label under `primary`.
    pub fn canonical_direction(self, primary: Direction) -> Direction {
        if self.is_with_trend() {
            primary
        } else {
            primary.opposite()
        }
    }

    /// Direction a position should lean while this wave unfolds: with the
    /// primary trend through the impulse, against it through A-B-C.
    pub fn bias(self, primary: Direction) -> Direction {
        if self.in_impulse() {
            primary
        } else {
            primary.opposite()
        }
    }
}

impl std::fmt::Display for WaveLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::One => "1",
            Self::Two => "2",
            Self::Three => "3",
            Self::Four => "4",
            Self::Five => "5",
            Self::A => "A",
            Self::B => "B",
            Self::C => "C",
        };
        write!(f, "{s}")
    }
}
