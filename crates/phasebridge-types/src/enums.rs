//! Enumeration types shared across the PhaseBridge workspace.
//!
//! Approach directions, engine turn codes, signal light colours, the
//! standardized movement numbering, and the record types carried over the
//! messaging channel.

use core::fmt;
use core::str::FromStr;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

// ---------------------------------------------------------------------------
// Approach geometry
// ---------------------------------------------------------------------------

/// Cardinal direction of an intersection approach.
///
/// The direction names the side of the intersection traffic arrives from:
/// vehicles on the [`Direction::North`] approach travel southbound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Direction {
    /// Western approach.
    West,
    /// Southern approach.
    South,
    /// Eastern approach.
    East,
    /// Northern approach.
    North,
}

impl Direction {
    /// The direction on the far side of the intersection.
    pub const fn opposite(self) -> Self {
        match self {
            Self::West => Self::East,
            Self::South => Self::North,
            Self::East => Self::West,
            Self::North => Self::South,
        }
    }
}

/// Turn code assigned by the simulation engine to a connection.
///
/// Partial turns are engine-specific refinements; for movement lookup they
/// collapse onto the plain turn (see [`Turn::normalized`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum Turn {
    /// Straight through (`s`).
    Straight,
    /// Left turn (`l`).
    Left,
    /// Right turn (`r`).
    Right,
    /// U-turn (`t`).
    UTurn,
    /// Partial left turn (`L`).
    PartiallyLeft,
    /// Partial right turn (`R`).
    PartiallyRight,
}

impl Turn {
    /// Parse the single-character engine turn code.
    ///
    /// Returns `None` for characters the engine does not use for turns.
    pub const fn from_code(code: char) -> Option<Self> {
        match code {
            's' => Some(Self::Straight),
            'l' => Some(Self::Left),
            'r' => Some(Self::Right),
            't' => Some(Self::UTurn),
            'L' => Some(Self::PartiallyLeft),
            'R' => Some(Self::PartiallyRight),
            _ => None,
        }
    }

    /// The turn used for movement lookup, ignoring the partial variants.
    pub const fn normalized(self) -> Self {
        match self {
            Self::PartiallyLeft => Self::Left,
            Self::PartiallyRight => Self::Right,
            other => other,
        }
    }
}

// ---------------------------------------------------------------------------
// Signal colours
// ---------------------------------------------------------------------------

/// Colour shown to one connection during one subphase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum LightColor {
    /// Stop.
    Red,
    /// Clearance interval.
    Yellow,
    /// Go (protected or permitted).
    Green,
}

impl LightColor {
    /// Parse an engine state character, ignoring case.
    pub const fn from_char(c: char) -> Option<Self> {
        match c {
            'r' | 'R' => Some(Self::Red),
            'y' | 'Y' => Some(Self::Yellow),
            'g' | 'G' => Some(Self::Green),
            _ => None,
        }
    }

    /// The character written into engine state strings.
    pub const fn as_char(self) -> char {
        match self {
            Self::Red => 'r',
            Self::Yellow => 'y',
            Self::Green => 'G',
        }
    }
}

// ---------------------------------------------------------------------------
// Movements
// ---------------------------------------------------------------------------

/// Standardized turning movement through an intersection.
///
/// The discriminants are the wire codes used by external controllers. Codes
/// 20 to 23 are reserved for U-turns. On the wire a movement travels as its
/// decimal code in a string (`"8"`), never as this enum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Movement {
    /// Left turn from the south approach.
    SouthLeft = 1,
    /// Through movement from the south approach.
    SouthThrough = 2,
    /// Right turn from the south approach.
    SouthRight = 3,
    /// Left turn from the east approach.
    EastLeft = 4,
    /// Through movement from the east approach.
    EastThrough = 5,
    /// Right turn from the east approach.
    EastRight = 6,
    /// Left turn from the north approach.
    NorthLeft = 7,
    /// Through movement from the north approach.
    NorthThrough = 8,
    /// Right turn from the north approach.
    NorthRight = 9,
    /// Left turn from the west approach.
    WestLeft = 10,
    /// Through movement from the west approach.
    WestThrough = 11,
    /// Right turn from the west approach.
    WestRight = 12,
    /// U-turn from the south approach.
    SouthUTurn = 20,
    /// U-turn from the east approach.
    EastUTurn = 21,
    /// U-turn from the north approach.
    NorthUTurn = 22,
    /// U-turn from the west approach.
    WestUTurn = 23,
}

/// Every movement, in code order.
pub const ALL_MOVEMENTS: [Movement; 16] = [
    Movement::SouthLeft,
    Movement::SouthThrough,
    Movement::SouthRight,
    Movement::EastLeft,
    Movement::EastThrough,
    Movement::EastRight,
    Movement::NorthLeft,
    Movement::NorthThrough,
    Movement::NorthRight,
    Movement::WestLeft,
    Movement::WestThrough,
    Movement::WestRight,
    Movement::SouthUTurn,
    Movement::EastUTurn,
    Movement::NorthUTurn,
    Movement::WestUTurn,
];

impl Movement {
    /// Look up a movement by its wire code.
    pub fn from_code(code: u8) -> Option<Self> {
        ALL_MOVEMENTS.iter().copied().find(|m| m.code() == code)
    }

    /// The wire code of this movement.
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Look up the movement for an approach direction and turn.
    ///
    /// Partial turns are normalized first. Returns `None` only for turn
    /// codes without a movement, which cannot happen after normalization.
    pub const fn from_parts(direction: Direction, turn: Turn) -> Option<Self> {
        let movement = match (direction, turn.normalized()) {
            (Direction::South, Turn::Left) => Self::SouthLeft,
            (Direction::South, Turn::Straight) => Self::SouthThrough,
            (Direction::South, Turn::Right) => Self::SouthRight,
            (Direction::South, Turn::UTurn) => Self::SouthUTurn,
            (Direction::East, Turn::Left) => Self::EastLeft,
            (Direction::East, Turn::Straight) => Self::EastThrough,
            (Direction::East, Turn::Right) => Self::EastRight,
            (Direction::East, Turn::UTurn) => Self::EastUTurn,
            (Direction::North, Turn::Left) => Self::NorthLeft,
            (Direction::North, Turn::Straight) => Self::NorthThrough,
            (Direction::North, Turn::Right) => Self::NorthRight,
            (Direction::North, Turn::UTurn) => Self::NorthUTurn,
            (Direction::West, Turn::Left) => Self::WestLeft,
            (Direction::West, Turn::Straight) => Self::WestThrough,
            (Direction::West, Turn::Right) => Self::WestRight,
            (Direction::West, Turn::UTurn) => Self::WestUTurn,
            (_, Turn::PartiallyLeft | Turn::PartiallyRight) => return None,
        };
        Some(movement)
    }

    /// The approach direction and (normalized) turn of this movement.
    pub const fn parts(self) -> (Direction, Turn) {
        match self {
            Self::SouthLeft => (Direction::South, Turn::Left),
            Self::SouthThrough => (Direction::South, Turn::Straight),
            Self::SouthRight => (Direction::South, Turn::Right),
            Self::EastLeft => (Direction::East, Turn::Left),
            Self::EastThrough => (Direction::East, Turn::Straight),
            Self::EastRight => (Direction::East, Turn::Right),
            Self::NorthLeft => (Direction::North, Turn::Left),
            Self::NorthThrough => (Direction::North, Turn::Straight),
            Self::NorthRight => (Direction::North, Turn::Right),
            Self::WestLeft => (Direction::West, Turn::Left),
            Self::WestThrough => (Direction::West, Turn::Straight),
            Self::WestRight => (Direction::West, Turn::Right),
            Self::SouthUTurn => (Direction::South, Turn::UTurn),
            Self::EastUTurn => (Direction::East, Turn::UTurn),
            Self::NorthUTurn => (Direction::North, Turn::UTurn),
            Self::WestUTurn => (Direction::West, Turn::UTurn),
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Error returned when a movement string is not a known movement code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownMovement(pub String);

impl fmt::Display for UnknownMovement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown movement code: {:?}", self.0)
    }
}

impl std::error::Error for UnknownMovement {}

impl FromStr for Movement {
    type Err = UnknownMovement;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u8>()
            .ok()
            .and_then(Self::from_code)
            .ok_or_else(|| UnknownMovement(s.to_owned()))
    }
}

// ---------------------------------------------------------------------------
// Messaging
// ---------------------------------------------------------------------------

/// Type tag of a record exchanged over the messaging channel.
///
/// The variant name doubles as the last segment of the channel subject.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub enum RecordType {
    /// A canonical signal scheme (inbound command or outbound snapshot).
    SignalScheme,
    /// Execution snapshot of the running signal program.
    SignalExecution,
    /// Per-vehicle speed guidance command.
    SpeedGuide,
    /// Request to publish the currently executing signal scheme.
    SignalExecutionRequirement,
    /// Order to start the simulation session.
    Start,
    /// Kinematic state of the vehicles around one intersection.
    SafetyMessage,
    /// Detector volumes of one intersection over the last interval.
    TrafficFlow,
}

/// Every record type, in declaration order.
pub const ALL_RECORD_TYPES: [RecordType; 7] = [
    RecordType::SignalScheme,
    RecordType::SignalExecution,
    RecordType::SpeedGuide,
    RecordType::SignalExecutionRequirement,
    RecordType::Start,
    RecordType::SafetyMessage,
    RecordType::TrafficFlow,
];

impl RecordType {
    /// The subject segment naming this record type.
    pub const fn name(self) -> &'static str {
        match self {
            Self::SignalScheme => "SignalScheme",
            Self::SignalExecution => "SignalExecution",
            Self::SpeedGuide => "SpeedGuide",
            Self::SignalExecutionRequirement => "SignalExecutionRequirement",
            Self::Start => "Start",
            Self::SafetyMessage => "SafetyMessage",
            Self::TrafficFlow => "TrafficFlow",
        }
    }

    /// Look up a record type by its subject segment.
    pub fn from_name(name: &str) -> Option<Self> {
        ALL_RECORD_TYPES.iter().copied().find(|t| t.name() == name)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
