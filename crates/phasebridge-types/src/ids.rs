//! Strongly-typed identifiers.
//!
//! Scheduler-side identifiers ([`TaskId`], [`SessionId`]) are UUID v7 so
//! they sort by creation time in logs. Engine-side identifiers wrap the
//! engine's own numbering: [`ConnectionIndex`] is the signal-group index of
//! one lane-to-lane connection, [`ProgramId`] names one installed signal
//! program.

use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

/// Generates a newtype wrapper around [`Uuid`] with standard derives.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
        #[ts(export, export_to = "bindings/")]
        pub struct $name(pub Uuid);

        impl $name {
            /// Create a new identifier using UUID v7 (time-ordered).
            pub fn new() -> Self {
                Self(Uuid::now_v7())
            }

            /// Return the inner [`Uuid`] value.
            pub const fn into_inner(self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id! {
    /// Unique identifier for a task held by the scheduler.
    TaskId
}

define_id! {
    /// Unique identifier for one simulation session (engine run).
    SessionId
}

/// Signal-group index of one connection, as assigned by the engine.
///
/// Stable for the lifetime of one intersection topology; position `i` of a
/// signal state string is the colour of connection `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ConnectionIndex(pub u16);

impl ConnectionIndex {
    /// Position of this connection inside a signal state.
    pub const fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl core::fmt::Display for ConnectionIndex {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a signal program installed in the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export, export_to = "bindings/")]
pub struct ProgramId(pub u32);

impl ProgramId {
    /// The next program id, or `None` if the id space is exhausted.
    pub const fn next(self) -> Option<Self> {
        match self.0.checked_add(1) {
            Some(id) => Some(Self(id)),
            None => None,
        }
    }
}

impl core::fmt::Display for ProgramId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_ids_are_unique_and_time_ordered() {
        let first = TaskId::new();
        let second = TaskId::new();
        assert_ne!(first, second);
        assert!(first <= second);
    }

    #[test]
    fn program_id_next_is_strictly_greater() {
        assert_eq!(ProgramId(4).next(), Some(ProgramId(5)));
        assert_eq!(ProgramId(u32::MAX).next(), None);
    }

    #[test]
    fn connection_index_serializes_as_number() {
        let json = serde_json::to_string(&ConnectionIndex(7)).ok();
        assert_eq!(json.as_deref(), Some("7"));
    }
}
