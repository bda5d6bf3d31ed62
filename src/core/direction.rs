//! Direction lattice
//!
//! ```text
//!          InOut
//!         /     \
//!       In       Out
//!         \     /
//!         Unknown
//! ```
//!
//! `In` and `Out` are incomparable. The lattice has height 3, so any
//! monotone label can change at most twice.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How a function or global participates in data flow
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DirectionLabel {
    /// No observed access
    #[default]
    Unknown,
    /// Read-only
    In,
    /// Write-only
    Out,
    /// Read and written
    InOut,
}

impl DirectionLabel {
    /// Least upper bound of two labels
    pub fn join(self, other: Self) -> Self {
        use DirectionLabel::*;
        match (self, other) {
            (Unknown, x) | (x, Unknown) => x,
            (In, In) => In,
            (Out, Out) => Out,
            _ => InOut,
        }
    }

    /// Partial order: `self <= other`
    pub fn leq(self, other: Self) -> bool {
        self.join(other) == other
    }

    pub fn from_mode(mode: AccessMode) -> Self {
        match mode {
            AccessMode::Read => Self::In,
            AccessMode::Write => Self::Out,
        }
    }

    /// Join over an arbitrary collection of labels
    pub fn join_all<I: IntoIterator<Item = Self>>(labels: I) -> Self {
        labels.into_iter().fold(Self::Unknown, Self::join)
    }

    pub const ALL: [DirectionLabel; 4] = [Self::Unknown, Self::In, Self::Out, Self::InOut];
}

impl fmt::Display for DirectionLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Unknown => "-",
            Self::In => "In",
            Self::Out => "Out",
            Self::InOut => "In/Out",
        };
        f.write_str(s)
    }
}

/// Mode of a single observed access to a global
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum AccessMode {
    Read,
    Write,
}
