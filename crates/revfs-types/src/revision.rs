use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A revision number. Revision 0 is the empty initial tree.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Revnum(u64);

impl Revnum {
    /// The initial, empty revision.
    pub const ZERO: Self = Self(0);

    pub const fn new(n: u64) -> Self {
        Self(n)
    }

    pub const fn get(self) -> u64 {
        self.0
    }

    /// The revision after this one.
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// The revision before this one, or `None` for revision 0.
    pub fn prev(self) -> Option<Self> {
        self.0.checked_sub(1).map(Self)
    }
}

impl fmt::Debug for Revnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

impl fmt::Display for Revnum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for Revnum {
    fn from(n: u64) -> Self {
        Self(n)
    }
}

impl From<Revnum> for u64 {
    fn from(rev: Revnum) -> Self {
        rev.0
    }
}

impl FromStr for Revnum {
    type Err = TypeError;

    /// Accepts `12` or `r12`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix('r').unwrap_or(s);
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|_| TypeError::InvalidRevnum(s.to_string()))
    }
}
