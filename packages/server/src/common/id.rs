//! Typed wrapper for store-assigned submission identifiers.
//!
//! The store hands out identifiers from a sequence, so they are plain
//! integers on the wire and in SQL. The newtype keeps them from being mixed
//! up with counts, sizes, or other `i64` values in signatures.

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;

/// Identifier of a submission, assigned exactly once by the store.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct SubmissionId(i64);

impl SubmissionId {
    #[inline]
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn as_i64(self) -> i64 {
        self.0
    }
}

impl From<i64> for SubmissionId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl From<SubmissionId> for i64 {
    fn from(id: SubmissionId) -> Self {
        id.0
    }
}

impl Display for SubmissionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl FromStr for SubmissionId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim().parse().map(Self)
    }
}
