//! Shared value types: timestamps and token accounting.
//!
//! These carry meaningful values (epoch instants, non-negative token counts)
//! and participate in usage computations, unlike the opaque identifiers in
//! [`crate::identifiers`].

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock instant with millisecond precision.
///
/// Serialized as integer milliseconds since the Unix epoch so events can be
/// correlated by exact equality after a round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(i64);

impl Timestamp {
    /// Returns the current UTC time, truncated to milliseconds.
    pub fn now() -> Self {
        Self(Utc::now().timestamp_millis())
    }

    /// Creates a [`Timestamp`] from milliseconds since the Unix epoch.
    pub fn from_epoch_millis(millis: i64) -> Self {
        Self(millis)
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`], dropping sub-millisecond precision.
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt.timestamp_millis())
    }

    /// Returns milliseconds since the Unix epoch.
    pub fn as_epoch_millis(self) -> i64 {
        self.0
    }

    /// Returns the instant as a [`DateTime<Utc>`], or `None` if out of range.
    pub fn as_datetime(self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.0)
    }

    /// Milliseconds elapsed from `earlier` to `self` (negative if `earlier` is later).
    pub fn millis_since(self, earlier: Timestamp) -> i64 {
        self.0 - earlier.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.as_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}ms", self.0),
        }
    }
}

// ---------------------------------------------------------------------------
// Token accounting
// ---------------------------------------------------------------------------

/// Number of tokens consumed or budgeted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenCount(u64);

impl TokenCount {
    /// Creates a [`TokenCount`] from a raw integer.
    pub fn new(count: u64) -> Self {
        Self(count)
    }

    /// Returns the underlying integer value.
    pub fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns `true` if this count is zero.
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }
}

impl std::fmt::Display for TokenCount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::ops::Add for TokenCount {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl std::ops::AddAssign for TokenCount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 = self.0.saturating_add(rhs.0);
    }
}

/// Token usage reported by a backend for one call.
///
/// Every count is optional because backends report different subsets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenUsage {
    /// Tokens sent to the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_tokens: Option<TokenCount>,
    /// Tokens produced by the model.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_tokens: Option<TokenCount>,
    /// Total tokens billed, when the backend reports it directly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_tokens: Option<TokenCount>,
}

impl TokenUsage {
    /// Usage with all three counts set; `total` is `input + output`.
    pub fn new(input: u64, output: u64) -> Self {
        Self {
            input_tokens: Some(TokenCount::new(input)),
            output_tokens: Some(TokenCount::new(output)),
            total_tokens: Some(TokenCount::new(input) + TokenCount::new(output)),
        }
    }

    /// The billed total: `total_tokens` if reported, otherwise `input + output`.
    pub fn total(&self) -> TokenCount {
        self.total_tokens.unwrap_or_else(|| {
            self.input_tokens.unwrap_or_default() + self.output_tokens.unwrap_or_default()
        })
    }
}
