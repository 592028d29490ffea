//! Domain model for diagrams, favorites and their owners.
//!
//! # Responsibility
//! - Define the persisted entities shared by repositories and services.
//! - Keep navigation fields next to the columns they are derived from.
//!
//! # Invariants
//! - Every entity carries a caller-assigned UUID; the store never generates ids.
//! - Timestamps are UTC with millisecond precision, the resolution persisted
//!   by the store, so values read back compare equal to values written.

use chrono::{DateTime, SubsecRound, Utc};

pub mod diagram;
pub mod favorite;
pub mod user;

/// Current UTC time truncated to the persisted millisecond resolution.
pub fn utc_now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}
