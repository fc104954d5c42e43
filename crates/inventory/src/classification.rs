//! Expiration classification engine.
//!
//! A pure function of "today" and a lot's expiration date. The bands are:
//!
//! | days until expiration | classification |
//! |-----------------------|----------------|
//! | `< 0`                 | `Expired`      |
//! | `0..=7`               | `Critical`     |
//! | `8..=30`              | `NearExpiry`   |
//! | `> 30` or undated     | `Normal`       |

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Last day (inclusive) of the critical band.
pub const CRITICAL_WINDOW_DAYS: i64 = 7;
/// Last day (inclusive) of the near-expiry band.
pub const NEAR_EXPIRY_WINDOW_DAYS: i64 = 30;

/// Expiry-urgency label stored on every lot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Classification {
    Normal,
    NearExpiry,
    Critical,
    Expired,
}

impl Classification {
    /// Expired stock is never eligible for allocation.
    pub fn is_allocatable(self) -> bool {
        !matches!(self, Classification::Expired)
    }

    /// Entering one of these states raises an expiring alert.
    pub fn is_expiring(self) -> bool {
        matches!(self, Classification::Critical | Classification::NearExpiry)
    }
}

impl core::fmt::Display for Classification {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let s = match self {
            Classification::Normal => "NORMAL",
            Classification::NearExpiry => "NEAR_EXPIRY",
            Classification::Critical => "CRITICAL",
            Classification::Expired => "EXPIRED",
        };
        f.write_str(s)
    }
}

/// Whole days from `today` until `expiration_date` (negative once past).
pub fn days_until_expiration(today: NaiveDate, expiration_date: NaiveDate) -> i64 {
    (expiration_date - today).num_days()
}

pub fn classify_days(days_until_expiration: i64) -> Classification {
    if days_until_expiration < 0 {
        Classification::Expired
    } else if days_until_expiration <= CRITICAL_WINDOW_DAYS {
        Classification::Critical
    } else if days_until_expiration <= NEAR_EXPIRY_WINDOW_DAYS {
        Classification::NearExpiry
    } else {
        Classification::Normal
    }
}

pub fn classify(today: NaiveDate, expiration_date: Option<NaiveDate>) -> Classification {
    match expiration_date {
        Some(date) => classify_days(days_until_expiration(today, date)),
        None => Classification::Normal,
    }
}
