//! Freshness deadlines: the most recent scheduled cutoff at or before now.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use cswd_warehouse::period::quarter_start;
use serde::{Deserialize, Serialize};
use time::macros::{offset, time};
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset, Weekday};

/// How often cached data rolls over.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Frequency {
    /// Every business day.
    Daily,
    /// Mondays.
    Weekly,
    /// First of the month.
    Monthly,
    /// First day of a calendar quarter.
    Quarterly,
}

impl Frequency {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "D",
            Self::Weekly => "W",
            Self::Monthly => "M",
            Self::Quarterly => "Q",
        }
    }

    /// Latest boundary day at or before `day`.
    pub fn boundary_on_or_before(self, day: Date) -> Date {
        match self {
            Self::Daily => {
                let mut day = day;
                while matches!(day.weekday(), Weekday::Saturday | Weekday::Sunday) {
                    day = day.previous_day().unwrap_or(day);
                }
                day
            }
            Self::Weekly => {
                let back = i64::from(day.weekday().number_days_from_monday());
                day.saturating_sub(time::Duration::days(back))
            }
            Self::Monthly => day.replace_day(1).unwrap_or(day),
            Self::Quarterly => quarter_start(day),
        }
    }
}

impl Display for Frequency {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Frequency {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "D" | "DAILY" => Ok(Self::Daily),
            "W" | "WEEKLY" => Ok(Self::Weekly),
            "M" | "MONTHLY" => Ok(Self::Monthly),
            "Q" | "QUARTERLY" => Ok(Self::Quarterly),
            _ => Err(format!(
                "invalid frequency '{value}', expected one of D, W, M, Q"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FreshnessPolicy {
    /// Market-local time of day at which data rolls over.
    pub cutoff: Time,
    pub frequency: Frequency,
    /// Market timezone.
    pub offset: UtcOffset,
}

impl Default for FreshnessPolicy {
    fn default() -> Self {
        Self {
            cutoff: time!(18:00:00),
            frequency: Frequency::Daily,
            offset: offset!(+8),
        }
    }
}

impl FreshnessPolicy {
    pub fn with_frequency(self, frequency: Frequency) -> Self {
        Self { frequency, ..self }
    }

    pub fn deadline(&self, now: OffsetDateTime) -> OffsetDateTime {
        let local = now.to_offset(self.offset);
        let mut day = local.date();
        if local.time() < self.cutoff {
            day = day.previous_day().unwrap_or(day);
        }
        let boundary = self.frequency.boundary_on_or_before(day);
        PrimitiveDateTime::new(boundary, self.cutoff).assume_offset(self.offset)
    }

    /// An entry written at or before the deadline, or never written, is stale.
    pub fn is_stale(&self, written: Option<OffsetDateTime>, now: OffsetDateTime) -> bool {
        written.map_or(true, |written| written <= self.deadline(now))
    }
}
