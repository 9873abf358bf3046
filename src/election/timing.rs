//! Election phase windows as wall-clock times in a named zone.
//!
//! Elections are scheduled in the future, so the setup payload records
//! local wall-clock strings plus an IANA zone name rather than instants;
//! the zone database current at validation time decides what instant a
//! wall clock maps to. Block timestamps (UTC epoch seconds) are compared
//! against the resolved instants.

use std::str::FromStr;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

/// `YYYY-MM-DDThh:mm:ss` — RFC 3339 without the offset, deliberately.
pub const TIME_SPEC_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// A wall-clock time without a zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSpec(pub String);

impl TimeSpec {
    /// Resolve to an instant in the given zone. Ambiguous local times
    /// (DST fold) take the earliest occurrence; nonexistent ones fail.
    pub fn to_instant(&self, zone: Tz) -> Option<DateTime<Utc>> {
        let naive = NaiveDateTime::parse_from_str(&self.0, TIME_SPEC_FORMAT).ok()?;
        zone.from_local_datetime(&naive)
            .earliest()
            .map(|t| t.with_timezone(&Utc))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeBounds {
    pub opens: TimeSpec,
    pub closes: TimeSpec,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingInfo {
    #[serde(rename = "timeZone")]
    pub timezone: String,
    #[serde(rename = "parameterConfirmation")]
    pub parameter_confirmation: TimeBounds,
    #[serde(rename = "voterRegistration")]
    pub voter_registration: TimeBounds,
    #[serde(rename = "voteCasting")]
    pub vote_casting: TimeBounds,
    #[serde(rename = "tallyDecryption")]
    pub tally_decryption: TimeBounds,
}

/// One resolved phase window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Window {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// The four resolved windows, in protocol order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PhaseWindows {
    windows: [Window; 4],
}

impl TimingInfo {
    pub fn zone(&self) -> Result<Tz, ValidationError> {
        Tz::from_str(&self.timezone)
            .map_err(|_| ValidationError::UnknownTimezone(self.timezone.clone()))
    }

    /// Resolve and validate every window: known zone, each `opens <
    /// closes`, each phase starting no earlier than the previous phase
    /// closed, and the first no earlier than `min` (the genesis time).
    pub fn resolve(&self, min: DateTime<Utc>) -> Result<PhaseWindows, ValidationError> {
        let zone = self.zone()?;
        let mut windows = Vec::with_capacity(4);
        let mut min = min;
        for (phase, bounds) in [
            ("parameterConfirmation", &self.parameter_confirmation),
            ("voterRegistration", &self.voter_registration),
            ("voteCasting", &self.vote_casting),
            ("tallyDecryption", &self.tally_decryption),
        ] {
            let bad = |reason| ValidationError::BadTiming { phase, reason };
            let start = bounds
                .opens
                .to_instant(zone)
                .ok_or_else(|| bad("opens timespec invalid"))?;
            let end = bounds
                .closes
                .to_instant(zone)
                .ok_or_else(|| bad("closes timespec invalid"))?;
            if start < min {
                return Err(bad("opens time is too early"));
            }
            if end <= start {
                return Err(bad("closes time is not after opens time"));
            }
            windows.push(Window { start, end });
            min = end;
        }
        Ok(PhaseWindows {
            windows: windows.try_into().expect("exactly four windows"),
        })
    }
}

impl PhaseWindows {
    /// The 1-based phase whose window contains `t`. The interval is open
    /// at both ends: a block stamped exactly on a boundary belongs to no
    /// phase.
    pub fn phase_for(&self, t: DateTime<Utc>) -> Option<u8> {
        self.windows
            .iter()
            .position(|w| t > w.start && t < w.end)
            .map(|i| i as u8 + 1)
    }
}

/// A block's epoch seconds as an instant.
pub fn epoch_to_instant(epoch_seconds: u32) -> DateTime<Utc> {
    Utc.timestamp_opt(i64::from(epoch_seconds), 0)
        .single()
        .expect("u32 epoch is always in range")
}
