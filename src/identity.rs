//! Archival identifier construction and batch-level validation.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveTime, Timelike};
use tracing::debug;

use crate::error::Rejection;
use crate::keywords::{Keyword, KeywordResolver};

/// `{prefix}.{YYYYMMDD}.{HHMMSS}.fits`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ArchiveId {
    prefix: String,
    date: NaiveDate,
    time: NaiveTime,
}

impl ArchiveId {
    /// Time of day is truncated to whole seconds
    pub fn new(prefix: impl Into<String>, date: NaiveDate, time: NaiveTime) -> Self {
        let time = time.with_nanosecond(0).unwrap_or(time);
        Self {
            prefix: prefix.into(),
            date,
            time,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    pub fn time(&self) -> NaiveTime {
        self.time
    }

    pub fn seconds_of_day(&self) -> u32 {
        self.time.num_seconds_from_midnight()
    }

    /// Identifier with the camera sub-path used in the file-list table
    pub fn routed_name(&self) -> String {
        match self.prefix.as_str() {
            "NC" => format!("scam/{}", self),
            "NS" => format!("spec/{}", self),
            _ => self.to_string(),
        }
    }
}

impl fmt::Display for ArchiveId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.fits",
            self.prefix,
            self.date.format("%Y%m%d"),
            self.time.format("%H%M%S")
        )
    }
}

impl FromStr for ArchiveId {
    type Err = Rejection;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.trim().split('.').collect();
        let [prefix, date, time, suffix] = parts.as_slice() else {
            return Err(Rejection::bad_identifier(format!("malformed identifier '{}'", s)));
        };
        if prefix.len() != 2 || !prefix.chars().all(|c| c.is_ascii_uppercase()) {
            return Err(Rejection::bad_identifier(format!("bad prefix '{}'", prefix)));
        }
        if *suffix != "fits" {
            return Err(Rejection::bad_identifier(format!("bad suffix '{}'", suffix)));
        }
        let date = NaiveDate::parse_from_str(date, "%Y%m%d")
            .ok()
            .filter(|_| date.len() == 8)
            .ok_or_else(|| Rejection::bad_identifier(format!("bad date '{}'", date)))?;
        let time = NaiveTime::parse_from_str(time, "%H%M%S")
            .ok()
            .filter(|_| time.len() == 6)
            .ok_or_else(|| Rejection::bad_identifier(format!("bad time '{}'", time)))?;
        Ok(Self::new(*prefix, date, time))
    }
}

/// Parse a header date: `YYYY-MM-DD`, optionally followed by `T...`
pub(crate) fn parse_header_date(text: &str) -> Option<NaiveDate> {
    let date = text.trim().split('T').next()?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

/// Parse a header time of day with optional fractional seconds
pub(crate) fn parse_header_time(text: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(text.trim(), "%H:%M:%S%.f")
        .or_else(|_| NaiveTime::parse_from_str(text.trim(), "%H:%M:%S"))
        .ok()
}

/// Build the identifier from normalized DATE-OBS and UTC
pub fn compute_identifier(kw: &KeywordResolver<'_>, prefix: &str) -> Result<ArchiveId, Rejection> {
    if prefix.is_empty() {
        return Err(Rejection::bad_identifier("no instrument prefix"));
    }
    let date_obs = kw
        .get_str(Keyword::DateObs)
        .ok()
        .ok_or_else(|| Rejection::bad_identifier("DATE-OBS missing"))?;
    let date = parse_header_date(&date_obs)
        .ok_or_else(|| Rejection::bad_identifier(format!("DATE-OBS '{}' unreadable", date_obs)))?;
    let utc = kw
        .get_str(Keyword::Utc)
        .ok()
        .ok_or_else(|| Rejection::bad_identifier("UTC missing"))?;
    let time = parse_header_time(&utc)
        .ok_or_else(|| Rejection::bad_identifier(format!("UTC '{}' unreadable", utc)))?;
    Ok(ArchiveId::new(prefix, date, time))
}

/// Batch-scoped identifier checks. Only the batch pipeline owns one.
#[derive(Debug, Clone)]
pub struct IdentityValidator {
    ut_date: NaiveDate,
    end_of_night: NaiveTime,
    accepted: HashSet<ArchiveId>,
}

impl IdentityValidator {
    pub fn new(ut_date: NaiveDate, end_of_night: NaiveTime) -> Self {
        Self {
            ut_date,
            end_of_night,
            accepted: HashSet::new(),
        }
    }

    /// Checks in order: present, not a duplicate, date consistent
    pub fn check(&self, id: Option<&str>) -> Result<ArchiveId, Rejection> {
        let text = id
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| Rejection::bad_identifier("identifier missing"))?;
        let id: ArchiveId = text.parse()?;

        if self.accepted.contains(&id) {
            return Err(Rejection::DuplicateIdentifier { id: id.to_string() });
        }

        let day_gap = (self.ut_date - id.date).num_days().abs();
        if id.date != self.ut_date
            && day_gap > 1
            && id.seconds_of_day() < self.end_of_night.num_seconds_from_midnight()
        {
            return Err(Rejection::BadDate {
                id: id.to_string(),
                date: id.date.format("%Y%m%d").to_string(),
            });
        }

        Ok(id)
    }

    /// Record an identifier once its file has been fully accepted
    pub fn record(&mut self, id: &ArchiveId) {
        debug!("Accepted identifier {}", id);
        self.accepted.insert(id.clone());
    }

    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }
}
