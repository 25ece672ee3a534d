//! Durations in the notation the metrics and alerting backends use in their
//! configuration files, e.g. `30s`, `5m`, `1h30m`.

use std::fmt;
use std::time::Duration;

use lazy_static::lazy_static;
use regex::Regex;
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

use crate::{Error, Result};

lazy_static! {
    static ref DURATION_RE: Regex = Regex::new(
        r"^(?:([0-9]+)y)?(?:([0-9]+)w)?(?:([0-9]+)d)?(?:([0-9]+)h)?(?:([0-9]+)m)?(?:([0-9]+)s)?(?:([0-9]+)ms)?$"
    )
    .expect("duration pattern is valid");
}

const MS_PER_UNIT: [(u64, &str); 7] = [
    (1000 * 60 * 60 * 24 * 365, "y"),
    (1000 * 60 * 60 * 24 * 7, "w"),
    (1000 * 60 * 60 * 24, "d"),
    (1000 * 60 * 60, "h"),
    (1000 * 60, "m"),
    (1000, "s"),
    (1, "ms"),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PromDuration(pub Duration);

impl PromDuration {
    pub fn from_secs(secs: u64) -> Self {
        PromDuration(Duration::from_secs(secs))
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn parse(s: &str) -> Result<Self> {
        if s == "0" {
            return Ok(PromDuration::default());
        }
        if s.is_empty() {
            return Err(Error::Validation("empty duration string".to_string()));
        }

        let caps = DURATION_RE
            .captures(s)
            .ok_or_else(|| Error::Validation(format!("not a valid duration string: {:?}", s)))?;

        let mut total_ms: u64 = 0;
        for (i, (unit_ms, _)) in MS_PER_UNIT.iter().enumerate() {
            if let Some(m) = caps.get(i + 1) {
                let n: u64 = m
                    .as_str()
                    .parse()
                    .map_err(|_| Error::Validation(format!("duration out of range: {:?}", s)))?;
                total_ms = n
                    .checked_mul(*unit_ms)
                    .and_then(|v| total_ms.checked_add(v))
                    .ok_or_else(|| Error::Validation(format!("duration out of range: {:?}", s)))?;
            }
        }
        Ok(PromDuration(Duration::from_millis(total_ms)))
    }
}

/// Parses `s`, treating anything unparsable as absent.
pub fn parse_lenient(s: &str) -> Option<PromDuration> {
    PromDuration::parse(s).ok()
}

impl fmt::Display for PromDuration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut ms = self.0.as_millis() as u64;
        if ms == 0 {
            return f.write_str("0s");
        }
        for (unit_ms, unit) in MS_PER_UNIT {
            if ms >= unit_ms {
                write!(f, "{}{}", ms / unit_ms, unit)?;
                ms %= unit_ms;
            }
        }
        Ok(())
    }
}

impl Serialize for PromDuration {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for PromDuration {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        PromDuration::parse(&s).map_err(de::Error::custom)
    }
}
