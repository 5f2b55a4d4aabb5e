use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const MINUTES_PER_DAY: u16 = 24 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClockParseError {
    #[error("expected HH:MM, got {0:?}")]
    Format(String),
    #[error("time out of range: {0:?}")]
    Range(String),
}

/// Time of day with minute resolution, as printed next to a fixture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClockTime {
    minutes: u16,
}

impl ClockTime {
    pub fn new(hour: u16, minute: u16) -> Option<Self> {
        (hour < 24 && minute < 60).then(|| ClockTime {
            minutes: hour * 60 + minute,
        })
    }

    /// Minutes since midnight.
    pub fn minutes(self) -> u16 {
        self.minutes
    }

    /// Shortest distance around the 24h dial, in minutes (0..=720).
    pub fn circular_distance(self, other: ClockTime) -> u16 {
        let delta = self.minutes.abs_diff(other.minutes);
        delta.min(MINUTES_PER_DAY - delta)
    }
}

impl FromStr for ClockTime {
    type Err = ClockParseError;

    /// Accepts 24-hour `H:MM` or `HH:MM`, surrounding whitespace ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let (h, m) = trimmed
            .split_once(':')
            .ok_or_else(|| ClockParseError::Format(s.to_string()))?;
        let all_digits = |p: &str| !p.is_empty() && p.bytes().all(|b| b.is_ascii_digit());
        if !all_digits(h) || h.len() > 2 || !all_digits(m) || m.len() != 2 {
            return Err(ClockParseError::Format(s.to_string()));
        }
        let hour: u16 = h.parse().map_err(|_| ClockParseError::Format(s.to_string()))?;
        let minute: u16 = m.parse().map_err(|_| ClockParseError::Format(s.to_string()))?;
        ClockTime::new(hour, minute).ok_or_else(|| ClockParseError::Range(s.to_string()))
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes / 60, self.minutes % 60)
    }
}

/// Circular distance between two "HH:MM" strings.
pub fn distance(a: &str, b: &str) -> Result<u16, ClockParseError> {
    Ok(a.parse::<ClockTime>()?.circular_distance(b.parse()?))
}
