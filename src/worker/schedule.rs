//! When a worker runs: a daily wall-clock time (UTC) or a fixed interval

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use super::WorkerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Schedule {
    /// Once a day at `hour:minute` UTC
    Daily { hour: u32, minute: u32 },
    /// Every `interval`, first run immediately
    Every(Duration),
}

impl Schedule {
    pub fn daily(hour: u32, minute: u32) -> Self {
        Schedule::Daily { hour, minute }
    }

    pub fn every(interval: Duration) -> Self {
        Schedule::Every(interval)
    }

    /// Parse "HH:MM" into a daily schedule
    pub fn parse_daily(s: &str) -> Result<Self, WorkerError> {
        let invalid = || WorkerError::InvalidSchedule(format!("expected HH:MM, got '{}'", s));
        let (h, m) = s.trim().split_once(':').ok_or_else(invalid)?;
        let hour = h.parse::<u32>().map_err(|_| invalid())?;
        let minute = m.parse::<u32>().map_err(|_| invalid())?;
        let schedule = Schedule::daily(hour, minute);
        schedule.validate()?;
        Ok(schedule)
    }

    pub fn validate(&self) -> Result<(), WorkerError> {
        match *self {
            Schedule::Daily { hour, minute } if hour > 23 || minute > 59 => Err(
                WorkerError::InvalidSchedule(format!("{:02}:{:02} is not a time of day", hour, minute)),
            ),
            Schedule::Every(interval) if interval.is_zero() => Err(WorkerError::InvalidSchedule(
                "interval must be greater than zero".to_string(),
            )),
            _ => Ok(()),
        }
    }

    /// The first scheduled instant strictly after `now`
    pub fn next_run_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match *self {
            Schedule::Daily { hour, minute } => {
                let today = now
                    .date_naive()
                    .and_hms_opt(hour, minute, 0)
                    .map(|t| t.and_utc());
                match today {
                    Some(t) if t > now => t,
                    Some(t) => t + ChronoDuration::days(1),
                    None => now + ChronoDuration::days(1),
                }
            }
            Schedule::Every(interval) => {
                now + ChronoDuration::from_std(interval).unwrap_or(ChronoDuration::MAX)
            }
        }
    }

    /// How long to sleep from `now` until the next run
    pub fn next_delay(&self, now: DateTime<Utc>) -> Duration {
        (self.next_run_after(now) - now)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

impl fmt::Display for Schedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Schedule::Daily { hour, minute } => write!(f, "daily at {:02}:{:02} UTC", hour, minute),
            Schedule::Every(interval) => write!(f, "every {:?}", interval),
        }
    }
}
