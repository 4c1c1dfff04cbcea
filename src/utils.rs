use chrono::{Local, NaiveDate};

use crate::error::{NasaError, Result};

/// Date layout used by the NASA API, both in queries and in responses.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

pub fn format_date(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

/// Parses `YYYY-MM-DD`, returning `None` for anything else.
pub fn parse_date(s: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).ok()
}

/// Like [`parse_date`] but for user input, where a bad value is an error.
pub fn parse_date_arg(s: &str) -> Result<NaiveDate> {
    parse_date(s).ok_or_else(|| {
        NasaError::InvalidInput(format!("invalid date {:?}; should use format YYYY-MM-DD", s))
    })
}

/// Source of "today". Injected so day rollover can be simulated.
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

/// Calendar date in the local timezone.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        Local::now().date_naive()
    }
}

#[cfg(test)]
pub(crate) mod test_clock {
    use super::*;
    use std::sync::Mutex;

    /// Clock pinned to a date that tests can move forward.
    pub(crate) struct FixedClock {
        date: Mutex<NaiveDate>,
    }

    impl FixedClock {
        pub(crate) fn new(date: NaiveDate) -> Self {
            Self { date: Mutex::new(date) }
        }

        pub(crate) fn set(&self, date: NaiveDate) {
            *self.date.lock().unwrap() = date;
        }
    }

    impl Clock for FixedClock {
        fn today(&self) -> NaiveDate {
            *self.date.lock().unwrap()
        }
    }
}
