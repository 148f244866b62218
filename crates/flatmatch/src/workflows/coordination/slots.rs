use std::collections::{BTreeMap, BTreeSet};

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};

use super::domain::ResidentId;

/// Lookahead window and daily hour band a candidate slot must fall into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SlotWindow {
    pub lookahead_days: u16,
    /// First admissible hour of day, inclusive.
    pub first_hour: u8,
    /// Last admissible hour of day, inclusive.
    pub last_hour: u8,
}

impl SlotWindow {
    fn admits(&self, from: NaiveDate, date: NaiveDate, time: NaiveTime) -> bool {
        let horizon = from + Duration::days(i64::from(self.lookahead_days));
        date >= from
            && date < horizon
            && time.hour() >= u32::from(self.first_hour)
            && time.hour() <= u32::from(self.last_hour)
    }
}

impl Default for SlotWindow {
    fn default() -> Self {
        Self {
            lookahead_days: 14,
            first_hour: 9,
            last_hour: 20,
        }
    }
}

/// Availability calendars supplied at query time, keyed by resident.
/// Never persisted; each resolution call brings its own.
pub type ResidentAvailability = BTreeMap<ResidentId, BTreeSet<(NaiveDate, NaiveTime)>>;

/// One candidate meeting opportunity with per-resident availability
/// annotated. Partially available slots are returned too; display and
/// selectability policy stays with the caller.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub time: NaiveTime,
    pub day_of_week: &'static str,
    pub available_residents: Vec<ResidentId>,
    pub total_residents: usize,
}

impl TimeSlot {
    /// Every resident who supplied a calendar can make this slot.
    pub fn is_fully_available(&self) -> bool {
        self.available_residents.len() == self.total_residents
    }
}

/// Merge per-resident calendars into chronologically ordered candidate
/// slots. Pure over its inputs: identical calendars always produce
/// identical output, and no state is held between calls.
pub fn resolve(
    availabilities: &ResidentAvailability,
    window: &SlotWindow,
    from: NaiveDate,
) -> Vec<TimeSlot> {
    let total_residents = availabilities.len();
    if total_residents == 0 {
        return Vec::new();
    }

    let mut offers: BTreeMap<(NaiveDate, NaiveTime), Vec<ResidentId>> = BTreeMap::new();
    for (resident, calendar) in availabilities {
        for &(date, time) in calendar {
            if !window.admits(from, date, time) {
                continue;
            }
            offers.entry((date, time)).or_default().push(resident.clone());
        }
    }

    offers
        .into_iter()
        .map(|((date, time), available_residents)| TimeSlot {
            date,
            time,
            day_of_week: weekday_label(date.weekday()),
            available_residents,
            total_residents,
        })
        .collect()
}

const fn weekday_label(day: Weekday) -> &'static str {
    match day {
        Weekday::Mon => "Monday",
        Weekday::Tue => "Tuesday",
        Weekday::Wed => "Wednesday",
        Weekday::Thu => "Thursday",
        Weekday::Fri => "Friday",
        Weekday::Sat => "Saturday",
        Weekday::Sun => "Sunday",
    }
}
