use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr};
use uuid::Uuid;

lazy_static! {
    pub static ref TIME_REGEX: Regex =
        Regex::new(r"^([01][0-9]|2[0-3]):[0-5][0-9]$").expect("time pattern is valid");
    pub static ref DATE_REGEX: Regex =
        Regex::new(r"^[0-9]{4}-[0-9]{2}-[0-9]{2}$").expect("date pattern is valid");
}

pub const MINUTES_PER_SLOT: u16 = 60;
/// Upper bound for a single slot's price, so a day's worth of slots always sums within `i64`.
pub const MAX_SLOT_PRICE: i64 = 1_000_000_000;
const MINUTES_PER_DAY: u16 = 24 * 60;

/// Wall-clock time of day with minute precision, written as `HH:MM`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotTime(u16);

impl SlotTime {
    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_hm(hour: u16, minute: u16) -> Option<Self> {
        if minute >= 60 {
            return None;
        }
        Self::from_minutes(hour * 60 + minute)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn is_full_hour(self) -> bool {
        self.0 % MINUTES_PER_SLOT == 0
    }

    /// Minute-granular time of day of a naive timestamp.
    pub fn of(datetime: &NaiveDateTime) -> Self {
        // hour() < 24 and minute() < 60, so this stays below MINUTES_PER_DAY
        Self((datetime.hour() * 60 + datetime.minute()) as u16)
    }

    pub fn on(self, date: NaiveDate) -> NaiveDateTime {
        date.and_time(NaiveTime::MIN) + Duration::minutes(i64::from(self.0))
    }
}

impl fmt::Display for SlotTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.0 / 60, self.0 % 60)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("'{0}' is not a valid HH:MM time")]
pub struct InvalidSlotTime(pub String);

impl FromStr for SlotTime {
    type Err = InvalidSlotTime;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || InvalidSlotTime(value.to_string());
        if !TIME_REGEX.is_match(value) {
            return Err(invalid());
        }
        let (hour, minute) = value.split_once(':').ok_or_else(invalid)?;
        let hour = hour.parse::<u16>().map_err(|_| invalid())?;
        let minute = minute.parse::<u16>().map_err(|_| invalid())?;
        Self::from_hm(hour, minute).ok_or_else(invalid)
    }
}

impl Serialize for SlotTime {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for SlotTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Uniqueness key of a timeslot. Court ids are globally unique, so the venue is not part of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SlotKey {
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub time: SlotTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeslot {
    pub id: Uuid,
    #[serde(rename = "venue")]
    pub venue_id: Uuid,
    #[serde(rename = "court")]
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub price: i64,
    pub is_available: bool,
}

impl Timeslot {
    pub fn key(&self) -> SlotKey {
        SlotKey {
            court_id: self.court_id,
            date: self.date,
            time: self.time,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTimeslot {
    pub venue_id: Uuid,
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub price: i64,
    pub is_available: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotFilter {
    pub venue_id: Option<Uuid>,
    pub court_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
}

impl SlotFilter {
    pub fn matches(&self, timeslot: &Timeslot) -> bool {
        self.venue_id.map_or(true, |id| id == timeslot.venue_id)
            && self.court_id.map_or(true, |id| id == timeslot.court_id)
            && self.date.map_or(true, |date| date == timeslot.date)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Confirmed,
    Cancelled,
}

impl BookingStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Cancelled => "cancelled",
        }
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "confirmed" => Ok(BookingStatus::Confirmed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            other => Err(format!("unknown booking status '{other}'")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Booking {
    pub id: Uuid,
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub time: SlotTime,
    pub duration: u32,
    pub total_amount: i64,
    pub status: BookingStatus,
    /// Every slot claimed by this booking, in time order.
    pub slot_times: Vec<SlotTime>,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub venue_name: String,
    pub court_name: String,
    pub sport: String,
    pub cancellation_reason: Option<String>,
    pub created_at: NaiveDateTime,
    pub cancelled_at: Option<NaiveDateTime>,
}

impl Booking {
    pub fn starts_at(&self) -> NaiveDateTime {
        self.time.on(self.date)
    }

    pub fn end_time(&self) -> SlotTime {
        self.slot_times
            .last()
            .and_then(|last| SlotTime::from_minutes(last.minutes() + MINUTES_PER_SLOT))
            // a slot starting at 23:00 ends at midnight
            .unwrap_or(SlotTime(0))
    }

    pub fn slot_keys(&self) -> impl Iterator<Item = SlotKey> + '_ {
        self.slot_times.iter().map(|time| SlotKey {
            court_id: self.court_id,
            date: self.date,
            time: *time,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReminderWindow {
    #[serde(rename = "24h")]
    DayBefore,
    #[serde(rename = "2h")]
    TwoHoursBefore,
    #[serde(rename = "30m")]
    HalfHourBefore,
}

impl ReminderWindow {
    pub const ALL: [ReminderWindow; 3] = [
        ReminderWindow::DayBefore,
        ReminderWindow::TwoHoursBefore,
        ReminderWindow::HalfHourBefore,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ReminderWindow::DayBefore => "24h",
            ReminderWindow::TwoHoursBefore => "2h",
            ReminderWindow::HalfHourBefore => "30m",
        }
    }

    pub fn lead_time(self) -> Duration {
        match self {
            ReminderWindow::DayBefore => Duration::hours(24),
            ReminderWindow::TwoHoursBefore => Duration::hours(2),
            ReminderWindow::HalfHourBefore => Duration::minutes(30),
        }
    }
}

impl FromStr for ReminderWindow {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ReminderWindow::ALL
            .into_iter()
            .find(|window| window.label() == value)
            .ok_or_else(|| format!("unknown reminder window '{value}'"))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reminder {
    pub key: String,
    pub booking_id: Uuid,
    pub window: ReminderWindow,
    pub due_at: NaiveDateTime,
}

impl Reminder {
    pub fn key_for(booking_id: Uuid, window: ReminderWindow) -> String {
        format!("{booking_id}-{}", window.label())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Venue {
    pub id: Uuid,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Court {
    pub id: Uuid,
    pub venue_id: Uuid,
    pub name: String,
    pub sport: String,
}
