use crate::{
    backend::{BackendError, BookingBackend, DirectoryBackend, ReminderBackend, TimeslotBackend},
    local_backend::LocalBackend,
    types::{
        Booking, BookingStatus, Court, NewTimeslot, Reminder, SlotFilter, SlotTime, Timeslot, User,
        Venue,
    },
};
use chrono::{DateTime, Local, NaiveDate, NaiveDateTime, TimeZone, Utc};
use mockable::Clock;
use std::sync::{
    atomic::{AtomicBool, AtomicU64, Ordering},
    Arc, Mutex,
};
use uuid::Uuid;

pub fn date(year: i32, month: u32, day: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, month, day).unwrap()
}

pub fn time(raw: &str) -> SlotTime {
    raw.parse().unwrap()
}

pub fn at(day: NaiveDate, raw: &str) -> NaiveDateTime {
    time(raw).on(day)
}

/// Clock pinned to a naive local wall-clock instant.
pub struct FixedClock(Mutex<NaiveDateTime>);

impl FixedClock {
    pub fn at(now: NaiveDateTime) -> Arc<Self> {
        Arc::new(Self(Mutex::new(now)))
    }
}

impl Clock for FixedClock {
    fn local(&self) -> DateTime<Local> {
        let now = *self.0.lock().unwrap();
        Local.from_local_datetime(&now).earliest().unwrap()
    }

    fn utc(&self) -> DateTime<Utc> {
        self.local().with_timezone(&Utc)
    }
}

pub fn booking_for(court_id: Uuid, day: NaiveDate, times: &[&str]) -> Booking {
    let slot_times: Vec<SlotTime> = times.iter().map(|raw| time(raw)).collect();
    Booking {
        id: Uuid::new_v4(),
        user_id: Uuid::new_v4(),
        venue_id: Uuid::nil(),
        court_id,
        date: day,
        time: slot_times[0],
        duration: slot_times.len() as u32,
        total_amount: 500 * slot_times.len() as i64,
        status: BookingStatus::Confirmed,
        slot_times,
        customer_name: "Stefan".into(),
        customer_email: "stefan@example.com".into(),
        customer_phone: None,
        venue_name: "Riverside Sports Arena".into(),
        court_name: "Court 1".into(),
        sport: "Badminton".into(),
        cancellation_reason: None,
        created_at: day.and_hms_opt(8, 0, 0).unwrap(),
        cancelled_at: None,
    }
}

/// A backend seeded with one venue, one court and one user.
pub struct Fixture<T> {
    pub backend: T,
    pub venue: Venue,
    pub court: Court,
    pub user: User,
}

impl Fixture<LocalBackend> {
    pub fn new() -> Self {
        let backend = LocalBackend::default();
        let venue = Venue {
            id: Uuid::new_v4(),
            name: "Riverside Sports Arena".into(),
        };
        let court = Court {
            id: Uuid::new_v4(),
            venue_id: venue.id,
            name: "Court 1".into(),
            sport: "Badminton".into(),
        };
        let user = User {
            id: Uuid::new_v4(),
            name: "Stefan".into(),
            email: "stefan@example.com".into(),
            phone: Some("+43 660 1234567".into()),
        };
        backend.insert_venue(venue.clone()).unwrap();
        backend.insert_court(court.clone()).unwrap();
        backend.insert_user(user.clone()).unwrap();
        Self {
            backend,
            venue,
            court,
            user,
        }
    }

    pub fn mocked(self) -> Fixture<MockBackend> {
        Fixture {
            backend: MockBackend::new(self.backend),
            venue: self.venue,
            court: self.court,
            user: self.user,
        }
    }
}

impl<T: TimeslotBackend> Fixture<T> {
    pub fn add_slot(&self, day: NaiveDate, raw: &str, price: i64) -> Timeslot {
        self.backend
            .create_slot(NewTimeslot {
                venue_id: self.venue.id,
                court_id: self.court.id,
                date: day,
                time: time(raw),
                price,
                is_available: true,
            })
            .unwrap()
    }

    pub fn slots(&self, day: NaiveDate) -> Vec<Timeslot> {
        self.backend
            .find_slots(&SlotFilter {
                venue_id: Some(self.venue.id),
                court_id: Some(self.court.id),
                date: Some(day),
            })
            .unwrap()
    }

    pub fn availability(&self, day: NaiveDate) -> Vec<(String, bool)> {
        self.slots(day)
            .into_iter()
            .map(|timeslot| (timeslot.time.to_string(), timeslot.is_available))
            .collect()
    }
}

pub struct MockBackendInner {
    pub success: AtomicBool,
    pub calls_to_find_slots: AtomicU64,
    pub calls_to_delete_slots_before: AtomicU64,
    pub calls_to_delete_slots: AtomicU64,
    pub calls_to_create_booking: AtomicU64,
    pub calls_to_schedule_reminders: AtomicU64,
    pub local: LocalBackend,
}

/// Counts calls and delegates to a [`LocalBackend`] until `success` is switched off.
#[derive(Clone)]
pub struct MockBackend(pub Arc<MockBackendInner>);

impl MockBackend {
    pub fn new(local: LocalBackend) -> Self {
        Self(Arc::new(MockBackendInner {
            success: AtomicBool::new(true),
            calls_to_find_slots: AtomicU64::default(),
            calls_to_delete_slots_before: AtomicU64::default(),
            calls_to_delete_slots: AtomicU64::default(),
            calls_to_create_booking: AtomicU64::default(),
            calls_to_schedule_reminders: AtomicU64::default(),
            local,
        }))
    }

    pub fn calls(counter: &AtomicU64) -> u64 {
        counter.load(Ordering::SeqCst)
    }

    fn result(&self) -> Result<(), BackendError> {
        match self.0.success.load(Ordering::SeqCst) {
            true => Ok(()),
            false => Err(BackendError::Storage("Supposed to fail".into())),
        }
    }
}

impl TimeslotBackend for MockBackend {
    fn create_slot(&self, slot: NewTimeslot) -> Result<Timeslot, BackendError> {
        self.result()?;
        self.0.local.create_slot(slot)
    }

    fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Timeslot>, BackendError> {
        self.0.calls_to_find_slots.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0.local.find_slots(filter)
    }

    fn set_availability(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        time: SlotTime,
        available: bool,
    ) -> Result<bool, BackendError> {
        self.result()?;
        self.0.local.set_availability(court_id, date, time, available)
    }

    fn delete_slots_before(&self, date: NaiveDate) -> Result<usize, BackendError> {
        self.0
            .calls_to_delete_slots_before
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0.local.delete_slots_before(date)
    }

    fn delete_slots(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        times: &[SlotTime],
    ) -> Result<usize, BackendError> {
        self.0.calls_to_delete_slots.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0.local.delete_slots(court_id, date, times)
    }
}

impl BookingBackend for MockBackend {
    fn create_booking(&self, booking: &Booking) -> Result<(), BackendError> {
        self.0.calls_to_create_booking.fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0.local.create_booking(booking)
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, BackendError> {
        self.result()?;
        self.0.local.booking(id)
    }

    fn cancel_booking(
        &self,
        id: Uuid,
        reason: Option<String>,
        cancelled_at: NaiveDateTime,
    ) -> Result<Booking, BackendError> {
        self.result()?;
        self.0.local.cancel_booking(id, reason, cancelled_at)
    }
}

impl ReminderBackend for MockBackend {
    fn schedule_reminders(&self, reminders: &[Reminder]) -> Result<(), BackendError> {
        self.0
            .calls_to_schedule_reminders
            .fetch_add(1, Ordering::SeqCst);
        self.result()?;
        self.0.local.schedule_reminders(reminders)
    }

    fn remove_reminders(&self, booking_id: Uuid) -> Result<usize, BackendError> {
        self.result()?;
        self.0.local.remove_reminders(booking_id)
    }

    fn take_due_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, BackendError> {
        self.result()?;
        self.0.local.take_due_reminders(now)
    }
}

impl DirectoryBackend for MockBackend {
    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError> {
        self.result()?;
        self.0.local.user(id)
    }

    fn venue(&self, id: Uuid) -> Result<Option<Venue>, BackendError> {
        self.result()?;
        self.0.local.venue(id)
    }

    fn court(&self, venue_id: Uuid, court_id: Uuid) -> Result<Option<Court>, BackendError> {
        self.result()?;
        self.0.local.court(venue_id, court_id)
    }
}
