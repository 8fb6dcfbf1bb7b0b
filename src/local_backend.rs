use crate::backend::{
    BackendError, BookingBackend, DirectoryBackend, ReminderBackend, TimeslotBackend,
};
use crate::types::{
    Booking, BookingStatus, Court, NewTimeslot, Reminder, SlotFilter, SlotKey, SlotTime, Timeslot,
    User, Venue,
};
use chrono::{Duration, NaiveDate, NaiveDateTime};
use std::{
    collections::{BTreeMap, HashMap},
    sync::{Arc, Mutex, MutexGuard},
};
use tracing::{info, warn};
use uuid::Uuid;

#[derive(Debug, Default)]
struct LocalState {
    timeslots: BTreeMap<SlotKey, Timeslot>,
    bookings: HashMap<Uuid, Booking>,
    reminders: BTreeMap<String, Reminder>,
    users: HashMap<Uuid, User>,
    venues: HashMap<Uuid, Venue>,
    courts: HashMap<Uuid, Court>,
}

/// In-memory backend. Nothing survives a restart, pending reminders included.
///
/// All state sits behind one mutex, so claiming slots and inserting the booking happen in a
/// single critical section.
#[derive(Debug, Clone, Default)]
pub struct LocalBackend {
    state: Arc<Mutex<LocalState>>,
}

impl LocalBackend {
    fn lock(&self) -> Result<MutexGuard<'_, LocalState>, BackendError> {
        self.state
            .lock()
            .map_err(|_| BackendError::Storage("local state lock poisoned".into()))
    }

    pub fn insert_user(&self, user: User) -> Result<(), BackendError> {
        self.lock()?.users.insert(user.id, user);
        Ok(())
    }

    pub fn insert_venue(&self, venue: Venue) -> Result<(), BackendError> {
        self.lock()?.venues.insert(venue.id, venue);
        Ok(())
    }

    pub fn insert_court(&self, court: Court) -> Result<(), BackendError> {
        self.lock()?.courts.insert(court.id, court);
        Ok(())
    }

    /// Seeds one venue with a single court, a demo player and hourly slots for the coming days.
    pub fn insert_example_data(&self, today: NaiveDate) -> Result<(), BackendError> {
        const NUMBER_OF_EXAMPLE_DAYS: i64 = 5;
        const OPENING_HOUR: u16 = 6;
        const CLOSING_HOUR: u16 = 22;

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
            name: "Demo Player".into(),
            email: "player@example.com".into(),
            phone: None,
        };
        info!(venue_id = %venue.id, court_id = %court.id, user_id = %user.id, "Inserting example data");

        for day in 0..NUMBER_OF_EXAMPLE_DAYS {
            let date = today + Duration::days(day);
            for hour in OPENING_HOUR..CLOSING_HOUR {
                let Some(time) = SlotTime::from_hm(hour, 0) else {
                    continue;
                };
                let price = if (18..21).contains(&hour) { 800 } else { 500 };
                self.create_slot(NewTimeslot {
                    venue_id: venue.id,
                    court_id: court.id,
                    date,
                    time,
                    price,
                    is_available: true,
                })?;
            }
        }

        self.insert_venue(venue)?;
        self.insert_court(court)?;
        self.insert_user(user)
    }
}

impl TimeslotBackend for LocalBackend {
    fn create_slot(&self, slot: NewTimeslot) -> Result<Timeslot, BackendError> {
        let timeslot = Timeslot {
            id: Uuid::new_v4(),
            venue_id: slot.venue_id,
            court_id: slot.court_id,
            date: slot.date,
            time: slot.time,
            price: slot.price,
            is_available: slot.is_available,
        };

        let mut state = self.lock()?;
        if state.timeslots.contains_key(&timeslot.key()) {
            return Err(BackendError::DuplicateSlot);
        }
        state.timeslots.insert(timeslot.key(), timeslot.clone());
        Ok(timeslot)
    }

    fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Timeslot>, BackendError> {
        let mut timeslots: Vec<Timeslot> = self
            .lock()?
            .timeslots
            .values()
            .filter(|timeslot| filter.matches(timeslot))
            .cloned()
            .collect();
        timeslots.sort_by(|a, b| (a.date, a.time).cmp(&(b.date, b.time)));
        Ok(timeslots)
    }

    fn set_availability(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        time: SlotTime,
        available: bool,
    ) -> Result<bool, BackendError> {
        let key = SlotKey {
            court_id,
            date,
            time,
        };
        match self.lock()?.timeslots.get_mut(&key) {
            Some(timeslot) => {
                timeslot.is_available = available;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn delete_slots_before(&self, date: NaiveDate) -> Result<usize, BackendError> {
        let mut state = self.lock()?;
        let before = state.timeslots.len();
        state.timeslots.retain(|key, _| key.date >= date);
        Ok(before - state.timeslots.len())
    }

    fn delete_slots(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        times: &[SlotTime],
    ) -> Result<usize, BackendError> {
        let mut state = self.lock()?;
        let removed = times
            .iter()
            .filter(|time| {
                let key = SlotKey {
                    court_id,
                    date,
                    time: **time,
                };
                state.timeslots.remove(&key).is_some()
            })
            .count();
        Ok(removed)
    }
}

impl BookingBackend for LocalBackend {
    fn create_booking(&self, booking: &Booking) -> Result<(), BackendError> {
        let mut state = self.lock()?;

        let unavailable: Vec<SlotTime> = booking
            .slot_keys()
            .filter(|key| {
                !state
                    .timeslots
                    .get(key)
                    .is_some_and(|timeslot| timeslot.is_available)
            })
            .map(|key| key.time)
            .collect();
        if !unavailable.is_empty() {
            return Err(BackendError::SlotsUnavailable(unavailable));
        }

        for key in booking.slot_keys() {
            if let Some(timeslot) = state.timeslots.get_mut(&key) {
                timeslot.is_available = false;
            }
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, BackendError> {
        Ok(self.lock()?.bookings.get(&id).cloned())
    }

    fn cancel_booking(
        &self,
        id: Uuid,
        reason: Option<String>,
        cancelled_at: NaiveDateTime,
    ) -> Result<Booking, BackendError> {
        let mut state = self.lock()?;
        let booking = state
            .bookings
            .get_mut(&id)
            .ok_or(BackendError::BookingNotFound(id))?;
        if booking.status == BookingStatus::Cancelled {
            return Err(BackendError::AlreadyCancelled(id));
        }
        booking.status = BookingStatus::Cancelled;
        booking.cancellation_reason = reason;
        booking.cancelled_at = Some(cancelled_at);
        let booking = booking.clone();

        for key in booking.slot_keys() {
            match state.timeslots.get_mut(&key) {
                Some(timeslot) => timeslot.is_available = true,
                None => {
                    warn!(booking_id = %id, date = %key.date, time = %key.time, "Timeslot to release no longer exists")
                }
            }
        }
        Ok(booking)
    }
}

impl ReminderBackend for LocalBackend {
    fn schedule_reminders(&self, reminders: &[Reminder]) -> Result<(), BackendError> {
        let mut state = self.lock()?;
        for reminder in reminders {
            state.reminders.insert(reminder.key.clone(), reminder.clone());
        }
        Ok(())
    }

    fn remove_reminders(&self, booking_id: Uuid) -> Result<usize, BackendError> {
        let prefix = format!("{booking_id}-");
        let mut state = self.lock()?;
        let before = state.reminders.len();
        state.reminders.retain(|key, _| !key.starts_with(&prefix));
        Ok(before - state.reminders.len())
    }

    fn take_due_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, BackendError> {
        let mut state = self.lock()?;
        let due_keys: Vec<String> = state
            .reminders
            .values()
            .filter(|reminder| reminder.due_at <= now)
            .map(|reminder| reminder.key.clone())
            .collect();
        let mut due: Vec<Reminder> = due_keys
            .iter()
            .filter_map(|key| state.reminders.remove(key))
            .collect();
        due.sort_by_key(|reminder| reminder.due_at);
        Ok(due)
    }
}

impl DirectoryBackend for LocalBackend {
    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError> {
        Ok(self.lock()?.users.get(&id).cloned())
    }

    fn venue(&self, id: Uuid) -> Result<Option<Venue>, BackendError> {
        Ok(self.lock()?.venues.get(&id).cloned())
    }

    fn court(&self, venue_id: Uuid, court_id: Uuid) -> Result<Option<Court>, BackendError> {
        Ok(self
            .lock()?
            .courts
            .get(&court_id)
            .filter(|court| court.venue_id == venue_id)
            .cloned())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::testutils::{booking_for, date, time};
    use crate::types::ReminderWindow;

    fn new_slot(court_id: Uuid, date: NaiveDate, time: SlotTime) -> NewTimeslot {
        NewTimeslot {
            venue_id: Uuid::nil(),
            court_id,
            date,
            time,
            price: 500,
            is_available: true,
        }
    }

    #[test]
    fn test_create_and_find_slots_in_time_order() {
        let local_backend = LocalBackend::default();
        let court_id = Uuid::new_v4();
        let day = date(2025, 1, 10);

        for raw in ["20:00", "18:00", "19:00"] {
            local_backend
                .create_slot(new_slot(court_id, day, time(raw)))
                .unwrap();
        }
        local_backend
            .create_slot(new_slot(Uuid::new_v4(), day, time("07:00")))
            .unwrap();

        let filter = SlotFilter {
            court_id: Some(court_id),
            ..SlotFilter::default()
        };
        let timeslots = local_backend.find_slots(&filter).unwrap();
        let times: Vec<String> = timeslots.iter().map(|t| t.time.to_string()).collect();
        assert_eq!(times, vec!["18:00", "19:00", "20:00"]);
        assert!(timeslots.iter().all(|t| t.is_available));
    }

    #[test]
    fn test_reject_duplicate_slot() {
        let local_backend = LocalBackend::default();
        let court_id = Uuid::new_v4();
        let day = date(2025, 1, 10);

        local_backend
            .create_slot(new_slot(court_id, day, time("18:00")))
            .unwrap();
        let err = local_backend
            .create_slot(new_slot(court_id, day, time("18:00")))
            .unwrap_err();
        assert_eq!(err, BackendError::DuplicateSlot);

        // same time on another day is a different slot
        local_backend
            .create_slot(new_slot(court_id, date(2025, 1, 11), time("18:00")))
            .unwrap();
    }

    #[test]
    fn test_set_availability_of_missing_slot_is_soft() {
        let local_backend = LocalBackend::default();
        let court_id = Uuid::new_v4();
        let day = date(2025, 1, 10);

        assert!(!local_backend
            .set_availability(court_id, day, time("18:00"), true)
            .unwrap());

        local_backend
            .create_slot(new_slot(court_id, day, time("18:00")))
            .unwrap();
        assert!(local_backend
            .set_availability(court_id, day, time("18:00"), false)
            .unwrap());
        assert!(local_backend
            .set_availability(court_id, day, time("18:00"), false)
            .unwrap());
        let timeslots = local_backend.find_slots(&SlotFilter::default()).unwrap();
        assert!(!timeslots[0].is_available);
    }

    #[test]
    fn test_delete_slots_before_and_by_key() {
        let local_backend = LocalBackend::default();
        let court_id = Uuid::new_v4();

        local_backend
            .create_slot(new_slot(court_id, date(2025, 1, 8), time("18:00")))
            .unwrap();
        local_backend
            .create_slot(new_slot(court_id, date(2025, 1, 9), time("18:00")))
            .unwrap();
        local_backend
            .create_slot(new_slot(court_id, date(2025, 1, 10), time("08:00")))
            .unwrap();
        local_backend
            .create_slot(new_slot(court_id, date(2025, 1, 10), time("18:00")))
            .unwrap();

        assert_eq!(local_backend.delete_slots_before(date(2025, 1, 10)).unwrap(), 2);
        assert_eq!(
            local_backend
                .delete_slots(court_id, date(2025, 1, 10), &[time("08:00"), time("09:00")])
                .unwrap(),
            1
        );

        let timeslots = local_backend.find_slots(&SlotFilter::default()).unwrap();
        assert_eq!(timeslots.len(), 1);
        assert_eq!(timeslots[0].time, time("18:00"));
    }

    #[test]
    fn test_create_booking_claims_all_slots_or_none() {
        let local_backend = LocalBackend::default();
        let court_id = Uuid::new_v4();
        let day = date(2025, 1, 10);
        for raw in ["18:00", "19:00", "20:00"] {
            local_backend
                .create_slot(new_slot(court_id, day, time(raw)))
                .unwrap();
        }

        let first = booking_for(court_id, day, &["19:00", "20:00"]);
        local_backend.create_booking(&first).unwrap();

        let overlapping = booking_for(court_id, day, &["18:00", "19:00"]);
        let err = local_backend.create_booking(&overlapping).unwrap_err();
        assert_eq!(err, BackendError::SlotsUnavailable(vec![time("19:00")]));

        // 18:00 must not have been claimed by the failed attempt
        let timeslots = local_backend.find_slots(&SlotFilter::default()).unwrap();
        let availability: Vec<bool> = timeslots.iter().map(|t| t.is_available).collect();
        assert_eq!(availability, vec![true, false, false]);
        assert!(local_backend.booking(overlapping.id).unwrap().is_none());
        assert_eq!(local_backend.booking(first.id).unwrap(), Some(first));
    }

    #[test]
    fn test_create_booking_requires_existing_slots() {
        let local_backend = LocalBackend::default();
        let booking = booking_for(Uuid::new_v4(), date(2025, 1, 10), &["18:00"]);

        let err = local_backend.create_booking(&booking).unwrap_err();
        assert_eq!(err, BackendError::SlotsUnavailable(vec![time("18:00")]));
    }

    #[test]
    fn test_cancel_booking_releases_its_slots() {
        let local_backend = LocalBackend::default();
        let court_id = Uuid::new_v4();
        let day = date(2025, 1, 10);
        for raw in ["18:00", "19:00", "20:00"] {
            local_backend
                .create_slot(new_slot(court_id, day, time(raw)))
                .unwrap();
        }
        let booking = booking_for(court_id, day, &["18:00", "19:00", "20:00"]);
        local_backend.create_booking(&booking).unwrap();
        local_backend
            .delete_slots(court_id, day, &[time("19:00")])
            .unwrap();

        local_backend
            .cancel_booking(booking.id, None, day.and_hms_opt(9, 0, 0).unwrap())
            .unwrap();

        let availability: Vec<(String, bool)> = local_backend
            .find_slots(&SlotFilter {
                court_id: Some(court_id),
                ..Default::default()
            })
            .unwrap()
            .into_iter()
            .map(|timeslot| (timeslot.time.to_string(), timeslot.is_available))
            .collect();
        assert_eq!(
            availability,
            vec![("18:00".into(), true), ("20:00".into(), true)]
        );
    }

    #[test]
    fn test_cancel_booking_only_once() {
        let local_backend = LocalBackend::default();
        let court_id = Uuid::new_v4();
        let day = date(2025, 1, 10);
        local_backend
            .create_slot(new_slot(court_id, day, time("18:00")))
            .unwrap();
        let booking = booking_for(court_id, day, &["18:00"]);
        local_backend.create_booking(&booking).unwrap();

        let cancelled_at = day.and_hms_opt(9, 0, 0).unwrap();
        let cancelled = local_backend
            .cancel_booking(booking.id, Some("Rain".into()), cancelled_at)
            .unwrap();
        assert_eq!(cancelled.status, BookingStatus::Cancelled);
        assert_eq!(cancelled.cancellation_reason.as_deref(), Some("Rain"));
        assert_eq!(cancelled.cancelled_at, Some(cancelled_at));

        let err = local_backend
            .cancel_booking(booking.id, None, cancelled_at)
            .unwrap_err();
        assert_eq!(err, BackendError::AlreadyCancelled(booking.id));

        let missing = Uuid::new_v4();
        let err = local_backend
            .cancel_booking(missing, None, cancelled_at)
            .unwrap_err();
        assert_eq!(err, BackendError::BookingNotFound(missing));
    }

    #[test]
    fn test_reminders_are_taken_once_and_removed_by_prefix() {
        let local_backend = LocalBackend::default();
        let first = Uuid::new_v4();
        let second = Uuid::new_v4();
        let day = date(2025, 1, 10);
        let reminder = |booking_id, window: ReminderWindow, hour| Reminder {
            key: Reminder::key_for(booking_id, window),
            booking_id,
            window,
            due_at: day.and_hms_opt(hour, 0, 0).unwrap(),
        };

        local_backend
            .schedule_reminders(&[
                reminder(first, ReminderWindow::TwoHoursBefore, 16),
                reminder(first, ReminderWindow::HalfHourBefore, 17),
                reminder(second, ReminderWindow::TwoHoursBefore, 10),
            ])
            .unwrap();

        let due = local_backend
            .take_due_reminders(day.and_hms_opt(16, 0, 0).unwrap())
            .unwrap();
        let keys: Vec<&str> = due.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(
            keys,
            vec![
                Reminder::key_for(second, ReminderWindow::TwoHoursBefore),
                Reminder::key_for(first, ReminderWindow::TwoHoursBefore)
            ]
        );
        assert!(local_backend
            .take_due_reminders(day.and_hms_opt(16, 0, 0).unwrap())
            .unwrap()
            .is_empty());

        assert_eq!(local_backend.remove_reminders(first).unwrap(), 1);
        assert!(local_backend
            .take_due_reminders(day.and_hms_opt(23, 0, 0).unwrap())
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_court_lookup_is_scoped_to_its_venue() {
        let local_backend = LocalBackend::default();
        let court = Court {
            id: Uuid::new_v4(),
            venue_id: Uuid::new_v4(),
            name: "Court 1".into(),
            sport: "Tennis".into(),
        };
        local_backend.insert_court(court.clone()).unwrap();

        assert_eq!(
            local_backend.court(court.venue_id, court.id).unwrap(),
            Some(court.clone())
        );
        assert_eq!(local_backend.court(Uuid::new_v4(), court.id).unwrap(), None);
    }

    #[test]
    fn test_insert_example_data() {
        let local_backend = LocalBackend::default();
        local_backend.insert_example_data(date(2025, 1, 10)).unwrap();

        let timeslots = local_backend.find_slots(&SlotFilter::default()).unwrap();
        assert_eq!(timeslots.len(), 5 * 16);
        let first = &timeslots[0];
        assert_eq!(first.date, date(2025, 1, 10));
        assert_eq!(first.time, time("06:00"));
        assert!(local_backend
            .court(first.venue_id, first.court_id)
            .unwrap()
            .is_some());
        assert!(local_backend.venue(first.venue_id).unwrap().is_some());
    }
}
