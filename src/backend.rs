use crate::types::{
    Booking, Court, NewTimeslot, Reminder, SlotFilter, SlotTime, Timeslot, User, Venue,
};
use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    #[error("a timeslot already exists for this court/date/time")]
    DuplicateSlot,
    /// At least one slot of a claim was missing or already taken. Nothing was changed.
    #[error("timeslots {} are not available", format_times(.0))]
    SlotsUnavailable(Vec<SlotTime>),
    #[error("booking {0} does not exist")]
    BookingNotFound(Uuid),
    #[error("booking {0} is already cancelled")]
    AlreadyCancelled(Uuid),
    #[error("storage failure: {0}")]
    Storage(String),
}

fn format_times(times: &[SlotTime]) -> String {
    times
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub trait TimeslotBackend: Clone + Send + Sync + 'static {
    fn create_slot(&self, slot: NewTimeslot) -> Result<Timeslot, BackendError>;
    /// Matching slots ordered by date, then time.
    fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Timeslot>, BackendError>;
    /// Returns `false` if no such slot exists.
    fn set_availability(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        time: SlotTime,
        available: bool,
    ) -> Result<bool, BackendError>;
    fn delete_slots_before(&self, date: NaiveDate) -> Result<usize, BackendError>;
    fn delete_slots(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        times: &[SlotTime],
    ) -> Result<usize, BackendError>;
}

pub trait BookingBackend: Clone + Send + Sync + 'static {
    /// Claims every slot in `booking.slot_times` and stores the booking as one atomic unit.
    ///
    /// Fails with [`BackendError::SlotsUnavailable`] without any change if a single slot is
    /// missing or already unavailable.
    fn create_booking(&self, booking: &Booking) -> Result<(), BackendError>;
    fn booking(&self, id: Uuid) -> Result<Option<Booking>, BackendError>;
    /// Transitions a confirmed booking to cancelled and makes every slot in its `slot_times`
    /// available again, as one atomic unit. Slots deleted in the meantime are skipped.
    fn cancel_booking(
        &self,
        id: Uuid,
        reason: Option<String>,
        cancelled_at: NaiveDateTime,
    ) -> Result<Booking, BackendError>;
}

pub trait ReminderBackend: Clone + Send + Sync + 'static {
    fn schedule_reminders(&self, reminders: &[Reminder]) -> Result<(), BackendError>;
    /// Removes every reminder whose key starts with the booking id.
    fn remove_reminders(&self, booking_id: Uuid) -> Result<usize, BackendError>;
    /// Removes and returns the reminders due at `now`.
    fn take_due_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, BackendError>;
}

/// Read access to the identities owned by the surrounding application.
pub trait DirectoryBackend: Clone + Send + Sync + 'static {
    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError>;
    fn venue(&self, id: Uuid) -> Result<Option<Venue>, BackendError>;
    fn court(&self, venue_id: Uuid, court_id: Uuid) -> Result<Option<Court>, BackendError>;
}

pub trait Backend: TimeslotBackend + BookingBackend + ReminderBackend + DirectoryBackend {}

impl<T> Backend for T where T: TimeslotBackend + BookingBackend + ReminderBackend + DirectoryBackend
{}
