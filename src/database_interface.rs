use crate::backend::{
    BackendError, BookingBackend, DirectoryBackend, ReminderBackend, TimeslotBackend,
};
use crate::schema::{bookings, courts, reminders, timeslots, users, venues};
use crate::types::{
    Booking, BookingStatus, Court, NewTimeslot, Reminder, SlotFilter, SlotTime, Timeslot, User,
    Venue,
};
use chrono::{NaiveDate, NaiveDateTime};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::{
    Connection, ConnectionError, ExpressionMethods, OptionalExtension, PgConnection, QueryDsl,
    RunQueryDsl, SelectableHelper, TextExpressionMethods,
};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;
use uuid::Uuid;

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = timeslots)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct TimeslotRow {
    id: Uuid,
    venue_id: Uuid,
    court_id: Uuid,
    date: NaiveDate,
    time: i16,
    price: i64,
    is_available: bool,
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = bookings)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct BookingRow {
    id: Uuid,
    user_id: Uuid,
    venue_id: Uuid,
    court_id: Uuid,
    date: NaiveDate,
    time: i16,
    duration: i32,
    total_amount: i64,
    status: String,
    slot_times: Vec<i16>,
    customer_name: String,
    customer_email: String,
    customer_phone: Option<String>,
    venue_name: String,
    court_name: String,
    sport: String,
    cancellation_reason: Option<String>,
    created_at: NaiveDateTime,
    cancelled_at: Option<NaiveDateTime>,
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = reminders)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct ReminderRow {
    key: String,
    booking_id: Uuid,
    reminder_window: String,
    due_at: NaiveDateTime,
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = users)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct UserRow {
    id: Uuid,
    name: String,
    email: String,
    phone: Option<String>,
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = venues)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct VenueRow {
    id: Uuid,
    name: String,
}

#[derive(Queryable, Selectable, Insertable)]
#[diesel(table_name = courts)]
#[diesel(check_for_backend(diesel::pg::Pg))]
struct CourtRow {
    id: Uuid,
    venue_id: Uuid,
    name: String,
    sport: String,
}

impl From<DieselError> for BackendError {
    fn from(err: DieselError) -> Self {
        BackendError::Storage(err.to_string())
    }
}

fn slot_time(minutes: i16) -> Result<SlotTime, BackendError> {
    u16::try_from(minutes)
        .ok()
        .and_then(SlotTime::from_minutes)
        .ok_or_else(|| BackendError::Storage(format!("stored time {minutes} is out of range")))
}

fn minutes(time: SlotTime) -> i16 {
    // SlotTime never exceeds 23:59
    time.minutes() as i16
}

impl TryFrom<TimeslotRow> for Timeslot {
    type Error = BackendError;

    fn try_from(row: TimeslotRow) -> Result<Self, Self::Error> {
        Ok(Timeslot {
            id: row.id,
            venue_id: row.venue_id,
            court_id: row.court_id,
            date: row.date,
            time: slot_time(row.time)?,
            price: row.price,
            is_available: row.is_available,
        })
    }
}

impl From<&Booking> for BookingRow {
    fn from(booking: &Booking) -> Self {
        BookingRow {
            id: booking.id,
            user_id: booking.user_id,
            venue_id: booking.venue_id,
            court_id: booking.court_id,
            date: booking.date,
            time: minutes(booking.time),
            duration: booking.duration as i32,
            total_amount: booking.total_amount,
            status: booking.status.as_str().to_string(),
            slot_times: booking.slot_times.iter().copied().map(minutes).collect(),
            customer_name: booking.customer_name.clone(),
            customer_email: booking.customer_email.clone(),
            customer_phone: booking.customer_phone.clone(),
            venue_name: booking.venue_name.clone(),
            court_name: booking.court_name.clone(),
            sport: booking.sport.clone(),
            cancellation_reason: booking.cancellation_reason.clone(),
            created_at: booking.created_at,
            cancelled_at: booking.cancelled_at,
        }
    }
}

impl TryFrom<BookingRow> for Booking {
    type Error = BackendError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        Ok(Booking {
            id: row.id,
            user_id: row.user_id,
            venue_id: row.venue_id,
            court_id: row.court_id,
            date: row.date,
            time: slot_time(row.time)?,
            duration: u32::try_from(row.duration)
                .map_err(|_| BackendError::Storage(format!("negative duration {}", row.duration)))?,
            total_amount: row.total_amount,
            status: row.status.parse().map_err(BackendError::Storage)?,
            slot_times: row
                .slot_times
                .into_iter()
                .map(slot_time)
                .collect::<Result<_, _>>()?,
            customer_name: row.customer_name,
            customer_email: row.customer_email,
            customer_phone: row.customer_phone,
            venue_name: row.venue_name,
            court_name: row.court_name,
            sport: row.sport,
            cancellation_reason: row.cancellation_reason,
            created_at: row.created_at,
            cancelled_at: row.cancelled_at,
        })
    }
}

impl From<&Reminder> for ReminderRow {
    fn from(reminder: &Reminder) -> Self {
        ReminderRow {
            key: reminder.key.clone(),
            booking_id: reminder.booking_id,
            reminder_window: reminder.window.label().to_string(),
            due_at: reminder.due_at,
        }
    }
}

impl TryFrom<ReminderRow> for Reminder {
    type Error = BackendError;

    fn try_from(row: ReminderRow) -> Result<Self, Self::Error> {
        Ok(Reminder {
            key: row.key,
            booking_id: row.booking_id,
            window: row.reminder_window.parse().map_err(BackendError::Storage)?,
            due_at: row.due_at,
        })
    }
}

/// PostgreSQL backend. Schema lives in `migrations/`.
#[derive(Clone)]
pub struct DatabaseInterface {
    connection: Arc<Mutex<PgConnection>>,
}

impl DatabaseInterface {
    pub fn new(database_url: &str) -> Result<Self, ConnectionError> {
        let connection = PgConnection::establish(database_url)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    fn connection(&self) -> Result<MutexGuard<'_, PgConnection>, BackendError> {
        self.connection
            .lock()
            .map_err(|_| BackendError::Storage("database connection lock poisoned".into()))
    }
}

#[cfg(test)]
impl DatabaseInterface {
    pub fn insert_venue(&self, venue: Venue) -> Result<(), BackendError> {
        let row = VenueRow {
            id: venue.id,
            name: venue.name,
        };
        diesel::insert_into(venues::table)
            .values(&row)
            .execute(&mut *self.connection()?)?;
        Ok(())
    }

    pub fn insert_court(&self, court: Court) -> Result<(), BackendError> {
        let row = CourtRow {
            id: court.id,
            venue_id: court.venue_id,
            name: court.name,
            sport: court.sport,
        };
        diesel::insert_into(courts::table)
            .values(&row)
            .execute(&mut *self.connection()?)?;
        Ok(())
    }
}

impl TimeslotBackend for DatabaseInterface {
    fn create_slot(&self, slot: NewTimeslot) -> Result<Timeslot, BackendError> {
        let row = TimeslotRow {
            id: Uuid::new_v4(),
            venue_id: slot.venue_id,
            court_id: slot.court_id,
            date: slot.date,
            time: minutes(slot.time),
            price: slot.price,
            is_available: slot.is_available,
        };

        let mut connection = self.connection()?;
        let created = diesel::insert_into(timeslots::table)
            .values(&row)
            .returning(TimeslotRow::as_returning())
            .get_result(&mut *connection)
            .map_err(|err| match err {
                DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                    BackendError::DuplicateSlot
                }
                err => err.into(),
            })?;
        created.try_into()
    }

    fn find_slots(&self, filter: &SlotFilter) -> Result<Vec<Timeslot>, BackendError> {
        let mut query = timeslots::table
            .select(TimeslotRow::as_select())
            .into_boxed();
        if let Some(venue_id) = filter.venue_id {
            query = query.filter(timeslots::venue_id.eq(venue_id));
        }
        if let Some(court_id) = filter.court_id {
            query = query.filter(timeslots::court_id.eq(court_id));
        }
        if let Some(date) = filter.date {
            query = query.filter(timeslots::date.eq(date));
        }

        let rows = query
            .order((timeslots::date.asc(), timeslots::time.asc()))
            .load(&mut *self.connection()?)?;
        rows.into_iter().map(Timeslot::try_from).collect()
    }

    fn set_availability(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        time: SlotTime,
        available: bool,
    ) -> Result<bool, BackendError> {
        let updated = diesel::update(
            timeslots::table
                .filter(timeslots::court_id.eq(court_id))
                .filter(timeslots::date.eq(date))
                .filter(timeslots::time.eq(minutes(time))),
        )
        .set(timeslots::is_available.eq(available))
        .execute(&mut *self.connection()?)?;
        Ok(updated > 0)
    }

    fn delete_slots_before(&self, date: NaiveDate) -> Result<usize, BackendError> {
        let deleted = diesel::delete(timeslots::table.filter(timeslots::date.lt(date)))
            .execute(&mut *self.connection()?)?;
        Ok(deleted)
    }

    fn delete_slots(
        &self,
        court_id: Uuid,
        date: NaiveDate,
        times: &[SlotTime],
    ) -> Result<usize, BackendError> {
        let times: Vec<i16> = times.iter().copied().map(minutes).collect();
        let deleted = diesel::delete(
            timeslots::table
                .filter(timeslots::court_id.eq(court_id))
                .filter(timeslots::date.eq(date))
                .filter(timeslots::time.eq_any(times)),
        )
        .execute(&mut *self.connection()?)?;
        Ok(deleted)
    }
}

impl BookingBackend for DatabaseInterface {
    fn create_booking(&self, booking: &Booking) -> Result<(), BackendError> {
        let requested: Vec<i16> = booking.slot_times.iter().copied().map(minutes).collect();
        let row = BookingRow::from(booking);

        self.connection()?
            .transaction::<_, BackendError, _>(|connection| {
                // lock the free slots of the range so a concurrent claim waits for this one
                let free: Vec<i16> = timeslots::table
                    .select(timeslots::time)
                    .filter(timeslots::court_id.eq(booking.court_id))
                    .filter(timeslots::date.eq(booking.date))
                    .filter(timeslots::time.eq_any(&requested))
                    .filter(timeslots::is_available.eq(true))
                    .for_update()
                    .load(connection)?;

                let unavailable: Vec<SlotTime> = booking
                    .slot_times
                    .iter()
                    .copied()
                    .filter(|time| !free.contains(&minutes(*time)))
                    .collect();
                if !unavailable.is_empty() {
                    return Err(BackendError::SlotsUnavailable(unavailable));
                }

                let claimed = diesel::update(
                    timeslots::table
                        .filter(timeslots::court_id.eq(booking.court_id))
                        .filter(timeslots::date.eq(booking.date))
                        .filter(timeslots::time.eq_any(&requested))
                        .filter(timeslots::is_available.eq(true)),
                )
                .set(timeslots::is_available.eq(false))
                .execute(connection)?;
                if claimed != requested.len() {
                    return Err(BackendError::SlotsUnavailable(booking.slot_times.clone()));
                }

                diesel::insert_into(bookings::table)
                    .values(&row)
                    .execute(connection)?;
                Ok(())
            })
    }

    fn booking(&self, id: Uuid) -> Result<Option<Booking>, BackendError> {
        bookings::table
            .find(id)
            .select(BookingRow::as_select())
            .first(&mut *self.connection()?)
            .optional()?
            .map(Booking::try_from)
            .transpose()
    }

    fn cancel_booking(
        &self,
        id: Uuid,
        reason: Option<String>,
        cancelled_at: NaiveDateTime,
    ) -> Result<Booking, BackendError> {
        self.connection()?
            .transaction::<_, BackendError, _>(|connection| {
                let cancelled = diesel::update(
                    bookings::table
                        .find(id)
                        .filter(bookings::status.eq(BookingStatus::Confirmed.as_str())),
                )
                .set((
                    bookings::status.eq(BookingStatus::Cancelled.as_str()),
                    bookings::cancellation_reason.eq(reason),
                    bookings::cancelled_at.eq(Some(cancelled_at)),
                ))
                .returning(BookingRow::as_returning())
                .get_result(connection)
                .optional()?;

                let Some(row) = cancelled else {
                    let exists = bookings::table
                        .find(id)
                        .select(bookings::id)
                        .first::<Uuid>(connection)
                        .optional()?
                        .is_some();
                    return Err(match exists {
                        true => BackendError::AlreadyCancelled(id),
                        false => BackendError::BookingNotFound(id),
                    });
                };
                let booking = Booking::try_from(row)?;

                let times: Vec<i16> = booking.slot_times.iter().copied().map(minutes).collect();
                let released = diesel::update(
                    timeslots::table
                        .filter(timeslots::court_id.eq(booking.court_id))
                        .filter(timeslots::date.eq(booking.date))
                        .filter(timeslots::time.eq_any(&times)),
                )
                .set(timeslots::is_available.eq(true))
                .execute(connection)?;
                if released < times.len() {
                    warn!(booking_id = %id, released, claimed = times.len(), "Some timeslots to release no longer exist");
                }
                Ok(booking)
            })
    }
}

impl ReminderBackend for DatabaseInterface {
    fn schedule_reminders(&self, reminders: &[Reminder]) -> Result<(), BackendError> {
        let rows: Vec<ReminderRow> = reminders.iter().map(ReminderRow::from).collect();
        diesel::insert_into(reminders::table)
            .values(&rows)
            .on_conflict(reminders::key)
            .do_nothing()
            .execute(&mut *self.connection()?)?;
        Ok(())
    }

    fn remove_reminders(&self, booking_id: Uuid) -> Result<usize, BackendError> {
        let prefix = format!("{booking_id}-%");
        let removed = diesel::delete(reminders::table.filter(reminders::key.like(prefix)))
            .execute(&mut *self.connection()?)?;
        Ok(removed)
    }

    fn take_due_reminders(&self, now: NaiveDateTime) -> Result<Vec<Reminder>, BackendError> {
        let mut rows: Vec<ReminderRow> =
            diesel::delete(reminders::table.filter(reminders::due_at.le(now)))
                .returning(ReminderRow::as_returning())
                .get_results(&mut *self.connection()?)?;
        rows.sort_by_key(|row| row.due_at);
        rows.into_iter().map(Reminder::try_from).collect()
    }
}

impl DirectoryBackend for DatabaseInterface {
    fn user(&self, id: Uuid) -> Result<Option<User>, BackendError> {
        let row = users::table
            .find(id)
            .select(UserRow::as_select())
            .first(&mut *self.connection()?)
            .optional()?;
        Ok(row.map(|row| User {
            id: row.id,
            name: row.name,
            email: row.email,
            phone: row.phone,
        }))
    }

    fn venue(&self, id: Uuid) -> Result<Option<Venue>, BackendError> {
        let row = venues::table
            .find(id)
            .select(VenueRow::as_select())
            .first(&mut *self.connection()?)
            .optional()?;
        Ok(row.map(|row| Venue {
            id: row.id,
            name: row.name,
        }))
    }

    fn court(&self, venue_id: Uuid, court_id: Uuid) -> Result<Option<Court>, BackendError> {
        let row = courts::table
            .find(court_id)
            .filter(courts::venue_id.eq(venue_id))
            .select(CourtRow::as_select())
            .first(&mut *self.connection()?)
            .optional()?;
        Ok(row.map(|row| Court {
            id: row.id,
            venue_id: row.venue_id,
            name: row.name,
            sport: row.sport,
        }))
    }
}
