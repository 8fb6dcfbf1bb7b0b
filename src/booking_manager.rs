use crate::backend::Backend;
use crate::error::BookingError;
use crate::notification::{deliver, BookingNotice, Notifier};
use crate::reminder;
use crate::slot_query::{self, is_past, SlotQuery};
use crate::slot_range::{resolve_span, span_of_selection};
use crate::types::{
    Booking, BookingStatus, NewTimeslot, SlotFilter, SlotTime, Timeslot, MAX_SLOT_PRICE,
    MINUTES_PER_SLOT,
};
use chrono::{NaiveDate, NaiveDateTime};
use mockable::Clock;
use std::{sync::Arc, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

const MINUTES_PER_DAY: u16 = 24 * 60;

/// The hours a client asked for, in the form it sent them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedRange {
    /// `[start, end_minutes)`; 1440 books up to midnight.
    Until { start: SlotTime, end_minutes: u16 },
    Hours { start: SlotTime, hours: u16 },
    /// Individually picked slots, in any order.
    Selection(Vec<SlotTime>),
}

impl RequestedRange {
    /// Start and end minute of the range.
    pub fn span(&self) -> Result<(SlotTime, u16), BookingError> {
        let (start, end_minutes) = match self {
            RequestedRange::Until { start, end_minutes } => (*start, *end_minutes),
            RequestedRange::Hours { start, hours } => {
                let end_minutes = hours
                    .checked_mul(MINUTES_PER_SLOT)
                    .and_then(|length| length.checked_add(start.minutes()))
                    .unwrap_or(u16::MAX);
                (*start, end_minutes)
            }
            RequestedRange::Selection(selected) => span_of_selection(selected).ok_or_else(|| {
                BookingError::InvalidRange("Selected slots must be consecutive".into())
            })?,
        };
        if end_minutes > MINUTES_PER_DAY {
            return Err(BookingError::InvalidRange(
                "Bookings cannot run past midnight".into(),
            ));
        }
        Ok((start, end_minutes))
    }
}

/// A request to book one court. The range is checked only after user, venue and court resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub user_id: Uuid,
    pub venue_id: Uuid,
    pub court_id: Uuid,
    pub date: NaiveDate,
    pub range: RequestedRange,
    pub customer_name: Option<String>,
    pub customer_email: Option<String>,
    pub customer_phone: Option<String>,
    /// Amount the client computed. The stored amount is always recomputed from slot prices.
    pub client_total: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Confirmation {
    pub booking: Booking,
    pub email_sent: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cancellation {
    pub booking: Booking,
    pub refund_amount: i64,
    pub email_sent: bool,
}

/// 90% of the paid amount, rounded half up.
pub fn refund_amount(total_amount: i64) -> i64 {
    // the result never exceeds |total_amount|, so the narrowing cast is lossless
    (i128::from(total_amount) * 9 + 5).div_euclid(10) as i64
}

#[derive(Clone)]
pub struct BookingManager<T: Backend> {
    backend: T,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock + Send + Sync>,
    notification_timeout: Duration,
}

impl<T: Backend> BookingManager<T> {
    pub fn new(
        backend: T,
        notifier: Arc<dyn Notifier>,
        clock: Arc<dyn Clock + Send + Sync>,
        notification_timeout: Duration,
    ) -> Self {
        Self {
            backend,
            notifier,
            clock,
            notification_timeout,
        }
    }

    fn now(&self) -> NaiveDateTime {
        self.clock.local().naive_local()
    }

    pub fn timeslots(&self, query: &SlotQuery) -> Result<Vec<Timeslot>, BookingError> {
        Ok(slot_query::query_slots(&self.backend, query, self.now())?)
    }

    pub fn add_timeslot(&self, slot: NewTimeslot) -> Result<Timeslot, BookingError> {
        if !(1..=MAX_SLOT_PRICE).contains(&slot.price) {
            return Err(BookingError::Validation(format!(
                "Price must be between 1 and {MAX_SLOT_PRICE}"
            )));
        }
        if self.backend.court(slot.venue_id, slot.court_id)?.is_none() {
            return Err(BookingError::NotFound("Court not found".into()));
        }
        let timeslot = self.backend.create_slot(slot)?;
        info!(court_id = %timeslot.court_id, date = %timeslot.date, time = %timeslot.time, "Timeslot added");
        Ok(timeslot)
    }

    pub fn booking(&self, id: Uuid) -> Result<Booking, BookingError> {
        self.backend
            .booking(id)?
            .ok_or_else(|| BookingError::NotFound("Booking not found".into()))
    }

    pub async fn confirm(&self, request: BookingRequest) -> Result<Confirmation, BookingError> {
        let now = self.now();

        let user = self
            .backend
            .user(request.user_id)?
            .ok_or_else(|| BookingError::NotFound("User not found".into()))?;
        let venue = self
            .backend
            .venue(request.venue_id)?
            .ok_or_else(|| BookingError::NotFound("Venue not found".into()))?;
        let court = self
            .backend
            .court(request.venue_id, request.court_id)?
            .ok_or_else(|| BookingError::NotFound("Court not found".into()))?;

        let offered = self.backend.find_slots(&SlotFilter {
            venue_id: Some(venue.id),
            court_id: Some(court.id),
            date: Some(request.date),
        })?;
        let (start, end_minutes) = request.range.span()?;
        let range = resolve_span(&offered, start, end_minutes)?.ok_or_else(|| {
            BookingError::InvalidRange("The venue does not offer every hour of this range".into())
        })?;

        if is_past(request.date, start, now) {
            return Err(BookingError::SlotUnavailable("Timeslot already passed".into()));
        }
        if !range.all_available() {
            return Err(BookingError::SlotUnavailable(
                "Timeslot is already booked".into(),
            ));
        }

        let total_amount = range.total_price().ok_or_else(|| {
            BookingError::Validation("Total amount exceeds the supported range".into())
        })?;
        if let Some(client_total) = request.client_total {
            if client_total != total_amount {
                warn!(client_total, total_amount, "Client total differs from slot prices");
            }
        }

        let booking = Booking {
            id: Uuid::new_v4(),
            user_id: user.id,
            venue_id: venue.id,
            court_id: court.id,
            date: request.date,
            time: start,
            duration: range.duration(),
            total_amount,
            status: BookingStatus::Confirmed,
            slot_times: range.times(),
            customer_name: request.customer_name.unwrap_or(user.name),
            customer_email: request.customer_email.unwrap_or(user.email),
            customer_phone: request.customer_phone.or(user.phone),
            venue_name: venue.name,
            court_name: court.name,
            sport: court.sport,
            cancellation_reason: None,
            created_at: now,
            cancelled_at: None,
        };
        self.backend.create_booking(&booking)?;
        info!(booking_id = %booking.id, court_id = %booking.court_id, date = %booking.date, start = %booking.time, duration = booking.duration, "Booking confirmed");

        reminder::schedule_for_booking(&self.backend, &booking, now);

        let email_sent = deliver(
            "confirmation",
            booking.id,
            self.notification_timeout,
            self.notifier
                .send_booking_confirmation(BookingNotice::from(&booking)),
        )
        .await;

        Ok(Confirmation {
            booking,
            email_sent,
        })
    }

    pub async fn cancel(
        &self,
        booking_id: Uuid,
        reason: Option<String>,
    ) -> Result<Cancellation, BookingError> {
        // status change and slot release are one backend operation
        let booking = self
            .backend
            .cancel_booking(booking_id, reason, self.now())?;
        let refund_amount = refund_amount(booking.total_amount);

        reminder::cancel_for_booking(&self.backend, booking_id);

        info!(%booking_id, refund_amount, "Booking cancelled");

        let mut notice = BookingNotice::from(&booking);
        notice.refund_amount = Some(refund_amount);
        let email_sent = deliver(
            "cancellation",
            booking_id,
            self.notification_timeout,
            self.notifier.send_booking_cancellation(notice),
        )
        .await;

        Ok(Cancellation {
            booking,
            refund_amount,
            email_sent,
        })
    }
}
