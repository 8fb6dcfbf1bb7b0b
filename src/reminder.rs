//! Persisted reminder schedule and the worker that drains it.
//!
//! Reminders live in the backend as rows keyed `{booking_id}-{window}`, so a restart of the
//! PostgreSQL-backed service does not lose them. The worker takes due rows out of the store
//! before sending; a failed send is logged and never retried.

use crate::backend::{BackendError, Backend, BookingBackend, ReminderBackend};
use crate::notification::{deliver, BookingNotice, Notifier};
use crate::types::{Booking, BookingStatus, Reminder, ReminderWindow};
use chrono::NaiveDateTime;
use futures::future::join_all;
use mockable::Clock;
use std::{sync::Arc, time::Duration};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Reminders of `booking` whose trigger instant is still ahead of `now`.
pub fn reminders_for(booking: &Booking, now: NaiveDateTime) -> Vec<Reminder> {
    let starts_at = booking.starts_at();
    ReminderWindow::ALL
        .into_iter()
        .map(|window| Reminder {
            key: Reminder::key_for(booking.id, window),
            booking_id: booking.id,
            window,
            due_at: starts_at - window.lead_time(),
        })
        .filter(|reminder| reminder.due_at > now)
        .collect()
}

pub fn schedule_for_booking<T: ReminderBackend>(backend: &T, booking: &Booking, now: NaiveDateTime) {
    let reminders = reminders_for(booking, now);
    if reminders.is_empty() {
        return;
    }
    match backend.schedule_reminders(&reminders) {
        Ok(()) => info!(booking_id = %booking.id, count = reminders.len(), "Scheduled reminders"),
        Err(err) => warn!(booking_id = %booking.id, ?err, "Failed to schedule reminders"),
    }
}

pub fn cancel_for_booking<T: ReminderBackend>(backend: &T, booking_id: Uuid) {
    match backend.remove_reminders(booking_id) {
        Ok(0) => {}
        Ok(removed) => info!(%booking_id, removed, "Cancelled pending reminders"),
        Err(err) => warn!(%booking_id, ?err, "Failed to cancel pending reminders"),
    }
}

/// Sends every reminder due at `now`. Returns how many were delivered.
pub async fn dispatch_due_reminders<T: Backend>(
    backend: &T,
    notifier: &dyn Notifier,
    now: NaiveDateTime,
    timeout: Duration,
) -> Result<usize, BackendError> {
    let due = backend.take_due_reminders(now)?;

    let mut sends = vec![];
    for reminder in due {
        let booking = match backend.booking(reminder.booking_id) {
            Ok(Some(booking)) if booking.status == BookingStatus::Confirmed => booking,
            Ok(_) => {
                info!(key = %reminder.key, "Dropping reminder of missing or cancelled booking");
                continue;
            }
            Err(err) => {
                warn!(key = %reminder.key, ?err, "Dropping reminder, booking lookup failed");
                continue;
            }
        };

        let mut notice = BookingNotice::from(&booking);
        notice.reminder_window = Some(reminder.window);
        sends.push(deliver(
            "reminder",
            booking.id,
            timeout,
            notifier.send_booking_reminder(notice),
        ));
    }

    let delivered = join_all(sends).await.into_iter().filter(|sent| *sent).count();
    Ok(delivered)
}

pub async fn run_reminder_worker<T: Backend>(
    backend: T,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock + Send + Sync>,
    poll_interval: Duration,
    timeout: Duration,
) {
    info!(?poll_interval, "Reminder worker started");
    let mut interval = tokio::time::interval(poll_interval);
    loop {
        interval.tick().await;
        let now = clock.local().naive_local();
        if let Err(err) = dispatch_due_reminders(&backend, notifier.as_ref(), now, timeout).await {
            error!(?err, "Failed to read due reminders");
        }
    }
}
