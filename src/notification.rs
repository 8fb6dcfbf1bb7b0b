use crate::types::{Booking, ReminderWindow, SlotTime};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Serialize;
use std::{future::Future, time::Duration};
use tracing::{info, warn};
use uuid::Uuid;

/// Everything a customer-facing message about a booking needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingNotice {
    pub booking_id: Uuid,
    pub customer_name: String,
    pub customer_email: String,
    pub customer_phone: Option<String>,
    pub venue_name: String,
    pub court_name: String,
    pub sport: String,
    pub date: NaiveDate,
    pub start_time: SlotTime,
    pub end_time: SlotTime,
    pub duration: u32,
    pub total_amount: i64,
    pub refund_amount: Option<i64>,
    pub cancellation_reason: Option<String>,
    pub reminder_window: Option<ReminderWindow>,
}

impl From<&Booking> for BookingNotice {
    fn from(booking: &Booking) -> Self {
        Self {
            booking_id: booking.id,
            customer_name: booking.customer_name.clone(),
            customer_email: booking.customer_email.clone(),
            customer_phone: booking.customer_phone.clone(),
            venue_name: booking.venue_name.clone(),
            court_name: booking.court_name.clone(),
            sport: booking.sport.clone(),
            date: booking.date,
            start_time: booking.time,
            end_time: booking.end_time(),
            duration: booking.duration,
            total_amount: booking.total_amount,
            refund_amount: None,
            cancellation_reason: booking.cancellation_reason.clone(),
            reminder_window: None,
        }
    }
}

/// Outbound notification service. Every method reports delivery and never fails the caller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send_booking_confirmation(&self, notice: BookingNotice) -> bool;
    async fn send_booking_cancellation(&self, notice: BookingNotice) -> bool;
    async fn send_booking_reminder(&self, notice: BookingNotice) -> bool;
}

/// Waits at most `timeout` for a notification; anything but a confirmed delivery is `false`.
pub async fn deliver<F>(kind: &'static str, booking_id: Uuid, timeout: Duration, send: F) -> bool
where
    F: Future<Output = bool>,
{
    match tokio::time::timeout(timeout, send).await {
        Ok(true) => true,
        Ok(false) => {
            warn!(kind, %booking_id, "Notification could not be delivered");
            false
        }
        Err(_) => {
            warn!(kind, %booking_id, ?timeout, "Notification timed out");
            false
        }
    }
}

/// Writes notifications to the log instead of sending them.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send_booking_confirmation(&self, notice: BookingNotice) -> bool {
        info!(booking_id = %notice.booking_id, to = %notice.customer_email, date = %notice.date, start = %notice.start_time, "Booking confirmation");
        true
    }

    async fn send_booking_cancellation(&self, notice: BookingNotice) -> bool {
        info!(booking_id = %notice.booking_id, to = %notice.customer_email, refund = ?notice.refund_amount, "Booking cancellation");
        true
    }

    async fn send_booking_reminder(&self, notice: BookingNotice) -> bool {
        info!(booking_id = %notice.booking_id, to = %notice.customer_email, window = ?notice.reminder_window, "Booking reminder");
        true
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    event: &'static str,
    notice: &'a BookingNotice,
}

/// Posts every notification as JSON to a mail/SMS gateway.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            url,
        }
    }

    async fn post(&self, event: &'static str, notice: &BookingNotice) -> bool {
        let result = self
            .client
            .post(&self.url)
            .json(&WebhookPayload { event, notice })
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                warn!(event, status = %response.status(), "Notification webhook rejected the request");
                false
            }
            Err(err) => {
                warn!(event, ?err, "Notification webhook unreachable");
                false
            }
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send_booking_confirmation(&self, notice: BookingNotice) -> bool {
        self.post("booking_confirmation", &notice).await
    }

    async fn send_booking_cancellation(&self, notice: BookingNotice) -> bool {
        self.post("booking_cancellation", &notice).await
    }

    async fn send_booking_reminder(&self, notice: BookingNotice) -> bool {
        self.post("booking_reminder", &notice).await
    }
}
