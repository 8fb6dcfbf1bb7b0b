use crate::backend::Backend;
use crate::booking_manager::{BookingManager, BookingRequest, RequestedRange};
use crate::error::BookingError;
use crate::slot_query::SlotQuery;
use crate::types::{Booking, NewTimeslot, SlotTime, Timeslot, DATE_REGEX, TIME_REGEX};
use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::{
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use uuid::Uuid;
use validator::{Validate, ValidationErrors};

#[derive(Clone)]
pub struct AppState<T: Backend> {
    pub booking_manager: BookingManager<T>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct TimeslotQueryParams {
    venue: Option<String>,
    court: Option<String>,
    date: Option<String>,
    cleanup: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct AddTimeslotRequest {
    #[validate(required)]
    venue: Option<Uuid>,
    #[validate(required)]
    court: Option<Uuid>,
    #[validate(required, regex(path = *DATE_REGEX))]
    date: Option<String>,
    #[validate(required, regex(path = *TIME_REGEX))]
    time: Option<String>,
    #[validate(required, range(min = 1, max = 1_000_000_000))]
    price: Option<i64>,
    is_available: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct ConfirmBookingRequest {
    #[validate(required)]
    user_id: Option<Uuid>,
    #[validate(required)]
    venue_id: Option<Uuid>,
    #[validate(required)]
    court_id: Option<Uuid>,
    #[validate(required, regex(path = *DATE_REGEX))]
    date: Option<String>,
    #[validate(regex(path = *TIME_REGEX))]
    time: Option<String>,
    #[validate(regex(path = *TIME_REGEX))]
    start_time: Option<String>,
    #[validate(regex(path = *TIME_REGEX))]
    end_time: Option<String>,
    #[validate(range(min = 1, max = 24))]
    duration: Option<u16>,
    selected_slots: Option<Vec<String>>,
    total_amount: Option<i64>,
    customer_name: Option<String>,
    #[validate(email)]
    customer_email: Option<String>,
    customer_phone: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
struct CancelBookingRequest {
    #[validate(required)]
    booking_id: Option<String>,
    reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AddTimeslotResponse {
    success: bool,
    timeslot: Timeslot,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConfirmBookingResponse {
    success: bool,
    booking: Booking,
    booking_id: Uuid,
    total_amount: i64,
    email_sent: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelBookingResponse {
    success: bool,
    booking: Booking,
    refund_amount: i64,
    email_sent: bool,
}

pub fn create_app<T: Backend>(booking_manager: BookingManager<T>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let state = AppState { booking_manager };

    Router::new()
        .route("/timeslots", get(get_timeslots).post(add_timeslot))
        .route("/bookings/confirm", post(confirm_booking))
        .route("/bookings/cancel", post(cancel_booking))
        .route("/bookings/:id", get(get_booking))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
}

fn to_camel_case(field: &str) -> String {
    let mut camel = String::with_capacity(field.len());
    let mut upper = false;
    for c in field.chars() {
        if c == '_' {
            upper = true;
        } else if upper {
            camel.extend(c.to_uppercase());
            upper = false;
        } else {
            camel.push(c);
        }
    }
    camel
}

fn validation_error(errors: ValidationErrors) -> BookingError {
    let mut missing = vec![];
    let mut invalid = vec![];
    for (field, field_errors) in errors.field_errors() {
        let field = to_camel_case(&field.to_string());
        if field_errors.iter().any(|err| err.code == "required") {
            missing.push(field);
        } else {
            invalid.push(field);
        }
    }
    missing.sort();
    invalid.sort();

    if missing.is_empty() {
        BookingError::Validation(format!("Invalid value for: {}", invalid.join(", ")))
    } else {
        BookingError::MissingFields(missing)
    }
}

fn parse_body<T: Validate>(body: Result<Json<T>, JsonRejection>) -> Result<T, BookingError> {
    let Json(request) = body.map_err(|rejection| BookingError::Validation(rejection.body_text()))?;
    request.validate().map_err(validation_error)?;
    Ok(request)
}

fn parse_date(raw: &str) -> Result<NaiveDate, BookingError> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| BookingError::Validation(format!("'{raw}' is not a valid date")))
}

fn parse_time(raw: &str) -> Result<SlotTime, BookingError> {
    raw.parse()
        .map_err(|err: crate::types::InvalidSlotTime| BookingError::Validation(err.to_string()))
}

fn parse_id(raw: &str, what: &str) -> Result<Uuid, BookingError> {
    Uuid::parse_str(raw).map_err(|_| BookingError::Validation(format!("'{raw}' is not a valid {what} id")))
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, BookingError> {
    value.ok_or_else(|| BookingError::MissingFields(vec![field.to_string()]))
}

impl TimeslotQueryParams {
    fn into_query(self) -> Result<SlotQuery, BookingError> {
        Ok(SlotQuery {
            venue_id: self.venue.as_deref().map(|raw| parse_id(raw, "venue")).transpose()?,
            court_id: self.court.as_deref().map(|raw| parse_id(raw, "court")).transpose()?,
            date: self.date.as_deref().map(parse_date).transpose()?,
            cleanup: matches!(self.cleanup.as_deref(), Some("true") | Some("1")),
        })
    }
}

impl AddTimeslotRequest {
    fn into_new_timeslot(self) -> Result<NewTimeslot, BookingError> {
        Ok(NewTimeslot {
            venue_id: required(self.venue, "venue")?,
            court_id: required(self.court, "court")?,
            date: parse_date(&required(self.date, "date")?)?,
            time: parse_time(&required(self.time, "time")?)?,
            price: required(self.price, "price")?,
            is_available: self.is_available.unwrap_or(true),
        })
    }
}

impl ConfirmBookingRequest {
    /// Accepts `startTime`/`endTime`, `time` plus `duration`, or a `selectedSlots` list.
    /// Whether the range is usable is decided by the booking manager.
    fn into_booking_request(self) -> Result<BookingRequest, BookingError> {
        let selection = self
            .selected_slots
            .as_deref()
            .unwrap_or_default()
            .iter()
            .map(|raw| parse_time(raw))
            .collect::<Result<Vec<_>, _>>()?;
        let start = self
            .start_time
            .as_deref()
            .or(self.time.as_deref())
            .map(parse_time)
            .transpose()?;

        let range = match (start, self.end_time.as_deref(), self.duration) {
            (Some(start), Some(raw), _) => RequestedRange::Until {
                start,
                end_minutes: parse_time(raw)?.minutes(),
            },
            (Some(start), None, Some(hours)) => RequestedRange::Hours { start, hours },
            _ if !selection.is_empty() => RequestedRange::Selection(selection),
            (Some(start), None, None) => RequestedRange::Hours { start, hours: 1 },
            (None, _, _) => return Err(BookingError::MissingFields(vec!["startTime".into()])),
        };

        Ok(BookingRequest {
            user_id: required(self.user_id, "userId")?,
            venue_id: required(self.venue_id, "venueId")?,
            court_id: required(self.court_id, "courtId")?,
            date: parse_date(&required(self.date, "date")?)?,
            range,
            customer_name: self.customer_name,
            customer_email: self.customer_email,
            customer_phone: self.customer_phone,
            client_total: self.total_amount,
        })
    }
}

async fn get_timeslots<T: Backend>(
    State(state): State<AppState<T>>,
    params: Result<Query<TimeslotQueryParams>, QueryRejection>,
) -> Result<Json<Vec<Timeslot>>, BookingError> {
    let Query(params) = params.map_err(|rejection| BookingError::Validation(rejection.body_text()))?;
    let query = params.into_query()?;
    Ok(Json(state.booking_manager.timeslots(&query)?))
}

async fn add_timeslot<T: Backend>(
    State(state): State<AppState<T>>,
    body: Result<Json<AddTimeslotRequest>, JsonRejection>,
) -> Result<Json<AddTimeslotResponse>, BookingError> {
    let slot = parse_body(body)?.into_new_timeslot()?;
    let timeslot = state.booking_manager.add_timeslot(slot)?;
    Ok(Json(AddTimeslotResponse {
        success: true,
        timeslot,
    }))
}

async fn confirm_booking<T: Backend>(
    State(state): State<AppState<T>>,
    body: Result<Json<ConfirmBookingRequest>, JsonRejection>,
) -> Result<Json<ConfirmBookingResponse>, BookingError> {
    let request = parse_body(body)?.into_booking_request()?;
    let confirmation = state.booking_manager.confirm(request).await?;
    Ok(Json(ConfirmBookingResponse {
        success: true,
        booking_id: confirmation.booking.id,
        total_amount: confirmation.booking.total_amount,
        booking: confirmation.booking,
        email_sent: confirmation.email_sent,
    }))
}

async fn cancel_booking<T: Backend>(
    State(state): State<AppState<T>>,
    body: Result<Json<CancelBookingRequest>, JsonRejection>,
) -> Result<Json<CancelBookingResponse>, BookingError> {
    let request = parse_body(body)?;
    let raw_id = required(request.booking_id, "bookingId")?;
    // an id that cannot exist is reported like any other unknown booking
    let booking_id = Uuid::parse_str(&raw_id)
        .map_err(|_| BookingError::NotFound("Booking not found".into()))?;

    let cancellation = state
        .booking_manager
        .cancel(booking_id, request.reason)
        .await?;
    Ok(Json(CancelBookingResponse {
        success: true,
        booking: cancellation.booking,
        refund_amount: cancellation.refund_amount,
        email_sent: cancellation.email_sent,
    }))
}

async fn get_booking<T: Backend>(
    State(state): State<AppState<T>>,
    Path(id): Path<String>,
) -> Result<Json<Booking>, BookingError> {
    let id = Uuid::parse_str(&id).map_err(|_| BookingError::NotFound("Booking not found".into()))?;
    Ok(Json(state.booking_manager.booking(id)?))
}
