//! Answers "what can I book right now" for a court, hiding slots that already started.
//!
//! The filtering is advisory. Booking confirmation re-checks at commit time.

use crate::backend::{BackendError, TimeslotBackend};
use crate::types::{SlotFilter, SlotTime, Timeslot};
use chrono::{NaiveDate, NaiveDateTime};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SlotQuery {
    pub venue_id: Option<Uuid>,
    pub court_id: Option<Uuid>,
    pub date: Option<NaiveDate>,
    /// Also purge the slots hidden by this query.
    pub cleanup: bool,
}

/// A slot is past once the current minute is later than its start minute.
pub fn is_past(date: NaiveDate, time: SlotTime, now: NaiveDateTime) -> bool {
    let today = now.date();
    date < today || (date == today && time < SlotTime::of(&now))
}

pub fn query_slots<T: TimeslotBackend>(
    backend: &T,
    query: &SlotQuery,
    now: NaiveDateTime,
) -> Result<Vec<Timeslot>, BackendError> {
    let today = now.date();

    if let Some(date) = query.date {
        if date < today {
            if query.cleanup {
                purge_before(backend, today)?;
            }
            return Ok(vec![]);
        }
    }

    let filter = SlotFilter {
        venue_id: query.venue_id,
        court_id: query.court_id,
        date: query.date,
    };
    let (past, upcoming): (Vec<Timeslot>, Vec<Timeslot>) = backend
        .find_slots(&filter)?
        .into_iter()
        .partition(|timeslot| is_past(timeslot.date, timeslot.time, now));

    if query.cleanup && !past.is_empty() {
        if query.date.is_some() {
            purge_started_today(backend, &past)?;
        } else {
            purge_before(backend, today)?;
            let started_today: Vec<Timeslot> =
                past.into_iter().filter(|slot| slot.date == today).collect();
            purge_started_today(backend, &started_today)?;
        }
    }

    Ok(upcoming)
}

fn purge_before<T: TimeslotBackend>(backend: &T, today: NaiveDate) -> Result<(), BackendError> {
    let removed = backend.delete_slots_before(today)?;
    if removed > 0 {
        info!(removed, %today, "Removed timeslots dated before today");
    }
    Ok(())
}

fn purge_started_today<T: TimeslotBackend>(
    backend: &T,
    started: &[Timeslot],
) -> Result<(), BackendError> {
    let mut by_court: Vec<(Uuid, NaiveDate, Vec<SlotTime>)> = vec![];
    for timeslot in started {
        match by_court
            .iter_mut()
            .find(|(court_id, date, _)| *court_id == timeslot.court_id && *date == timeslot.date)
        {
            Some((_, _, times)) => times.push(timeslot.time),
            None => by_court.push((timeslot.court_id, timeslot.date, vec![timeslot.time])),
        }
    }

    for (court_id, date, times) in by_court {
        let removed = backend.delete_slots(court_id, date, &times)?;
        info!(removed, %court_id, %date, "Removed timeslots that already started");
    }
    Ok(())
}
