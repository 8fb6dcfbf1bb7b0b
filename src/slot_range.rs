use crate::types::{SlotTime, Timeslot, MINUTES_PER_SLOT};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RangeError {
    #[error("end time must be after start time")]
    EndNotAfterStart,
    #[error("bookings must start and end on a full hour")]
    NotOnFullHour,
}

/// The hourly slots covering `[start, end)`, in time order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotRange {
    pub slots: Vec<Timeslot>,
}

impl SlotRange {
    pub fn duration(&self) -> u32 {
        self.slots.len() as u32
    }

    /// `None` if the prices do not fit into an `i64`.
    pub fn total_price(&self) -> Option<i64> {
        self.slots
            .iter()
            .try_fold(0i64, |total, timeslot| total.checked_add(timeslot.price))
    }

    pub fn all_available(&self) -> bool {
        self.slots.iter().all(|timeslot| timeslot.is_available)
    }

    pub fn times(&self) -> Vec<SlotTime> {
        self.slots.iter().map(|timeslot| timeslot.time).collect()
    }
}

/// Walks `[start, end)` in one-hour steps and picks the matching slot for every step.
///
/// `Ok(None)` means at least one hour has no slot on offer, which is distinct from a range whose
/// slots all exist but are partly taken (see [`SlotRange::all_available`]).
pub fn resolve_range(
    timeslots: &[Timeslot],
    start: SlotTime,
    end: SlotTime,
) -> Result<Option<SlotRange>, RangeError> {
    resolve_span(timeslots, start, end.minutes())
}

/// Like [`resolve_range`], with the end given in minutes since midnight so a range may run
/// until 24:00.
pub fn resolve_span(
    timeslots: &[Timeslot],
    start: SlotTime,
    end_minutes: u16,
) -> Result<Option<SlotRange>, RangeError> {
    let start_minutes = start.minutes();
    if end_minutes <= start_minutes {
        return Err(RangeError::EndNotAfterStart);
    }
    if !start.is_full_hour() || end_minutes % MINUTES_PER_SLOT != 0 {
        return Err(RangeError::NotOnFullHour);
    }

    let mut slots = vec![];
    for minutes in (start_minutes..end_minutes).step_by(usize::from(MINUTES_PER_SLOT)) {
        let step = timeslots
            .iter()
            .find(|timeslot| timeslot.time.minutes() == minutes);
        match step {
            Some(timeslot) => slots.push(timeslot.clone()),
            None => return Ok(None),
        }
    }
    Ok(Some(SlotRange { slots }))
}

/// Start and end minute of an explicit slot selection, provided the selection has no holes.
pub fn span_of_selection(selected: &[SlotTime]) -> Option<(SlotTime, u16)> {
    let mut selected = selected.to_vec();
    selected.sort();
    selected.dedup();

    let first = *selected.first()?;
    let contiguous = selected
        .windows(2)
        .all(|pair| pair[1].minutes() == pair[0].minutes() + MINUTES_PER_SLOT);
    if !contiguous {
        return None;
    }
    let last = *selected.last()?;
    Some((first, last.minutes() + MINUTES_PER_SLOT))
}
