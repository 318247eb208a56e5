//! Availability evaluation: the Filter step of the planner.
//!
//! Pure queries over a roster + appointment snapshot. All interval
//! comparisons are half-open `[start, end)` so an appointment ending at
//! 10:00 never collides with one starting at 10:00.

use crate::{
    appointment::Appointment,
    roster::Provider,
    types::AppointmentId,
};
use chrono::{DateTime, Datelike, Duration, Utc};

/// Whether `provider` can take an appointment of `duration_minutes`
/// starting at `at`.
///
/// Rejects when the provider opted out of transfers, when the candidate
/// interval does not fit the weekday's working hours, or when any other
/// open appointment of the provider overlaps the candidate interval at
/// its effective position. `open_book` is the provider's Pending/Active
/// appointments; `excluding` removes the appointment being placed so it
/// never blocks itself.
pub fn is_available(
    provider: &Provider,
    open_book: &[Appointment],
    at: DateTime<Utc>,
    duration_minutes: i64,
    excluding: Option<AppointmentId>,
) -> bool {
    if !provider.accepts_transfers {
        return false;
    }

    if !provider
        .working_hours
        .fits(at.weekday(), at.time(), duration_minutes)
    {
        return false;
    }

    let candidate_end = at + Duration::minutes(duration_minutes);
    !open_book.iter().any(|appt| {
        appt.status.is_open()
            && Some(appt.appointment_id) != excluding
            && appt.overlaps(at, candidate_end)
    })
}
