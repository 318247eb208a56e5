//! Post-commit notification hook.
//!
//! The real transport (WhatsApp via an edge function) lives outside the
//! engine. Whatever the implementation does, a failure here never rolls
//! back the assignment: callers log the error and move on, and the
//! transport is free to retry on its own schedule.

use crate::{appointment::Appointment, types::ProviderId};

pub trait Notifier: Send {
    /// Invoked after every successful assignment commit.
    fn assignment_committed(
        &self,
        appointment: &Appointment,
        previous_provider: Option<ProviderId>,
    ) -> anyhow::Result<()>;
}

/// Default notifier: records the commit in the engine log.
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn assignment_committed(
        &self,
        appointment: &Appointment,
        previous_provider: Option<ProviderId>,
    ) -> anyhow::Result<()> {
        match (previous_provider, appointment.assigned_provider_id) {
            (Some(from), Some(to)) => log::info!(
                "notify: appointment {} moved {from} -> {to}",
                appointment.appointment_id
            ),
            (None, Some(to)) => log::info!(
                "notify: appointment {} assigned to {to}",
                appointment.appointment_id
            ),
            _ => {}
        }
        Ok(())
    }
}

/// Silent notifier for tests and batch tooling.
pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn assignment_committed(
        &self,
        _appointment: &Appointment,
        _previous_provider: Option<ProviderId>,
    ) -> anyhow::Result<()> {
        Ok(())
    }
}
