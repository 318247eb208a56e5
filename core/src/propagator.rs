//! Delay propagation: re-timing a provider's day queue after slippage.
//!
//! One cascade is a single ordered walk over the trigger provider's
//! remaining same-day queue, stamped with one correlation id. Each step
//! either records new slippage and hands the appointment to the planner,
//! or proves the queue is clean from there on and exits. Termination is
//! bounded by the queue length plus a configured step ceiling.

use crate::{
    appointment::AppointmentStatus,
    audit::AuditEmitter,
    error::DispatchResult,
    event::AuditEvent,
    notify::Notifier,
    planner::{ConsiderReason, PlannerOutcome, ReassignmentPlanner},
    roster::RosterSnapshot,
    store::DispatchStore,
    types::{AppointmentId, CorrelationId},
};
use chrono::{DateTime, Duration, Utc};

/// One appointment touched by a cascade, in walk order.
#[derive(Debug, Clone)]
pub struct PropagationStep {
    pub appointment_id: AppointmentId,
    pub delay_minutes: i64,
    pub outcome: PlannerOutcome,
}

pub struct DelayPropagator {
    max_steps: usize,
    emitter: AuditEmitter,
}

impl DelayPropagator {
    pub fn new(max_cascade_steps: usize) -> Self {
        Self {
            max_steps: max_cascade_steps,
            emitter: AuditEmitter::new("propagator"),
        }
    }

    /// Walk the queue behind `trigger_id` and re-time every appointment
    /// the slippage reaches. Returns the touched appointments in walk
    /// order for audit correlation; an empty result means the queue
    /// absorbed the delay (or the trigger had no provider to cascade
    /// through).
    pub fn propagate(
        &self,
        store: &DispatchStore,
        planner: &ReassignmentPlanner,
        roster: &RosterSnapshot,
        notifier: &dyn Notifier,
        trigger_id: AppointmentId,
        now: DateTime<Utc>,
        correlation_id: CorrelationId,
    ) -> DispatchResult<Vec<PropagationStep>> {
        let Some(trigger) = store.appointment(trigger_id)? else {
            return Ok(Vec::new());
        };
        let Some(provider_id) = trigger.assigned_provider_id else {
            // Unstaffed trigger occupies nobody's queue.
            return Ok(Vec::new());
        };

        // The slot the rest of the queue must clear. A running overrun
        // holds its provider at least until now.
        let mut prev_end = trigger.effective_end();
        if trigger.status == AppointmentStatus::Active && now > prev_end {
            prev_end = now;
        }

        let queue = store.list_by_provider(provider_id, trigger.day())?;
        let mut steps: Vec<PropagationStep> = Vec::new();

        for appt in queue {
            // Only the remaining queue, in order, strictly after the trigger.
            if (appt.scheduled_start, appt.appointment_id)
                <= (trigger.scheduled_start, trigger.appointment_id)
            {
                continue;
            }

            if steps.len() >= self.max_steps {
                log::warn!(
                    "cascade {correlation_id} hit the {} step ceiling on provider {provider_id}",
                    self.max_steps
                );
                break;
            }

            // Cancellation point: if the trigger resolved externally
            // mid-walk, keep what is committed and stop.
            match store.appointment(trigger_id)? {
                Some(t) if t.status.is_open() => {}
                _ => {
                    log::info!(
                        "cascade {correlation_id} stopped: trigger {trigger_id} resolved externally"
                    );
                    break;
                }
            }

            let effective = appt.scheduled_start.max(prev_end);
            if effective == appt.scheduled_start {
                // No induced slippage; everything behind is clean too.
                break;
            }

            let new_delay = (effective - appt.scheduled_start).num_minutes();
            if new_delay <= appt.delay_minutes {
                // A previous cascade already pushed this one at least as
                // far. Nothing new to record; its standing slot still
                // bounds the next appointment.
                prev_end = appt.effective_end();
                continue;
            }

            match store.record_delay(appt.appointment_id, new_delay, appt.version) {
                Ok(()) => {}
                Err(e) if e.is_retryable() => {
                    log::debug!(
                        "cascade {correlation_id} lost a race on {}: {e}",
                        appt.appointment_id
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
            self.emitter.emit(
                store,
                appt.business_id,
                &AuditEvent::DelayPropagated {
                    appointment_id: appt.appointment_id,
                    provider_id,
                    delay_minutes: new_delay,
                    trigger_appointment_id: trigger_id,
                },
                Some(correlation_id),
                now,
            );

            // Re-read so the planner's working copy carries the version
            // the delay write just produced.
            let Some(fresh) = store.appointment(appt.appointment_id)? else {
                break;
            };
            let outcome = planner.consider(
                store,
                roster,
                notifier,
                &fresh,
                ConsiderReason::Delayed {
                    trigger: Some(trigger_id),
                },
                Some(correlation_id),
                now,
            )?;

            match outcome {
                PlannerOutcome::Committed { .. } => {
                    // Moved off this provider: the slot is freed, the
                    // next appointment only has to clear the previous
                    // effective end.
                }
                PlannerOutcome::AcceptedInPlace | PlannerOutcome::Deferred => {
                    prev_end = effective + Duration::minutes(appt.duration_minutes);
                }
            }

            steps.push(PropagationStep {
                appointment_id: appt.appointment_id,
                delay_minutes: new_delay,
                outcome,
            });
        }

        Ok(steps)
    }
}
