//! Delay detection: the scan that finds schedule slippage.
//!
//! Runs on a fixed cadence (the runner) or on demand after a
//! status-changing event. The detector never mutates appointment
//! status; it updates the cached delay and signals downstream.

use crate::{
    appointment::AppointmentStatus,
    audit::AuditEmitter,
    error::DispatchResult,
    event::AuditEvent,
    store::DispatchStore,
    types::{AppointmentId, BusinessId, ProviderId},
};
use chrono::{DateTime, Duration, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayKind {
    /// A pending appointment has not started past its grace window.
    LateStart,
    /// An active appointment is running past its effective end. Nothing
    /// changes on the appointment itself; its provider's queue needs a
    /// re-walk.
    Overrun,
}

/// One observed slippage, attributable to the appointment that caused
/// it. LateStart records are the observable Delay Records of the
/// engine (audited, cached); Overrun records are internal triggers for
/// the propagator and write nothing by themselves.
#[derive(Debug, Clone)]
pub struct DelayRecord {
    pub appointment_id: AppointmentId,
    pub provider_id: Option<ProviderId>,
    pub delay_minutes: i64,
    pub kind: DelayKind,
}

pub struct DelayDetector {
    grace_window: Duration,
    emitter: AuditEmitter,
}

impl DelayDetector {
    pub fn new(grace_window_minutes: i64) -> Self {
        Self {
            grace_window: Duration::minutes(grace_window_minutes),
            emitter: AuditEmitter::new("detector"),
        }
    }

    /// Scan one business's open appointments for slippage.
    ///
    /// Monotonic: a delay is recorded and audited only when it exceeds
    /// the cached value, so a second scan at the same instant over an
    /// unchanged queue is a no-op. Shrinkage never happens here; only
    /// completion/cancellation clears the cache (store rule).
    pub fn scan(
        &self,
        store: &DispatchStore,
        business_id: BusinessId,
        now: DateTime<Utc>,
    ) -> DispatchResult<Vec<DelayRecord>> {
        let mut records = Vec::new();

        for appt in store.list_pending_or_active(business_id)? {
            match appt.status {
                AppointmentStatus::Pending => {
                    if appt.scheduled_start + self.grace_window >= now {
                        continue;
                    }
                    let observed = (now - appt.scheduled_start).num_minutes();
                    if observed <= appt.delay_minutes {
                        continue;
                    }
                    match store.record_delay(appt.appointment_id, observed, appt.version) {
                        Ok(()) => {}
                        Err(e) if e.is_retryable() => {
                            // Concurrent writer got there first; the next
                            // scan sees the fresh row.
                            log::debug!(
                                "delay write for {} lost a race: {e}",
                                appt.appointment_id
                            );
                            continue;
                        }
                        Err(e) => return Err(e),
                    }
                    self.emitter.emit(
                        store,
                        business_id,
                        &AuditEvent::DelayDetected {
                            appointment_id: appt.appointment_id,
                            provider_id: appt.assigned_provider_id,
                            delay_minutes: observed,
                        },
                        None,
                        now,
                    );
                    log::info!(
                        "appointment {} slipped {observed}m past its scheduled start",
                        appt.appointment_id
                    );
                    records.push(DelayRecord {
                        appointment_id: appt.appointment_id,
                        provider_id: appt.assigned_provider_id,
                        delay_minutes: observed,
                        kind: DelayKind::LateStart,
                    });
                }
                AppointmentStatus::Active => {
                    if now <= appt.effective_end() {
                        continue;
                    }
                    records.push(DelayRecord {
                        appointment_id: appt.appointment_id,
                        provider_id: appt.assigned_provider_id,
                        delay_minutes: appt.delay_minutes,
                        kind: DelayKind::Overrun,
                    });
                }
                // list_pending_or_active never returns terminal rows
                AppointmentStatus::Completed | AppointmentStatus::Cancelled => {}
            }
        }

        Ok(records)
    }
}
