//! The reassignment planner, known to the product as the "virtual assistant".
//!
//! One Consider cycle walks a fixed pipeline: Match (skills) → Filter
//! (availability) → Select (ranked tie-break) → Commit. Commit always
//! terminates the cycle; the appointment becomes eligible again on the
//! next detector pass. A rejected store write is retried exactly once
//! against refreshed data, then the delay is accepted in place; an
//! appointment is never left unassigned or half-moved.

use crate::{
    appointment::Appointment,
    audit::AuditEmitter,
    availability,
    error::DispatchResult,
    event::AuditEvent,
    notify::Notifier,
    roster::RosterSnapshot,
    store::DispatchStore,
    types::{AppointmentId, CorrelationId, ProviderId},
};
use chrono::{DateTime, Utc};
use std::cmp::Ordering;

/// Why an appointment entered a Consider cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsiderReason {
    /// A delay record fired. `trigger` names the upstream appointment
    /// for cascade members, None when the appointment slipped on its
    /// own.
    Delayed { trigger: Option<AppointmentId> },
    /// The appointment has no provider at all.
    Unstaffed,
}

impl ConsiderReason {
    fn trigger(&self) -> Option<AppointmentId> {
        match self {
            Self::Delayed { trigger } => *trigger,
            Self::Unstaffed => None,
        }
    }
}

/// Terminal outcome of one Consider cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlannerOutcome {
    /// A new provider was committed.
    Committed {
        provider_id: ProviderId,
        previous: Option<ProviderId>,
    },
    /// No better provider exists; the delay stands.
    AcceptedInPlace,
    /// Evaluation did not run (terminal status, vanished row, or stale
    /// roster). The next detector pass picks the appointment up again.
    Deferred,
}

/// Candidate surviving Match and Filter, with its ranking inputs.
struct Candidate {
    provider_id: ProviderId,
    backlog: i64,
    is_online: bool,
    last_seen: DateTime<Utc>,
}

/// Tie-break order: lightest same-day backlog, then presence recency
/// (online first, then latest last_seen), then ascending provider id
/// for determinism. Reconstructed from audit traces, not confirmed
/// production behavior, so keep it in this one place.
fn rank(a: &Candidate, b: &Candidate) -> Ordering {
    a.backlog
        .cmp(&b.backlog)
        .then_with(|| b.is_online.cmp(&a.is_online))
        .then_with(|| b.last_seen.cmp(&a.last_seen))
        .then_with(|| a.provider_id.cmp(&b.provider_id))
}

pub struct ReassignmentPlanner {
    freshness_seconds: i64,
    emitter: AuditEmitter,
}

impl ReassignmentPlanner {
    pub fn new(roster_freshness_seconds: i64) -> Self {
        Self {
            freshness_seconds: roster_freshness_seconds,
            emitter: AuditEmitter::new("assistant"),
        }
    }

    /// Run one full Consider cycle over the caller's working-set copy
    /// of the appointment. The copy's version token is what the commit
    /// is checked against, so a row that moved since the caller read it
    /// surfaces as a store conflict and takes the retry path.
    #[allow(clippy::too_many_arguments)]
    pub fn consider(
        &self,
        store: &DispatchStore,
        roster: &RosterSnapshot,
        notifier: &dyn Notifier,
        appt: &Appointment,
        reason: ConsiderReason,
        correlation_id: Option<CorrelationId>,
        now: DateTime<Utc>,
    ) -> DispatchResult<PlannerOutcome> {
        if !appt.status.is_open() {
            log::debug!(
                "appointment {} already {}; nothing to plan",
                appt.appointment_id,
                appt.status.as_str()
            );
            return Ok(PlannerOutcome::Deferred);
        }

        if let Err(e) = roster.ensure_fresh(now, self.freshness_seconds) {
            log::warn!("{e}; deferring appointment {}", appt.appointment_id);
            return Ok(PlannerOutcome::Deferred);
        }

        match self.plan(store, roster, appt)? {
            Some(target) if Some(target) != appt.assigned_provider_id => self.commit(
                store,
                roster,
                notifier,
                appt.clone(),
                target,
                reason,
                correlation_id,
                now,
            ),
            _ => {
                self.accept_in_place(
                    store,
                    appt,
                    reason,
                    correlation_id,
                    "no eligible alternative; delay accepted in place",
                    now,
                );
                Ok(PlannerOutcome::AcceptedInPlace)
            }
        }
    }

    /// Match → Filter → Select. Returns the best provider, which may be
    /// the current one.
    fn plan(
        &self,
        store: &DispatchStore,
        roster: &RosterSnapshot,
        appt: &Appointment,
    ) -> DispatchResult<Option<ProviderId>> {
        let start = appt.effective_start();
        let mut candidates = Vec::new();

        for provider in roster.eligible(&appt.required_skills) {
            let book = store.list_by_provider(provider.provider_id, appt.day())?;
            if !availability::is_available(
                provider,
                &book,
                start,
                appt.duration_minutes,
                Some(appt.appointment_id),
            ) {
                continue;
            }
            let backlog = book
                .iter()
                .filter(|a| a.appointment_id != appt.appointment_id)
                .count() as i64;
            candidates.push(Candidate {
                provider_id: provider.provider_id,
                backlog,
                is_online: provider.is_online,
                last_seen: provider.last_seen,
            });
        }

        candidates.sort_by(rank);
        Ok(candidates.first().map(|c| c.provider_id))
    }

    /// Commit, with a single retry against refreshed data when the
    /// store rejects the write.
    #[allow(clippy::too_many_arguments)]
    fn commit(
        &self,
        store: &DispatchStore,
        roster: &RosterSnapshot,
        notifier: &dyn Notifier,
        appt: Appointment,
        target: ProviderId,
        reason: ConsiderReason,
        correlation_id: Option<CorrelationId>,
        now: DateTime<Utc>,
    ) -> DispatchResult<PlannerOutcome> {
        match store.update_assignment(
            appt.appointment_id,
            target,
            appt.delay_minutes,
            appt.assigned_provider_id,
            appt.version,
        ) {
            Ok(()) => {
                self.finish_commit(store, notifier, &appt, target, reason, correlation_id, now);
                Ok(PlannerOutcome::Committed {
                    provider_id: target,
                    previous: appt.assigned_provider_id,
                })
            }
            Err(e) if e.is_retryable() => {
                log::info!(
                    "commit of appointment {} rejected ({e}); replanning once",
                    appt.appointment_id
                );
                self.retry_commit(store, roster, notifier, appt, reason, correlation_id, now)
            }
            Err(e) => Err(e),
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn retry_commit(
        &self,
        store: &DispatchStore,
        roster: &RosterSnapshot,
        notifier: &dyn Notifier,
        stale: Appointment,
        reason: ConsiderReason,
        correlation_id: Option<CorrelationId>,
        now: DateTime<Utc>,
    ) -> DispatchResult<PlannerOutcome> {
        let Some(fresh) = store.appointment(stale.appointment_id)? else {
            return Ok(PlannerOutcome::Deferred);
        };
        if !fresh.status.is_open() {
            return Ok(PlannerOutcome::Deferred);
        }

        let fresh_roster = store.roster_snapshot(roster.business_id, now)?;
        match self.plan(store, &fresh_roster, &fresh)? {
            Some(target) if Some(target) != fresh.assigned_provider_id => {
                match store.update_assignment(
                    fresh.appointment_id,
                    target,
                    fresh.delay_minutes,
                    fresh.assigned_provider_id,
                    fresh.version,
                ) {
                    Ok(()) => {
                        self.finish_commit(
                            store,
                            notifier,
                            &fresh,
                            target,
                            reason,
                            correlation_id,
                            now,
                        );
                        Ok(PlannerOutcome::Committed {
                            provider_id: target,
                            previous: fresh.assigned_provider_id,
                        })
                    }
                    Err(e) if e.is_retryable() => {
                        // Two rejections in one cycle: give up cleanly.
                        log::warn!(
                            "retry commit of appointment {} rejected again ({e}); accepting delay",
                            fresh.appointment_id
                        );
                        self.emit_assistant_cycle(
                            store,
                            &fresh,
                            reason,
                            correlation_id,
                            "store conflict; delay accepted in place",
                            now,
                        );
                        Ok(PlannerOutcome::AcceptedInPlace)
                    }
                    Err(e) => Err(e),
                }
            }
            _ => {
                self.accept_in_place(
                    store,
                    &fresh,
                    reason,
                    correlation_id,
                    "no eligible alternative; delay accepted in place",
                    now,
                );
                Ok(PlannerOutcome::AcceptedInPlace)
            }
        }
    }

    /// Audit + notify after a successful write. Neither may fail the
    /// committed assignment.
    #[allow(clippy::too_many_arguments)]
    fn finish_commit(
        &self,
        store: &DispatchStore,
        notifier: &dyn Notifier,
        before: &Appointment,
        target: ProviderId,
        reason: ConsiderReason,
        correlation_id: Option<CorrelationId>,
        now: DateTime<Utc>,
    ) {
        let event = match before.assigned_provider_id {
            Some(previous) => AuditEvent::AppointmentReassigned {
                appointment_id: before.appointment_id,
                provider_id: target,
                previous_provider_id: Some(previous),
                delay_minutes: before.delay_minutes,
                trigger_appointment_id: reason.trigger(),
            },
            None => AuditEvent::AppointmentAssigned {
                appointment_id: before.appointment_id,
                provider_id: target,
                delay_minutes: before.delay_minutes,
            },
        };
        self.emitter
            .emit(store, before.business_id, &event, correlation_id, now);

        let mut committed = before.clone();
        committed.shifted_from_provider_id = before.assigned_provider_id;
        committed.assigned_provider_id = Some(target);
        if let Err(e) = notifier.assignment_committed(&committed, before.assigned_provider_id) {
            log::warn!(
                "notification for appointment {} failed (assignment stands): {e}",
                before.appointment_id
            );
        }
    }

    /// Stay-in-place terminal. Audited for delayed appointments; an
    /// unstaffed appointment that still has no candidate stays silent,
    /// otherwise every idle pass would re-log the same outcome.
    fn accept_in_place(
        &self,
        store: &DispatchStore,
        appt: &Appointment,
        reason: ConsiderReason,
        correlation_id: Option<CorrelationId>,
        note: &str,
        now: DateTime<Utc>,
    ) {
        match reason {
            ConsiderReason::Delayed { .. } => {
                self.emit_assistant_cycle(store, appt, reason, correlation_id, note, now);
            }
            ConsiderReason::Unstaffed => {
                log::debug!(
                    "no provider available for unstaffed appointment {}",
                    appt.appointment_id
                );
            }
        }
    }

    fn emit_assistant_cycle(
        &self,
        store: &DispatchStore,
        appt: &Appointment,
        reason: ConsiderReason,
        correlation_id: Option<CorrelationId>,
        note: &str,
        now: DateTime<Utc>,
    ) {
        self.emitter.emit(
            store,
            appt.business_id,
            &AuditEvent::AssistantCycle {
                appointment_id: appt.appointment_id,
                provider_id: appt.assigned_provider_id,
                delay_minutes: appt.delay_minutes,
                note: note.to_string(),
                trigger_appointment_id: reason.trigger(),
            },
            correlation_id,
            now,
        );
    }
}
