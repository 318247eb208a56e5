//! The dispatch engine. One instance serves one business.
//!
//! EXECUTION ORDER of one pass (fixed, never reordered):
//!   1. Roster snapshot refresh
//!   2. Delay detector scan
//!   3. One full cascade per delay record, in scheduled order:
//!      planner on the trigger, then the propagation walk (which runs
//!      its own planner cycles), all under one correlation id
//!   4. Unstaffed sweep
//!
//! RULES:
//!   - A cascade fully resolves before the next one starts.
//!   - Only this engine writes assignment/timing fields for its
//!     business; external actors may add Pending rows concurrently.
//!   - Every decision lands in the audit log before the pass moves on.

use crate::{
    appointment::Appointment,
    clock::EngineClock,
    config::EngineConfig,
    detector::{DelayDetector, DelayKind},
    error::{DispatchError, DispatchResult},
    notify::{LogNotifier, Notifier},
    planner::{ConsiderReason, PlannerOutcome, ReassignmentPlanner},
    propagator::DelayPropagator,
    store::DispatchStore,
    types::{BusinessId, CorrelationId},
};

pub struct DispatchEngine {
    business_id: BusinessId,
    config: EngineConfig,
    clock: EngineClock,
    store: DispatchStore,
    detector: DelayDetector,
    propagator: DelayPropagator,
    planner: ReassignmentPlanner,
    notifier: Box<dyn Notifier>,
}

/// What one pass did, for the runner's summary line and for tests.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassSummary {
    pub delays_detected: usize,
    pub cascades: usize,
    pub propagated: usize,
    pub reassignments: usize,
    pub assignments: usize,
    pub accepted_in_place: usize,
    pub deferred: usize,
}

impl PassSummary {
    fn tally(&mut self, outcome: PlannerOutcome) {
        match outcome {
            PlannerOutcome::Committed { previous: Some(_), .. } => self.reassignments += 1,
            PlannerOutcome::Committed { previous: None, .. } => self.assignments += 1,
            PlannerOutcome::AcceptedInPlace => self.accepted_in_place += 1,
            PlannerOutcome::Deferred => self.deferred += 1,
        }
    }
}

impl DispatchEngine {
    pub fn new(
        business_id: BusinessId,
        config: EngineConfig,
        clock: EngineClock,
        store: DispatchStore,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        let detector = DelayDetector::new(config.grace_window_minutes);
        let propagator = DelayPropagator::new(config.max_cascade_steps);
        let planner = ReassignmentPlanner::new(config.roster_freshness_seconds);
        Self {
            business_id,
            config,
            clock,
            store,
            detector,
            propagator,
            planner,
            notifier,
        }
    }

    /// Wall-clock engine with the default notifier. Production callers
    /// and the runner use this; tests pin the clock via new().
    pub fn build(business_id: BusinessId, config: EngineConfig, store: DispatchStore) -> Self {
        Self::new(
            business_id,
            config,
            EngineClock::System,
            store,
            Box::new(LogNotifier),
        )
    }

    pub fn business_id(&self) -> BusinessId {
        self.business_id
    }

    pub fn store(&self) -> &DispatchStore {
        &self.store
    }

    /// Ingestion gate for new bookings: validate, then persist.
    /// Malformed shapes are surfaced to the caller and write nothing.
    pub fn ingest(&self, appointment: &Appointment) -> DispatchResult<()> {
        if appointment.business_id != self.business_id {
            return Err(DispatchError::MalformedAppointment {
                reason: format!(
                    "appointment {} belongs to business {}, engine serves {}",
                    appointment.appointment_id, appointment.business_id, self.business_id
                ),
            });
        }
        appointment.validate(&self.config.skill_catalog)?;
        self.store.insert_appointment(appointment)
    }

    /// One full detector-and-cascades pass over this business.
    pub fn run_pass(&self) -> DispatchResult<PassSummary> {
        let now = self.clock.now();
        let roster = self.store.roster_snapshot(self.business_id, now)?;
        let records = self.detector.scan(&self.store, self.business_id, now)?;

        let mut summary = PassSummary::default();
        summary.delays_detected = records
            .iter()
            .filter(|r| r.kind == DelayKind::LateStart)
            .count();

        for record in &records {
            let correlation_id = CorrelationId::new_v4();
            summary.cascades += 1;

            if record.kind == DelayKind::LateStart {
                if let Some(appt) = self.store.appointment(record.appointment_id)? {
                    let outcome = self.planner.consider(
                        &self.store,
                        &roster,
                        self.notifier.as_ref(),
                        &appt,
                        ConsiderReason::Delayed { trigger: None },
                        Some(correlation_id),
                        now,
                    )?;
                    summary.tally(outcome);
                }
            }

            let steps = self.propagator.propagate(
                &self.store,
                &self.planner,
                &roster,
                self.notifier.as_ref(),
                record.appointment_id,
                now,
                correlation_id,
            )?;
            summary.propagated += steps.len();
            for step in steps {
                summary.tally(step.outcome);
            }
        }

        for appt in self.store.list_unstaffed(self.business_id)? {
            let outcome = self.planner.consider(
                &self.store,
                &roster,
                self.notifier.as_ref(),
                &appt,
                ConsiderReason::Unstaffed,
                None,
                now,
            )?;
            summary.tally(outcome);
        }

        log::debug!(
            "pass for business {}: {} delays, {} cascades, {} reassignments, {} assignments",
            self.business_id,
            summary.delays_detected,
            summary.cascades,
            summary.reassignments,
            summary.assignments,
        );
        Ok(summary)
    }
}
