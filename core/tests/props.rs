//! Property tests over generated day queues: propagation terminates,
//! never rewinds an appointment, and converges after one walk.

use chrono::{DateTime, Duration, NaiveTime, Utc};
use dispatch_core::{
    appointment::{Appointment, AppointmentStatus},
    notify::NoopNotifier,
    planner::ReassignmentPlanner,
    propagator::DelayPropagator,
    roster::{Provider, WeekSchedule},
    store::DispatchStore,
    types::{AppointmentId, BusinessId},
};
use proptest::prelude::*;
use std::collections::BTreeSet;
use uuid::Uuid;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

/// One provider, a sequential day queue shaped by `(gap, duration)`
/// pairs, and an initial delay planted on the head appointment.
fn build_queue(
    initial_delay: i64,
    layout: &[(i64, i64)],
) -> (DispatchStore, BusinessId, AppointmentId, Vec<AppointmentId>) {
    let store = DispatchStore::in_memory().unwrap();
    store.migrate().unwrap();
    let business_id = Uuid::new_v4();
    store.insert_business(business_id, "prop clinic").unwrap();

    let provider = Provider {
        provider_id: Uuid::new_v4(),
        business_id,
        display_name: "Solo".to_string(),
        skills: BTreeSet::new(),
        accepts_transfers: true,
        working_hours: WeekSchedule::uniform(
            NaiveTime::from_hms_opt(0, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(23, 59, 0).unwrap(),
        ),
        is_online: true,
        last_seen: ts("2026-08-05T07:00:00Z"),
    };
    store.insert_provider(&provider).unwrap();

    let mut ids = Vec::new();
    let mut start = ts("2026-08-05T08:00:00Z");
    for (gap, duration) in layout {
        start = start + Duration::minutes(*gap);
        let appt = Appointment {
            appointment_id: Uuid::new_v4(),
            business_id,
            scheduled_start: start,
            duration_minutes: *duration,
            status: AppointmentStatus::Pending,
            assigned_provider_id: Some(provider.provider_id),
            shifted_from_provider_id: None,
            delay_minutes: 0,
            required_skills: BTreeSet::new(),
            version: 0,
        };
        store.insert_appointment(&appt).unwrap();
        ids.push(appt.appointment_id);
        start = start + Duration::minutes(*duration);
    }

    let head = ids[0];
    store.record_delay(head, initial_delay, 0).unwrap();
    (store, business_id, head, ids)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn propagation_never_rewinds_and_converges(
        initial_delay in 1i64..=180,
        layout in prop::collection::vec((0i64..=60, 15i64..=60), 1..6),
    ) {
        let (store, business_id, head, _ids) = build_queue(initial_delay, &layout);
        let now = ts("2026-08-05T08:30:00Z");
        let roster = store.roster_snapshot(business_id, now).unwrap();
        let propagator = DelayPropagator::new(64);
        let planner = ReassignmentPlanner::new(3600);

        let steps = propagator
            .propagate(&store, &planner, &roster, &NoopNotifier, head, now, Uuid::new_v4())
            .unwrap();
        prop_assert!(steps.len() < layout.len(), "walk is bounded by the queue");

        let open = store.list_pending_or_active(business_id).unwrap();
        for appt in &open {
            prop_assert!(
                appt.effective_start() >= appt.scheduled_start,
                "appointment {} moved earlier than booked",
                appt.appointment_id
            );
        }
        for a in &open {
            for b in &open {
                if a.appointment_id == b.appointment_id {
                    continue;
                }
                let disjoint = a.effective_end() <= b.effective_start()
                    || b.effective_end() <= a.effective_start();
                prop_assert!(
                    disjoint,
                    "effective intervals of {} and {} overlap",
                    a.appointment_id,
                    b.appointment_id
                );
            }
        }

        // One walk converges: a second one finds nothing left to push.
        let audits_before = store.audit_total(business_id).unwrap();
        let again = propagator
            .propagate(&store, &planner, &roster, &NoopNotifier, head, now, Uuid::new_v4())
            .unwrap();
        prop_assert!(again.is_empty());
        prop_assert_eq!(store.audit_total(business_id).unwrap(), audits_before);
    }
}
