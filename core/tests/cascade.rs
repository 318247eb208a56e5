//! Engine passes end to end: ingestion gate, overrun cascades, and the
//! audited terminal outcomes.

use chrono::{DateTime, NaiveTime, Utc};
use dispatch_core::{
    appointment::{Appointment, AppointmentStatus},
    clock::EngineClock,
    config::EngineConfig,
    engine::DispatchEngine,
    error::DispatchError,
    notify::NoopNotifier,
    roster::{Provider, WeekSchedule},
    store::DispatchStore,
    types::{BusinessId, ProviderId},
};
use std::collections::BTreeSet;
use uuid::Uuid;

fn ts(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn make_provider(business_id: BusinessId, name: &str, skills: &[&str]) -> Provider {
    Provider {
        provider_id: Uuid::new_v4(),
        business_id,
        display_name: name.to_string(),
        skills: skills.iter().map(|s| s.to_string()).collect(),
        accepts_transfers: true,
        working_hours: WeekSchedule::uniform(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        ),
        is_online: true,
        last_seen: ts("2026-08-05T08:00:00Z"),
    }
}

fn appointment(
    business_id: BusinessId,
    provider_id: Option<ProviderId>,
    start: &str,
    duration_minutes: i64,
    required: &[&str],
) -> Appointment {
    Appointment {
        appointment_id: Uuid::new_v4(),
        business_id,
        scheduled_start: ts(start),
        duration_minutes,
        status: AppointmentStatus::Pending,
        assigned_provider_id: provider_id,
        shifted_from_provider_id: None,
        delay_minutes: 0,
        required_skills: required.iter().map(|s| s.to_string()).collect(),
        version: 0,
    }
}

fn engine_at(business_id: BusinessId, now: &str) -> DispatchEngine {
    let store = DispatchStore::in_memory().unwrap();
    store.migrate().unwrap();
    store.insert_business(business_id, "clinic").unwrap();
    DispatchEngine::new(
        business_id,
        EngineConfig::default_test(),
        EngineClock::fixed(now),
        store,
        Box::new(NoopNotifier),
    )
}

#[test]
fn ingestion_rejects_non_positive_duration() {
    let business_id = Uuid::new_v4();
    let engine = engine_at(business_id, "2026-08-05T08:00:00Z");

    let bad = appointment(business_id, None, "2026-08-05T09:00:00Z", 0, &[]);
    let err = engine.ingest(&bad).unwrap_err();
    assert!(matches!(err, DispatchError::MalformedAppointment { .. }));
    assert!(engine.store().appointment(bad.appointment_id).unwrap().is_none());
}

#[test]
fn ingestion_rejects_unknown_skill_codes() {
    let business_id = Uuid::new_v4();
    let engine = engine_at(business_id, "2026-08-05T08:00:00Z");

    let bad = appointment(business_id, None, "2026-08-05T09:00:00Z", 30, &["LEVITATION"]);
    let err = engine.ingest(&bad).unwrap_err();
    match err {
        DispatchError::MalformedAppointment { reason } => {
            assert!(reason.contains("LEVITATION"), "reason was: {reason}");
        }
        other => panic!("expected MalformedAppointment, got {other}"),
    }
}

#[test]
fn ingestion_rejects_foreign_business() {
    let business_id = Uuid::new_v4();
    let engine = engine_at(business_id, "2026-08-05T08:00:00Z");

    let foreign = appointment(Uuid::new_v4(), None, "2026-08-05T09:00:00Z", 30, &[]);
    let err = engine.ingest(&foreign).unwrap_err();
    assert!(matches!(err, DispatchError::MalformedAppointment { .. }));
}

/// An active appointment running past its end pushes the successor even
/// when the successor's own slippage is still inside the grace window.
#[test]
fn active_overrun_cascades_to_the_successor() {
    let business_id = Uuid::new_v4();
    let engine = engine_at(business_id, "2026-08-05T09:40:00Z");
    let x = make_provider(business_id, "X", &[]);
    engine.store().insert_provider(&x).unwrap();

    let mut running = appointment(
        business_id,
        Some(x.provider_id),
        "2026-08-05T09:00:00Z",
        30,
        &[],
    );
    running.status = AppointmentStatus::Active;
    engine.ingest(&running).unwrap();
    let next = appointment(
        business_id,
        Some(x.provider_id),
        "2026-08-05T09:35:00Z",
        30,
        &[],
    );
    engine.ingest(&next).unwrap();

    let summary = engine.run_pass().unwrap();
    // The overrun itself is not a detected delay; only the ripple is.
    assert_eq!(summary.delays_detected, 0);
    assert_eq!(summary.propagated, 1);

    let store = engine.store();
    let running_after = store.appointment(running.appointment_id).unwrap().unwrap();
    assert_eq!(running_after.status, AppointmentStatus::Active);
    assert_eq!(running_after.delay_minutes, 0, "overrun leaves the trigger untouched");

    let pushed = store.appointment(next.appointment_id).unwrap().unwrap();
    assert_eq!(pushed.delay_minutes, 5);
    assert_eq!(pushed.effective_start(), ts("2026-08-05T09:40:00Z"));
    assert_eq!(store.audit_count(business_id, "delay.propagate").unwrap(), 1);
}

/// The no-eligible-alternative terminal is an audited outcome, not an
/// error: the appointment keeps its provider and its delay.
#[test]
fn unmatchable_skill_is_an_audited_accept_in_place() {
    let business_id = Uuid::new_v4();
    let engine = engine_at(business_id, "2026-08-05T09:20:00Z");
    let x = make_provider(business_id, "X", &["CUT"]);
    let idle = make_provider(business_id, "Idle", &["COLOR"]);
    engine.store().insert_provider(&x).unwrap();
    engine.store().insert_provider(&idle).unwrap();

    // Jam X so staying put means keeping the delay.
    let delayed = appointment(
        business_id,
        Some(x.provider_id),
        "2026-08-05T09:00:00Z",
        30,
        &["SURG"],
    );
    let next = appointment(
        business_id,
        Some(x.provider_id),
        "2026-08-05T09:30:00Z",
        30,
        &["CUT"],
    );
    engine.ingest(&delayed).unwrap();
    engine.ingest(&next).unwrap();

    let summary = engine.run_pass().unwrap();
    assert_eq!(summary.delays_detected, 1);
    assert_eq!(summary.reassignments, 0);

    let store = engine.store();
    let still = store.appointment(delayed.appointment_id).unwrap().unwrap();
    assert_eq!(still.assigned_provider_id, Some(x.provider_id));
    assert_eq!(still.delay_minutes, 20);

    let events = store.audit_events(business_id).unwrap();
    let cycle = events
        .iter()
        .find(|e| e.event_type == "appointment.assistant_cycle")
        .expect("assistant cycle must be audited");
    let payload: serde_json::Value = serde_json::from_str(&cycle.payload).unwrap();
    assert!(payload["note"]
        .as_str()
        .unwrap()
        .contains("no eligible alternative"));
}

/// Two committed appointments never hold the same provider at
/// overlapping effective intervals.
#[test]
fn no_provider_holds_overlapping_commitments() {
    let business_id = Uuid::new_v4();
    let engine = engine_at(business_id, "2026-08-05T09:20:00Z");
    let x = make_provider(business_id, "X", &[]);
    let w = make_provider(business_id, "W", &[]);
    engine.store().insert_provider(&x).unwrap();
    engine.store().insert_provider(&w).unwrap();

    for start in [
        "2026-08-05T09:00:00Z",
        "2026-08-05T09:30:00Z",
        "2026-08-05T10:00:00Z",
    ] {
        engine
            .ingest(&appointment(business_id, Some(x.provider_id), start, 30, &[]))
            .unwrap();
    }
    engine.run_pass().unwrap();

    let store = engine.store();
    let open = store.list_pending_or_active(business_id).unwrap();
    for a in &open {
        for b in &open {
            if a.appointment_id == b.appointment_id {
                continue;
            }
            if a.assigned_provider_id.is_some()
                && a.assigned_provider_id == b.assigned_provider_id
            {
                let disjoint = a.effective_end() <= b.effective_start()
                    || b.effective_end() <= a.effective_start();
                assert!(
                    disjoint,
                    "provider {:?} double-booked: {} and {}",
                    a.assigned_provider_id, a.appointment_id, b.appointment_id
                );
            }
        }
    }
}
