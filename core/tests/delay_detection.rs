//! Delay detector: grace window, monotonic growth, idempotence.

use chrono::{DateTime, NaiveTime, Utc};
use dispatch_core::{
    appointment::{Appointment, AppointmentStatus},
    clock::EngineClock,
    config::EngineConfig,
    detector::{DelayDetector, DelayKind},
    engine::DispatchEngine,
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

fn setup() -> (DispatchStore, BusinessId, ProviderId) {
    let store = DispatchStore::in_memory().unwrap();
    store.migrate().unwrap();
    let business_id = Uuid::new_v4();
    store.insert_business(business_id, "clinic").unwrap();
    let provider = Provider {
        provider_id: Uuid::new_v4(),
        business_id,
        display_name: "Ana".to_string(),
        skills: BTreeSet::new(),
        accepts_transfers: true,
        working_hours: WeekSchedule::uniform(
            NaiveTime::from_hms_opt(8, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(18, 0, 0).unwrap(),
        ),
        is_online: true,
        last_seen: ts("2026-08-05T08:00:00Z"),
    };
    store.insert_provider(&provider).unwrap();
    (store, business_id, provider.provider_id)
}

fn pending(business_id: BusinessId, provider_id: ProviderId, start: &str) -> Appointment {
    Appointment {
        appointment_id: Uuid::new_v4(),
        business_id,
        scheduled_start: ts(start),
        duration_minutes: 30,
        status: AppointmentStatus::Pending,
        assigned_provider_id: Some(provider_id),
        shifted_from_provider_id: None,
        delay_minutes: 0,
        required_skills: BTreeSet::new(),
        version: 0,
    }
}

#[test]
fn slippage_within_grace_window_is_ignored() {
    let (store, business_id, provider_id) = setup();
    let appt = pending(business_id, provider_id, "2026-08-05T09:00:00Z");
    store.insert_appointment(&appt).unwrap();

    let detector = DelayDetector::new(5);
    let records = detector
        .scan(&store, business_id, ts("2026-08-05T09:04:00Z"))
        .unwrap();
    assert!(records.is_empty());
    assert_eq!(store.audit_count(business_id, "delay.detect").unwrap(), 0);
}

#[test]
fn slippage_past_grace_is_recorded_in_full() {
    let (store, business_id, provider_id) = setup();
    let appt = pending(business_id, provider_id, "2026-08-05T09:00:00Z");
    store.insert_appointment(&appt).unwrap();

    let detector = DelayDetector::new(5);
    let records = detector
        .scan(&store, business_id, ts("2026-08-05T09:20:00Z"))
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].kind, DelayKind::LateStart);
    // Full slippage, not slippage minus grace.
    assert_eq!(records[0].delay_minutes, 20);

    let stored = store.appointment(appt.appointment_id).unwrap().unwrap();
    assert_eq!(stored.delay_minutes, 20);
    assert_eq!(stored.status, AppointmentStatus::Pending, "scan must not touch status");
    assert_eq!(store.audit_count(business_id, "delay.detect").unwrap(), 1);
}

#[test]
fn delay_only_grows() {
    let (store, business_id, provider_id) = setup();
    let appt = pending(business_id, provider_id, "2026-08-05T09:00:00Z");
    store.insert_appointment(&appt).unwrap();

    let detector = DelayDetector::new(5);
    detector
        .scan(&store, business_id, ts("2026-08-05T09:20:00Z"))
        .unwrap();
    let records = detector
        .scan(&store, business_id, ts("2026-08-05T09:25:00Z"))
        .unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].delay_minutes, 25);

    let stored = store.appointment(appt.appointment_id).unwrap().unwrap();
    assert_eq!(stored.delay_minutes, 25);
    assert_eq!(store.audit_count(business_id, "delay.detect").unwrap(), 2);
}

/// A second scan at the same instant over an unchanged queue reports
/// nothing and writes nothing.
#[test]
fn rescan_of_unchanged_queue_is_a_no_op() {
    let (store, business_id, provider_id) = setup();
    let appt = pending(business_id, provider_id, "2026-08-05T09:00:00Z");
    store.insert_appointment(&appt).unwrap();

    let detector = DelayDetector::new(5);
    let now = ts("2026-08-05T09:20:00Z");
    let first = detector.scan(&store, business_id, now).unwrap();
    assert_eq!(first.len(), 1);
    let audits_after_first = store.audit_total(business_id).unwrap();

    let second = detector.scan(&store, business_id, now).unwrap();
    assert!(second.is_empty());
    assert_eq!(store.audit_total(business_id).unwrap(), audits_after_first);
}

#[test]
fn completion_clears_the_delay_cache() {
    let (store, business_id, provider_id) = setup();
    let appt = pending(business_id, provider_id, "2026-08-05T09:00:00Z");
    store.insert_appointment(&appt).unwrap();

    let detector = DelayDetector::new(5);
    detector
        .scan(&store, business_id, ts("2026-08-05T09:20:00Z"))
        .unwrap();
    store
        .set_status(appt.appointment_id, AppointmentStatus::Completed)
        .unwrap();

    let stored = store.appointment(appt.appointment_id).unwrap().unwrap();
    assert_eq!(stored.delay_minutes, 0);

    // Terminal rows leave the scan's working set entirely.
    let records = detector
        .scan(&store, business_id, ts("2026-08-05T10:00:00Z"))
        .unwrap();
    assert!(records.is_empty());
}

/// Full-pass idempotence at engine level: same instant, unchanged
/// queue, zero new records or audit rows.
#[test]
fn engine_pass_is_idempotent_at_fixed_instant() {
    let (store, business_id, provider_id) = setup();
    let appt = pending(business_id, provider_id, "2026-08-05T09:00:00Z");
    store.insert_appointment(&appt).unwrap();

    let engine = DispatchEngine::new(
        business_id,
        EngineConfig::default_test(),
        EngineClock::fixed("2026-08-05T09:20:00Z"),
        store,
        Box::new(NoopNotifier),
    );

    let first = engine.run_pass().unwrap();
    assert_eq!(first.delays_detected, 1);
    let audits = engine.store().audit_total(business_id).unwrap();

    let second = engine.run_pass().unwrap();
    assert_eq!(second.delays_detected, 0);
    assert_eq!(second.propagated, 0);
    assert_eq!(second.reassignments, 0);
    assert_eq!(engine.store().audit_total(business_id).unwrap(), audits);
}
