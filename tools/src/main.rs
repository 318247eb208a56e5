//! dispatch-runner: headless operational CLI for the dispatch engine.
//!
//! Usage:
//!   dispatch-runner --db dispatch.db --seed-demo --seed 42
//!   dispatch-runner --db dispatch.db --passes 3
//!   dispatch-runner --db dispatch.db --passes 1 --now 2026-08-05T09:20:00Z
//!   dispatch-runner --db dispatch.db --tail-audit 20

use anyhow::Result;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use dispatch_core::{
    appointment::{Appointment, AppointmentStatus},
    clock::EngineClock,
    config::EngineConfig,
    engine::DispatchEngine,
    roster::{Provider, WeekSchedule},
    store::DispatchStore,
    types::BusinessId,
    worker::Coordinator,
};
use rand::{RngCore, SeedableRng};
use rand_pcg::Pcg64Mcg;
use std::collections::BTreeSet;
use std::env;
use uuid::Uuid;

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let seed = parse_arg(&args, "--seed", 42u64);
    let passes = parse_arg(&args, "--passes", 0u64);
    let tail = parse_arg(&args, "--tail-audit", 0usize);
    let businesses = parse_arg(&args, "--businesses", 1usize);
    let providers = parse_arg(&args, "--providers", 4usize);
    let appointments = parse_arg(&args, "--appointments", 12usize);
    let seed_demo = args.iter().any(|a| a == "--seed-demo");
    let db = args
        .windows(2)
        .find(|w| w[0] == "--db")
        .map(|w| w[1].as_str())
        .unwrap_or(":memory:");
    let now = args
        .windows(2)
        .find(|w| w[0] == "--now")
        .map(|w| w[1].as_str());

    println!("dispatch-runner");
    println!("  db:     {db}");
    println!("  seed:   {seed}");
    println!("  passes: {passes}");
    println!();

    // For :memory: use a SQLite shared-memory URI so the coordinator's
    // per-worker connections all see the same database.
    let db_effective: String = if db == ":memory:" {
        format!("file:dispatch_{}?mode=memory&cache=shared", unix_now())
    } else {
        db.to_string()
    };
    let store = DispatchStore::open(&db_effective)?;
    store.migrate()?;

    let clock = match now {
        Some(ts) => EngineClock::fixed(ts),
        None => EngineClock::System,
    };
    let config = EngineConfig::default_test();

    if seed_demo {
        seed_demo_data(&store, &config, &clock, seed, businesses, providers, appointments)?;
    }

    if passes > 0 {
        let mut coordinator = Coordinator::new(store.reopen()?, config.clone(), clock.clone());
        for _ in 0..passes {
            coordinator.submit_pass_all()?;
        }
        coordinator.shutdown();
        print_summary(&store)?;
    }

    if tail > 0 {
        tail_audit(&store, tail)?;
    }

    Ok(())
}

/// Deterministic demo tenants: same seed, same roster, same book.
fn seed_demo_data(
    store: &DispatchStore,
    config: &EngineConfig,
    clock: &EngineClock,
    seed: u64,
    businesses: usize,
    providers_per: usize,
    appointments_per: usize,
) -> Result<()> {
    const NAMES: &[&str] = &[
        "Ana", "Bruno", "Carla", "Diego", "Elena", "Felipe", "Gabriela", "Hugo",
    ];

    let mut rng = Pcg64Mcg::seed_from_u64(seed);
    let catalog: Vec<&String> = config.skill_catalog.iter().collect();
    let day_base = clock.now().date_naive();

    for b in 0..businesses {
        let business_id = BusinessId::new_v4();
        store.insert_business(business_id, &format!("Demo Clinic {}", b + 1))?;
        let engine = DispatchEngine::new(
            business_id,
            config.clone(),
            clock.clone(),
            store.reopen()?,
            Box::new(dispatch_core::notify::NoopNotifier),
        );

        let mut roster = Vec::new();
        for p in 0..providers_per {
            let mut skills = BTreeSet::new();
            skills.insert(catalog[rng.next_u64() as usize % catalog.len()].clone());
            skills.insert(catalog[rng.next_u64() as usize % catalog.len()].clone());
            let provider = Provider {
                provider_id: Uuid::new_v4(),
                business_id,
                display_name: NAMES[p % NAMES.len()].to_string(),
                skills,
                accepts_transfers: rng.next_u64() % 10 != 0,
                working_hours: WeekSchedule::weekdays(
                    NaiveTime::from_hms_opt(9, 0, 0).expect("valid time"),
                    NaiveTime::from_hms_opt(17, 0, 0).expect("valid time"),
                ),
                is_online: rng.next_u64() % 10 < 7,
                last_seen: clock.now() - Duration::minutes((rng.next_u64() % 120) as i64),
            };
            store.insert_provider(&provider)?;
            roster.push(provider);
        }

        for a in 0..appointments_per {
            let slot_minutes = 9 * 60 + (rng.next_u64() % (7 * 60)) as i64;
            let scheduled_start = day_base
                .and_time(NaiveTime::MIN)
                .and_utc()
                + Duration::minutes(slot_minutes);
            let assigned = if rng.next_u64() % 5 == 0 {
                None // unstaffed; the first pass places it
            } else {
                Some(roster[a % roster.len()].provider_id)
            };
            let mut required_skills = BTreeSet::new();
            if rng.next_u64() % 2 == 0 {
                required_skills
                    .insert(catalog[rng.next_u64() as usize % catalog.len()].clone());
            }
            let appointment = Appointment {
                appointment_id: Uuid::new_v4(),
                business_id,
                scheduled_start,
                duration_minutes: [30, 45, 60][(rng.next_u64() % 3) as usize],
                status: AppointmentStatus::Pending,
                assigned_provider_id: assigned,
                shifted_from_provider_id: None,
                delay_minutes: 0,
                required_skills,
                version: 0,
            };
            engine.ingest(&appointment)?;
        }

        println!(
            "seeded business {business_id}: {providers_per} providers, {appointments_per} appointments"
        );
    }
    Ok(())
}

fn print_summary(store: &DispatchStore) -> Result<()> {
    println!("=== PASS SUMMARY ===");
    for business_id in store.list_business_ids()? {
        let pending = store.count_by_status(business_id, AppointmentStatus::Pending)?;
        let active = store.count_by_status(business_id, AppointmentStatus::Active)?;
        println!("  business {business_id}");
        println!("    pending:     {pending}");
        println!("    active:      {active}");
        for event_type in [
            "appointment.assign",
            "delay.detect",
            "delay.propagate",
            "appointment.reassign",
            "appointment.assistant_cycle",
        ] {
            let count = store.audit_count(business_id, event_type)?;
            if count > 0 {
                println!("    {event_type}: {count}");
            }
        }
    }
    Ok(())
}

fn tail_audit(store: &DispatchStore, n: usize) -> Result<()> {
    for business_id in store.list_business_ids()? {
        let events = store.audit_events(business_id)?;
        println!("=== AUDIT TAIL ({business_id}) ===");
        for entry in events.iter().rev().take(n).rev() {
            println!(
                "  #{} {} [{}] {} {}",
                entry.id.unwrap_or(0),
                format_ts(entry.recorded_at),
                entry.actor,
                entry.event_type,
                entry.payload,
            );
        }
    }
    Ok(())
}

fn format_ts(ts: DateTime<Utc>) -> String {
    ts.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn parse_arg<T: std::str::FromStr + Copy>(args: &[String], flag: &str, default: T) -> T {
    args.windows(2)
        .find(|w| w[0] == flag)
        .and_then(|w| w[1].parse().ok())
        .unwrap_or(default)
}

fn unix_now() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
