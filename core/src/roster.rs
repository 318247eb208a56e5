//! Providers, their working hours, and the roster snapshot the planner
//! evaluates against.
//!
//! The snapshot is read-only: the engine never mutates provider state,
//! it only stamps when the data was taken so downstream consumers can
//! refuse to act on stale availability.

use crate::{
    error::{DispatchError, DispatchResult},
    skill,
    types::{BusinessId, ProviderId, SkillCode},
};
use chrono::{DateTime, NaiveTime, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Open/close window for a single weekday.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayWindow {
    pub open: NaiveTime,
    pub close: NaiveTime,
}

/// Per-weekday working hours, Monday-indexed. A missing entry means the
/// provider does not work that day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct WeekSchedule {
    windows: [Option<DayWindow>; 7],
}

impl WeekSchedule {
    /// No working hours at all.
    pub fn closed() -> Self {
        Self::default()
    }

    /// Same window all seven days.
    pub fn uniform(open: NaiveTime, close: NaiveTime) -> Self {
        Self {
            windows: [Some(DayWindow { open, close }); 7],
        }
    }

    /// Monday through Friday only.
    pub fn weekdays(open: NaiveTime, close: NaiveTime) -> Self {
        let mut schedule = Self::closed();
        for day in 0..5 {
            schedule.windows[day] = Some(DayWindow { open, close });
        }
        schedule
    }

    pub fn with_day(mut self, weekday: Weekday, open: NaiveTime, close: NaiveTime) -> Self {
        self.windows[weekday.num_days_from_monday() as usize] = Some(DayWindow { open, close });
        self
    }

    pub fn without_day(mut self, weekday: Weekday) -> Self {
        self.windows[weekday.num_days_from_monday() as usize] = None;
        self
    }

    pub fn window_for(&self, weekday: Weekday) -> Option<&DayWindow> {
        self.windows[weekday.num_days_from_monday() as usize].as_ref()
    }

    /// Whether `[start, start + duration)` fits entirely inside the
    /// window for that weekday. Seconds-since-midnight arithmetic, so a
    /// candidate spilling past midnight can never fit.
    pub fn fits(&self, weekday: Weekday, start: NaiveTime, duration_minutes: i64) -> bool {
        let Some(window) = self.window_for(weekday) else {
            return false;
        };
        let start_s = i64::from(start.num_seconds_from_midnight());
        let end_s = start_s + duration_minutes * 60;
        let open_s = i64::from(window.open.num_seconds_from_midnight());
        let close_s = i64::from(window.close.num_seconds_from_midnight());
        start_s >= open_s && end_s <= close_s
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Provider {
    pub provider_id: ProviderId,
    pub business_id: BusinessId,
    pub display_name: String,
    pub skills: BTreeSet<SkillCode>,
    /// Opt-out gate: false means never a reassignment target.
    pub accepts_transfers: bool,
    pub working_hours: WeekSchedule,
    /// Presence is advisory: it orders candidates, never gates them.
    pub is_online: bool,
    pub last_seen: DateTime<Utc>,
}

/// Point-in-time view of one business's roster.
#[derive(Debug, Clone)]
pub struct RosterSnapshot {
    pub business_id: BusinessId,
    pub taken_at: DateTime<Utc>,
    pub providers: Vec<Provider>,
}

impl RosterSnapshot {
    pub fn provider(&self, id: ProviderId) -> Option<&Provider> {
        self.providers.iter().find(|p| p.provider_id == id)
    }

    /// Match step of the planner: providers whose skills cover the
    /// requirement.
    pub fn eligible(&self, required: &BTreeSet<SkillCode>) -> Vec<&Provider> {
        self.providers
            .iter()
            .filter(|p| skill::matches(required, &p.skills))
            .collect()
    }

    pub fn age_seconds(&self, now: DateTime<Utc>) -> i64 {
        (now - self.taken_at).num_seconds()
    }

    /// Guard against acting on stale availability: errors when the
    /// snapshot is older than `freshness_seconds`.
    pub fn ensure_fresh(&self, now: DateTime<Utc>, freshness_seconds: i64) -> DispatchResult<()> {
        let age_seconds = self.age_seconds(now);
        if age_seconds > freshness_seconds {
            return Err(DispatchError::StaleRoster {
                business_id: self.business_id,
                age_seconds,
            });
        }
        Ok(())
    }
}
