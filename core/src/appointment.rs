//! Appointment records and their lifecycle.
//!
//! Status is a closed enum; the store encodes it as TEXT, but nothing
//! outside the store boundary ever sees a raw status string, so states
//! like "active and cancelled" are unrepresentable.

use crate::{
    error::{DispatchError, DispatchResult},
    types::{AppointmentId, BusinessId, ProviderId, SkillCode},
};
use chrono::{DateTime, Duration, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    Pending,
    Active,
    Completed,
    Cancelled,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Decode a store column. Unknown strings are a data error, not a panic.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "cancelled" => Some(Self::Cancelled),
            _ => None,
        }
    }

    /// Completed and Cancelled never transition again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Pending or Active, the states the engine schedules around.
    pub fn is_open(&self) -> bool {
        !self.is_terminal()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Appointment {
    pub appointment_id: AppointmentId,
    pub business_id: BusinessId,
    pub scheduled_start: DateTime<Utc>,
    pub duration_minutes: i64,
    pub status: AppointmentStatus,
    /// None = unstaffed; the planner will try to find a provider.
    pub assigned_provider_id: Option<ProviderId>,
    /// Previous holder, set when the planner moves the appointment.
    pub shifted_from_provider_id: Option<ProviderId>,
    /// Cached slippage in whole minutes. Cleared on completion/cancellation.
    pub delay_minutes: i64,
    /// Empty set = any provider qualifies.
    pub required_skills: BTreeSet<SkillCode>,
    /// Optimistic-concurrency token, bumped on every store write.
    pub version: i64,
}

impl Appointment {
    /// Where the appointment currently stands: scheduled start plus the
    /// recorded slippage.
    pub fn effective_start(&self) -> DateTime<Utc> {
        self.scheduled_start + Duration::minutes(self.delay_minutes)
    }

    pub fn effective_end(&self) -> DateTime<Utc> {
        self.effective_start() + Duration::minutes(self.duration_minutes)
    }

    pub fn scheduled_end(&self) -> DateTime<Utc> {
        self.scheduled_start + Duration::minutes(self.duration_minutes)
    }

    /// Calendar day the appointment was booked on. Day queues are keyed
    /// by scheduled (not effective) date so a delay never moves an
    /// appointment into another day's queue.
    pub fn day(&self) -> NaiveDate {
        self.scheduled_start.date_naive()
    }

    /// Half-open overlap test against `[start, end)` using the
    /// appointment's effective interval. Exact boundary contact is not
    /// an overlap, so back-to-back bookings never double-count.
    pub fn overlaps(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        self.effective_start() < end && start < self.effective_end()
    }

    /// Ingestion gate. Rejects shapes the engine must never act on;
    /// nothing is silently coerced.
    pub fn validate(&self, skill_catalog: &BTreeSet<SkillCode>) -> DispatchResult<()> {
        if self.duration_minutes <= 0 {
            return Err(DispatchError::MalformedAppointment {
                reason: format!(
                    "duration must be positive, got {} (appointment {})",
                    self.duration_minutes, self.appointment_id
                ),
            });
        }
        if self.delay_minutes < 0 {
            return Err(DispatchError::MalformedAppointment {
                reason: format!(
                    "delay must be non-negative, got {} (appointment {})",
                    self.delay_minutes, self.appointment_id
                ),
            });
        }
        for skill in &self.required_skills {
            if !skill_catalog.contains(skill) {
                return Err(DispatchError::MalformedAppointment {
                    reason: format!(
                        "unknown skill code '{skill}' (appointment {})",
                        self.appointment_id
                    ),
                });
            }
        }
        Ok(())
    }
}
