//! Audit events: every engine decision, appended and never rewritten.
//!
//! RULE: the engine communicates outcomes ONLY through the audit log.
//! Downstream tooling (debug probes, log analysis) replays these rows;
//! variants are added over time but never removed or renamed.

use crate::types::{AppointmentId, BusinessId, CorrelationId, ProviderId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Every event the engine emits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    /// A previously unstaffed appointment received its first provider.
    AppointmentAssigned {
        appointment_id: AppointmentId,
        provider_id: ProviderId,
        delay_minutes: i64,
    },

    /// The detector observed slippage growing on a pending appointment.
    DelayDetected {
        appointment_id: AppointmentId,
        provider_id: Option<ProviderId>,
        delay_minutes: i64,
    },

    /// A cascade walk pushed a downstream appointment's effective start.
    DelayPropagated {
        appointment_id: AppointmentId,
        provider_id: ProviderId,
        delay_minutes: i64,
        trigger_appointment_id: AppointmentId,
    },

    /// The planner moved an appointment to a different provider.
    AppointmentReassigned {
        appointment_id: AppointmentId,
        provider_id: ProviderId,
        previous_provider_id: Option<ProviderId>,
        delay_minutes: i64,
        trigger_appointment_id: Option<AppointmentId>,
    },

    /// The planner ran a full cycle and left the appointment in place.
    AssistantCycle {
        appointment_id: AppointmentId,
        provider_id: Option<ProviderId>,
        delay_minutes: i64,
        note: String,
        trigger_appointment_id: Option<AppointmentId>,
    },
}

impl AuditEvent {
    /// Stable dotted event name, as used by the event_type column and
    /// the downstream log tooling.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::AppointmentAssigned { .. } => "appointment.assign",
            Self::DelayDetected { .. } => "delay.detect",
            Self::DelayPropagated { .. } => "delay.propagate",
            Self::AppointmentReassigned { .. } => "appointment.reassign",
            Self::AssistantCycle { .. } => "appointment.assistant_cycle",
        }
    }
}

/// An audit row as persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditLogEntry {
    pub id: Option<i64>,
    pub business_id: BusinessId,
    pub event_type: String,
    /// Which part of the engine decided: "detector", "propagator",
    /// "assistant".
    pub actor: String,
    /// Present on every event belonging to one delay cascade.
    pub correlation_id: Option<CorrelationId>,
    /// JSON-serialized AuditEvent.
    pub payload: String,
    pub recorded_at: DateTime<Utc>,
}
