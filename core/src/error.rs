use crate::types::{AppointmentId, BusinessId, ProviderId};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Version conflict on appointment {appointment_id}: expected {expected}, found {found}")]
    Conflict {
        appointment_id: AppointmentId,
        expected: i64,
        found: i64,
    },

    #[error("Slot on provider {provider_id} already taken (assigning appointment {appointment_id})")]
    SlotTaken {
        appointment_id: AppointmentId,
        provider_id: ProviderId,
    },

    #[error("Malformed appointment: {reason}")]
    MalformedAppointment { reason: String },

    #[error("Roster snapshot for business {business_id} is stale ({age_seconds}s old)")]
    StaleRoster {
        business_id: BusinessId,
        age_seconds: i64,
    },

    #[error("Appointment {0} not found")]
    AppointmentNotFound(AppointmentId),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DispatchError {
    /// Transient store rejections the planner retries once.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. } | Self::SlotTaken { .. })
    }
}

pub type DispatchResult<T> = Result<T, DispatchError>;
