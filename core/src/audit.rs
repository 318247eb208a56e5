//! Audit emission: the engine's side of the append-only log.
//!
//! Emission is fire-and-forget: a decision that was already committed
//! must never be unwound because the log write failed, so failures are
//! logged and swallowed. The return value only tells callers whether a
//! row landed, for pass summaries.

use crate::{
    event::{AuditEvent, AuditLogEntry},
    store::DispatchStore,
    types::{BusinessId, CorrelationId},
};
use chrono::{DateTime, Utc};

pub struct AuditEmitter {
    actor: &'static str,
}

impl AuditEmitter {
    /// One emitter per deciding component; `actor` lands in every row.
    pub fn new(actor: &'static str) -> Self {
        Self { actor }
    }

    pub fn emit(
        &self,
        store: &DispatchStore,
        business_id: BusinessId,
        event: &AuditEvent,
        correlation_id: Option<CorrelationId>,
        at: DateTime<Utc>,
    ) -> bool {
        let payload = match serde_json::to_string(event) {
            Ok(payload) => payload,
            Err(e) => {
                log::warn!("audit payload for {} did not serialize: {e}", event.type_name());
                return false;
            }
        };
        let entry = AuditLogEntry {
            id: None,
            business_id,
            event_type: event.type_name().to_string(),
            actor: self.actor.to_string(),
            correlation_id,
            payload,
            recorded_at: at,
        };
        match store.append_audit(&entry) {
            Ok(()) => true,
            Err(e) => {
                log::warn!("audit append for {} failed: {e}", event.type_name());
                false
            }
        }
    }
}
