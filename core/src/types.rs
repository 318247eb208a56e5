//! Shared primitive types used across the entire engine.

use uuid::Uuid;

/// Identity of an appointment.
pub type AppointmentId = Uuid;

/// Identity of a provider (staff member performing appointments).
pub type ProviderId = Uuid;

/// Identity of a business, the tenant boundary. All matching and
/// propagation is scoped to exactly one business.
pub type BusinessId = Uuid;

/// Correlation id stamped on every audit event of one delay cascade.
pub type CorrelationId = Uuid;

/// Short identifier for a qualification required to perform a treatment.
pub type SkillCode = String;
