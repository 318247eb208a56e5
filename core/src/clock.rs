//! Engine clock: the single source of "now".
//!
//! RULE: Nothing in the engine reads the system clock directly.
//! All instants flow through EngineClock so tests can pin time.

use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub enum EngineClock {
    /// Wall clock. Used by the runner and production callers.
    System,
    /// Pinned instant. Used by tests and replay tooling.
    Fixed(DateTime<Utc>),
}

impl EngineClock {
    pub fn now(&self) -> DateTime<Utc> {
        match self {
            Self::System => Utc::now(),
            Self::Fixed(at) => *at,
        }
    }

    /// Pin the clock to an RFC 3339 instant. Panics on an unparsable
    /// literal; callers pass compile-time constants.
    pub fn fixed(rfc3339: &str) -> Self {
        let at = DateTime::parse_from_rfc3339(rfc3339)
            .unwrap_or_else(|e| panic!("bad clock literal {rfc3339}: {e}"))
            .with_timezone(&Utc);
        Self::Fixed(at)
    }
}
