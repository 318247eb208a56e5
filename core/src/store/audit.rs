use super::{id_column, opt_id_column, ts_column, DispatchStore};
use crate::{
    error::DispatchResult,
    event::AuditLogEntry,
    types::{BusinessId, CorrelationId},
};
use rusqlite::{params, Row};

fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    Ok(AuditLogEntry {
        id: Some(row.get(0)?),
        business_id: id_column(row, 1)?,
        event_type: row.get(2)?,
        actor: row.get(3)?,
        correlation_id: opt_id_column(row, 4)?,
        payload: row.get(5)?,
        recorded_at: ts_column(row, 6)?,
    })
}

impl DispatchStore {
    /// Append one audit row. The table has no UPDATE path; rows are
    /// immutable once written.
    pub fn append_audit(&self, entry: &AuditLogEntry) -> DispatchResult<()> {
        self.conn.execute(
            "INSERT INTO audit_event (
                 business_id, event_type, actor, correlation_id, payload, recorded_at
             ) VALUES (?1,?2,?3,?4,?5,?6)",
            params![
                entry.business_id.to_string(),
                entry.event_type,
                entry.actor,
                entry.correlation_id.map(|id| id.to_string()),
                entry.payload,
                entry.recorded_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// All audit rows for one business in append order.
    pub fn audit_events(&self, business_id: BusinessId) -> DispatchResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, business_id, event_type, actor, correlation_id, payload, recorded_at
             FROM audit_event WHERE business_id = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![business_id.to_string()], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    /// All rows of one cascade, in append order.
    pub fn audit_for_correlation(
        &self,
        correlation_id: CorrelationId,
    ) -> DispatchResult<Vec<AuditLogEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, business_id, event_type, actor, correlation_id, payload, recorded_at
             FROM audit_event WHERE correlation_id = ?1 ORDER BY id ASC",
        )?;
        let entries = stmt
            .query_map(params![correlation_id.to_string()], entry_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(entries)
    }

    pub fn audit_count(&self, business_id: BusinessId, event_type: &str) -> DispatchResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM audit_event WHERE business_id = ?1 AND event_type = ?2",
            params![business_id.to_string(), event_type],
            |r| r.get(0),
        )?)
    }

    pub fn audit_total(&self, business_id: BusinessId) -> DispatchResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM audit_event WHERE business_id = ?1",
            params![business_id.to_string()],
            |r| r.get(0),
        )?)
    }
}
