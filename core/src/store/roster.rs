use super::{id_column, json_column, ts_column, DispatchStore};
use crate::{
    error::DispatchResult,
    roster::{Provider, RosterSnapshot},
    types::{BusinessId, ProviderId},
};
use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

const PROVIDER_COLUMNS: &str = "provider_id, business_id, display_name, skills, \
     accepts_transfers, working_hours, is_online, last_seen";

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<Provider> {
    Ok(Provider {
        provider_id: id_column(row, 0)?,
        business_id: id_column(row, 1)?,
        display_name: row.get(2)?,
        skills: json_column(row, 3)?,
        accepts_transfers: row.get(4)?,
        working_hours: json_column(row, 5)?,
        is_online: row.get(6)?,
        last_seen: ts_column(row, 7)?,
    })
}

impl DispatchStore {
    pub fn insert_business(&self, business_id: BusinessId, name: &str) -> DispatchResult<()> {
        self.conn.execute(
            "INSERT INTO business (business_id, name) VALUES (?1, ?2)",
            params![business_id.to_string(), name],
        )?;
        Ok(())
    }

    pub fn list_business_ids(&self) -> DispatchResult<Vec<BusinessId>> {
        let mut stmt = self
            .conn
            .prepare("SELECT business_id FROM business ORDER BY business_id ASC")?;
        let ids = stmt
            .query_map([], |row| id_column(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(ids)
    }

    pub fn insert_provider(&self, provider: &Provider) -> DispatchResult<()> {
        self.conn.execute(
            "INSERT INTO provider (
                 provider_id, business_id, display_name, skills,
                 accepts_transfers, working_hours, is_online, last_seen
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8)",
            params![
                provider.provider_id.to_string(),
                provider.business_id.to_string(),
                provider.display_name,
                serde_json::to_string(&provider.skills)?,
                provider.accepts_transfers,
                serde_json::to_string(&provider.working_hours)?,
                provider.is_online,
                provider.last_seen.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    pub fn provider(&self, provider_id: ProviderId) -> DispatchResult<Option<Provider>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM provider WHERE provider_id = ?1"
        ))?;
        let provider = stmt
            .query_row(params![provider_id.to_string()], provider_from_row)
            .optional()?;
        Ok(provider)
    }

    /// Point-in-time roster for one business, stamped with the read
    /// instant so downstream consumers can enforce freshness.
    pub fn roster_snapshot(
        &self,
        business_id: BusinessId,
        taken_at: DateTime<Utc>,
    ) -> DispatchResult<RosterSnapshot> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {PROVIDER_COLUMNS} FROM provider
             WHERE business_id = ?1
             ORDER BY provider_id ASC"
        ))?;
        let providers = stmt
            .query_map(params![business_id.to_string()], provider_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(RosterSnapshot {
            business_id,
            taken_at,
            providers,
        })
    }

    pub fn set_provider_presence(
        &self,
        provider_id: ProviderId,
        is_online: bool,
        last_seen: DateTime<Utc>,
    ) -> DispatchResult<()> {
        self.conn.execute(
            "UPDATE provider SET is_online = ?2, last_seen = ?3 WHERE provider_id = ?1",
            params![
                provider_id.to_string(),
                is_online,
                last_seen.to_rfc3339()
            ],
        )?;
        Ok(())
    }

    pub fn set_accepts_transfers(
        &self,
        provider_id: ProviderId,
        accepts_transfers: bool,
    ) -> DispatchResult<()> {
        self.conn.execute(
            "UPDATE provider SET accepts_transfers = ?2 WHERE provider_id = ?1",
            params![provider_id.to_string(), accepts_transfers],
        )?;
        Ok(())
    }
}
