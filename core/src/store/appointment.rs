use super::{id_column, json_column, opt_id_column, ts_column, DispatchStore};
use crate::{
    appointment::{Appointment, AppointmentStatus},
    error::{DispatchError, DispatchResult},
    types::{AppointmentId, BusinessId, ProviderId},
};
use chrono::{Duration, NaiveDate, NaiveTime};
use rusqlite::{params, OptionalExtension, Row};

const APPOINTMENT_COLUMNS: &str = "appointment_id, business_id, scheduled_start, \
     duration_minutes, status, assigned_provider_id, shifted_from_provider_id, \
     delay_minutes, required_skills, version";

fn appointment_from_row(row: &Row<'_>) -> rusqlite::Result<Appointment> {
    let status_text: String = row.get(4)?;
    let status = AppointmentStatus::parse(&status_text).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            4,
            rusqlite::types::Type::Text,
            format!("unknown appointment status '{status_text}'").into(),
        )
    })?;
    Ok(Appointment {
        appointment_id: id_column(row, 0)?,
        business_id: id_column(row, 1)?,
        scheduled_start: ts_column(row, 2)?,
        duration_minutes: row.get(3)?,
        status,
        assigned_provider_id: opt_id_column(row, 5)?,
        shifted_from_provider_id: opt_id_column(row, 6)?,
        delay_minutes: row.get(7)?,
        required_skills: json_column(row, 8)?,
        version: row.get(9)?,
    })
}

impl DispatchStore {
    pub fn insert_appointment(&self, appt: &Appointment) -> DispatchResult<()> {
        self.conn.execute(
            "INSERT INTO appointment (
                 appointment_id, business_id, scheduled_start, duration_minutes,
                 status, assigned_provider_id, shifted_from_provider_id,
                 delay_minutes, required_skills, version
             ) VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10)",
            params![
                appt.appointment_id.to_string(),
                appt.business_id.to_string(),
                appt.scheduled_start.to_rfc3339(),
                appt.duration_minutes,
                appt.status.as_str(),
                appt.assigned_provider_id.map(|id| id.to_string()),
                appt.shifted_from_provider_id.map(|id| id.to_string()),
                appt.delay_minutes,
                serde_json::to_string(&appt.required_skills)?,
                appt.version,
            ],
        )?;
        Ok(())
    }

    pub fn appointment(&self, id: AppointmentId) -> DispatchResult<Option<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment WHERE appointment_id = ?1"
        ))?;
        let appt = stmt
            .query_row(params![id.to_string()], appointment_from_row)
            .optional()?;
        Ok(appt)
    }

    /// Every Pending or Active appointment of one business, ordered by
    /// scheduled start. The detector's working set.
    pub fn list_pending_or_active(&self, business_id: BusinessId) -> DispatchResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment
             WHERE business_id = ?1 AND status IN ('pending', 'active')
             ORDER BY scheduled_start ASC, appointment_id ASC"
        ))?;
        let appts = stmt
            .query_map(params![business_id.to_string()], appointment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(appts)
    }

    /// Pending appointments with no provider, oldest booking first.
    pub fn list_unstaffed(&self, business_id: BusinessId) -> DispatchResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment
             WHERE business_id = ?1 AND status = 'pending'
               AND assigned_provider_id IS NULL
             ORDER BY scheduled_start ASC, appointment_id ASC"
        ))?;
        let appts = stmt
            .query_map(params![business_id.to_string()], appointment_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(appts)
    }

    /// One provider's open appointments for one calendar day, ordered by
    /// scheduled start. The propagator's day queue.
    pub fn list_by_provider(
        &self,
        provider_id: ProviderId,
        day: NaiveDate,
    ) -> DispatchResult<Vec<Appointment>> {
        let day_start = day.and_time(NaiveTime::MIN).and_utc();
        let day_end = day_start + Duration::days(1);
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {APPOINTMENT_COLUMNS} FROM appointment
             WHERE assigned_provider_id = ?1 AND status IN ('pending', 'active')
               AND scheduled_start >= ?2 AND scheduled_start < ?3
             ORDER BY scheduled_start ASC, appointment_id ASC"
        ))?;
        let appts = stmt
            .query_map(
                params![
                    provider_id.to_string(),
                    day_start.to_rfc3339(),
                    day_end.to_rfc3339()
                ],
                appointment_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(appts)
    }

    /// Commit an assignment under the optimistic-concurrency contract.
    ///
    /// Rejects with `SlotTaken` when the target provider has any other
    /// open appointment overlapping the committed interval, and with
    /// `Conflict` when the row moved past `expected_version` since the
    /// caller read it. Either rejection leaves the row untouched so the
    /// planner can re-plan against a refreshed snapshot.
    pub fn update_assignment(
        &self,
        appointment_id: AppointmentId,
        provider_id: ProviderId,
        delay_minutes: i64,
        shifted_from: Option<ProviderId>,
        expected_version: i64,
    ) -> DispatchResult<()> {
        let appt = self
            .appointment(appointment_id)?
            .ok_or(DispatchError::AppointmentNotFound(appointment_id))?;

        let start = appt.scheduled_start + Duration::minutes(delay_minutes);
        let end = start + Duration::minutes(appt.duration_minutes);
        let taken = self
            .list_by_provider(provider_id, appt.day())?
            .iter()
            .any(|other| other.appointment_id != appointment_id && other.overlaps(start, end));
        if taken {
            return Err(DispatchError::SlotTaken {
                appointment_id,
                provider_id,
            });
        }

        let updated = self.conn.execute(
            "UPDATE appointment
             SET assigned_provider_id = ?2, shifted_from_provider_id = ?3,
                 delay_minutes = ?4, version = version + 1
             WHERE appointment_id = ?1 AND version = ?5",
            params![
                appointment_id.to_string(),
                provider_id.to_string(),
                shifted_from.map(|id| id.to_string()),
                delay_minutes,
                expected_version,
            ],
        )?;
        if updated == 0 {
            return Err(self.version_conflict(appointment_id, expected_version)?);
        }
        Ok(())
    }

    /// Record observed slippage. Same version discipline as assignment
    /// commits; the caller enforces monotonicity before writing.
    pub fn record_delay(
        &self,
        appointment_id: AppointmentId,
        delay_minutes: i64,
        expected_version: i64,
    ) -> DispatchResult<()> {
        let updated = self.conn.execute(
            "UPDATE appointment SET delay_minutes = ?2, version = version + 1
             WHERE appointment_id = ?1 AND version = ?3",
            params![appointment_id.to_string(), delay_minutes, expected_version],
        )?;
        if updated == 0 {
            return Err(self.version_conflict(appointment_id, expected_version)?);
        }
        Ok(())
    }

    /// Lifecycle transition. Terminal states clear the delay cache;
    /// a finished appointment no longer carries slippage.
    pub fn set_status(
        &self,
        appointment_id: AppointmentId,
        status: AppointmentStatus,
    ) -> DispatchResult<()> {
        let sql = if status.is_terminal() {
            "UPDATE appointment SET status = ?2, delay_minutes = 0, version = version + 1
             WHERE appointment_id = ?1"
        } else {
            "UPDATE appointment SET status = ?2, version = version + 1
             WHERE appointment_id = ?1"
        };
        let updated = self
            .conn
            .execute(sql, params![appointment_id.to_string(), status.as_str()])?;
        if updated == 0 {
            return Err(DispatchError::AppointmentNotFound(appointment_id));
        }
        Ok(())
    }

    pub fn count_by_status(
        &self,
        business_id: BusinessId,
        status: AppointmentStatus,
    ) -> DispatchResult<i64> {
        Ok(self.conn.query_row(
            "SELECT COUNT(*) FROM appointment WHERE business_id = ?1 AND status = ?2",
            params![business_id.to_string(), status.as_str()],
            |r| r.get(0),
        )?)
    }

    fn version_conflict(
        &self,
        appointment_id: AppointmentId,
        expected: i64,
    ) -> DispatchResult<DispatchError> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT version FROM appointment WHERE appointment_id = ?1",
                params![appointment_id.to_string()],
                |r| r.get(0),
            )
            .optional()?;
        Ok(match found {
            Some(found) => DispatchError::Conflict {
                appointment_id,
                expected,
                found,
            },
            None => DispatchError::AppointmentNotFound(appointment_id),
        })
    }
}
