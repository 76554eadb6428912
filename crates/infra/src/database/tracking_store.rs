//! SQLite-backed tracking store.
//!
//! `SqliteTrackingDatabase` implements the engine's unit-of-work port: each
//! call opens a `BEGIN IMMEDIATE` transaction on a pooled connection, hands
//! the engine a `SqliteTrackingStore` bound to it, and commits only when the
//! work succeeds. Dropping the transaction on error rolls it back.

use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Row, TransactionBehavior};
use tokio::task;
use tracing::debug;
use worktrack_core::{OverlapQuery, RunningLogFilter, SlotQuery, TrackingDatabase, TrackingStore};
use worktrack_domain::{
    Activity, DateRange, DeleteMode, Employee, Result, Screenshot, SlotAggregate, SqlDialect,
    TimeLog, TimeLogSlotLink, TimeSlot, TimeSlotDetail, TimeSlotMinute, Timesheet, WorkTrackError,
};

use super::interval_sql::{interval_sql_for, IntervalSql};
use super::manager::DbManager;
use crate::errors::conversions::{map_join_error, map_sql_error};

const TIME_LOG_COLUMNS: &str = "id, tenant_id, organization_id, employee_id, timesheet_id, \
     started_at, stopped_at, log_type, source, is_billable, is_running, description, reason, \
     version, project_id, task_id, contact_id, team_id, edited_at, created_at, updated_at, \
     deleted_at";

const TIME_SLOT_COLUMNS: &str = "id, tenant_id, organization_id, employee_id, started_at, \
     duration, keyboard, mouse, overall, created_at, updated_at, deleted_at";

const TIMESHEET_COLUMNS: &str = "id, tenant_id, organization_id, employee_id, started_at, \
     stopped_at, duration, keyboard, mouse, overall, status, created_at, updated_at, deleted_at";

const EMPLOYEE_COLUMNS: &str = "id, tenant_id, organization_id, re_weekly_limit, \
     bill_rate_value, future_date_allowed, timezone, total_work_hours";

/// Unit-of-work boundary over the shared connection pool.
#[derive(Clone)]
pub struct SqliteTrackingDatabase {
    db: Arc<DbManager>,
    sql: Arc<dyn IntervalSql>,
}

impl SqliteTrackingDatabase {
    /// Bind the store to `dialect`. Only SQLite can be served by this
    /// adapter; any other dialect is a configuration error.
    pub fn new(db: Arc<DbManager>, dialect: SqlDialect) -> Result<Self> {
        if dialect != SqlDialect::Sqlite {
            return Err(WorkTrackError::Config(format!(
                "unsupported storage dialect '{dialect}' for the SQLite adapter"
            )));
        }
        Ok(Self { db, sql: interval_sql_for(dialect) })
    }

    pub fn manager(&self) -> &Arc<DbManager> {
        &self.db
    }

    /// Insert or replace the employee row the engine reads limits from.
    pub async fn upsert_employee(&self, employee: Employee) -> Result<()> {
        let db = Arc::clone(&self.db);
        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                &format!(
                    "INSERT OR REPLACE INTO employees ({EMPLOYEE_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)"
                ),
                params![
                    employee.id,
                    employee.tenant_id,
                    employee.organization_id,
                    employee.re_weekly_limit,
                    employee.bill_rate_value,
                    employee.future_date_allowed,
                    employee.timezone,
                    employee.total_work_hours,
                ],
            )
            .map_err(map_sql_error)?;
            debug!(employee_id = %employee.id, "employee upserted");
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

impl TrackingDatabase for SqliteTrackingDatabase {
    fn run_in_transaction(
        &self,
        work: &mut dyn FnMut(&mut dyn TrackingStore) -> Result<()>,
    ) -> Result<()> {
        let mut conn = self.db.get_connection()?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(map_sql_error)?;
        {
            let mut store = SqliteTrackingStore { conn: &tx, sql: self.sql.as_ref() };
            work(&mut store)?;
        }
        tx.commit().map_err(map_sql_error)
    }
}

// ============================================================================
// Parameter binding
// ============================================================================

/// Collects bound values and hands out the matching placeholders.
struct QueryParams<'a> {
    sql: &'a dyn IntervalSql,
    values: Vec<Value>,
}

impl<'a> QueryParams<'a> {
    fn new(sql: &'a dyn IntervalSql) -> Self {
        Self { sql, values: Vec::new() }
    }

    fn bind(&mut self, value: impl Into<Value>) -> String {
        self.values.push(value.into());
        self.sql.placeholder(self.values.len())
    }

    fn bind_text(&mut self, value: &str) -> String {
        self.bind(value.to_string())
    }

    fn bind_time(&mut self, value: DateTime<Utc>) -> String {
        self.bind(value.timestamp())
    }

    fn bind_list(&mut self, ids: &[String]) -> String {
        ids.iter().map(|id| self.bind_text(id)).collect::<Vec<_>>().join(", ")
    }
}

// ============================================================================
// Store
// ============================================================================

/// Engine store bound to one open transaction.
pub struct SqliteTrackingStore<'a> {
    conn: &'a Connection,
    sql: &'a dyn IntervalSql,
}

impl<'a> SqliteTrackingStore<'a> {
    pub fn new(conn: &'a Connection, sql: &'a dyn IntervalSql) -> Self {
        Self { conn, sql }
    }

    fn params(&self) -> QueryParams<'a> {
        QueryParams::new(self.sql)
    }

    fn query_all<T>(
        &self,
        sql: &str,
        values: &[Value],
        map: impl FnMut(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Vec<T>> {
        let mut stmt = self.conn.prepare_cached(sql).map_err(map_sql_error)?;
        let rows = stmt.query_map(params_from_iter(values.iter()), map).map_err(map_sql_error)?;
        rows.collect::<rusqlite::Result<Vec<T>>>().map_err(map_sql_error)
    }

    fn query_one<T>(
        &self,
        sql: &str,
        values: &[Value],
        map: impl FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    ) -> Result<Option<T>> {
        self.conn
            .query_row(sql, params_from_iter(values.iter()), map)
            .optional()
            .map_err(map_sql_error)
    }

    fn execute(&self, sql: &str, values: &[Value]) -> Result<usize> {
        self.conn.execute(sql, params_from_iter(values.iter())).map_err(map_sql_error)
    }

    fn slot_filter(&self, query: &SlotQuery) -> (String, Vec<Value>) {
        let mut params = self.params();
        let tenant = params.bind_text(&query.tenant_id);
        let employee = params.bind_text(&query.employee_id);
        let start = params.bind_time(query.range.start);
        let end = params.bind_time(query.range.end);
        let mut clause = format!(
            "tenant_id = {tenant} AND employee_id = {employee} AND deleted_at IS NULL AND {}",
            self.sql.starts_within_predicate(&start, &end)
        );
        if let Some(org) = &query.organization_id {
            let org = params.bind_text(org);
            clause.push_str(&format!(" AND organization_id = {org}"));
        }
        (clause, params.values)
    }

    fn load_detail(&self, slot: TimeSlot) -> Result<TimeSlotDetail> {
        let slot_id = vec![Value::Text(slot.id.clone())];
        let screenshots = self.query_all(
            "SELECT id, time_slot_id, file, thumb, recorded_at, deleted_at FROM screenshots \
             WHERE time_slot_id = ?1 AND deleted_at IS NULL ORDER BY recorded_at, rowid",
            &slot_id,
            map_screenshot_row,
        )?;
        let activities = self.query_all(
            "SELECT id, time_slot_id, title, activity_type, duration, recorded_at, deleted_at \
             FROM activities WHERE time_slot_id = ?1 AND deleted_at IS NULL \
             ORDER BY recorded_at, rowid",
            &slot_id,
            map_activity_row,
        )?;
        let minutes = self.query_all(
            "SELECT id, time_slot_id, keyboard, mouse, recorded_at FROM time_slot_minutes \
             WHERE time_slot_id = ?1 ORDER BY recorded_at, rowid",
            &slot_id,
            map_minute_row,
        )?;
        let time_log_ids = self.query_all(
            "SELECT links.time_log_id FROM time_log_slots links \
             JOIN time_logs logs ON logs.id = links.time_log_id \
             WHERE links.time_slot_id = ?1 AND logs.deleted_at IS NULL \
             ORDER BY links.rowid",
            &slot_id,
            |row| row.get::<_, String>(0),
        )?;
        Ok(TimeSlotDetail { slot, screenshots, activities, minutes, time_log_ids })
    }
}

impl TrackingStore for SqliteTrackingStore<'_> {
    // ------------------------------------------------------------------------
    // Employees
    // ------------------------------------------------------------------------

    fn find_employee(&self, tenant_id: &str, employee_id: &str) -> Result<Option<Employee>> {
        self.query_one(
            &format!("SELECT {EMPLOYEE_COLUMNS} FROM employees WHERE tenant_id = ?1 AND id = ?2"),
            &[Value::Text(tenant_id.to_string()), Value::Text(employee_id.to_string())],
            map_employee_row,
        )
    }

    fn update_employee_hours(
        &mut self,
        tenant_id: &str,
        employee_id: &str,
        hours: i64,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE employees SET total_work_hours = ?3 WHERE tenant_id = ?1 AND id = ?2",
                params![tenant_id, employee_id, hours],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn list_tenant_ids(&self) -> Result<Vec<String>> {
        self.query_all(
            "SELECT DISTINCT tenant_id FROM time_logs WHERE deleted_at IS NULL ORDER BY tenant_id",
            &[],
            |row| row.get::<_, String>(0),
        )
    }

    // ------------------------------------------------------------------------
    // Time logs
    // ------------------------------------------------------------------------

    fn find_time_log(&self, tenant_id: &str, id: &str) -> Result<Option<TimeLog>> {
        self.query_one(
            &format!(
                "SELECT {TIME_LOG_COLUMNS} FROM time_logs \
                 WHERE tenant_id = ?1 AND id = ?2 AND deleted_at IS NULL"
            ),
            &[Value::Text(tenant_id.to_string()), Value::Text(id.to_string())],
            map_time_log_row,
        )
    }

    fn find_time_logs(&self, tenant_id: &str, ids: &[String]) -> Result<Vec<TimeLog>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = self.params();
        let tenant = params.bind_text(tenant_id);
        let list = params.bind_list(ids);
        self.query_all(
            &format!(
                "SELECT {TIME_LOG_COLUMNS} FROM time_logs \
                 WHERE tenant_id = {tenant} AND id IN ({list}) AND deleted_at IS NULL \
                 ORDER BY started_at, rowid"
            ),
            &params.values,
            map_time_log_row,
        )
    }

    fn find_overlapping_logs(&self, query: &OverlapQuery) -> Result<Vec<TimeLog>> {
        let mut params = self.params();
        let tenant = params.bind_text(&query.tenant_id);
        let employee = params.bind_text(&query.employee_id);
        let start = params.bind_time(query.range.start);
        let end = params.bind_time(query.range.end);
        let mut sql = format!(
            "SELECT {TIME_LOG_COLUMNS} FROM time_logs \
             WHERE tenant_id = {tenant} AND employee_id = {employee} \
             AND deleted_at IS NULL AND stopped_at IS NOT NULL AND {}",
            self.sql.overlap_predicate(&start, &end)
        );
        if !query.exclude_ids.is_empty() {
            let excluded = params.bind_list(&query.exclude_ids);
            sql.push_str(&format!(" AND id NOT IN ({excluded})"));
        }
        sql.push_str(" ORDER BY started_at, rowid");
        self.query_all(&sql, &params.values, map_time_log_row)
    }

    fn find_running_logs(&self, filter: &RunningLogFilter) -> Result<Vec<TimeLog>> {
        let mut params = self.params();
        let tenant = params.bind_text(&filter.tenant_id);
        let mut sql = format!(
            "SELECT {TIME_LOG_COLUMNS} FROM time_logs \
             WHERE tenant_id = {tenant} AND deleted_at IS NULL \
             AND (stopped_at IS NULL OR is_running = 1)"
        );
        if let Some(org) = &filter.organization_id {
            let org = params.bind_text(org);
            sql.push_str(&format!(" AND organization_id = {org}"));
        }
        if let Some(employee) = &filter.employee_id {
            let employee = params.bind_text(employee);
            sql.push_str(&format!(" AND employee_id = {employee}"));
        }
        sql.push_str(" ORDER BY started_at, rowid");
        self.query_all(&sql, &params.values, map_time_log_row)
    }

    fn find_last_stopped_log(
        &self,
        tenant_id: &str,
        employee_id: &str,
        before: DateTime<Utc>,
        exclude_id: &str,
    ) -> Result<Option<TimeLog>> {
        self.query_one(
            &format!(
                "SELECT {TIME_LOG_COLUMNS} FROM time_logs \
                 WHERE tenant_id = ?1 AND employee_id = ?2 AND id <> ?3 \
                 AND deleted_at IS NULL AND stopped_at IS NOT NULL AND stopped_at <= ?4 \
                 ORDER BY stopped_at DESC, started_at DESC, rowid DESC LIMIT 1"
            ),
            &[
                Value::Text(tenant_id.to_string()),
                Value::Text(employee_id.to_string()),
                Value::Text(exclude_id.to_string()),
                Value::Integer(before.timestamp()),
            ],
            map_time_log_row,
        )
    }

    fn sum_log_seconds(
        &self,
        tenant_id: &str,
        employee_id: &str,
        within: Option<DateRange>,
    ) -> Result<i64> {
        let mut params = self.params();
        let tenant = params.bind_text(tenant_id);
        let employee = params.bind_text(employee_id);
        let mut sql = format!(
            "SELECT COALESCE(SUM({}), 0) FROM time_logs \
             WHERE tenant_id = {tenant} AND employee_id = {employee} \
             AND deleted_at IS NULL AND stopped_at IS NOT NULL",
            self.sql.log_duration_expr()
        );
        if let Some(range) = within {
            let start = params.bind_time(range.start);
            let end = params.bind_time(range.end);
            sql.push_str(&format!(" AND {}", self.sql.starts_within_predicate(&start, &end)));
        }
        Ok(self.query_one(&sql, &params.values, |row| row.get::<_, i64>(0))?.unwrap_or(0))
    }

    fn insert_time_log(&mut self, log: &TimeLog) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO time_logs ({TIME_LOG_COLUMNS}) VALUES \
                     (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, \
                      ?17, ?18, ?19, ?20, ?21, ?22)"
                ),
                params![
                    log.id,
                    log.tenant_id,
                    log.organization_id,
                    log.employee_id,
                    log.timesheet_id,
                    log.started_at.timestamp(),
                    log.stopped_at.map(|t| t.timestamp()),
                    log.log_type.as_str(),
                    log.source.as_str(),
                    log.is_billable,
                    log.is_running,
                    log.description,
                    log.reason,
                    log.version,
                    log.project_id,
                    log.task_id,
                    log.contact_id,
                    log.team_id,
                    log.edited_at.map(|t| t.timestamp()),
                    log.created_at.timestamp(),
                    log.updated_at.timestamp(),
                    log.deleted_at.map(|t| t.timestamp()),
                ],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn update_time_log(&mut self, log: &TimeLog) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE time_logs SET tenant_id = ?2, organization_id = ?3, employee_id = ?4, \
                 timesheet_id = ?5, started_at = ?6, stopped_at = ?7, log_type = ?8, \
                 source = ?9, is_billable = ?10, is_running = ?11, description = ?12, \
                 reason = ?13, version = ?14, project_id = ?15, task_id = ?16, \
                 contact_id = ?17, team_id = ?18, edited_at = ?19, created_at = ?20, \
                 updated_at = ?21, deleted_at = ?22 \
                 WHERE id = ?1 AND deleted_at IS NULL",
                params![
                    log.id,
                    log.tenant_id,
                    log.organization_id,
                    log.employee_id,
                    log.timesheet_id,
                    log.started_at.timestamp(),
                    log.stopped_at.map(|t| t.timestamp()),
                    log.log_type.as_str(),
                    log.source.as_str(),
                    log.is_billable,
                    log.is_running,
                    log.description,
                    log.reason,
                    log.version,
                    log.project_id,
                    log.task_id,
                    log.contact_id,
                    log.team_id,
                    log.edited_at.map(|t| t.timestamp()),
                    log.created_at.timestamp(),
                    log.updated_at.timestamp(),
                    log.deleted_at.map(|t| t.timestamp()),
                ],
            )
            .map_err(map_sql_error)?;
        if changed == 0 {
            return Err(WorkTrackError::NotFound(format!("time log {}", log.id)));
        }
        Ok(())
    }

    fn delete_time_logs(
        &mut self,
        tenant_id: &str,
        ids: &[String],
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        match mode {
            DeleteMode::Soft => {
                let mut params = self.params();
                let deleted_at = params.bind_time(now);
                let tenant = params.bind_text(tenant_id);
                let list = params.bind_list(ids);
                self.execute(
                    &format!(
                        "UPDATE time_logs SET deleted_at = {deleted_at} \
                         WHERE tenant_id = {tenant} AND id IN ({list}) AND deleted_at IS NULL"
                    ),
                    &params.values,
                )
            }
            DeleteMode::Hard => {
                let mut links = self.params();
                let list = links.bind_list(ids);
                self.execute(
                    &format!("DELETE FROM time_log_slots WHERE time_log_id IN ({list})"),
                    &links.values,
                )?;

                let mut params = self.params();
                let tenant = params.bind_text(tenant_id);
                let list = params.bind_list(ids);
                self.execute(
                    &format!(
                        "DELETE FROM time_logs \
                         WHERE tenant_id = {tenant} AND id IN ({list}) AND deleted_at IS NULL"
                    ),
                    &params.values,
                )
            }
        }
    }

    // ------------------------------------------------------------------------
    // Time slots
    // ------------------------------------------------------------------------

    fn find_slots(&self, query: &SlotQuery) -> Result<Vec<TimeSlotDetail>> {
        let (clause, values) = self.slot_filter(query);
        let slots = self.query_all(
            &format!(
                "SELECT {TIME_SLOT_COLUMNS} FROM time_slots WHERE {clause} \
                 ORDER BY started_at, rowid"
            ),
            &values,
            map_time_slot_row,
        )?;
        slots.into_iter().map(|slot| self.load_detail(slot)).collect()
    }

    fn find_slots_for_log(&self, tenant_id: &str, time_log_id: &str) -> Result<Vec<TimeSlot>> {
        self.query_all(
            "SELECT slots.id, slots.tenant_id, slots.organization_id, slots.employee_id, \
             slots.started_at, slots.duration, slots.keyboard, slots.mouse, slots.overall, \
             slots.created_at, slots.updated_at, slots.deleted_at \
             FROM time_slots slots \
             JOIN time_log_slots links ON links.time_slot_id = slots.id \
             WHERE links.time_log_id = ?2 AND slots.tenant_id = ?1 AND slots.deleted_at IS NULL \
             ORDER BY slots.started_at, slots.rowid",
            &[Value::Text(tenant_id.to_string()), Value::Text(time_log_id.to_string())],
            map_time_slot_row,
        )
    }

    fn find_slot_links(&self, slot_ids: &[String]) -> Result<Vec<TimeLogSlotLink>> {
        if slot_ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut params = self.params();
        let list = params.bind_list(slot_ids);
        self.query_all(
            &format!(
                "SELECT links.time_log_id, links.time_slot_id, links.is_primary \
                 FROM time_log_slots links \
                 JOIN time_logs logs ON logs.id = links.time_log_id \
                 WHERE links.time_slot_id IN ({list}) AND logs.deleted_at IS NULL \
                 ORDER BY links.rowid"
            ),
            &params.values,
            map_link_row,
        )
    }

    fn aggregate_slots(&self, query: &SlotQuery) -> Result<SlotAggregate> {
        let (clause, values) = self.slot_filter(query);
        let aggregate = self.query_one(
            &format!(
                "SELECT COALESCE(SUM(duration), 0), \
                 COALESCE(ROUND(AVG(keyboard)), 0), \
                 COALESCE(ROUND(AVG(mouse)), 0), \
                 COALESCE(ROUND(AVG(overall)), 0), \
                 COUNT(*) \
                 FROM time_slots WHERE {clause}"
            ),
            &values,
            |row| {
                Ok(SlotAggregate {
                    duration: row.get(0)?,
                    keyboard: row.get::<_, f64>(1)? as i64,
                    mouse: row.get::<_, f64>(2)? as i64,
                    overall: row.get::<_, f64>(3)? as i64,
                    slot_count: row.get(4)?,
                })
            },
        )?;
        Ok(aggregate.unwrap_or_default())
    }

    fn insert_time_slot(&mut self, slot: &TimeSlot) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO time_slots ({TIME_SLOT_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)"
                ),
                params![
                    slot.id,
                    slot.tenant_id,
                    slot.organization_id,
                    slot.employee_id,
                    slot.started_at.timestamp(),
                    slot.duration,
                    slot.keyboard,
                    slot.mouse,
                    slot.overall,
                    slot.created_at.timestamp(),
                    slot.updated_at.timestamp(),
                    slot.deleted_at.map(|t| t.timestamp()),
                ],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn update_time_slot(&mut self, slot: &TimeSlot) -> Result<()> {
        let changed = self
            .conn
            .execute(
                "UPDATE time_slots SET tenant_id = ?2, organization_id = ?3, employee_id = ?4, \
                 started_at = ?5, duration = ?6, keyboard = ?7, mouse = ?8, overall = ?9, \
                 created_at = ?10, updated_at = ?11, deleted_at = ?12 WHERE id = ?1",
                params![
                    slot.id,
                    slot.tenant_id,
                    slot.organization_id,
                    slot.employee_id,
                    slot.started_at.timestamp(),
                    slot.duration,
                    slot.keyboard,
                    slot.mouse,
                    slot.overall,
                    slot.created_at.timestamp(),
                    slot.updated_at.timestamp(),
                    slot.deleted_at.map(|t| t.timestamp()),
                ],
            )
            .map_err(map_sql_error)?;
        if changed == 0 {
            return Err(WorkTrackError::NotFound(format!("time slot {}", slot.id)));
        }
        Ok(())
    }

    fn delete_time_slots(
        &mut self,
        tenant_id: &str,
        ids: &[String],
        mode: DeleteMode,
        now: DateTime<Utc>,
    ) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        if mode == DeleteMode::Hard {
            let mut children = self.params();
            let list = children.bind_list(ids);
            for statement in [
                format!("DELETE FROM time_log_slots WHERE time_slot_id IN ({list})"),
                format!("DELETE FROM time_slot_minutes WHERE time_slot_id IN ({list})"),
                format!("UPDATE screenshots SET time_slot_id = NULL WHERE time_slot_id IN ({list})"),
                format!("UPDATE activities SET time_slot_id = NULL WHERE time_slot_id IN ({list})"),
            ] {
                self.execute(&statement, &children.values)?;
            }
        }

        let mut params = self.params();
        let sql = match mode {
            DeleteMode::Soft => {
                let deleted_at = params.bind_time(now);
                let tenant = params.bind_text(tenant_id);
                let list = params.bind_list(ids);
                format!(
                    "UPDATE time_slots SET deleted_at = {deleted_at} \
                     WHERE tenant_id = {tenant} AND id IN ({list}) AND deleted_at IS NULL"
                )
            }
            DeleteMode::Hard => {
                let tenant = params.bind_text(tenant_id);
                let list = params.bind_list(ids);
                format!(
                    "DELETE FROM time_slots \
                     WHERE tenant_id = {tenant} AND id IN ({list}) AND deleted_at IS NULL"
                )
            }
        };
        self.execute(&sql, &params.values)
    }

    fn link_slot(&mut self, link: &TimeLogSlotLink) -> Result<()> {
        self.conn
            .execute(
                "INSERT INTO time_log_slots (time_log_id, time_slot_id, is_primary) \
                 VALUES (?1, ?2, ?3) \
                 ON CONFLICT(time_log_id, time_slot_id) DO UPDATE SET is_primary = excluded.is_primary",
                params![link.time_log_id, link.time_slot_id, link.is_primary],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn unlink_slot(&mut self, time_log_id: &str, time_slot_id: &str) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM time_log_slots WHERE time_log_id = ?1 AND time_slot_id = ?2",
                params![time_log_id, time_slot_id],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn insert_slot_children(
        &mut self,
        time_slot_id: &str,
        screenshots: &[Screenshot],
        activities: &[Activity],
        minutes: &[TimeSlotMinute],
    ) -> Result<()> {
        // Devices retry uploads; a repeated child id replaces the earlier row.
        for screenshot in screenshots {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO screenshots \
                     (id, time_slot_id, file, thumb, recorded_at, deleted_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        screenshot.id,
                        time_slot_id,
                        screenshot.file,
                        screenshot.thumb,
                        screenshot.recorded_at.timestamp(),
                        screenshot.deleted_at.map(|t| t.timestamp()),
                    ],
                )
                .map_err(map_sql_error)?;
        }
        for activity in activities {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO activities \
                     (id, time_slot_id, title, activity_type, duration, recorded_at, deleted_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                    params![
                        activity.id,
                        time_slot_id,
                        activity.title,
                        activity.activity_type,
                        activity.duration,
                        activity.recorded_at.timestamp(),
                        activity.deleted_at.map(|t| t.timestamp()),
                    ],
                )
                .map_err(map_sql_error)?;
        }
        for minute in minutes {
            self.conn
                .execute(
                    "INSERT OR REPLACE INTO time_slot_minutes \
                     (id, time_slot_id, keyboard, mouse, recorded_at) \
                     VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        minute.id,
                        time_slot_id,
                        minute.keyboard,
                        minute.mouse,
                        minute.recorded_at.timestamp(),
                    ],
                )
                .map_err(map_sql_error)?;
        }
        Ok(())
    }

    fn reparent_slot_children(
        &mut self,
        from_slot_ids: &[String],
        to_slot_id: &str,
    ) -> Result<()> {
        if from_slot_ids.is_empty() {
            return Ok(());
        }
        let mut params = self.params();
        let target = params.bind_text(to_slot_id);
        let list = params.bind_list(from_slot_ids);
        for table in ["screenshots", "activities", "time_slot_minutes"] {
            self.execute(
                &format!(
                    "UPDATE {table} SET time_slot_id = {target} WHERE time_slot_id IN ({list})"
                ),
                &params.values,
            )?;
        }
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Timesheets
    // ------------------------------------------------------------------------

    fn find_timesheet(&self, tenant_id: &str, id: &str) -> Result<Option<Timesheet>> {
        self.query_one(
            &format!(
                "SELECT {TIMESHEET_COLUMNS} FROM timesheets \
                 WHERE tenant_id = ?1 AND id = ?2 AND deleted_at IS NULL"
            ),
            &[Value::Text(tenant_id.to_string()), Value::Text(id.to_string())],
            map_timesheet_row,
        )
    }

    fn find_timesheet_for_week(
        &self,
        tenant_id: &str,
        employee_id: &str,
        week_start: DateTime<Utc>,
    ) -> Result<Option<Timesheet>> {
        self.query_one(
            &format!(
                "SELECT {TIMESHEET_COLUMNS} FROM timesheets \
                 WHERE tenant_id = ?1 AND employee_id = ?2 AND started_at = ?3 \
                 AND deleted_at IS NULL"
            ),
            &[
                Value::Text(tenant_id.to_string()),
                Value::Text(employee_id.to_string()),
                Value::Integer(week_start.timestamp()),
            ],
            map_timesheet_row,
        )
    }

    fn insert_timesheet(&mut self, timesheet: &Timesheet) -> Result<()> {
        self.conn
            .execute(
                &format!(
                    "INSERT INTO timesheets ({TIMESHEET_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)"
                ),
                params![
                    timesheet.id,
                    timesheet.tenant_id,
                    timesheet.organization_id,
                    timesheet.employee_id,
                    timesheet.started_at.timestamp(),
                    timesheet.stopped_at.timestamp(),
                    timesheet.duration,
                    timesheet.keyboard,
                    timesheet.mouse,
                    timesheet.overall,
                    timesheet.status.as_str(),
                    timesheet.created_at.timestamp(),
                    timesheet.updated_at.timestamp(),
                    timesheet.deleted_at.map(|t| t.timestamp()),
                ],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }

    fn update_timesheet_aggregate(
        &mut self,
        tenant_id: &str,
        id: &str,
        aggregate: &SlotAggregate,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.conn
            .execute(
                "UPDATE timesheets SET duration = ?3, keyboard = ?4, mouse = ?5, overall = ?6, \
                 updated_at = ?7 WHERE tenant_id = ?1 AND id = ?2",
                params![
                    tenant_id,
                    id,
                    aggregate.duration,
                    aggregate.keyboard,
                    aggregate.mouse,
                    aggregate.overall,
                    now.timestamp(),
                ],
            )
            .map_err(map_sql_error)?;
        Ok(())
    }
}

// ============================================================================
// Row mappers
// ============================================================================

fn timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let secs: i64 = row.get(idx)?;
    DateTime::from_timestamp(secs, 0).ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
}

fn optional_timestamp_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<DateTime<Utc>>> {
    row.get::<_, Option<i64>>(idx)?
        .map(|secs| {
            DateTime::from_timestamp(secs, 0)
                .ok_or(rusqlite::Error::IntegralValueOutOfRange(idx, secs))
        })
        .transpose()
}

fn enum_at<T: FromStr<Err = String>>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let raw: String = row.get(idx)?;
    raw.parse()
        .map_err(|err: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, err.into()))
}

fn map_time_log_row(row: &Row<'_>) -> rusqlite::Result<TimeLog> {
    Ok(TimeLog {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        organization_id: row.get(2)?,
        employee_id: row.get(3)?,
        timesheet_id: row.get(4)?,
        started_at: timestamp_at(row, 5)?,
        stopped_at: optional_timestamp_at(row, 6)?,
        log_type: enum_at(row, 7)?,
        source: enum_at(row, 8)?,
        is_billable: row.get(9)?,
        is_running: row.get(10)?,
        description: row.get(11)?,
        reason: row.get(12)?,
        version: row.get(13)?,
        project_id: row.get(14)?,
        task_id: row.get(15)?,
        contact_id: row.get(16)?,
        team_id: row.get(17)?,
        edited_at: optional_timestamp_at(row, 18)?,
        created_at: timestamp_at(row, 19)?,
        updated_at: timestamp_at(row, 20)?,
        deleted_at: optional_timestamp_at(row, 21)?,
    })
}

fn map_time_slot_row(row: &Row<'_>) -> rusqlite::Result<TimeSlot> {
    Ok(TimeSlot {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        organization_id: row.get(2)?,
        employee_id: row.get(3)?,
        started_at: timestamp_at(row, 4)?,
        duration: row.get(5)?,
        keyboard: row.get(6)?,
        mouse: row.get(7)?,
        overall: row.get(8)?,
        created_at: timestamp_at(row, 9)?,
        updated_at: timestamp_at(row, 10)?,
        deleted_at: optional_timestamp_at(row, 11)?,
    })
}

fn map_timesheet_row(row: &Row<'_>) -> rusqlite::Result<Timesheet> {
    Ok(Timesheet {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        organization_id: row.get(2)?,
        employee_id: row.get(3)?,
        started_at: timestamp_at(row, 4)?,
        stopped_at: timestamp_at(row, 5)?,
        duration: row.get(6)?,
        keyboard: row.get(7)?,
        mouse: row.get(8)?,
        overall: row.get(9)?,
        status: enum_at(row, 10)?,
        created_at: timestamp_at(row, 11)?,
        updated_at: timestamp_at(row, 12)?,
        deleted_at: optional_timestamp_at(row, 13)?,
    })
}

fn map_employee_row(row: &Row<'_>) -> rusqlite::Result<Employee> {
    Ok(Employee {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        organization_id: row.get(2)?,
        re_weekly_limit: row.get(3)?,
        bill_rate_value: row.get(4)?,
        future_date_allowed: row.get(5)?,
        timezone: row.get(6)?,
        total_work_hours: row.get(7)?,
    })
}

fn map_link_row(row: &Row<'_>) -> rusqlite::Result<TimeLogSlotLink> {
    Ok(TimeLogSlotLink {
        time_log_id: row.get(0)?,
        time_slot_id: row.get(1)?,
        is_primary: row.get(2)?,
    })
}

fn map_screenshot_row(row: &Row<'_>) -> rusqlite::Result<Screenshot> {
    Ok(Screenshot {
        id: row.get(0)?,
        time_slot_id: row.get(1)?,
        file: row.get(2)?,
        thumb: row.get(3)?,
        recorded_at: timestamp_at(row, 4)?,
        deleted_at: optional_timestamp_at(row, 5)?,
    })
}

fn map_activity_row(row: &Row<'_>) -> rusqlite::Result<Activity> {
    Ok(Activity {
        id: row.get(0)?,
        time_slot_id: row.get(1)?,
        title: row.get(2)?,
        activity_type: row.get(3)?,
        duration: row.get(4)?,
        recorded_at: timestamp_at(row, 5)?,
        deleted_at: optional_timestamp_at(row, 6)?,
    })
}

fn map_minute_row(row: &Row<'_>) -> rusqlite::Result<TimeSlotMinute> {
    Ok(TimeSlotMinute {
        id: row.get(0)?,
        time_slot_id: row.get(1)?,
        keyboard: row.get(2)?,
        mouse: row.get(3)?,
        recorded_at: timestamp_at(row, 4)?,
    })
}
