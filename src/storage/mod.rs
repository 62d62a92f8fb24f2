//! SQLite persistence for scenario definitions, step results and
//! per-user browser settings.

use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::loader::ScenarioBundle;
use crate::protocol::{
    BrowserConfig, BrowserKind, ExecutionResult, ScenarioState, ScenarioStatus, Step, StepKind,
    StepStatus,
};

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Scenario not found: {0}")]
    ScenarioNotFound(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Persistence collaborator seen by the scenario runner.
///
/// Implementations must serialize concurrent writes for the same
/// (scenario, step) key; parallel runs share one store.
pub trait Persistence: Send + Sync {
    /// Steps ordered by `order`, with override-wins-else-template fields.
    fn load_steps(&self, scenario_key: &str) -> StorageResult<Vec<Step>>;

    fn save_result(&self, scenario_key: &str, result: &ExecutionResult) -> StorageResult<()>;

    fn save_scenario_status(&self, scenario_key: &str, status: &ScenarioStatus) -> StorageResult<()>;

    /// Falls back to [`BrowserConfig::default`] for unknown users.
    fn load_browser_config(&self, user_key: &str) -> StorageResult<BrowserConfig>;

    fn scenario_status(&self, scenario_key: &str) -> StorageResult<ScenarioStatus>;

    fn load_results(&self, scenario_key: &str, run_id: Uuid) -> StorageResult<Vec<ExecutionResult>>;
}

/// Database wrapper; clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteStore {
    /// Open or create database at path
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")?;

        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;

        info!("Opened database at {:?}", path.as_ref());
        Ok(store)
    }

    /// Open in-memory database (for testing)
    pub fn open_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Arc::new(Mutex::new(conn)),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> StorageResult<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS step_templates (
                name TEXT PRIMARY KEY,
                step_type TEXT,
                target TEXT,
                description TEXT
            );

            CREATE TABLE IF NOT EXISTS scenarios (
                key TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'not-run',
                last_executed_at TEXT
            );

            -- Scenario-specific overrides; NULL/empty fields inherit from the template
            CREATE TABLE IF NOT EXISTS scenario_steps (
                scenario_key TEXT NOT NULL REFERENCES scenarios(key) ON DELETE CASCADE,
                step_order INTEGER NOT NULL,
                name TEXT,
                template_name TEXT,
                step_type TEXT,
                target TEXT,
                description TEXT,
                requires_manual_input INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (scenario_key, step_order)
            );

            CREATE TABLE IF NOT EXISTS execution_results (
                run_id TEXT NOT NULL,
                scenario_key TEXT NOT NULL,
                step_order INTEGER NOT NULL,
                status TEXT NOT NULL,
                before_image BLOB,
                after_image BLOB,
                error TEXT,
                executed_at TEXT NOT NULL,
                PRIMARY KEY (run_id, scenario_key, step_order)
            );
            CREATE INDEX IF NOT EXISTS idx_results_scenario ON execution_results(scenario_key);

            CREATE TABLE IF NOT EXISTS browser_configs (
                user_key TEXT PRIMARY KEY,
                browser_kind TEXT NOT NULL DEFAULT 'chrome',
                incognito INTEGER NOT NULL DEFAULT 0,
                second_screen INTEGER NOT NULL DEFAULT 0
            );
            "#,
        )?;

        Ok(())
    }

    /// Writes a bundle in one transaction. Existing scenarios with the same
    /// key have their steps replaced.
    pub fn import(&self, bundle: &ScenarioBundle) -> StorageResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        for template in &bundle.templates {
            tx.execute(
                "INSERT OR REPLACE INTO step_templates (name, step_type, target, description)
                 VALUES (?1, ?2, ?3, ?4)",
                params![template.name, template.kind, template.target, template.description],
            )?;
        }

        for scenario in &bundle.scenarios {
            tx.execute(
                "INSERT INTO scenarios (key, name) VALUES (?1, ?2)
                 ON CONFLICT(key) DO UPDATE SET name = excluded.name",
                params![scenario.key, scenario.name],
            )?;
            tx.execute(
                "DELETE FROM scenario_steps WHERE scenario_key = ?1",
                params![scenario.key],
            )?;
            for step in &scenario.steps {
                tx.execute(
                    "INSERT INTO scenario_steps
                     (scenario_key, step_order, name, template_name, step_type, target, description, requires_manual_input)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                    params![
                        scenario.key,
                        step.order,
                        step.name,
                        step.template,
                        step.kind,
                        step.target,
                        step.description,
                        step.requires_manual_input,
                    ],
                )?;
            }
        }

        for user in &bundle.users {
            tx.execute(
                "INSERT OR REPLACE INTO browser_configs (user_key, browser_kind, incognito, second_screen)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    user.user,
                    user.browser.browser_kind.as_str(),
                    user.browser.incognito,
                    user.browser.second_screen,
                ],
            )?;
        }

        tx.commit()?;
        info!(
            templates = bundle.templates.len(),
            scenarios = bundle.scenarios.len(),
            users = bundle.users.len(),
            "Bundle imported"
        );
        Ok(())
    }

    pub fn scenario_keys(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT key FROM scenarios ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    fn scenario_exists(conn: &Connection, scenario_key: &str) -> StorageResult<bool> {
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM scenarios WHERE key = ?1",
            params![scenario_key],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

fn parse_timestamp(raw: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| StorageError::InvalidData(format!("timestamp '{}': {}", raw, e)))
}

impl Persistence for SqliteStore {
    fn load_steps(&self, scenario_key: &str) -> StorageResult<Vec<Step>> {
        let conn = self.conn.lock();
        if !Self::scenario_exists(&conn, scenario_key)? {
            return Err(StorageError::ScenarioNotFound(scenario_key.to_string()));
        }

        let mut stmt = conn.prepare(
            "SELECT s.step_order,
                    COALESCE(NULLIF(s.name, ''), t.name, ''),
                    COALESCE(NULLIF(s.step_type, ''), t.step_type, ''),
                    COALESCE(NULLIF(s.target, ''), t.target, ''),
                    COALESCE(NULLIF(s.description, ''), t.description, ''),
                    s.requires_manual_input
             FROM scenario_steps s
             LEFT JOIN step_templates t ON t.name = s.template_name
             WHERE s.scenario_key = ?1
             ORDER BY s.step_order",
        )?;

        let rows = stmt.query_map(params![scenario_key], |row| {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, bool>(5)?,
            ))
        })?;

        let mut steps = Vec::new();
        for row in rows {
            let (order, name, kind, target, description, requires_manual_input) = row?;
            let order = u32::try_from(order)
                .map_err(|_| StorageError::InvalidData(format!("step order {}", order)))?;
            steps.push(Step {
                order,
                name,
                kind: kind.parse().unwrap_or(StepKind::Unknown),
                target,
                description,
                requires_manual_input,
            });
        }

        debug!(scenario = scenario_key, steps = steps.len(), "Steps loaded");
        Ok(steps)
    }

    fn save_result(&self, scenario_key: &str, result: &ExecutionResult) -> StorageResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO execution_results
             (run_id, scenario_key, step_order, status, before_image, after_image, error, executed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                result.run_id.to_string(),
                scenario_key,
                result.step_order,
                result.status.as_str(),
                result.before_image,
                result.after_image,
                result.error,
                result.timestamp.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn save_scenario_status(&self, scenario_key: &str, status: &ScenarioStatus) -> StorageResult<()> {
        let conn = self.conn.lock();
        let updated = conn.execute(
            "UPDATE scenarios SET status = ?1, last_executed_at = ?2 WHERE key = ?3",
            params![
                status.status.as_str(),
                status.last_executed_at.map(|t| t.to_rfc3339()),
                scenario_key,
            ],
        )?;
        if updated == 0 {
            return Err(StorageError::ScenarioNotFound(scenario_key.to_string()));
        }
        Ok(())
    }

    fn load_browser_config(&self, user_key: &str) -> StorageResult<BrowserConfig> {
        let conn = self.conn.lock();
        let config = conn
            .query_row(
                "SELECT browser_kind, incognito, second_screen FROM browser_configs WHERE user_key = ?1",
                params![user_key],
                |row| {
                    Ok(BrowserConfig {
                        browser_kind: BrowserKind::parse(&row.get::<_, String>(0)?),
                        incognito: row.get(1)?,
                        second_screen: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(config.unwrap_or_default())
    }

    fn scenario_status(&self, scenario_key: &str) -> StorageResult<ScenarioStatus> {
        let conn = self.conn.lock();
        let row = conn
            .query_row(
                "SELECT status, last_executed_at FROM scenarios WHERE key = ?1",
                params![scenario_key],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?)),
            )
            .optional()?;

        let (status, last) = row.ok_or_else(|| StorageError::ScenarioNotFound(scenario_key.to_string()))?;
        Ok(ScenarioStatus {
            status: ScenarioState::parse(&status),
            last_executed_at: last.as_deref().map(parse_timestamp).transpose()?,
        })
    }

    fn load_results(&self, scenario_key: &str, run_id: Uuid) -> StorageResult<Vec<ExecutionResult>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT step_order, status, before_image, after_image, error, executed_at
             FROM execution_results
             WHERE scenario_key = ?1 AND run_id = ?2
             ORDER BY step_order",
        )?;

        let rows = stmt.query_map(params![scenario_key, run_id.to_string()], |row| {
            Ok((
                row.get::<_, u32>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<Vec<u8>>>(2)?,
                row.get::<_, Option<Vec<u8>>>(3)?,
                row.get::<_, Option<String>>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut results = Vec::new();
        for row in rows {
            let (step_order, status, before_image, after_image, error, executed_at) = row?;
            let status = match status.as_str() {
                "completed" => StepStatus::Completed,
                "failed" => StepStatus::Failed,
                other => return Err(StorageError::InvalidData(format!("step status '{}'", other))),
            };
            results.push(ExecutionResult {
                run_id,
                step_order,
                before_image,
                after_image,
                status,
                timestamp: parse_timestamp(&executed_at)?,
                error,
            });
        }
        Ok(results)
    }
}
