use crate::candles;
use crate::error::{Result, StorageError};
use chrono::{DateTime, Duration, Utc};
use oxsignal_alert::configuration::AlertConfiguration;
use oxsignal_common::types::{
    AlertRecord, MetricSample, MetricSnapshot, MetricType, MetricWindow, Resolution,
};
use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

pub const DB_FILE: &str = "oxsignal.db";

const METRIC_SAMPLES_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS metric_samples (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    agent_id TEXT NOT NULL,
    metric TEXT NOT NULL,
    value REAL NOT NULL,
    timestamp INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_samples_agent_metric_time
    ON metric_samples(agent_id, metric, timestamp);
";

const AGENTS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS agents (
    agent_id TEXT PRIMARY KEY,
    resolution TEXT,
    last_seen INTEGER NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const ALERT_CONFIGURATIONS_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alert_configurations (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    enabled INTEGER NOT NULL DEFAULT 1,
    config_json TEXT NOT NULL,
    created_at INTEGER NOT NULL,
    updated_at INTEGER NOT NULL
);
";

const ALERT_HISTORY_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS alert_history (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    configuration_id TEXT NOT NULL,
    configuration_name TEXT NOT NULL,
    alert_type TEXT NOT NULL,
    metric TEXT NOT NULL,
    severity TEXT NOT NULL,
    message TEXT NOT NULL,
    indicators TEXT NOT NULL,
    notifications TEXT NOT NULL,
    snapshot TEXT NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_alert_history_pair_time
    ON alert_history(agent_id, configuration_id, created_at);
";

/// Single-file SQLite store backing metric windows, alert configurations,
/// and alert history. Clones share one connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    default_resolution: Resolution,
}

impl SqliteStore {
    /// Opens (or creates) `<data_dir>/oxsignal.db` in WAL mode.
    pub fn open(data_dir: &Path, default_resolution: Resolution) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let db_path = data_dir.join(DB_FILE);
        let conn = Connection::open(&db_path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(METRIC_SAMPLES_SCHEMA)?;
        conn.execute_batch(AGENTS_SCHEMA)?;
        conn.execute_batch(ALERT_CONFIGURATIONS_SCHEMA)?;
        conn.execute_batch(ALERT_HISTORY_SCHEMA)?;
        tracing::info!(path = %db_path.display(), "Opened signal store");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            default_resolution,
        })
    }

    /// Lock the connection, recovering from a poisoned Mutex if necessary.
    pub(crate) fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    // ── Metric samples ──

    pub fn write_samples(&self, samples: &[MetricSample]) -> Result<()> {
        let mut conn = self.lock();
        let tx = conn.transaction()?;
        {
            let mut insert = tx.prepare_cached(
                "INSERT INTO metric_samples (agent_id, metric, value, timestamp) VALUES (?1, ?2, ?3, ?4)",
            )?;
            let mut touch = tx.prepare_cached(
                "INSERT INTO agents (agent_id, resolution, last_seen, created_at, updated_at)
                 VALUES (?1, NULL, ?2, ?3, ?3)
                 ON CONFLICT(agent_id) DO UPDATE SET
                    last_seen = MAX(last_seen, excluded.last_seen),
                    updated_at = excluded.updated_at",
            )?;
            let now = Utc::now().timestamp_millis();
            for s in samples {
                let ts = s.timestamp.timestamp_millis();
                insert.execute(params![&s.agent_id, s.metric.as_str(), s.value, ts])?;
                touch.execute(params![&s.agent_id, ts, now])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    /// Stores one agent report as three samples sharing its timestamp.
    pub fn record_snapshot(&self, agent_id: &str, snapshot: &MetricSnapshot) -> Result<()> {
        let samples: Vec<MetricSample> = MetricType::ALL
            .into_iter()
            .map(|metric| MetricSample {
                agent_id: agent_id.to_string(),
                metric,
                value: snapshot.value(metric),
                timestamp: snapshot.timestamp,
            })
            .collect();
        self.write_samples(&samples)
    }

    /// The most recent `lookback` raw samples, oldest first.
    pub fn raw_window(
        &self,
        agent_id: &str,
        metric: MetricType,
        lookback: usize,
    ) -> Result<Vec<MetricSample>> {
        let conn = self.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT value, timestamp FROM metric_samples
             WHERE agent_id = ?1 AND metric = ?2
             ORDER BY timestamp DESC, id DESC
             LIMIT ?3",
        )?;
        let rows = stmt.query_map(
            params![agent_id, metric.as_str(), lookback as i64],
            |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
        )?;

        let mut samples = Vec::with_capacity(lookback);
        for row in rows {
            let (value, ts_ms) = row?;
            samples.push(MetricSample {
                agent_id: agent_id.to_string(),
                metric,
                value,
                timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_default(),
            });
        }
        samples.reverse();
        Ok(samples)
    }

    /// The most recent `lookback` candles of `width_secs`, as closes.
    pub fn candle_window(
        &self,
        agent_id: &str,
        metric: MetricType,
        width_secs: u64,
        lookback: usize,
    ) -> Result<Vec<MetricSample>> {
        let latest: Option<i64> = {
            let conn = self.lock();
            conn.query_row(
                "SELECT MAX(timestamp) FROM metric_samples WHERE agent_id = ?1 AND metric = ?2",
                params![agent_id, metric.as_str()],
                |row| row.get(0),
            )?
        };
        let Some(latest) = latest.and_then(DateTime::from_timestamp_millis) else {
            return Ok(Vec::new());
        };

        let span = Duration::seconds((width_secs as i64).saturating_mul(lookback as i64 - 1));
        let from = candles::bucket_start(latest, width_secs) - span;

        let samples = {
            let conn = self.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT value, timestamp FROM metric_samples
                 WHERE agent_id = ?1 AND metric = ?2 AND timestamp >= ?3
                 ORDER BY timestamp ASC, id ASC",
            )?;
            let rows = stmt.query_map(
                params![agent_id, metric.as_str(), from.timestamp_millis()],
                |row| Ok((row.get::<_, f64>(0)?, row.get::<_, i64>(1)?)),
            )?;
            let mut samples = Vec::new();
            for row in rows {
                let (value, ts_ms) = row?;
                samples.push(MetricSample {
                    agent_id: agent_id.to_string(),
                    metric,
                    value,
                    timestamp: DateTime::from_timestamp_millis(ts_ms).unwrap_or_default(),
                });
            }
            samples
        };

        let all = candles::aggregate(&samples, width_secs);
        let start = all.len().saturating_sub(lookback);
        Ok(candles::closes(agent_id, metric, &all[start..]))
    }

    pub fn load_window(
        &self,
        agent_id: &str,
        metric: MetricType,
        resolution: Resolution,
        lookback: usize,
    ) -> Result<MetricWindow> {
        let samples = match resolution {
            Resolution::Raw => self.raw_window(agent_id, metric, lookback)?,
            Resolution::Candle { secs } => self.candle_window(agent_id, metric, secs, lookback)?,
        };
        Ok(MetricWindow {
            agent_id: agent_id.to_string(),
            metric,
            resolution,
            samples,
        })
    }

    // ── Agents ──

    /// Sets or clears (`None`) the per-agent resolution override.
    pub fn set_agent_resolution(&self, agent_id: &str, resolution: Option<Resolution>) -> Result<()> {
        let now = Utc::now().timestamp_millis();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO agents (agent_id, resolution, last_seen, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?3, ?3)
             ON CONFLICT(agent_id) DO UPDATE SET
                resolution = excluded.resolution,
                updated_at = excluded.updated_at",
            params![agent_id, resolution.map(|r| r.to_string()), now],
        )?;
        Ok(())
    }

    /// The agent's override, or the store default. An unparsable override
    /// is logged and ignored.
    pub fn agent_resolution(&self, agent_id: &str) -> Result<Resolution> {
        let stored: Option<String> = {
            let conn = self.lock();
            conn.query_row(
                "SELECT resolution FROM agents WHERE agent_id = ?1",
                params![agent_id],
                |row| row.get(0),
            )
            .optional()?
            .flatten()
        };

        Ok(match stored {
            None => self.default_resolution,
            Some(raw) => match raw.parse() {
                Ok(resolution) => resolution,
                Err(e) => {
                    tracing::warn!(agent_id, resolution = %raw, error = %e, "Ignoring invalid agent resolution");
                    self.default_resolution
                }
            },
        })
    }

    // ── Alert configurations ──

    pub fn upsert_configuration(&self, config: &AlertConfiguration) -> Result<()> {
        let json = serde_json::to_string(config)?;
        let now = Utc::now().timestamp_millis();
        let conn = self.lock();
        conn.execute(
            "INSERT INTO alert_configurations (id, name, enabled, config_json, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                enabled = excluded.enabled,
                config_json = excluded.config_json,
                updated_at = excluded.updated_at",
            params![&config.id, &config.name, config.enabled, json, now],
        )?;
        Ok(())
    }

    pub fn delete_configuration(&self, id: &str) -> Result<bool> {
        let conn = self.lock();
        let n = conn.execute("DELETE FROM alert_configurations WHERE id = ?1", params![id])?;
        Ok(n > 0)
    }

    pub fn count_configurations(&self) -> Result<u64> {
        let conn = self.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM alert_configurations", [], |row| {
            row.get(0)
        })?;
        Ok(n as u64)
    }

    /// Stored configurations in insertion order. Rows whose JSON body no
    /// longer decodes are skipped with a warning.
    pub fn list_configurations(&self, enabled_only: bool) -> Result<Vec<AlertConfiguration>> {
        let rows: Vec<(String, String)> = {
            let conn = self.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT id, config_json FROM alert_configurations
                 WHERE (?1 = 0 OR enabled = 1)
                 ORDER BY created_at ASC, id ASC",
            )?;
            let rows = stmt.query_map(params![enabled_only], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };

        let mut configs = Vec::with_capacity(rows.len());
        for (id, json) in rows {
            match AlertConfiguration::from_json(&json) {
                Ok(config) => configs.push(config),
                Err(e) => {
                    tracing::warn!(configuration_id = %id, error = %e, "Skipping unreadable alert configuration");
                }
            }
        }
        Ok(configs)
    }

    // ── Alert history ──

    pub fn has_recent_alert(
        &self,
        agent_id: &str,
        configuration_id: &str,
        window: Duration,
    ) -> Result<bool> {
        let cutoff = (Utc::now() - window).timestamp_millis();
        let conn = self.lock();
        Ok(recent_alert_exists(&conn, agent_id, configuration_id, cutoff)?)
    }

    pub fn insert_alert(&self, record: &AlertRecord) -> Result<()> {
        let conn = self.lock();
        insert_alert(&conn, record)
    }

    /// Inserts `record` unless the same pair has an alert newer than
    /// `window`. Check and insert run in one `IMMEDIATE` transaction, so a
    /// concurrent writer on another connection waits for the lock.
    pub fn insert_alert_if_absent(&self, record: &AlertRecord, window: Duration) -> Result<bool> {
        let cutoff = (Utc::now() - window).timestamp_millis();
        let mut conn = self.lock();
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        if recent_alert_exists(&tx, &record.agent_id, &record.configuration_id, cutoff)? {
            return Ok(false);
        }
        insert_alert(&tx, record)?;
        tx.commit()?;
        Ok(true)
    }

    /// The agent's alerts, newest first.
    pub fn list_alerts(&self, agent_id: &str, limit: usize) -> Result<Vec<AlertRecord>> {
        let rows: Vec<AlertRow> = {
            let conn = self.lock();
            let mut stmt = conn.prepare_cached(
                "SELECT id, agent_id, configuration_id, configuration_name, alert_type, metric,
                        severity, message, indicators, notifications, snapshot, created_at
                 FROM alert_history
                 WHERE agent_id = ?1
                 ORDER BY created_at DESC, id DESC
                 LIMIT ?2",
            )?;
            let rows = stmt.query_map(params![agent_id, limit as i64], |row| {
                Ok(AlertRow {
                    id: row.get(0)?,
                    agent_id: row.get(1)?,
                    configuration_id: row.get(2)?,
                    configuration_name: row.get(3)?,
                    alert_type: row.get(4)?,
                    metric: row.get(5)?,
                    severity: row.get(6)?,
                    message: row.get(7)?,
                    indicators: row.get(8)?,
                    notifications: row.get(9)?,
                    snapshot: row.get(10)?,
                    created_at: row.get(11)?,
                })
            })?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        rows.into_iter().map(AlertRow::into_record).collect()
    }
}

fn recent_alert_exists(
    conn: &Connection,
    agent_id: &str,
    configuration_id: &str,
    cutoff_ms: i64,
) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(
            SELECT 1 FROM alert_history
            WHERE agent_id = ?1 AND configuration_id = ?2 AND created_at >= ?3
         )",
        params![agent_id, configuration_id, cutoff_ms],
        |row| row.get(0),
    )
}

fn insert_alert(conn: &Connection, record: &AlertRecord) -> Result<()> {
    let mut stmt = conn.prepare_cached(
        "INSERT INTO alert_history (id, agent_id, configuration_id, configuration_name, alert_type,
            metric, severity, message, indicators, notifications, snapshot, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    )?;
    stmt.execute(params![
        &record.id,
        &record.agent_id,
        &record.configuration_id,
        &record.configuration_name,
        record.alert_type.as_str(),
        record.metric.as_str(),
        record.severity.to_string(),
        &record.message,
        serde_json::to_string(&record.indicators)?,
        serde_json::to_string(&record.notifications)?,
        serde_json::to_string(&record.snapshot)?,
        record.created_at.timestamp_millis(),
    ])?;
    Ok(())
}

struct AlertRow {
    id: String,
    agent_id: String,
    configuration_id: String,
    configuration_name: String,
    alert_type: String,
    metric: String,
    severity: String,
    message: String,
    indicators: String,
    notifications: String,
    snapshot: String,
    created_at: i64,
}

fn invalid(column: &'static str) -> impl FnOnce(String) -> StorageError {
    move |message| StorageError::InvalidColumn { column, message }
}

impl AlertRow {
    fn into_record(self) -> Result<AlertRecord> {
        Ok(AlertRecord {
            id: self.id,
            agent_id: self.agent_id,
            configuration_id: self.configuration_id,
            configuration_name: self.configuration_name,
            alert_type: self.alert_type.parse().map_err(invalid("alert_type"))?,
            metric: self.metric.parse().map_err(invalid("metric"))?,
            severity: self.severity.parse().map_err(invalid("severity"))?,
            message: self.message,
            indicators: serde_json::from_str(&self.indicators)?,
            notifications: serde_json::from_str(&self.notifications)?,
            snapshot: serde_json::from_str(&self.snapshot)?,
            created_at: DateTime::from_timestamp_millis(self.created_at).unwrap_or_default(),
        })
    }
}
