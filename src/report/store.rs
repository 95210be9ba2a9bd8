//! SQLite storage of the evaluations and of the generated reports.

use crate::report::*;

use chrono::TimeZone;
use rusqlite::{params, Connection, OptionalExtension, Row, Transaction};
use serde::{Deserialize, Serialize};

#[derive(Eq, PartialEq, Debug, Clone, Copy, Hash)]
pub enum ReportType {
    Sensory,
    Survey,
}

impl ReportType {
    pub fn as_str(self) -> &'static str {
        match self {
            ReportType::Sensory => "sensory",
            ReportType::Survey => "survey",
        }
    }

    pub fn parse(s: &str) -> Option<ReportType> {
        match s {
            "sensory" => Some(ReportType::Sensory),
            "survey" => Some(ReportType::Survey),
            _ => None,
        }
    }
}

/// A cached report, as stored.
#[derive(Eq, PartialEq, Debug, Clone)]
pub struct GeneratedReport {
    pub id: RecordId,
    pub evaluation_id: RecordId,
    pub report_type: ReportType,
    /// The serialized report, returned as is on cache hits.
    pub report_data: String,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub is_valid: bool,
}

/// A report to insert. New rows are always valid.
#[derive(Debug, Clone)]
pub struct NewReport<'a> {
    pub evaluation_id: RecordId,
    pub report_type: ReportType,
    pub report_data: &'a str,
    pub generated_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// The operations the report cache needs from the data store.
pub trait ReportStore {
    /// The title of the evaluation, if it is registered.
    fn evaluation_title(&self, evaluation_id: RecordId) -> ReportResult<Option<String>>;

    /// The submissions of the evaluation that are not deleted.
    fn load_evaluations(&self, evaluation_id: RecordId) -> ReportResult<Vec<PanelistEvaluation>>;

    /// The products of the evaluation that are not deleted, in presentation order.
    fn load_products(&self, evaluation_id: RecordId) -> ReportResult<Vec<Product>>;

    fn insert_report(&self, report: &NewReport) -> ReportResult<GeneratedReport>;

    /// Marks every report of the key as invalid. Returns the number of rows changed.
    fn invalidate_reports(
        &self,
        evaluation_id: RecordId,
        report_type: ReportType,
    ) -> ReportResult<usize>;

    /// The most recently generated report of the key that is valid and expires after `now`.
    fn latest_valid_report(
        &self,
        evaluation_id: RecordId,
        report_type: ReportType,
        now: DateTime<Utc>,
    ) -> ReportResult<Option<GeneratedReport>>;
}

// The preferences of a submission are stored as a JSON array.
#[derive(Eq, PartialEq, Debug, Clone, Serialize, Deserialize)]
struct StoredPreference {
    product_id: RecordId,
    position: u32,
    reason: Option<String>,
}

pub struct SqliteStore {
    connection: Connection,
}

fn configure_connection(connection: &Connection) -> ReportResult<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context(PersistenceSnafu {})?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context(PersistenceSnafu {})?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> ReportResult<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS sensory_evaluations (
              id INTEGER PRIMARY KEY,
              title TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS sensory_products (
              id INTEGER PRIMARY KEY,
              evaluation_id INTEGER NOT NULL,
              name TEXT NOT NULL,
              code TEXT,
              description TEXT,
              position INTEGER NOT NULL DEFAULT 0,
              is_deleted INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS panelist_evaluations (
              id INTEGER PRIMARY KEY,
              evaluation_id INTEGER NOT NULL,
              panelist_id TEXT NOT NULL,
              panelist_name TEXT,
              panelist_email TEXT,
              preferences TEXT NOT NULL,
              submitted_at TEXT NOT NULL,
              is_deleted INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS generated_reports (
              id INTEGER PRIMARY KEY AUTOINCREMENT,
              evaluation_id INTEGER NOT NULL,
              report_type TEXT NOT NULL,
              report_data TEXT NOT NULL,
              generated_at INTEGER NOT NULL,
              expires_at INTEGER NOT NULL,
              is_valid INTEGER NOT NULL DEFAULT 1
            );

            CREATE INDEX IF NOT EXISTS idx_products_evaluation
              ON sensory_products(evaluation_id);
            CREATE INDEX IF NOT EXISTS idx_panelist_evaluations_evaluation
              ON panelist_evaluations(evaluation_id);
            CREATE INDEX IF NOT EXISTS idx_generated_reports_key
              ON generated_reports(evaluation_id, report_type, is_valid);
            ",
        )
        .context(PersistenceSnafu {})
}

// Timestamps of the reports are stored as milliseconds since the epoch so that
// expiry checks are plain integer comparisons.
fn to_millis(ts: &DateTime<Utc>) -> i64 {
    ts.timestamp_millis()
}

fn from_millis(idx: usize, ms: i64) -> rusqlite::Result<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single().ok_or_else(|| {
        rusqlite::Error::IntegralValueOutOfRange(idx, ms)
    })
}

fn report_from_row(row: &Row) -> rusqlite::Result<GeneratedReport> {
    let report_type: String = row.get(2)?;
    Ok(GeneratedReport {
        id: row.get(0)?,
        evaluation_id: row.get(1)?,
        report_type: ReportType::parse(&report_type).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                2,
                rusqlite::types::Type::Text,
                format!("unknown report type {:?}", report_type).into(),
            )
        })?,
        report_data: row.get(3)?,
        generated_at: from_millis(4, row.get(4)?)?,
        expires_at: from_millis(5, row.get(5)?)?,
        is_valid: row.get(6)?,
    })
}

fn evaluation_from_row(row: &Row) -> rusqlite::Result<PanelistEvaluation> {
    let raw_preferences: String = row.get(5)?;
    let stored: Vec<StoredPreference> =
        serde_json::from_str(&raw_preferences).map_err(|e| {
            rusqlite::Error::FromSqlConversionFailure(5, rusqlite::types::Type::Text, Box::new(e))
        })?;
    Ok(PanelistEvaluation {
        id: row.get(0)?,
        evaluation_id: row.get(1)?,
        panelist_id: row.get(2)?,
        panelist_name: row.get(3)?,
        panelist_email: row.get(4)?,
        preferences: stored
            .into_iter()
            .map(|p| Preference {
                product_id: p.product_id,
                position: p.position,
                reason: p.reason,
            })
            .collect(),
        submitted_at: row.get(6)?,
        is_deleted: row.get(7)?,
    })
}

const REPORT_COLUMNS: &str =
    "id, evaluation_id, report_type, report_data, generated_at, expires_at, is_valid";

impl SqliteStore {
    /// Opens (and creates if needed) the database at the given path.
    pub fn open(path: &str) -> ReportResult<SqliteStore> {
        let connection = Connection::open(path).context(PersistenceSnafu {})?;
        configure_connection(&connection)?;
        SqliteStore::from_connection(connection)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> ReportResult<SqliteStore> {
        let connection = Connection::open_in_memory().context(PersistenceSnafu {})?;
        SqliteStore::from_connection(connection)
    }

    pub fn from_connection(connection: Connection) -> ReportResult<SqliteStore> {
        ensure_schema(&connection)?;
        Ok(SqliteStore { connection })
    }

    /// Starts a transaction on the store. Writes through the store are part of it
    /// until it is committed; dropping it rolls them back.
    pub fn transaction(&self) -> ReportResult<Transaction<'_>> {
        self.connection
            .unchecked_transaction()
            .context(PersistenceSnafu {})
    }

    /// The evaluation that owns the product with this id, if the product exists.
    pub fn product_owner(&self, product_id: RecordId) -> ReportResult<Option<RecordId>> {
        self.connection
            .query_row(
                "SELECT evaluation_id FROM sensory_products WHERE id = ?1",
                params![product_id],
                |row| row.get(0),
            )
            .optional()
            .context(PersistenceSnafu {})
    }

    /// The evaluation that owns the submission with this id, if the submission exists.
    pub fn submission_owner(&self, submission_id: RecordId) -> ReportResult<Option<RecordId>> {
        self.connection
            .query_row(
                "SELECT evaluation_id FROM panelist_evaluations WHERE id = ?1",
                params![submission_id],
                |row| row.get(0),
            )
            .optional()
            .context(PersistenceSnafu {})
    }

    pub fn insert_evaluation(&self, evaluation_id: RecordId, title: &str) -> ReportResult<()> {
        self.connection
            .execute(
                "INSERT OR REPLACE INTO sensory_evaluations (id, title) VALUES (?1, ?2)",
                params![evaluation_id, title],
            )
            .context(PersistenceSnafu {})?;
        Ok(())
    }

    pub fn insert_product(&self, product: &Product) -> ReportResult<()> {
        self.connection
            .execute(
                "INSERT OR REPLACE INTO sensory_products
                   (id, evaluation_id, name, code, description, position, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    product.id,
                    product.evaluation_id,
                    product.name,
                    product.code,
                    product.description,
                    product.position,
                    product.is_deleted
                ],
            )
            .context(PersistenceSnafu {})?;
        Ok(())
    }

    /// Stores a submission. Without an id, the database assigns one.
    /// Returns the id of the stored row.
    pub fn insert_panelist_evaluation(
        &self,
        id: Option<RecordId>,
        evaluation: &PanelistEvaluation,
    ) -> ReportResult<RecordId> {
        let stored: Vec<StoredPreference> = evaluation
            .preferences
            .iter()
            .map(|p| StoredPreference {
                product_id: p.product_id,
                position: p.position,
                reason: p.reason.clone(),
            })
            .collect();
        let raw_preferences = serde_json::to_string(&stored).context(ParsingJsonSnafu {})?;
        self.connection
            .execute(
                "INSERT OR REPLACE INTO panelist_evaluations
                   (id, evaluation_id, panelist_id, panelist_name, panelist_email,
                    preferences, submitted_at, is_deleted)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    id,
                    evaluation.evaluation_id,
                    evaluation.panelist_id,
                    evaluation.panelist_name,
                    evaluation.panelist_email,
                    raw_preferences,
                    evaluation.submitted_at,
                    evaluation.is_deleted
                ],
            )
            .context(PersistenceSnafu {})?;
        Ok(self.connection.last_insert_rowid())
    }

    /// All the stored reports of a key, the most recent first.
    pub fn list_reports(
        &self,
        evaluation_id: RecordId,
        report_type: ReportType,
    ) -> ReportResult<Vec<GeneratedReport>> {
        let sql = format!(
            "SELECT {} FROM generated_reports
             WHERE evaluation_id = ?1 AND report_type = ?2
             ORDER BY generated_at DESC, id DESC",
            REPORT_COLUMNS
        );
        let mut stmt = self.connection.prepare(&sql).context(PersistenceSnafu {})?;
        let rows = stmt
            .query_map(params![evaluation_id, report_type.as_str()], report_from_row)
            .context(PersistenceSnafu {})?;
        rows.collect::<rusqlite::Result<Vec<GeneratedReport>>>()
            .context(PersistenceSnafu {})
    }
}

impl ReportStore for SqliteStore {
    fn evaluation_title(&self, evaluation_id: RecordId) -> ReportResult<Option<String>> {
        self.connection
            .query_row(
                "SELECT title FROM sensory_evaluations WHERE id = ?1",
                params![evaluation_id],
                |row| row.get(0),
            )
            .optional()
            .context(PersistenceSnafu {})
    }

    fn load_evaluations(&self, evaluation_id: RecordId) -> ReportResult<Vec<PanelistEvaluation>> {
        let mut stmt = self
            .connection
            .prepare(
                "SELECT id, evaluation_id, panelist_id, panelist_name, panelist_email,
                        preferences, submitted_at, is_deleted
                 FROM panelist_evaluations
                 WHERE evaluation_id = ?1 AND is_deleted = 0
                 ORDER BY submitted_at, id",
            )
            .context(PersistenceSnafu {})?;
        let rows = stmt
            .query_map(params![evaluation_id], evaluation_from_row)
            .context(PersistenceSnafu {})?;
        let res = rows
            .collect::<rusqlite::Result<Vec<PanelistEvaluation>>>()
            .context(PersistenceSnafu {})?;
        debug!(
            "load_evaluations: evaluation {:?}: {:?} submissions",
            evaluation_id,
            res.len()
        );
        Ok(res)
    }

    fn load_products(&self, evaluation_id: RecordId) -> ReportResult<Vec<Product>> {
        let mut stmt = self
            .connection
            .prepare(
                "SELECT id, evaluation_id, name, code, description, position, is_deleted
                 FROM sensory_products
                 WHERE evaluation_id = ?1 AND is_deleted = 0
                 ORDER BY position, id",
            )
            .context(PersistenceSnafu {})?;
        let rows = stmt
            .query_map(params![evaluation_id], |row| {
                Ok(Product {
                    id: row.get(0)?,
                    evaluation_id: row.get(1)?,
                    name: row.get(2)?,
                    code: row.get(3)?,
                    description: row.get(4)?,
                    position: row.get(5)?,
                    is_deleted: row.get(6)?,
                })
            })
            .context(PersistenceSnafu {})?;
        rows.collect::<rusqlite::Result<Vec<Product>>>()
            .context(PersistenceSnafu {})
    }

    fn insert_report(&self, report: &NewReport) -> ReportResult<GeneratedReport> {
        self.connection
            .execute(
                "INSERT INTO generated_reports
                   (evaluation_id, report_type, report_data, generated_at, expires_at, is_valid)
                 VALUES (?1, ?2, ?3, ?4, ?5, 1)",
                params![
                    report.evaluation_id,
                    report.report_type.as_str(),
                    report.report_data,
                    to_millis(&report.generated_at),
                    to_millis(&report.expires_at)
                ],
            )
            .context(PersistenceSnafu {})?;
        let id = self.connection.last_insert_rowid();
        debug!(
            "insert_report: evaluation {:?}: inserted report {:?}",
            report.evaluation_id, id
        );
        let sql = format!("SELECT {} FROM generated_reports WHERE id = ?1", REPORT_COLUMNS);
        self.connection
            .query_row(&sql, params![id], report_from_row)
            .context(PersistenceSnafu {})
    }

    fn invalidate_reports(
        &self,
        evaluation_id: RecordId,
        report_type: ReportType,
    ) -> ReportResult<usize> {
        self.connection
            .execute(
                "UPDATE generated_reports SET is_valid = 0
                 WHERE evaluation_id = ?1 AND report_type = ?2",
                params![evaluation_id, report_type.as_str()],
            )
            .context(PersistenceSnafu {})
    }

    fn latest_valid_report(
        &self,
        evaluation_id: RecordId,
        report_type: ReportType,
        now: DateTime<Utc>,
    ) -> ReportResult<Option<GeneratedReport>> {
        let sql = format!(
            "SELECT {} FROM generated_reports
             WHERE evaluation_id = ?1 AND report_type = ?2 AND is_valid = 1 AND expires_at > ?3
             ORDER BY generated_at DESC, id DESC
             LIMIT 1",
            REPORT_COLUMNS
        );
        self.connection
            .query_row(
                &sql,
                params![evaluation_id, report_type.as_str(), to_millis(&now)],
                report_from_row,
            )
            .optional()
            .context(PersistenceSnafu {})
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 0).unwrap()
    }

    fn new_report(data: &str, generated_at: DateTime<Utc>) -> NewReport {
        NewReport {
            evaluation_id: 1,
            report_type: ReportType::Sensory,
            report_data: data,
            generated_at,
            expires_at: generated_at + Duration::days(30),
        }
    }

    fn submission(panelist: &str, prefs: Vec<Preference>, deleted: bool) -> PanelistEvaluation {
        PanelistEvaluation {
            id: 0,
            evaluation_id: 1,
            panelist_id: panelist.to_string(),
            panelist_name: Some("Ana".to_string()),
            panelist_email: None,
            preferences: prefs,
            submitted_at: "2024-04-30T10:00:00Z".to_string(),
            is_deleted: deleted,
        }
    }

    #[test]
    fn submissions_round_trip_without_deleted_rows() {
        let store = SqliteStore::open_in_memory().unwrap();
        let prefs = vec![
            Preference {
                product_id: 1,
                position: 1,
                reason: Some("Excelente".to_string()),
            },
            Preference {
                product_id: 2,
                position: 2,
                reason: None,
            },
        ];
        let id = store
            .insert_panelist_evaluation(None, &submission("p1", prefs.clone(), false))
            .unwrap();
        store
            .insert_panelist_evaluation(Some(50), &submission("p2", vec![], true))
            .unwrap();
        let loaded = store.load_evaluations(1).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].id, id);
        assert_eq!(loaded[0].preferences, prefs);
        assert_eq!(loaded[0].panelist_name.as_deref(), Some("Ana"));
        assert!(store.load_evaluations(2).unwrap().is_empty());
    }

    #[test]
    fn products_in_presentation_order() {
        let store = SqliteStore::open_in_memory().unwrap();
        for (id, name, position, deleted) in
            [(10, "B", 2, false), (11, "A", 1, false), (12, "X", 3, true)]
        {
            store
                .insert_product(&Product {
                    id,
                    evaluation_id: 1,
                    name: name.to_string(),
                    code: Some(format!("{}", id * 10)),
                    description: None,
                    position,
                    is_deleted: deleted,
                })
                .unwrap();
        }
        let products = store.load_products(1).unwrap();
        let names: Vec<&str> = products.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A", "B"]);
        assert_eq!(products[0].code.as_deref(), Some("110"));
    }

    #[test]
    fn dropped_transaction_rolls_back() {
        let store = SqliteStore::open_in_memory().unwrap();
        {
            let _tx = store.transaction().unwrap();
            store.insert_evaluation(1, "Yogur natural").unwrap();
        }
        assert_eq!(store.evaluation_title(1).unwrap(), None);

        let tx = store.transaction().unwrap();
        store.insert_evaluation(1, "Yogur natural").unwrap();
        tx.commit().unwrap();
        assert!(store.evaluation_title(1).unwrap().is_some());
    }

    #[test]
    fn evaluation_title_lookup() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert_evaluation(1, "Yogur natural").unwrap();
        assert_eq!(
            store.evaluation_title(1).unwrap().as_deref(),
            Some("Yogur natural")
        );
        assert_eq!(store.evaluation_title(2).unwrap(), None);
    }

    #[test]
    fn latest_valid_report_skips_expired_and_invalid() {
        let store = SqliteStore::open_in_memory().unwrap();
        let first = store.insert_report(&new_report("{\"a\":1}", t0())).unwrap();
        assert!(first.is_valid);
        assert_eq!(first.generated_at, t0());
        let second = store
            .insert_report(&new_report("{\"a\":2}", t0() + Duration::days(1)))
            .unwrap();

        let now = t0() + Duration::days(2);
        let hit = store
            .latest_valid_report(1, ReportType::Sensory, now)
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, second.id);
        assert_eq!(hit.report_data, "{\"a\":2}");

        // Other report type and other evaluations do not match.
        assert!(store
            .latest_valid_report(1, ReportType::Survey, now)
            .unwrap()
            .is_none());
        assert!(store
            .latest_valid_report(2, ReportType::Sensory, now)
            .unwrap()
            .is_none());

        // The second report expires exactly at t0 + 31 days.
        let later = t0() + Duration::days(30) + Duration::hours(1);
        let hit = store
            .latest_valid_report(1, ReportType::Sensory, later)
            .unwrap()
            .unwrap();
        assert_eq!(hit.id, second.id);
        assert!(store
            .latest_valid_report(1, ReportType::Sensory, t0() + Duration::days(31))
            .unwrap()
            .is_none());

        assert_eq!(store.invalidate_reports(1, ReportType::Sensory).unwrap(), 2);
        assert!(store
            .latest_valid_report(1, ReportType::Sensory, now)
            .unwrap()
            .is_none());
        let history = store.list_reports(1, ReportType::Sensory).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, second.id);
        assert!(history.iter().all(|r| !r.is_valid));
    }
}
