use super::file::StateSnapshot;
use super::{PersistenceResult, StateStore};
use crate::analysis::UnitPriceAnalysis;
use crate::state::EngineState;
use rusqlite::{Connection, OptionalExtension, params};
use std::sync::Mutex;

/// Engine state in a SQLite file: one row of shared document pieces plus
/// per-entity tables of JSON blobs, written inside a transaction.
pub struct SqliteStateStore {
    connection: Mutex<Connection>,
}

impl SqliteStateStore {
    pub fn new<P: AsRef<std::path::Path>>(path: P) -> PersistenceResult<Self> {
        let connection = Connection::open(path)?;
        Self::initialize_schema(&connection)?;
        Ok(Self {
            connection: Mutex::new(connection),
        })
    }

    fn initialize_schema(connection: &Connection) -> PersistenceResult<()> {
        let ddl = r#"
            PRAGMA foreign_keys = ON;
            CREATE TABLE IF NOT EXISTS engine_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                catalogs_json TEXT NOT NULL,
                risks_json TEXT NOT NULL,
                price_history_json TEXT NOT NULL,
                trend_config_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                project_json TEXT NOT NULL,
                boq_items_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS analyses (
                item_id TEXT PRIMARY KEY,
                analysis_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS departments (
                id TEXT PRIMARY KEY,
                department_json TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS allocations (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                allocation_json TEXT NOT NULL
            );
        "#;
        connection.execute_batch(ddl)?;
        Ok(())
    }

    fn save_snapshot(tx: &rusqlite::Transaction, snapshot: &StateSnapshot) -> PersistenceResult<()> {
        tx.execute("DELETE FROM engine_meta", [])?;
        tx.execute(
            "INSERT INTO engine_meta (id, catalogs_json, risks_json, price_history_json, trend_config_json)
             VALUES (1, ?1, ?2, ?3, ?4)",
            params![
                serde_json::to_string(&snapshot.catalogs)?,
                serde_json::to_string(&snapshot.risks)?,
                serde_json::to_string(&snapshot.price_history)?,
                serde_json::to_string(&snapshot.trend_config)?,
            ],
        )?;

        tx.execute("DELETE FROM projects", [])?;
        let mut stmt =
            tx.prepare("INSERT INTO projects (id, project_json, boq_items_json) VALUES (?1, ?2, ?3)")?;
        for project in &snapshot.projects {
            let items = snapshot
                .boq_items_by_project
                .get(&project.id)
                .cloned()
                .unwrap_or_default();
            stmt.execute(params![
                project.id,
                serde_json::to_string(project)?,
                serde_json::to_string(&items)?,
            ])?;
        }

        tx.execute("DELETE FROM analyses", [])?;
        let mut stmt = tx.prepare("INSERT INTO analyses (item_id, analysis_json) VALUES (?1, ?2)")?;
        for (item_id, analysis) in &snapshot.analyses_by_item {
            stmt.execute(params![item_id, serde_json::to_string(analysis)?])?;
        }

        tx.execute("DELETE FROM departments", [])?;
        let mut stmt =
            tx.prepare("INSERT INTO departments (id, department_json) VALUES (?1, ?2)")?;
        for department in &snapshot.departments {
            stmt.execute(params![department.id, serde_json::to_string(department)?])?;
        }

        tx.execute("DELETE FROM allocations", [])?;
        let mut stmt = tx.prepare("INSERT INTO allocations (allocation_json) VALUES (?1)")?;
        for allocation in &snapshot.allocations {
            stmt.execute(params![serde_json::to_string(allocation)?])?;
        }
        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn save_state(&self, state: &EngineState) -> PersistenceResult<()> {
        let snapshot = StateSnapshot::from_state(state)?;
        let mut conn = self.connection.lock().expect("sqlite mutex poisoned");
        let tx = conn.transaction()?;
        Self::save_snapshot(&tx, &snapshot)?;
        tx.commit()?;
        Ok(())
    }

    fn load_state(&self) -> PersistenceResult<Option<EngineState>> {
        let conn = self.connection.lock().expect("sqlite mutex poisoned");

        let mut stmt = conn.prepare(
            "SELECT catalogs_json, risks_json, price_history_json, trend_config_json
             FROM engine_meta WHERE id = 1",
        )?;
        let meta: Option<(String, String, String, String)> = stmt
            .query_row([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })
            .optional()?;

        let Some((catalogs_json, risks_json, price_history_json, trend_config_json)) = meta else {
            return Ok(None);
        };

        let mut snapshot = StateSnapshot {
            catalogs: serde_json::from_str(&catalogs_json)?,
            risks: serde_json::from_str(&risks_json)?,
            price_history: serde_json::from_str(&price_history_json)?,
            trend_config: serde_json::from_str(&trend_config_json)?,
            ..StateSnapshot::default()
        };

        let mut stmt =
            conn.prepare("SELECT project_json, boq_items_json FROM projects ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (project_json, items_json) = row?;
            let project: crate::project::Project = serde_json::from_str(&project_json)?;
            let items: Vec<crate::boq::BoqItem> = serde_json::from_str(&items_json)?;
            snapshot.boq_items_by_project.insert(project.id.clone(), items);
            snapshot.projects.push(project);
        }

        let mut stmt =
            conn.prepare("SELECT item_id, analysis_json FROM analyses ORDER BY item_id ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (item_id, analysis_json) = row?;
            let analysis: UnitPriceAnalysis = serde_json::from_str(&analysis_json)?;
            snapshot.analyses_by_item.insert(item_id, analysis);
        }

        let mut stmt = conn.prepare("SELECT department_json FROM departments ORDER BY id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for json in rows {
            snapshot
                .departments
                .push(serde_json::from_str(&json?)?);
        }

        let mut stmt =
            conn.prepare("SELECT allocation_json FROM allocations ORDER BY seq ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        for json in rows {
            snapshot.allocations.push(serde_json::from_str(&json?)?);
        }

        snapshot.into_state().map(Some)
    }
}
