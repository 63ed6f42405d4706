use anyhow::{anyhow, Context};
use rusqlite::{Connection, OptionalExtension};

use super::engine::TabError;
use super::model::{CustomTable, Preset, Row};

/// The record-store contract the engine persists through. Identities are
/// store-assigned numeric ids; records travel whole (name, preset, columns
/// and rows in full, no row- or column-level diffing).
pub trait TabStore {
    fn fetch_all(&self) -> anyhow::Result<Vec<CustomTable>>;
    fn insert(&mut self, table: &CustomTable) -> anyhow::Result<CustomTable>;
    fn update(&mut self, id: i64, table: &CustomTable) -> anyhow::Result<CustomTable>;
    /// Deleting by a name with no stored match is a successful no-op; the
    /// tab may never have been persisted.
    fn delete_by_name(&mut self, name: &str) -> anyhow::Result<()>;
}

/// Custom tabs stored in the workspace database, one record per tab with
/// the columns/rows payloads as JSON text.
pub struct SqliteTabStore<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteTabStore<'a> {
    pub fn new(conn: &'a Connection) -> SqliteTabStore<'a> {
        SqliteTabStore { conn }
    }
}

fn encode_payloads(table: &CustomTable) -> anyhow::Result<(String, String)> {
    let columns = serde_json::to_string(&table.columns).context("serialize columns")?;
    let rows = serde_json::to_string(&table.rows).context("serialize rows")?;
    Ok((columns, rows))
}

impl TabStore for SqliteTabStore<'_> {
    fn fetch_all(&self) -> anyhow::Result<Vec<CustomTable>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, preset, columns, rows FROM custom_tabs ORDER BY id")?;
        let mut out = Vec::new();
        let mut rows = stmt.query([])?;
        while let Some(row) = rows.next()? {
            let id: i64 = row.get(0)?;
            let name: String = row.get(1)?;
            let preset: Option<String> = row.get(2)?;
            let columns_json: String = row.get(3)?;
            let rows_json: String = row.get(4)?;

            let columns: Vec<String> = serde_json::from_str(&columns_json)
                .with_context(|| format!("tab {name:?}: bad columns payload"))?;
            let parsed_rows: Vec<Row> = serde_json::from_str(&rows_json)
                .with_context(|| format!("tab {name:?}: bad rows payload"))?;

            out.push(CustomTable {
                id: Some(id),
                name,
                preset: Preset::from_db(preset.as_deref()),
                columns,
                rows: parsed_rows,
            });
        }
        Ok(out)
    }

    fn insert(&mut self, table: &CustomTable) -> anyhow::Result<CustomTable> {
        let (columns, rows) = encode_payloads(table)?;
        self.conn
            .execute(
                "INSERT INTO custom_tabs(name, preset, columns, rows) VALUES(?, ?, ?, ?)",
                (
                    &table.name,
                    Preset::as_db(table.preset),
                    &columns,
                    &rows,
                ),
            )
            .with_context(|| format!("insert tab {:?}", table.name))?;

        let mut saved = table.clone();
        saved.id = Some(self.conn.last_insert_rowid());
        Ok(saved)
    }

    fn update(&mut self, id: i64, table: &CustomTable) -> anyhow::Result<CustomTable> {
        let (columns, rows) = encode_payloads(table)?;
        let changed = self
            .conn
            .execute(
                "UPDATE custom_tabs SET name = ?, preset = ?, columns = ?, rows = ? WHERE id = ?",
                (
                    &table.name,
                    Preset::as_db(table.preset),
                    &columns,
                    &rows,
                    id,
                ),
            )
            .with_context(|| format!("update tab {:?}", table.name))?;
        if changed == 0 {
            return Err(anyhow!("no stored tab with id {id}"));
        }

        let mut saved = table.clone();
        saved.id = Some(id);
        Ok(saved)
    }

    fn delete_by_name(&mut self, name: &str) -> anyhow::Result<()> {
        // Confirm the record really is gone afterwards; a present row after
        // a silent zero-change delete would mean local state diverged.
        self.conn
            .execute("DELETE FROM custom_tabs WHERE name = ?", [name])
            .with_context(|| format!("delete tab {name:?}"))?;
        let remaining: Option<i64> = self
            .conn
            .query_row("SELECT id FROM custom_tabs WHERE name = ?", [name], |r| {
                r.get(0)
            })
            .optional()?;
        if remaining.is_some() {
            return Err(anyhow!("tab {name:?} still present after delete"));
        }
        Ok(())
    }
}

/// Turns the full in-memory table list into store calls: one insert per
/// never-persisted table, one whole-record update per persisted table.
/// Every call is attempted even after a failure; tables that did persist
/// stay persisted (partial success, no rollback). On overall success the
/// returned list (created first, then updated) is the new canonical
/// state.
pub fn reconcile(store: &mut dyn TabStore, tables: &[CustomTable]) -> Result<Vec<CustomTable>, TabError> {
    let (fresh, seen): (Vec<&CustomTable>, Vec<&CustomTable>) =
        tables.iter().partition(|t| t.id.is_none());

    let mut merged = Vec::with_capacity(tables.len());
    let mut failures: Vec<(String, String)> = Vec::new();

    for table in fresh {
        match store.insert(table) {
            Ok(saved) => merged.push(saved),
            Err(e) => failures.push((table.name.clone(), e.to_string())),
        }
    }
    for table in seen {
        let id = table.id.unwrap_or_default();
        match store.update(id, table) {
            Ok(saved) => merged.push(saved),
            Err(e) => failures.push((table.name.clone(), e.to_string())),
        }
    }

    if let Some((name, first_error)) = failures.first() {
        tracing::warn!(
            failed = failures.len(),
            total = tables.len(),
            tab = %name,
            error = %first_error,
            "tab persistence incomplete"
        );
        return Err(TabError::Persist {
            failed: failures.len(),
            total: tables.len(),
            first_error: first_error.clone(),
        });
    }
    Ok(merged)
}

#[cfg(test)]
mod tests {
    use super::super::model::CellValue;
    use super::*;

    #[derive(Default)]
    struct CountingStore {
        inserts: usize,
        updates: usize,
        next_id: i64,
        fail_on: Option<String>,
    }

    impl TabStore for CountingStore {
        fn fetch_all(&self) -> anyhow::Result<Vec<CustomTable>> {
            Ok(Vec::new())
        }

        fn insert(&mut self, table: &CustomTable) -> anyhow::Result<CustomTable> {
            if self.fail_on.as_deref() == Some(table.name.as_str()) {
                return Err(anyhow!("constraint violation"));
            }
            self.inserts += 1;
            self.next_id += 1;
            let mut saved = table.clone();
            saved.id = Some(self.next_id);
            Ok(saved)
        }

        fn update(&mut self, id: i64, table: &CustomTable) -> anyhow::Result<CustomTable> {
            if self.fail_on.as_deref() == Some(table.name.as_str()) {
                return Err(anyhow!("constraint violation"));
            }
            self.updates += 1;
            let mut saved = table.clone();
            saved.id = Some(id);
            Ok(saved)
        }

        fn delete_by_name(&mut self, _name: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn table(name: &str, id: Option<i64>) -> CustomTable {
        CustomTable {
            id,
            name: name.to_string(),
            preset: None,
            columns: vec!["Item".to_string()],
            rows: Vec::new(),
        }
    }

    #[test]
    fn reconcile_partitions_inserts_from_updates() {
        let mut store = CountingStore::default();
        let tables = vec![
            table("saved-a", Some(11)),
            table("new-a", None),
            table("saved-b", Some(12)),
            table("new-b", None),
            table("new-c", None),
        ];

        let merged = reconcile(&mut store, &tables).expect("reconcile");

        assert_eq!(store.inserts, 3);
        assert_eq!(store.updates, 2);
        assert_eq!(merged.len(), tables.len());
        // Created-first, then updated; every entry now carries an id.
        let names: Vec<&str> = merged.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["new-a", "new-b", "new-c", "saved-a", "saved-b"]);
        assert!(merged.iter().all(|t| t.id.is_some()));
    }

    #[test]
    fn reconcile_attempts_every_call_despite_failures() {
        let mut store = CountingStore {
            fail_on: Some("new-b".to_string()),
            ..CountingStore::default()
        };
        let tables = vec![table("new-a", None), table("new-b", None), table("saved", Some(4))];

        let err = reconcile(&mut store, &tables).expect_err("partial failure");
        match err {
            TabError::Persist { failed, total, .. } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 3);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The failure did not short-circuit the remaining calls.
        assert_eq!(store.inserts, 1);
        assert_eq!(store.updates, 1);
    }

    fn memory_conn() -> Connection {
        let conn = Connection::open_in_memory().expect("open in-memory db");
        conn.execute(
            "CREATE TABLE custom_tabs(
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                preset TEXT,
                columns TEXT NOT NULL,
                rows TEXT NOT NULL
            )",
            [],
        )
        .expect("create table");
        conn
    }

    #[test]
    fn sqlite_store_round_trips_payloads() {
        let conn = memory_conn();
        let mut store = SqliteTabStore::new(&conn);

        let mut t = table("Uniform Fees", None);
        t.preset = Some(Preset::Payment);
        t.columns = vec!["Student Name".to_string(), "Amount".to_string()];
        t.rows = vec![[
            ("Student Name".to_string(), CellValue::text("Ada")),
            ("Amount".to_string(), CellValue::Number(27000.0)),
        ]
        .into_iter()
        .collect()];

        let saved = store.insert(&t).expect("insert");
        let id = saved.id.expect("id assigned");

        let mut renamed = saved.clone();
        renamed.name = "School Fees".to_string();
        store.update(id, &renamed).expect("update");

        let all = store.fetch_all().expect("fetch");
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].name, "School Fees");
        assert_eq!(all[0].preset, Some(Preset::Payment));
        assert_eq!(all[0].rows[0].number_or_zero("Amount"), 27000.0);

        store.delete_by_name("School Fees").expect("delete");
        assert!(store.fetch_all().expect("fetch").is_empty());
        // Deleting a never-persisted name stays a no-op.
        store.delete_by_name("Ghost").expect("noop delete");
    }

    #[test]
    fn duplicate_names_violate_the_store_constraint() {
        let conn = memory_conn();
        let mut store = SqliteTabStore::new(&conn);
        store.insert(&table("Fees", None)).expect("insert");
        assert!(store.insert(&table("Fees", None)).is_err());
    }
}
