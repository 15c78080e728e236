// src/store/sqlite.rs
//
// A rusqlite-backed `Store`. Schema is a single generic (table_name, ...)
// layout rather than one physical table per entity kind - a pragmatic
// simplification recorded in DESIGN.md; the calibre store this crate is
// modelled on gives every relation its own table and column names, which
// is out of scope here (spec section 6 treats the persistent store as an
// external interface, not something this crate owns the schema of).

use super::Store;
use crate::diff::UpdateDiff;
use crate::error::{CacheError, Result};
use crate::link_table::{DstContainer, Id};
use crate::value::Value;
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::Mutex;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS id_map (
    dst_table TEXT NOT NULL,
    id INTEGER NOT NULL,
    value TEXT NOT NULL,
    PRIMARY KEY (dst_table, id)
);
CREATE TABLE IF NOT EXISTS link_rows (
    dst_table TEXT NOT NULL,
    src INTEGER NOT NULL,
    dst INTEGER NOT NULL,
    link_type TEXT,
    priority INTEGER,
    discriminator TEXT
);
CREATE INDEX IF NOT EXISTS link_rows_dst_table ON link_rows (dst_table);
CREATE TABLE IF NOT EXISTS link_attrs (
    dst_table TEXT NOT NULL,
    attr TEXT NOT NULL,
    src INTEGER NOT NULL,
    dst INTEGER NOT NULL,
    value TEXT NOT NULL
);
";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(SqliteStore { conn: Mutex::new(conn) })
    }

    pub fn backup_to(&self, path: &Path) -> Result<()> {
        self.conn
            .lock()
            .unwrap()
            .backup(rusqlite::DatabaseName::Main, path, None)
            .map_err(CacheError::from)
    }

    fn decode_value(raw: &str) -> Result<Value> {
        Ok(serde_json::from_str(raw)?)
    }

    fn encode_value(value: &Value) -> Result<String> {
        Ok(serde_json::to_string(value)?)
    }
}

impl Store for SqliteStore {
    fn read_id_map(&self, dst_table: &str) -> Result<Vec<(Id, Value)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT id, value FROM id_map WHERE dst_table = ?1")?;
        let rows = stmt
            .query_map(params![dst_table], |row| {
                let id: Id = row.get(0)?;
                let raw: String = row.get(1)?;
                Ok((id, raw))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(|(id, raw)| Ok((id, Self::decode_value(&raw)?))).collect()
    }

    fn read_one_to_one(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        self.read_plain_rows(dst_table)
    }

    fn read_many_to_one(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        self.read_plain_rows(dst_table)
    }

    fn read_one_to_many(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        self.read_plain_rows(dst_table)
    }

    fn read_many_to_many(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        self.read_plain_rows(dst_table)
    }

    fn read_many_to_many_priority(&self, dst_table: &str) -> Result<Vec<(Id, Id, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT src, dst, priority FROM link_rows WHERE dst_table = ?1 ORDER BY priority DESC",
        )?;
        let rows = stmt
            .query_map(params![dst_table], |row| Ok((row.get(0)?, row.get(1)?, row.get::<_, Option<i64>>(2)?.unwrap_or(0))))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_many_to_many_typed(&self, dst_table: &str) -> Result<Vec<(Id, Id, String)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT src, dst, link_type FROM link_rows WHERE dst_table = ?1")?;
        let rows = stmt
            .query_map(params![dst_table], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get::<_, Option<String>>(2)?.unwrap_or_default()))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_many_to_many_priority_typed(&self, dst_table: &str) -> Result<Vec<(Id, Id, String, i64)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT src, dst, link_type, priority FROM link_rows WHERE dst_table = ?1 ORDER BY priority DESC",
        )?;
        let rows = stmt
            .query_map(params![dst_table], |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get::<_, Option<String>>(2)?.unwrap_or_default(),
                    row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                ))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn read_blobs(&self, dst_table: &str) -> Result<Vec<(Id, String, String, Value)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT lr.src, lr.link_type, lr.discriminator, im.value
             FROM link_rows lr JOIN id_map im ON im.dst_table = lr.dst_table AND im.id = lr.dst
             WHERE lr.dst_table = ?1",
        )?;
        let rows = stmt
            .query_map(params![dst_table], |row| {
                let src: Id = row.get(0)?;
                let ty: String = row.get::<_, Option<String>>(1)?.unwrap_or_default();
                let discr: String = row.get::<_, Option<String>>(2)?.unwrap_or_default();
                let raw: String = row.get(3)?;
                Ok((src, ty, discr, raw))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(src, ty, discr, raw)| Ok((src, ty, discr, Self::decode_value(&raw)?)))
            .collect()
    }

    fn read_link_attr(&self, dst_table: &str, attr: &str) -> Result<Vec<(Id, Id, Value)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT src, dst, value FROM link_attrs WHERE dst_table = ?1 AND attr = ?2")?;
        let rows = stmt
            .query_map(params![dst_table, attr], |row| {
                let src: Id = row.get(0)?;
                let dst: Id = row.get(1)?;
                let raw: String = row.get(2)?;
                Ok((src, dst, raw))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter().map(|(src, dst, raw)| Ok((src, dst, Self::decode_value(&raw)?))).collect()
    }

    fn write_diff(&self, dst_table: &str, diff: &UpdateDiff) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for (dst, value) in &diff.id_map_update {
            tx.execute(
                "INSERT INTO id_map (dst_table, id, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT(dst_table, id) DO UPDATE SET value = excluded.value",
                params![dst_table, dst, Self::encode_value(value)?],
            )?;
        }
        for src in &diff.deleted {
            tx.execute("DELETE FROM link_rows WHERE dst_table = ?1 AND src = ?2", params![dst_table, src])?;
        }
        for (src, container) in &diff.updated {
            tx.execute("DELETE FROM link_rows WHERE dst_table = ?1 AND src = ?2", params![dst_table, src])?;
            write_container(&tx, dst_table, *src, container)?;
        }
        tx.commit()?;
        Ok(())
    }

    fn bulk_delete_in_table(&self, dst_table: &str, ids: &[Id]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM id_map WHERE dst_table = ?1 AND id = ?2", params![dst_table, id])?;
            tx.execute("DELETE FROM link_rows WHERE dst_table = ?1 AND dst = ?2", params![dst_table, id])?;
        }
        tx.commit()?;
        Ok(())
    }

    fn merge_link_rows(&self, dst_table: &str, old_id: Id, new_id: Id) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "UPDATE link_rows SET dst = ?3 WHERE dst_table = ?1 AND dst = ?2",
            params![dst_table, old_id, new_id],
        )?;
        tx.execute("DELETE FROM id_map WHERE dst_table = ?1 AND id = ?2", params![dst_table, old_id])?;
        tx.commit()?;
        Ok(())
    }

    fn update_column_in_table(&self, dst_table: &str, id: Id, value: &Value) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE id_map SET value = ?3 WHERE dst_table = ?1 AND id = ?2",
            params![dst_table, id, Self::encode_value(value)?],
        )?;
        Ok(())
    }

    fn clean(&self, dst_table: &str, ids: &[Id]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        for id in ids {
            tx.execute("DELETE FROM id_map WHERE dst_table = ?1 AND id = ?2", params![dst_table, id])?;
            tx.execute("DELETE FROM link_rows WHERE dst_table = ?1 AND dst = ?2", params![dst_table, id])?;
        }
        tx.commit()?;
        Ok(())
    }
}

impl SqliteStore {
    fn read_plain_rows(&self, dst_table: &str) -> Result<Vec<(Id, Id)>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT src, dst FROM link_rows WHERE dst_table = ?1")?;
        let rows = stmt
            .query_map(params![dst_table], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }
}

fn write_container(tx: &rusqlite::Transaction, dst_table: &str, src: Id, container: &DstContainer) -> Result<()> {
    match container {
        DstContainer::Empty => {}
        DstContainer::Single(dst) => {
            tx.execute(
                "INSERT INTO link_rows (dst_table, src, dst) VALUES (?1, ?2, ?3)",
                params![dst_table, src, dst],
            )?;
        }
        DstContainer::Set(set) => {
            for dst in set {
                tx.execute(
                    "INSERT INTO link_rows (dst_table, src, dst) VALUES (?1, ?2, ?3)",
                    params![dst_table, src, dst],
                )?;
            }
        }
        DstContainer::List(list) => {
            for (priority, dst) in list.iter().rev().enumerate() {
                tx.execute(
                    "INSERT INTO link_rows (dst_table, src, dst, priority) VALUES (?1, ?2, ?3, ?4)",
                    params![dst_table, src, dst, priority as i64],
                )?;
            }
        }
        DstContainer::Typed(map) => {
            for (ty, cell) in map {
                match cell {
                    DstContainer::Set(set) => {
                        for dst in set {
                            tx.execute(
                                "INSERT INTO link_rows (dst_table, src, dst, link_type) VALUES (?1, ?2, ?3, ?4)",
                                params![dst_table, src, dst, ty],
                            )?;
                        }
                    }
                    DstContainer::List(list) => {
                        for (priority, dst) in list.iter().rev().enumerate() {
                            tx.execute(
                                "INSERT INTO link_rows (dst_table, src, dst, link_type, priority) VALUES (?1, ?2, ?3, ?4, ?5)",
                                params![dst_table, src, dst, ty, priority as i64],
                            )?;
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    Ok(())
}
