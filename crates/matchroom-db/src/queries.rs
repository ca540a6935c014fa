use crate::Database;
use crate::models::{MessageRow, NewMessage};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Messages --

    /// Appends one message and returns its row id.
    pub fn insert_message(&self, msg: &NewMessage<'_>) -> Result<i64> {
        self.with_conn_mut(|conn| {
            conn.execute(
                "INSERT INTO messages (a_id, b_id, from_id, to_id, text, ts) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![msg.a_id, msg.b_id, msg.from_id, msg.to_id, msg.text, msg.ts],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// The most recent `limit` messages of a conversation, returned oldest first.
    pub fn get_recent_messages(&self, a_id: i64, b_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| query_recent_messages(conn, a_id, b_id, limit))
    }

    pub fn count_messages(&self, a_id: i64, b_id: i64) -> Result<u64> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE a_id = ?1 AND b_id = ?2",
                [a_id, b_id],
                |row| row.get(0),
            )?;
            Ok(count as u64)
        })
    }
}

fn query_recent_messages(conn: &Connection, a_id: i64, b_id: i64, limit: u32) -> Result<Vec<MessageRow>> {
    // Newest first so LIMIT keeps the tail of the conversation; ts is the
    // authoritative order, the row id only breaks ties.
    let mut stmt = conn.prepare(
        "SELECT id, a_id, b_id, from_id, to_id, text, ts
         FROM messages
         WHERE a_id = ?1 AND b_id = ?2
         ORDER BY ts DESC, id DESC
         LIMIT ?3",
    )?;

    let mut rows = stmt
        .query_map(rusqlite::params![a_id, b_id, limit], |row| {
            Ok(MessageRow {
                id: row.get(0)?,
                a_id: row.get(1)?,
                b_id: row.get(2)?,
                from_id: row.get(3)?,
                to_id: row.get(4)?,
                text: row.get(5)?,
                ts: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.reverse();
    Ok(rows)
}
