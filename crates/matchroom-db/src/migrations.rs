use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL);")?;

    let version: i64 = conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |r| r.get(0),
    )?;

    if version < 1 {
        info!("Running migration v1 (direct messages)");
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS messages (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                a_id        INTEGER NOT NULL,
                b_id        INTEGER NOT NULL,
                from_id     INTEGER NOT NULL,
                to_id       INTEGER NOT NULL,
                text        TEXT NOT NULL,
                ts          INTEGER NOT NULL,
                CHECK (a_id < b_id),
                CHECK (from_id <> to_id)
            );

            CREATE INDEX IF NOT EXISTS idx_messages_pair
                ON messages(a_id, b_id, ts);

            INSERT INTO schema_version (version) VALUES (1);
            ",
        )?;
    }

    info!("Database migrations complete");
    Ok(())
}
