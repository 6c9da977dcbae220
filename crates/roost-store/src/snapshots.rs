use roost_core::UserId;
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{NewSnapshot, SnapshotRecord, StoreError};

const SNAPSHOT_COLUMNS: &str = "id, user_id, user_name, model_info, content, create_time";

pub(crate) fn insert(conn: &Connection, snapshot: &NewSnapshot) -> Result<i64, StoreError> {
    conn.execute(
        r#"
        INSERT INTO recommendations (user_id, user_name, model_info, content, create_time)
        VALUES (?1, ?2, ?3, ?4, ?5)
        "#,
        params![
            snapshot.user_id,
            snapshot.user_name,
            snapshot.model_info,
            snapshot.content,
            snapshot.create_time,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

/// Newest snapshot by creation time; rows inserted in the same
/// millisecond resolve to the later insert.
pub(crate) fn latest_for_user(
    conn: &Connection,
    user_id: UserId,
) -> Result<Option<SnapshotRecord>, StoreError> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM recommendations WHERE user_id = ?1 \
         ORDER BY create_time DESC, id DESC LIMIT 1"
    );
    let record = conn
        .query_row(&sql, params![user_id], snapshot_from_row)
        .optional()?;
    Ok(record)
}

pub(crate) fn get(conn: &Connection, snapshot_id: i64) -> Result<Option<SnapshotRecord>, StoreError> {
    let sql = format!("SELECT {SNAPSHOT_COLUMNS} FROM recommendations WHERE id = ?1");
    let record = conn
        .query_row(&sql, params![snapshot_id], snapshot_from_row)
        .optional()?;
    Ok(record)
}

pub(crate) fn list(
    conn: &Connection,
    user_id: Option<UserId>,
    limit: u32,
) -> Result<Vec<SnapshotRecord>, StoreError> {
    let sql = format!(
        "SELECT {SNAPSHOT_COLUMNS} FROM recommendations \
         WHERE (?1 IS NULL OR user_id = ?1) \
         ORDER BY create_time DESC, id DESC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, i64::from(limit)], snapshot_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn delete(conn: &Connection, snapshot_id: i64) -> Result<usize, StoreError> {
    Ok(conn.execute(
        "DELETE FROM recommendations WHERE id = ?1",
        params![snapshot_id],
    )?)
}

fn snapshot_from_row(row: &Row<'_>) -> rusqlite::Result<SnapshotRecord> {
    Ok(SnapshotRecord {
        id: row.get(0)?,
        user_id: row.get(1)?,
        user_name: row.get(2)?,
        model_info: row.get(3)?,
        content: row.get(4)?,
        create_time: row.get(5)?,
    })
}
