use roost_core::{BehaviorEvent, BehaviorKind, UserId};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::{NewBehavior, StoreError};

const EVENT_COLUMNS: &str = "house_id, town, house_type, orientation, tags, score, create_time";

fn table(kind: BehaviorKind) -> &'static str {
    match kind {
        BehaviorKind::View => "views",
        BehaviorKind::Like => "likes",
    }
}

pub(crate) fn insert(
    conn: &Connection,
    kind: BehaviorKind,
    record: &NewBehavior,
) -> Result<i64, StoreError> {
    let sql = format!(
        "INSERT INTO {} (user_id, user_name, house_id, house_title, town, house_type, \
         orientation, tags, score, create_time) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        table(kind)
    );
    conn.execute(
        &sql,
        params![
            record.user_id,
            record.user_name,
            record.house_id,
            record.house_title,
            record.town,
            record.house_type,
            record.orientation,
            record.tags,
            record.score,
            record.create_time,
        ],
    )?;

    Ok(conn.last_insert_rowid())
}

pub(crate) fn delete(conn: &Connection, kind: BehaviorKind, id: i64) -> Result<usize, StoreError> {
    let sql = format!("DELETE FROM {} WHERE id = ?1", table(kind));
    Ok(conn.execute(&sql, params![id])?)
}

pub(crate) fn find_id(
    conn: &Connection,
    kind: BehaviorKind,
    user_id: UserId,
    house_id: &str,
    window: Option<(i64, i64)>,
) -> Result<Option<i64>, StoreError> {
    let (start_ms, end_ms) = window.unwrap_or((i64::MIN, i64::MAX));
    let sql = format!(
        "SELECT id FROM {} WHERE user_id = ?1 AND house_id = ?2 \
         AND create_time >= ?3 AND create_time < ?4 \
         ORDER BY create_time DESC, id DESC LIMIT 1",
        table(kind)
    );
    let id = conn
        .query_row(&sql, params![user_id, house_id, start_ms, end_ms], |row| {
            row.get(0)
        })
        .optional()?;
    Ok(id)
}

pub(crate) fn recent(
    conn: &Connection,
    kind: BehaviorKind,
    user_id: UserId,
    limit: u32,
) -> Result<Vec<BehaviorEvent>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM {} WHERE user_id = ?1 \
         ORDER BY create_time DESC, id DESC LIMIT ?2",
        table(kind)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, i64::from(limit)], |row| {
        event_from_row(row, kind)
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn after(
    conn: &Connection,
    kind: BehaviorKind,
    user_id: UserId,
    after_ms: i64,
) -> Result<Vec<BehaviorEvent>, StoreError> {
    let sql = format!(
        "SELECT {EVENT_COLUMNS} FROM {} WHERE user_id = ?1 AND create_time > ?2 \
         ORDER BY create_time DESC, id DESC",
        table(kind)
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![user_id, after_ms], |row| event_from_row(row, kind))?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn event_from_row(row: &Row<'_>, kind: BehaviorKind) -> rusqlite::Result<BehaviorEvent> {
    Ok(BehaviorEvent {
        house_id: row.get(0)?,
        town: row.get(1)?,
        house_type: row.get(2)?,
        orientation: row.get(3)?,
        tags: row.get(4)?,
        score: row.get(5)?,
        create_time: row.get(6)?,
        behavior_type: kind,
    })
}
