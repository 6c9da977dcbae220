use roost_core::{Listing, ListingCandidate};
use rusqlite::{Connection, OptionalExtension, Row, params};

use crate::StoreError;

const LISTING_COLUMNS: &str = "house_id, title, community, city, town, house_type, orientation, \
     tags, total_price, floor_area, unit_price, floor_type, cover_image, created_at";
const CANDIDATE_COLUMNS: &str = "house_id, town, house_type, orientation, tags";

#[derive(Debug, Clone, Copy)]
pub(crate) enum Column {
    Town,
    HouseType,
    Orientation,
}

impl Column {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Town => "town",
            Self::HouseType => "house_type",
            Self::Orientation => "orientation",
        }
    }
}

pub(crate) fn upsert(conn: &Connection, listing: &Listing) -> Result<(), StoreError> {
    conn.execute(
        r#"
        INSERT INTO listings (
            house_id, title, community, city, town, house_type, orientation,
            tags, total_price, floor_area, unit_price, floor_type, cover_image, created_at
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)
        ON CONFLICT(house_id) DO UPDATE SET
            title = excluded.title,
            community = excluded.community,
            city = excluded.city,
            town = excluded.town,
            house_type = excluded.house_type,
            orientation = excluded.orientation,
            tags = excluded.tags,
            total_price = excluded.total_price,
            floor_area = excluded.floor_area,
            unit_price = excluded.unit_price,
            floor_type = excluded.floor_type,
            cover_image = excluded.cover_image,
            created_at = excluded.created_at
        "#,
        params![
            listing.house_id,
            listing.title,
            listing.community,
            listing.city,
            listing.town,
            listing.house_type,
            listing.orientation,
            listing.tags,
            listing.total_price,
            listing.floor_area,
            listing.unit_price,
            listing.floor_type,
            listing.cover_image,
            listing.created_at,
        ],
    )?;

    Ok(())
}

pub(crate) fn get(conn: &Connection, house_id: &str) -> Result<Option<Listing>, StoreError> {
    let sql = format!("SELECT {LISTING_COLUMNS} FROM listings WHERE house_id = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let listing = stmt
        .query_row(params![house_id.trim()], listing_from_row)
        .optional()?;
    Ok(listing)
}

pub(crate) fn list(conn: &Connection, limit: u32) -> Result<Vec<Listing>, StoreError> {
    let sql = format!(
        "SELECT {LISTING_COLUMNS} FROM listings ORDER BY created_at DESC, house_id ASC LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![i64::from(limit)], listing_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn delete(conn: &Connection, house_ids: &[String]) -> Result<usize, StoreError> {
    let mut deleted = 0;
    for house_id in house_ids {
        deleted += conn.execute(
            "DELETE FROM listings WHERE house_id = ?1",
            params![house_id.trim()],
        )?;
    }
    Ok(deleted)
}

pub(crate) fn find_by_column(
    conn: &Connection,
    column: Column,
    value: &str,
    limit: u32,
) -> Result<Vec<ListingCandidate>, StoreError> {
    let value = value.trim();
    if value.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {CANDIDATE_COLUMNS} FROM listings WHERE {} = ?1 \
         ORDER BY created_at DESC, house_id ASC LIMIT ?2",
        column.as_sql()
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![value, i64::from(limit)], candidate_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn find_by_tag_fuzzy(
    conn: &Connection,
    tag: &str,
    limit: u32,
) -> Result<Vec<ListingCandidate>, StoreError> {
    let tag = tag.trim();
    if tag.is_empty() || limit == 0 {
        return Ok(Vec::new());
    }

    let pattern = format!("%{}%", escape_like(tag));
    let sql = format!(
        "SELECT {CANDIDATE_COLUMNS} FROM listings WHERE tags LIKE ?1 ESCAPE '\\' \
         ORDER BY created_at DESC, house_id ASC LIMIT ?2"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![pattern, i64::from(limit)], candidate_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn find_recent(conn: &Connection, limit: u32) -> Result<Vec<ListingCandidate>, StoreError> {
    if limit == 0 {
        return Ok(Vec::new());
    }

    let sql = format!(
        "SELECT {CANDIDATE_COLUMNS} FROM listings ORDER BY created_at DESC, rowid DESC LIMIT ?1"
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params![i64::from(limit)], candidate_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn listing_from_row(row: &Row<'_>) -> rusqlite::Result<Listing> {
    Ok(Listing {
        house_id: row.get(0)?,
        title: row.get(1)?,
        community: row.get(2)?,
        city: row.get(3)?,
        town: row.get(4)?,
        house_type: row.get(5)?,
        orientation: row.get(6)?,
        tags: row.get(7)?,
        total_price: row.get(8)?,
        floor_area: row.get(9)?,
        unit_price: row.get(10)?,
        floor_type: row.get(11)?,
        cover_image: row.get(12)?,
        created_at: row.get(13)?,
    })
}

fn candidate_from_row(row: &Row<'_>) -> rusqlite::Result<ListingCandidate> {
    Ok(ListingCandidate {
        house_id: row.get(0)?,
        town: row.get(1)?,
        house_type: row.get(2)?,
        orientation: row.get(3)?,
        tags: row.get(4)?,
    })
}
