use roost_core::non_empty;
use rusqlite::{Connection, Row, params_from_iter};

use crate::listings::escape_like;
use crate::{GroupColumn, GroupStatistics, ListingFilter, PriceCount, StoreError};

impl GroupColumn {
    fn as_sql(self) -> &'static str {
        match self {
            Self::Orientation => "orientation",
            Self::Town => "town",
            Self::Tags => "tags",
            Self::HouseType => "house_type",
            Self::FloorType => "floor_type",
            Self::Community => "community",
        }
    }

    /// Orientation and town keep a null group; the rest drop unset rows.
    fn skips_null(self) -> bool {
        !matches!(self, Self::Orientation | Self::Town)
    }
}

pub(crate) fn group_by(
    conn: &Connection,
    column: GroupColumn,
    filter: &ListingFilter,
    limit: Option<u32>,
) -> Result<Vec<GroupStatistics>, StoreError> {
    let (mut conditions, values) = filter_conditions(filter);
    if column.skips_null() {
        conditions.push(format!("{} IS NOT NULL", column.as_sql()));
    }

    let mut sql = format!(
        "SELECT {} AS name, COUNT(*) AS value, AVG(unit_price), MAX(unit_price), MIN(unit_price) \
         FROM listings",
        column.as_sql()
    );
    push_where(&mut sql, &conditions);
    sql.push_str(" GROUP BY name ORDER BY value DESC, name ASC");
    if let Some(limit) = limit {
        sql.push_str(&format!(" LIMIT {limit}"));
    }

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), group_from_row)?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

pub(crate) fn price_counts(
    conn: &Connection,
    filter: &ListingFilter,
) -> Result<Vec<PriceCount>, StoreError> {
    let (mut conditions, values) = filter_conditions(filter);
    conditions.push("unit_price IS NOT NULL".to_owned());

    let mut sql = "SELECT unit_price, COUNT(*) FROM listings".to_owned();
    push_where(&mut sql, &conditions);
    sql.push_str(" GROUP BY unit_price ORDER BY unit_price ASC");

    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(params_from_iter(values.iter()), |row| {
        Ok(PriceCount {
            unit_price: row.get(0)?,
            count: count_from(row, 1)?,
        })
    })?;
    rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
}

fn filter_conditions(filter: &ListingFilter) -> (Vec<String>, Vec<String>) {
    let mut conditions = Vec::new();
    let mut values = Vec::new();

    let exact = [
        ("town", filter.town.as_deref()),
        ("community", filter.community.as_deref()),
        ("house_type", filter.house_type.as_deref()),
        ("orientation", filter.orientation.as_deref()),
    ];
    for (column, value) in exact {
        if let Some(value) = non_empty(value) {
            values.push(value.to_owned());
            conditions.push(format!("{column} = ?{}", values.len()));
        }
    }
    if let Some(tag) = non_empty(filter.tag.as_deref()) {
        values.push(format!("%{}%", escape_like(tag)));
        conditions.push(format!("tags LIKE ?{} ESCAPE '\\'", values.len()));
    }

    (conditions, values)
}

fn push_where(sql: &mut String, conditions: &[String]) {
    if !conditions.is_empty() {
        sql.push_str(" WHERE ");
        sql.push_str(&conditions.join(" AND "));
    }
}

fn group_from_row(row: &Row<'_>) -> rusqlite::Result<GroupStatistics> {
    Ok(GroupStatistics {
        name: row.get(0)?,
        count: count_from(row, 1)?,
        avg_unit_price: row.get(2)?,
        max_unit_price: row.get(3)?,
        min_unit_price: row.get(4)?,
    })
}

fn count_from(row: &Row<'_>, index: usize) -> rusqlite::Result<u64> {
    Ok(row.get::<_, i64>(index)?.max(0) as u64)
}
