use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use roost_core::{BehaviorEvent, BehaviorKind, Listing, ListingCandidate, UserId};
use rusqlite::Connection;
use thiserror::Error;

mod behaviors;
mod listings;
mod snapshots;
mod statistics;

pub const DATABASE_FILE_NAME: &str = "roost.sqlite";

/// A view or like about to be persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewBehavior {
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub house_id: String,
    pub house_title: Option<String>,
    pub town: Option<String>,
    pub house_type: Option<String>,
    pub orientation: Option<String>,
    pub tags: Option<String>,
    pub score: Option<f64>,
    pub create_time: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewSnapshot {
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub model_info: String,
    pub content: String,
    pub create_time: Option<i64>,
}

/// A persisted recommendation snapshot. Text columns are returned raw;
/// callers decide whether the JSON inside is usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRecord {
    pub id: i64,
    pub user_id: UserId,
    pub user_name: Option<String>,
    pub model_info: Option<String>,
    pub content: Option<String>,
    pub create_time: Option<i64>,
}

/// Optional narrowing applied to listing statistics. `tag` matches as a
/// substring of the tag field; the rest match exactly.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListingFilter {
    pub town: Option<String>,
    pub community: Option<String>,
    pub house_type: Option<String>,
    pub orientation: Option<String>,
    pub tag: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupColumn {
    Orientation,
    Town,
    Tags,
    HouseType,
    FloorType,
    Community,
}

/// Listing count and unit-price spread of one group.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupStatistics {
    pub name: Option<String>,
    pub count: u64,
    pub avg_unit_price: Option<f64>,
    pub max_unit_price: Option<f64>,
    pub min_unit_price: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PriceCount {
    pub unit_price: f64,
    pub count: u64,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Persistence for listings, user behavior, and recommendation snapshots.
///
/// Listing queries return candidates in catalogue order and never
/// deduplicate across calls; that is the caller's concern.
pub trait Store {
    fn upsert_listing(&self, listing: &Listing) -> Result<(), StoreError>;
    fn find_listing_by_id(&self, house_id: &str) -> Result<Option<Listing>, StoreError>;
    fn list_listings(&self, limit: u32) -> Result<Vec<Listing>, StoreError>;
    fn delete_listings(&self, house_ids: &[String]) -> Result<usize, StoreError>;

    fn find_listings_by_town(
        &self,
        town: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError>;
    fn find_listings_by_house_type(
        &self,
        house_type: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError>;
    fn find_listings_by_orientation(
        &self,
        orientation: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError>;
    fn find_listings_by_tag_fuzzy(
        &self,
        tag: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError>;
    fn find_recent_listings(&self, limit: u32) -> Result<Vec<ListingCandidate>, StoreError>;

    /// Groups are ordered by listing count, largest first.
    fn group_listing_statistics(
        &self,
        column: GroupColumn,
        filter: &ListingFilter,
        limit: Option<u32>,
    ) -> Result<Vec<GroupStatistics>, StoreError>;
    fn count_listings_by_unit_price(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<PriceCount>, StoreError>;

    fn insert_view(&self, view: &NewBehavior) -> Result<i64, StoreError>;
    fn insert_like(&self, like: &NewBehavior) -> Result<i64, StoreError>;
    fn delete_like(&self, like_id: i64) -> Result<usize, StoreError>;
    fn find_like_id(&self, user_id: UserId, house_id: &str) -> Result<Option<i64>, StoreError>;
    fn find_view_id_between(
        &self,
        user_id: UserId,
        house_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Option<i64>, StoreError>;

    fn find_recent_views(&self, user_id: UserId, limit: u32)
    -> Result<Vec<BehaviorEvent>, StoreError>;
    fn find_recent_likes(&self, user_id: UserId, limit: u32)
    -> Result<Vec<BehaviorEvent>, StoreError>;
    fn find_views_after(
        &self,
        user_id: UserId,
        after_ms: i64,
    ) -> Result<Vec<BehaviorEvent>, StoreError>;
    fn find_likes_after(
        &self,
        user_id: UserId,
        after_ms: i64,
    ) -> Result<Vec<BehaviorEvent>, StoreError>;

    fn insert_snapshot(&self, snapshot: &NewSnapshot) -> Result<i64, StoreError>;
    fn find_latest_snapshot(&self, user_id: UserId) -> Result<Option<SnapshotRecord>, StoreError>;
    fn get_snapshot(&self, snapshot_id: i64) -> Result<Option<SnapshotRecord>, StoreError>;
    fn list_snapshots(
        &self,
        user_id: Option<UserId>,
        limit: u32,
    ) -> Result<Vec<SnapshotRecord>, StoreError>;
    fn delete_snapshot(&self, snapshot_id: i64) -> Result<usize, StoreError>;

    fn delete_snapshots(&self, snapshot_ids: &[i64]) -> Result<usize, StoreError> {
        let mut deleted = 0;
        for snapshot_id in snapshot_ids {
            deleted += self.delete_snapshot(*snapshot_id)?;
        }
        Ok(deleted)
    }
}

pub struct SqliteStore {
    conn: Connection,
    roost_dir: PathBuf,
}

impl SqliteStore {
    pub fn open(workspace_root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let roost_dir = workspace_root.as_ref().join(".roost");
        let sqlite_path = roost_dir.join(DATABASE_FILE_NAME);

        fs::create_dir_all(&roost_dir)?;

        let conn = Connection::open(&sqlite_path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.busy_timeout(Duration::from_secs(5))?;
        run_migrations(&conn)?;
        tracing::debug!(path = %sqlite_path.display(), "opened listing store");

        Ok(Self { conn, roost_dir })
    }

    pub fn roost_dir(&self) -> &Path {
        &self.roost_dir
    }
}

impl Store for SqliteStore {
    fn upsert_listing(&self, listing: &Listing) -> Result<(), StoreError> {
        listings::upsert(&self.conn, listing)
    }

    fn find_listing_by_id(&self, house_id: &str) -> Result<Option<Listing>, StoreError> {
        listings::get(&self.conn, house_id)
    }

    fn list_listings(&self, limit: u32) -> Result<Vec<Listing>, StoreError> {
        listings::list(&self.conn, limit)
    }

    fn delete_listings(&self, house_ids: &[String]) -> Result<usize, StoreError> {
        listings::delete(&self.conn, house_ids)
    }

    fn find_listings_by_town(
        &self,
        town: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError> {
        listings::find_by_column(&self.conn, listings::Column::Town, town, limit)
    }

    fn find_listings_by_house_type(
        &self,
        house_type: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError> {
        listings::find_by_column(&self.conn, listings::Column::HouseType, house_type, limit)
    }

    fn find_listings_by_orientation(
        &self,
        orientation: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError> {
        listings::find_by_column(&self.conn, listings::Column::Orientation, orientation, limit)
    }

    fn find_listings_by_tag_fuzzy(
        &self,
        tag: &str,
        limit: u32,
    ) -> Result<Vec<ListingCandidate>, StoreError> {
        listings::find_by_tag_fuzzy(&self.conn, tag, limit)
    }

    fn find_recent_listings(&self, limit: u32) -> Result<Vec<ListingCandidate>, StoreError> {
        listings::find_recent(&self.conn, limit)
    }

    fn group_listing_statistics(
        &self,
        column: GroupColumn,
        filter: &ListingFilter,
        limit: Option<u32>,
    ) -> Result<Vec<GroupStatistics>, StoreError> {
        statistics::group_by(&self.conn, column, filter, limit)
    }

    fn count_listings_by_unit_price(
        &self,
        filter: &ListingFilter,
    ) -> Result<Vec<PriceCount>, StoreError> {
        statistics::price_counts(&self.conn, filter)
    }

    fn insert_view(&self, view: &NewBehavior) -> Result<i64, StoreError> {
        behaviors::insert(&self.conn, BehaviorKind::View, view)
    }

    fn insert_like(&self, like: &NewBehavior) -> Result<i64, StoreError> {
        behaviors::insert(&self.conn, BehaviorKind::Like, like)
    }

    fn delete_like(&self, like_id: i64) -> Result<usize, StoreError> {
        behaviors::delete(&self.conn, BehaviorKind::Like, like_id)
    }

    fn find_like_id(&self, user_id: UserId, house_id: &str) -> Result<Option<i64>, StoreError> {
        behaviors::find_id(&self.conn, BehaviorKind::Like, user_id, house_id, None)
    }

    fn find_view_id_between(
        &self,
        user_id: UserId,
        house_id: &str,
        start_ms: i64,
        end_ms: i64,
    ) -> Result<Option<i64>, StoreError> {
        behaviors::find_id(
            &self.conn,
            BehaviorKind::View,
            user_id,
            house_id,
            Some((start_ms, end_ms)),
        )
    }

    fn find_recent_views(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        behaviors::recent(&self.conn, BehaviorKind::View, user_id, limit)
    }

    fn find_recent_likes(
        &self,
        user_id: UserId,
        limit: u32,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        behaviors::recent(&self.conn, BehaviorKind::Like, user_id, limit)
    }

    fn find_views_after(
        &self,
        user_id: UserId,
        after_ms: i64,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        behaviors::after(&self.conn, BehaviorKind::View, user_id, after_ms)
    }

    fn find_likes_after(
        &self,
        user_id: UserId,
        after_ms: i64,
    ) -> Result<Vec<BehaviorEvent>, StoreError> {
        behaviors::after(&self.conn, BehaviorKind::Like, user_id, after_ms)
    }

    fn insert_snapshot(&self, snapshot: &NewSnapshot) -> Result<i64, StoreError> {
        snapshots::insert(&self.conn, snapshot)
    }

    fn find_latest_snapshot(&self, user_id: UserId) -> Result<Option<SnapshotRecord>, StoreError> {
        snapshots::latest_for_user(&self.conn, user_id)
    }

    fn get_snapshot(&self, snapshot_id: i64) -> Result<Option<SnapshotRecord>, StoreError> {
        snapshots::get(&self.conn, snapshot_id)
    }

    fn list_snapshots(
        &self,
        user_id: Option<UserId>,
        limit: u32,
    ) -> Result<Vec<SnapshotRecord>, StoreError> {
        snapshots::list(&self.conn, user_id, limit)
    }

    fn delete_snapshot(&self, snapshot_id: i64) -> Result<usize, StoreError> {
        snapshots::delete(&self.conn, snapshot_id)
    }
}

fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS listings (
            house_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            community TEXT,
            city TEXT,
            town TEXT,
            house_type TEXT,
            orientation TEXT,
            tags TEXT,
            total_price REAL,
            floor_area REAL,
            unit_price REAL,
            floor_type TEXT,
            cover_image TEXT,
            created_at INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_listings_created_at ON listings(created_at);
        CREATE INDEX IF NOT EXISTS idx_listings_town ON listings(town);
        CREATE INDEX IF NOT EXISTS idx_listings_house_type ON listings(house_type);
        CREATE INDEX IF NOT EXISTS idx_listings_orientation ON listings(orientation);
        CREATE INDEX IF NOT EXISTS idx_listings_community ON listings(community);

        CREATE TABLE IF NOT EXISTS views (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            user_name TEXT,
            house_id TEXT NOT NULL,
            house_title TEXT,
            town TEXT,
            house_type TEXT,
            orientation TEXT,
            tags TEXT,
            score REAL,
            create_time INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_views_user_time ON views(user_id, create_time);

        CREATE TABLE IF NOT EXISTS likes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            user_name TEXT,
            house_id TEXT NOT NULL,
            house_title TEXT,
            town TEXT,
            house_type TEXT,
            orientation TEXT,
            tags TEXT,
            score REAL,
            create_time INTEGER NOT NULL
        );
        CREATE INDEX IF NOT EXISTS idx_likes_user_time ON likes(user_id, create_time);

        CREATE TABLE IF NOT EXISTS recommendations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id INTEGER NOT NULL,
            user_name TEXT,
            model_info TEXT,
            content TEXT,
            create_time INTEGER
        );
        CREATE INDEX IF NOT EXISTS idx_recommendations_user_time
            ON recommendations(user_id, create_time);
        "#,
    )?;

    Ok(())
}


#[cfg(test)]
mod tests {
    use super::test_support::{listing, open_temp_store};
    use super::*;

    #[test]
    fn store_creates_layout_and_survives_reopen() {
        let temp = tempfile::tempdir().expect("tempdir");
        let workspace = temp.path();

        let store = SqliteStore::open(workspace).expect("open store");
        assert!(store.roost_dir().join(DATABASE_FILE_NAME).exists());
        store
            .upsert_listing(&listing("h-1", 1_700_000_000_000))
            .expect("upsert listing");
        drop(store);

        let reopened = SqliteStore::open(workspace).expect("reopen store");
        let loaded = reopened
            .find_listing_by_id("h-1")
            .expect("load listing")
            .expect("listing exists");
        assert_eq!(loaded, listing("h-1", 1_700_000_000_000));
    }

    #[test]
    fn delete_snapshots_counts_removed_rows() {
        let (_temp, store) = open_temp_store();
        let first = store
            .insert_snapshot(&NewSnapshot {
                user_id: 1,
                user_name: None,
                model_info: "{}".to_owned(),
                content: "[\"h-1\"]".to_owned(),
                create_time: Some(10),
            })
            .expect("insert first");
        let second = store
            .insert_snapshot(&NewSnapshot {
                user_id: 1,
                user_name: None,
                model_info: "{}".to_owned(),
                content: "[\"h-2\"]".to_owned(),
                create_time: Some(20),
            })
            .expect("insert second");

        let deleted = store
            .delete_snapshots(&[first, second, 999])
            .expect("delete snapshots");
        assert_eq!(deleted, 2);
        assert!(store.find_latest_snapshot(1).expect("latest").is_none());
    }
}
