use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use tracing::{debug, info, warn};

use crate::airspace::{AirspaceRecord, AirspaceRow};
use crate::error::AirspaceError;
use crate::geometry_codec::Bounds;
use crate::viewport::{self, Geometry, SELECT_COLUMNS as SELECT_ROW, ViewportParams};

/// Bumped whenever the schema changes. A mismatch on open deletes and
/// recreates the file (pre-release policy).
pub const SCHEMA_VERSION: i32 = 3;

/// Size ceiling that triggers eviction of least-recently-accessed rows.
pub const MAX_DB_SIZE_BYTES: u64 = 100 * 1024 * 1024;
/// Eviction stops once the live data shrinks below this.
pub const TARGET_DB_SIZE_BYTES: u64 = 80 * 1024 * 1024;
const EVICTION_BATCH: usize = 50;

/// Geometries older than this are dropped by `clean_expired`.
const GEOMETRY_TTL_MS: i64 = 7 * 24 * 60 * 60 * 1000;
/// Legacy tile metadata expires much faster.
const TILE_TTL_MS: i64 = 24 * 60 * 60 * 1000;

const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS airspaces (
    id TEXT PRIMARY KEY NOT NULL,
    name TEXT NOT NULL DEFAULT '',
    type_code INTEGER NOT NULL DEFAULT 0,
    icao_class INTEGER,
    country TEXT,
    activity INTEGER,
    lower_raw_value TEXT,
    lower_raw_unit INTEGER,
    lower_raw_reference INTEGER,
    upper_raw_value TEXT,
    upper_raw_unit INTEGER,
    upper_raw_reference INTEGER,
    lower_altitude_ft INTEGER NOT NULL DEFAULT 999999,
    upper_altitude_ft INTEGER NOT NULL DEFAULT 999999,
    bounds_west REAL NOT NULL,
    bounds_south REAL NOT NULL,
    bounds_east REAL NOT NULL,
    bounds_north REAL NOT NULL,
    coords BLOB NOT NULL,
    offsets BLOB NOT NULL,
    geometry_hash TEXT NOT NULL,
    extra_properties TEXT,
    fetch_time INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_airspaces_spatial
    ON airspaces (lower_altitude_ft, bounds_west, bounds_east, bounds_south, bounds_north);
CREATE INDEX IF NOT EXISTS idx_airspaces_west ON airspaces (bounds_west);
CREATE INDEX IF NOT EXISTS idx_airspaces_east ON airspaces (bounds_east);
CREATE INDEX IF NOT EXISTS idx_airspaces_south ON airspaces (bounds_south);
CREATE INDEX IF NOT EXISTS idx_airspaces_north ON airspaces (bounds_north);
CREATE INDEX IF NOT EXISTS idx_airspaces_type ON airspaces (type_code);
CREATE INDEX IF NOT EXISTS idx_airspaces_class ON airspaces (icao_class);
CREATE INDEX IF NOT EXISTS idx_airspaces_country ON airspaces (country);
CREATE INDEX IF NOT EXISTS idx_airspaces_fetch_time ON airspaces (fetch_time);
CREATE INDEX IF NOT EXISTS idx_airspaces_filter
    ON airspaces (lower_altitude_ft, type_code, icao_class);
CREATE INDEX IF NOT EXISTS idx_airspaces_last_accessed ON airspaces (last_accessed);

CREATE TABLE IF NOT EXISTS countries (
    country_code TEXT PRIMARY KEY NOT NULL,
    airspace_count INTEGER NOT NULL DEFAULT 0,
    fetch_time INTEGER NOT NULL,
    etag TEXT,
    last_modified TEXT,
    size_bytes INTEGER,
    last_accessed INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS country_airspaces (
    country_code TEXT NOT NULL REFERENCES countries(country_code) ON DELETE CASCADE,
    airspace_id TEXT NOT NULL REFERENCES airspaces(id) ON DELETE CASCADE,
    PRIMARY KEY (country_code, airspace_id)
);
CREATE INDEX IF NOT EXISTS idx_country_airspaces_airspace
    ON country_airspaces (airspace_id);

CREATE TABLE IF NOT EXISTS tile_metadata (
    tile_key TEXT PRIMARY KEY NOT NULL,
    fetch_time INTEGER NOT NULL,
    size_bytes INTEGER
);
";

pub(crate) fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Aggregate numbers for the statistics surface.
#[derive(Debug, Clone, Default)]
pub struct StoreStatistics {
    pub total_geometries: i64,
    pub blob_bytes: i64,
    pub point_count: i64,
    pub db_file_bytes: u64,
    pub last_updated: Option<i64>,
    pub lookups: u64,
    pub lookup_hits: u64,
}

pub(crate) struct StoreInner {
    path: PathBuf,
    conn: Mutex<Option<Connection>>,
    max_bytes: u64,
    target_bytes: u64,
    lookups: AtomicU64,
    lookup_hits: AtomicU64,
}

/// Process-wide embedded store for airspace geometry.
///
/// The SQLite connection is opened lazily on first use and serializes all
/// access behind a mutex: a single writer, snapshot-consistent reads.
/// Every public operation is async and runs its blocking core on the
/// blocking pool.
#[derive(Clone)]
pub struct GeometryStore {
    inner: Arc<StoreInner>,
}

impl GeometryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_size_limits(path, MAX_DB_SIZE_BYTES, TARGET_DB_SIZE_BYTES)
    }

    /// Test seam: same store with a smaller eviction ceiling.
    pub fn with_size_limits(path: impl Into<PathBuf>, max_bytes: u64, target_bytes: u64) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path: path.into(),
                conn: Mutex::new(None),
                max_bytes,
                target_bytes,
                lookups: AtomicU64::new(0),
                lookup_hits: AtomicU64::new(0),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Run `f` with the open connection on the blocking pool.
    pub(crate) async fn with_conn<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.with_conn(f)).await?
    }

    /// Upsert a single geometry by id.
    pub async fn put(&self, record: AirspaceRecord) -> Result<()> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            inner.enforce_size_limit_blocking()?;
            inner.with_conn(move |conn| {
                upsert_record(conn, &record, now_ms())?;
                Ok(())
            })
        })
        .await?
    }

    /// Upsert a batch in one transaction. No partial commits: any failure
    /// rolls the whole batch back.
    pub async fn put_batch(&self, records: Vec<AirspaceRecord>) -> Result<usize> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            inner.enforce_size_limit_blocking()?;
            let started = Instant::now();
            let count = records.len();
            inner.with_conn(move |conn| {
                let now = now_ms();
                let tx = conn.transaction().context("begin batch transaction")?;
                for record in &records {
                    upsert_record(&tx, record, now)?;
                }
                tx.commit().context("commit batch transaction")?;
                Ok(())
            })?;
            info!(
                event = "BATCH_GEOMETRY_INSERT",
                count,
                elapsed_ms = started.elapsed().as_millis() as u64,
                "stored geometry batch"
            );
            Ok(count)
        })
        .await?
    }

    /// Which of `ids` are already present. Used by the ingestor to compute
    /// the new/updated delta before a batch insert.
    pub async fn existing_ids(&self, ids: Vec<String>) -> Result<HashSet<String>> {
        self.with_conn(move |conn| {
            let mut found = HashSet::with_capacity(ids.len());
            for chunk in ids.chunks(500) {
                let sql = format!(
                    "SELECT id FROM airspaces WHERE id IN ({})",
                    vec!["?"; chunk.len()].join(",")
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params_from_iter(chunk.iter()), |row| {
                    row.get::<_, String>(0)
                })?;
                for id in rows {
                    found.insert(id?);
                }
            }
            Ok(found)
        })
        .await
    }

    /// Fetch and decode one geometry, refreshing its access time.
    pub async fn get(&self, id: String) -> Result<Option<Geometry>> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            inner.lookups.fetch_add(1, Ordering::Relaxed);
            let hit = inner.with_conn(|conn| {
                let row = conn
                    .query_row(
                        &format!("{SELECT_ROW} WHERE a.id = ?"),
                        params![id],
                        map_airspace_row,
                    )
                    .optional()
                    .context("fetch airspace by id")?;
                if let Some(row) = &row {
                    conn.execute(
                        "UPDATE airspaces SET last_accessed = ? WHERE id = ?",
                        params![now_ms(), row.id],
                    )?;
                }
                Ok(row)
            })?;
            match hit {
                Some(row) => {
                    inner.lookup_hits.fetch_add(1, Ordering::Relaxed);
                    Ok(Some(viewport::decode_row(&row)?))
                }
                None => Ok(None),
            }
        })
        .await?
    }

    /// Fetch and decode many geometries; missing ids are simply absent from
    /// the result.
    pub async fn get_many(&self, ids: Vec<String>) -> Result<Vec<Geometry>> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let started = Instant::now();
            let requested = ids.len();
            inner.lookups.fetch_add(requested as u64, Ordering::Relaxed);
            let rows = inner.with_conn(move |conn| {
                let mut rows = Vec::with_capacity(ids.len());
                let now = now_ms();
                for chunk in ids.chunks(500) {
                    let marks = vec!["?"; chunk.len()].join(",");
                    let mut stmt =
                        conn.prepare_cached(&format!("{SELECT_ROW} WHERE a.id IN ({marks})"))?;
                    let mapped = stmt.query_map(params_from_iter(chunk.iter()), map_airspace_row)?;
                    for row in mapped {
                        match row {
                            Ok(row) => rows.push(row),
                            Err(err) => warn!(error = %err, "skipping unreadable airspace row"),
                        }
                    }
                    let mut touch: Vec<rusqlite::types::Value> =
                        vec![rusqlite::types::Value::Integer(now)];
                    touch.extend(
                        chunk
                            .iter()
                            .map(|id| rusqlite::types::Value::Text(id.clone())),
                    );
                    conn.execute(
                        &format!("UPDATE airspaces SET last_accessed = ? WHERE id IN ({marks})"),
                        params_from_iter(touch),
                    )?;
                }
                Ok(rows)
            })?;
            inner
                .lookup_hits
                .fetch_add(rows.len() as u64, Ordering::Relaxed);
            debug!(
                event = "BATCH_GEOMETRY_FETCH",
                requested,
                found = rows.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "fetched geometry batch"
            );
            Ok(viewport::decode_rows(rows))
        })
        .await?
    }

    /// Execute one viewport query: spatial intersection plus every optional
    /// filter in a single SQL statement, rows decoded into geometries.
    pub async fn query_viewport(&self, query: ViewportParams) -> Result<Vec<Geometry>> {
        if let Some(bounds) = &query.bounds {
            if bounds.west > bounds.east || bounds.south > bounds.north {
                return Err(AirspaceError::Protocol(format!(
                    "viewport not normalized (antimeridian crossing is unsupported): {bounds:?}"
                ))
                .into());
            }
        }
        self.with_conn(move |conn| {
            let started = Instant::now();
            let (sql, values) = viewport::build_query(&query);
            let mut stmt = conn.prepare_cached(&sql).context("prepare viewport query")?;
            let mapped = stmt.query_map(params_from_iter(values), map_airspace_row)?;
            let mut rows = Vec::new();
            for row in mapped {
                match row {
                    Ok(row) => rows.push(row),
                    Err(err) => warn!(error = %err, "skipping unreadable airspace row"),
                }
            }
            debug!(
                event = "SPATIAL_INDEX_QUERY",
                rows = rows.len(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "viewport query"
            );
            Ok(viewport::decode_rows(rows))
        })
        .await
    }

    /// Evict least-recently-accessed geometries while the database file
    /// exceeds the ceiling. Runs before inserts.
    pub async fn enforce_size_limit(&self) -> Result<usize> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || inner.enforce_size_limit_blocking()).await?
    }

    /// Drop geometries older than seven days and tile metadata older than
    /// a day; compacts the file if anything was removed.
    pub async fn clean_expired(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let now = now_ms();
            let geometries = conn.execute(
                "DELETE FROM airspaces WHERE fetch_time < ?",
                params![now - GEOMETRY_TTL_MS],
            )?;
            let tiles = conn.execute(
                "DELETE FROM tile_metadata WHERE fetch_time < ?",
                params![now - TILE_TTL_MS],
            )?;
            if geometries + tiles > 0 {
                conn.execute_batch("VACUUM")?;
                info!(geometries, tiles, "cleaned expired cache entries");
            }
            Ok(geometries + tiles)
        })
        .await
    }

    /// Legacy tile bookkeeping, kept for compatibility with older installs.
    pub async fn put_tile_metadata(&self, key: String, size_bytes: Option<i64>) -> Result<()> {
        self.with_conn(move |conn| {
            conn.execute(
                "INSERT INTO tile_metadata (tile_key, fetch_time, size_bytes) VALUES (?, ?, ?)
                 ON CONFLICT(tile_key) DO UPDATE SET
                     fetch_time = excluded.fetch_time,
                     size_bytes = excluded.size_bytes",
                params![key, now_ms(), size_bytes],
            )?;
            Ok(())
        })
        .await
    }

    /// Close the store and delete the database file plus journal sidecars.
    /// The next operation reopens a fresh file.
    pub async fn clear_all(&self) -> Result<()> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut slot = inner.lock_conn();
            *slot = None;
            delete_db_files(&inner.path)?;
            info!(path = %inner.path.display(), "cleared geometry store");
            Ok(())
        })
        .await?
    }

    /// Close the connection without touching the file.
    pub async fn close(&self) -> Result<()> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            *inner.lock_conn() = None;
            Ok(())
        })
        .await?
    }

    pub async fn statistics(&self) -> Result<StoreStatistics> {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let path = inner.path.clone();
            let lookups = inner.lookups.load(Ordering::Relaxed);
            let lookup_hits = inner.lookup_hits.load(Ordering::Relaxed);
            inner.with_conn(move |conn| {
                let (total_geometries, blob_bytes, point_count, last_updated) = conn.query_row(
                    "SELECT COUNT(*),
                            COALESCE(SUM(LENGTH(coords) + LENGTH(offsets)), 0),
                            COALESCE(SUM(LENGTH(coords)) / 8, 0),
                            MAX(fetch_time)
                     FROM airspaces",
                    [],
                    |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, i64>(1)?,
                            row.get::<_, i64>(2)?,
                            row.get::<_, Option<i64>>(3)?,
                        ))
                    },
                )?;
                let db_file_bytes = disk_usage(&path);
                Ok(StoreStatistics {
                    total_geometries,
                    blob_bytes,
                    point_count,
                    db_file_bytes,
                    last_updated,
                    lookups,
                    lookup_hits,
                })
            })
        })
        .await?
    }
}

impl StoreInner {
    fn lock_conn(&self) -> std::sync::MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut Connection) -> Result<T>) -> Result<T> {
        let mut slot = self.lock_conn();
        if slot.is_none() {
            *slot = Some(open_connection(&self.path)?);
        }
        match slot.as_mut() {
            Some(conn) => f(conn),
            None => Err(AirspaceError::Store("connection unavailable".into()).into()),
        }
    }

    fn enforce_size_limit_blocking(&self) -> Result<usize> {
        let file_bytes = disk_usage(&self.path);
        if file_bytes < self.max_bytes {
            return Ok(0);
        }
        let target = self.target_bytes;
        let deleted = self.with_conn(|conn| {
            let mut deleted = 0usize;
            loop {
                let changed = conn.execute(
                    "DELETE FROM airspaces WHERE id IN (
                         SELECT id FROM airspaces ORDER BY last_accessed ASC, id ASC LIMIT ?
                     )",
                    params![EVICTION_BATCH as i64],
                )?;
                deleted += changed;
                if changed == 0 || live_bytes(conn)? <= target {
                    break;
                }
            }
            conn.execute_batch("VACUUM")?;
            conn.query_row("PRAGMA wal_checkpoint(TRUNCATE)", [], |_| Ok(()))?;
            Ok(deleted)
        })?;
        let after = disk_usage(&self.path);
        warn!(
            before_bytes = file_bytes,
            after_bytes = after,
            deleted,
            "size limit enforcement evicted oldest geometries"
        );
        Ok(deleted)
    }
}

/// On-disk footprint: the database file plus its WAL journal sidecars.
/// Under WAL, fresh writes live in the `-wal` file until checkpointed, so
/// the main file alone understates usage.
pub(crate) fn disk_usage(path: &Path) -> u64 {
    ["", "-wal", "-shm"]
        .iter()
        .map(|suffix| {
            let mut os = path.as_os_str().to_os_string();
            os.push(suffix);
            std::fs::metadata(PathBuf::from(os))
                .map(|m| m.len())
                .unwrap_or(0)
        })
        .sum()
}

fn live_bytes(conn: &Connection) -> Result<u64> {
    let page_count: i64 = conn.query_row("PRAGMA page_count", [], |r| r.get(0))?;
    let freelist: i64 = conn.query_row("PRAGMA freelist_count", [], |r| r.get(0))?;
    let page_size: i64 = conn.query_row("PRAGMA page_size", [], |r| r.get(0))?;
    Ok(((page_count - freelist).max(0) as u64) * page_size as u64)
}

fn delete_db_files(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut os = path.as_os_str().to_os_string();
        os.push(suffix);
        match std::fs::remove_file(PathBuf::from(os)) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => {
                return Err(err).context(format!("delete {}{suffix}", path.display()));
            }
        }
    }
    Ok(())
}

fn open_connection(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create store directory {}", parent.display()))?;
    }

    let mut conn = open_raw(path)?;
    let version: i32 = conn.query_row("PRAGMA user_version", [], |r| r.get(0))?;
    if version != 0 && version != SCHEMA_VERSION {
        warn!(
            found = version,
            expected = SCHEMA_VERSION,
            "{}",
            AirspaceError::SchemaVersionMismatch {
                found: version,
                expected: SCHEMA_VERSION,
            }
        );
        drop(conn);
        delete_db_files(path)?;
        conn = open_raw(path)?;
    }

    conn.execute_batch(SCHEMA_SQL).context("create schema")?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    Ok(conn)
}

fn open_raw(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)
        .map_err(|err| AirspaceError::Store(format!("open {}: {err}", path.display())))?;
    // journal_mode returns the resulting mode as a row, so read it back
    // instead of using pragma_update.
    conn.query_row("PRAGMA journal_mode = WAL", [], |_| Ok(()))?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    Ok(conn)
}


pub(crate) fn map_airspace_row(row: &Row<'_>) -> rusqlite::Result<AirspaceRow> {
    Ok(AirspaceRow {
        id: row.get("id")?,
        name: row.get("name")?,
        type_code: row.get("type_code")?,
        icao_class: row.get("icao_class")?,
        country: row.get("country")?,
        activity: row.get("activity")?,
        lower_raw_value: row.get("lower_raw_value")?,
        lower_raw_unit: row.get("lower_raw_unit")?,
        lower_raw_reference: row.get("lower_raw_reference")?,
        upper_raw_value: row.get("upper_raw_value")?,
        upper_raw_unit: row.get("upper_raw_unit")?,
        upper_raw_reference: row.get("upper_raw_reference")?,
        lower_altitude_ft: row.get("lower_altitude_ft")?,
        upper_altitude_ft: row.get("upper_altitude_ft")?,
        bounds: Bounds::new(
            row.get("bounds_west")?,
            row.get("bounds_south")?,
            row.get("bounds_east")?,
            row.get("bounds_north")?,
        ),
        coords: row.get("coords")?,
        offsets: row.get("offsets")?,
        geometry_hash: row.get("geometry_hash")?,
        extra_properties: row.get("extra_properties")?,
        fetch_time: row.get("fetch_time")?,
        last_accessed: row.get("last_accessed")?,
    })
}

fn upsert_record(conn: &Connection, record: &AirspaceRecord, now: i64) -> Result<()> {
    conn.execute(
        "INSERT INTO airspaces (
             id, name, type_code, icao_class, country, activity,
             lower_raw_value, lower_raw_unit, lower_raw_reference,
             upper_raw_value, upper_raw_unit, upper_raw_reference,
             lower_altitude_ft, upper_altitude_ft,
             bounds_west, bounds_south, bounds_east, bounds_north,
             coords, offsets, geometry_hash, extra_properties,
             fetch_time, last_accessed
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12,
                   ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24)
         ON CONFLICT(id) DO UPDATE SET
             name = excluded.name,
             type_code = excluded.type_code,
             icao_class = excluded.icao_class,
             country = excluded.country,
             activity = excluded.activity,
             lower_raw_value = excluded.lower_raw_value,
             lower_raw_unit = excluded.lower_raw_unit,
             lower_raw_reference = excluded.lower_raw_reference,
             upper_raw_value = excluded.upper_raw_value,
             upper_raw_unit = excluded.upper_raw_unit,
             upper_raw_reference = excluded.upper_raw_reference,
             lower_altitude_ft = excluded.lower_altitude_ft,
             upper_altitude_ft = excluded.upper_altitude_ft,
             bounds_west = excluded.bounds_west,
             bounds_south = excluded.bounds_south,
             bounds_east = excluded.bounds_east,
             bounds_north = excluded.bounds_north,
             coords = excluded.coords,
             offsets = excluded.offsets,
             geometry_hash = excluded.geometry_hash,
             extra_properties = excluded.extra_properties,
             fetch_time = excluded.fetch_time,
             last_accessed = excluded.last_accessed",
        params![
            record.id,
            record.name,
            record.type_code,
            record.icao_class,
            record.country,
            record.activity,
            record.lower_limit.value_token(),
            record.lower_limit.unit,
            record.lower_limit.reference,
            record.upper_limit.value_token(),
            record.upper_limit.unit,
            record.upper_limit.reference,
            record.lower_altitude_ft,
            record.upper_altitude_ft,
            record.bounds.west,
            record.bounds.south,
            record.bounds.east,
            record.bounds.north,
            record.coords,
            record.offsets,
            record.geometry_hash,
            record.extra_properties,
            now,
            now,
        ],
    )
    .with_context(|| format!("upsert airspace {}", record.id))?;
    Ok(())
}
