use std::collections::HashSet;

use anyhow::{Context, Result};
use rusqlite::{OptionalExtension, params, params_from_iter};
use tracing::{debug, info};

use crate::geometry_store::{GeometryStore, now_ms};

/// One entry of the static download catalog.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CountryInfo {
    pub code: &'static str,
    pub name: &'static str,
    pub estimated_size_mb: f64,
}

const fn country(code: &'static str, name: &'static str, estimated_size_mb: f64) -> CountryInfo {
    CountryInfo {
        code,
        name,
        estimated_size_mb,
    }
}

/// Countries offered for download, covering the major paragliding regions.
pub const AVAILABLE_COUNTRIES: &[CountryInfo] = &[
    country("AT", "Austria", 2.1),
    country("AU", "Australia", 3.8),
    country("BE", "Belgium", 0.9),
    country("BR", "Brazil", 2.4),
    country("CA", "Canada", 3.2),
    country("CH", "Switzerland", 1.8),
    country("CL", "Chile", 1.1),
    country("CO", "Colombia", 0.8),
    country("CZ", "Czechia", 1.4),
    country("DE", "Germany", 4.6),
    country("DK", "Denmark", 0.7),
    country("ES", "Spain", 3.1),
    country("FR", "France", 5.2),
    country("GB", "United Kingdom", 3.4),
    country("GR", "Greece", 1.2),
    country("HR", "Croatia", 0.8),
    country("HU", "Hungary", 0.9),
    country("IN", "India", 1.6),
    country("IT", "Italy", 4.1),
    country("JP", "Japan", 2.2),
    country("MA", "Morocco", 0.6),
    country("MX", "Mexico", 1.3),
    country("NL", "Netherlands", 0.8),
    country("NO", "Norway", 1.5),
    country("NP", "Nepal", 0.4),
    country("NZ", "New Zealand", 1.0),
    country("PL", "Poland", 1.7),
    country("PT", "Portugal", 0.9),
    country("RO", "Romania", 1.0),
    country("SE", "Sweden", 1.4),
    country("SI", "Slovenia", 0.5),
    country("SK", "Slovakia", 0.7),
    country("TR", "Turkey", 1.9),
    country("US", "United States", 9.8),
    country("ZA", "South Africa", 1.2),
];

/// Per-country cache metadata as stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CountryRecord {
    pub country_code: String,
    pub airspace_count: i64,
    pub fetch_time: i64,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
    pub size_bytes: Option<i64>,
    pub last_accessed: i64,
}

/// Country metadata and country↔airspace mapping over the shared store.
///
/// The mapping table is the source of truth for which airspaces are "live":
/// anything no longer referenced by a mapping is an orphan and gets removed.
#[derive(Clone)]
pub struct CountryCatalog {
    store: GeometryStore,
}

impl CountryCatalog {
    pub fn new(store: GeometryStore) -> Self {
        Self { store }
    }

    pub async fn put_country_metadata(
        &self,
        code: String,
        airspace_count: i64,
        etag: Option<String>,
        last_modified: Option<String>,
        size_bytes: Option<i64>,
    ) -> Result<()> {
        self.store
            .with_conn(move |conn| {
                let now = now_ms();
                conn.execute(
                    "INSERT INTO countries (
                         country_code, airspace_count, fetch_time, etag,
                         last_modified, size_bytes, last_accessed
                     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                     ON CONFLICT(country_code) DO UPDATE SET
                         airspace_count = excluded.airspace_count,
                         fetch_time = excluded.fetch_time,
                         etag = excluded.etag,
                         last_modified = excluded.last_modified,
                         size_bytes = excluded.size_bytes,
                         last_accessed = excluded.last_accessed",
                    params![code, airspace_count, now, etag, last_modified, size_bytes, now],
                )
                .with_context(|| format!("upsert country metadata {code}"))?;
                Ok(())
            })
            .await
    }

    /// Replace the mapping rows for a country in one transaction, so an
    /// in-flight render never sees a half-replaced country.
    pub async fn put_country_mappings(&self, code: String, ids: Vec<String>) -> Result<()> {
        self.store
            .with_conn(move |conn| {
                let tx = conn.transaction().context("begin mapping transaction")?;
                tx.execute(
                    "DELETE FROM country_airspaces WHERE country_code = ?",
                    params![code],
                )?;
                {
                    let mut stmt = tx.prepare_cached(
                        "INSERT OR IGNORE INTO country_airspaces (country_code, airspace_id)
                         VALUES (?, ?)",
                    )?;
                    for id in &ids {
                        stmt.execute(params![code, id])?;
                    }
                }
                tx.commit().context("commit mapping transaction")?;
                debug!(country = %code, mappings = ids.len(), "replaced country mappings");
                Ok(())
            })
            .await
    }

    pub async fn ids_for_country(&self, code: String) -> Result<Vec<String>> {
        self.store
            .with_conn(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT airspace_id FROM country_airspaces WHERE country_code = ?",
                )?;
                let rows = stmt.query_map(params![code], |row| row.get::<_, String>(0))?;
                let mut ids = Vec::new();
                for id in rows {
                    ids.push(id?);
                }
                Ok(ids)
            })
            .await
    }

    /// Union of airspace ids mapped to any of `codes`.
    pub async fn ids_for_countries(&self, codes: Vec<String>) -> Result<HashSet<String>> {
        if codes.is_empty() {
            return Ok(HashSet::new());
        }
        self.store
            .with_conn(move |conn| {
                let sql = format!(
                    "SELECT DISTINCT airspace_id FROM country_airspaces WHERE country_code IN ({})",
                    vec!["?"; codes.len()].join(",")
                );
                let mut stmt = conn.prepare_cached(&sql)?;
                let rows = stmt.query_map(params_from_iter(codes.iter()), |row| {
                    row.get::<_, String>(0)
                })?;
                let mut ids = HashSet::new();
                for id in rows {
                    ids.insert(id?);
                }
                Ok(ids)
            })
            .await
    }

    /// Codes of every country currently cached.
    pub async fn cached_countries(&self) -> Result<Vec<String>> {
        self.store
            .with_conn(|conn| {
                let mut stmt =
                    conn.prepare_cached("SELECT country_code FROM countries ORDER BY country_code")?;
                let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
                let mut codes = Vec::new();
                for code in rows {
                    codes.push(code?);
                }
                Ok(codes)
            })
            .await
    }

    pub async fn country_metadata(&self, code: String) -> Result<Option<CountryRecord>> {
        self.store
            .with_conn(move |conn| {
                conn.query_row(
                    "SELECT country_code, airspace_count, fetch_time, etag,
                            last_modified, size_bytes, last_accessed
                     FROM countries WHERE country_code = ?",
                    params![code],
                    |row| {
                        Ok(CountryRecord {
                            country_code: row.get(0)?,
                            airspace_count: row.get(1)?,
                            fetch_time: row.get(2)?,
                            etag: row.get(3)?,
                            last_modified: row.get(4)?,
                            size_bytes: row.get(5)?,
                            last_accessed: row.get(6)?,
                        })
                    },
                )
                .optional()
                .context("fetch country metadata")
            })
            .await
    }

    /// Remove a country: metadata row (mappings cascade), then any airspaces
    /// left unreferenced.
    pub async fn delete_country(&self, code: String) -> Result<usize> {
        let deleted_code = code.clone();
        self.store
            .with_conn(move |conn| {
                conn.execute(
                    "DELETE FROM countries WHERE country_code = ?",
                    params![code],
                )
                .with_context(|| format!("delete country {code}"))?;
                Ok(())
            })
            .await?;
        let orphans = self.clean_orphans().await?;
        info!(country = %deleted_code, orphans, "deleted country");
        Ok(orphans)
    }

    /// Delete airspaces no longer referenced by any country mapping.
    pub async fn clean_orphans(&self) -> Result<usize> {
        self.store
            .with_conn(|conn| {
                let deleted = conn.execute(
                    "DELETE FROM airspaces WHERE id NOT IN (
                         SELECT airspace_id FROM country_airspaces
                     )",
                    [],
                )?;
                if deleted > 0 {
                    debug!(deleted, "removed orphaned airspaces");
                }
                Ok(deleted)
            })
            .await
    }
}
