//! Local track catalog backed by SQLite with an FTS5 index.
//!
//! `trackmatch index` builds the database from a JSON array of
//! [`CatalogEntry`]; [`CatalogProvider`] then serves searches from it.

use async_trait::async_trait;
use rusqlite::{params, Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::compare::compare;
use crate::models::{AlbumRef, CandidateTrack};
use crate::normalize::fold_to_ascii;
use crate::progress::{create_progress_bar, create_spinner, log_progress};
use crate::provider::{Provider, ProviderError};

const WRITE_BATCH_SIZE: usize = 10_000;

/// One track as supplied to `trackmatch index`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogEntry {
    pub id: String,
    pub title: String,
    pub artist: String,
    #[serde(default)]
    pub album: Option<String>,
    #[serde(default)]
    pub album_id: Option<String>,
    /// Playback key; defaults to the id
    #[serde(default)]
    pub source: Option<String>,
}

// ============================================================================
// Building
// ============================================================================

pub fn create_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA temp_store = MEMORY;

        CREATE TABLE tracks (
            row_id INTEGER PRIMARY KEY,
            id TEXT NOT NULL UNIQUE,
            title TEXT NOT NULL,
            artist TEXT NOT NULL,
            album TEXT,
            album_id TEXT,
            source TEXT NOT NULL
        );

        CREATE INDEX idx_tracks_album_id ON tracks(album_id);

        CREATE VIRTUAL TABLE tracks_fts USING fts5(
            title, artist, album,
            content='tracks',
            content_rowid='row_id',
            tokenize='unicode61 remove_diacritics 2'
        );",
    )
}

/// Insert entries in batched transactions. Duplicate ids keep the first entry.
/// Returns the number of rows written.
pub fn write_entries(conn: &mut Connection, entries: &[CatalogEntry]) -> rusqlite::Result<usize> {
    let total = entries.len() as u64;
    let pb = create_progress_bar(total, "Writing catalog");
    let mut written = 0;
    let mut processed = 0u64;

    for chunk in entries.chunks(WRITE_BATCH_SIZE) {
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO tracks (id, title, artist, album, album_id, source)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;

            for entry in chunk {
                written += stmt.execute(params![
                    entry.id,
                    entry.title,
                    entry.artist,
                    entry.album,
                    entry.album_id,
                    entry.source.as_deref().unwrap_or(&entry.id),
                ])?;
                processed += 1;
                pb.inc(1);
                log_progress("catalog", processed, total, WRITE_BATCH_SIZE as u64);
            }
        }
        tx.commit()?;
    }

    let skipped = entries.len() - written;
    if skipped > 0 {
        debug!(skipped, "duplicate catalog ids ignored");
    }
    pb.finish_with_message(format!("Wrote {} tracks", written));
    Ok(written)
}

pub fn build_fts_index(conn: &Connection) -> rusqlite::Result<()> {
    let spinner = create_spinner("Building FTS index");
    conn.execute("INSERT INTO tracks_fts(tracks_fts) VALUES('rebuild')", [])?;
    spinner.finish_with_message("FTS index built");
    Ok(())
}

pub fn optimize_database(conn: &Connection) -> rusqlite::Result<()> {
    let spinner = create_spinner("Optimizing database");
    // read-only connections cannot open a WAL database without its -shm file
    conn.execute_batch("PRAGMA journal_mode = DELETE; VACUUM; ANALYZE;")?;
    spinner.finish_with_message("Database optimized");
    Ok(())
}

/// Create schema, write entries and index them. Returns rows written.
pub fn build_catalog(conn: &mut Connection, entries: &[CatalogEntry]) -> rusqlite::Result<usize> {
    create_schema(conn)?;
    let written = write_entries(conn, entries)?;
    build_fts_index(conn)?;
    info!(tracks = written, "catalog built");
    Ok(written)
}

// ============================================================================
// Querying
// ============================================================================

fn fts_terms(text: &str) -> Vec<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| format!("\"{}\"", t))
        .collect()
}

/// Turn free text into an FTS5 query of quoted terms (implicit AND).
/// Punctuation such as `&`, `"` or `-` never reaches the FTS parser.
/// Returns `None` when the text has no searchable terms.
pub fn fts_query(text: &str) -> Option<String> {
    let terms = fts_terms(text);
    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" "))
    }
}

/// Any term of `text` in the album column. The two-way containment check
/// on the returned rows is left to `compare`.
pub fn fts_album_query(text: &str) -> Option<String> {
    let terms = fts_terms(text);
    if terms.is_empty() {
        None
    } else {
        Some(
            terms
                .iter()
                .map(|t| format!("album : {}", t))
                .collect::<Vec<_>>()
                .join(" OR "),
        )
    }
}

fn candidate_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<CandidateTrack> {
    Ok(CandidateTrack {
        id: row.get(0)?,
        title: row.get(1)?,
        artist_title: row.get(2)?,
        album_title: row.get(3)?,
        source: row.get(4)?,
    })
}

pub struct CatalogProvider {
    conn: Mutex<Connection>,
}

impl CatalogProvider {
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Open an existing catalog read-only.
    pub fn open(path: &Path) -> Result<Self, ProviderError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Ok(Self::new(conn))
    }

    /// Build an in-memory catalog from entries.
    pub fn in_memory(entries: &[CatalogEntry]) -> Result<Self, ProviderError> {
        let mut conn = Connection::open_in_memory()?;
        build_catalog(&mut conn, entries)?;
        Ok(Self::new(conn))
    }

    pub async fn track_count(&self) -> Result<usize, ProviderError> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM tracks", [], |row| row.get(0))?;
        Ok(count as usize)
    }
}

#[async_trait]
impl Provider for CatalogProvider {
    async fn search_by_text(&self, query: &str, limit: usize) -> Result<Vec<CandidateTrack>, ProviderError> {
        let Some(fts) = fts_query(query) else {
            return Ok(Vec::new());
        };
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT t.id, t.title, t.artist, t.album, t.source
             FROM tracks_fts fts
             JOIN tracks t ON fts.rowid = t.row_id
             WHERE fts.tracks_fts MATCH ?1
             ORDER BY fts.rank
             LIMIT ?2",
        )?;
        let rows = stmt.query_map(params![fts, limit as i64], candidate_from_row)?;
        let tracks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        debug!(query, fts = %fts, hits = tracks.len(), "catalog text search");
        Ok(tracks)
    }

    async fn search_album(&self, artist: &str, album: &str) -> Result<Vec<AlbumRef>, ProviderError> {
        let Some(fts) = fts_album_query(album) else {
            return Ok(Vec::new());
        };
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT t.album_id, t.album, MIN(t.artist)
             FROM tracks_fts fts
             JOIN tracks t ON fts.rowid = t.row_id
             WHERE fts.tracks_fts MATCH ?1
               AND t.album_id IS NOT NULL AND t.album IS NOT NULL
             GROUP BY t.album_id
             ORDER BY MIN(t.row_id)",
        )?;
        let rows = stmt.query_map([&fts], |row| {
            Ok(AlbumRef {
                id: row.get(0)?,
                title: row.get(1)?,
                artist_title: row.get(2)?,
            })
        })?;

        let mut albums = Vec::new();
        for album_ref in rows {
            let album_ref = album_ref?;
            let title_ok = compare(&album_ref.title, album, true).contains;
            let artist_ok = artist.trim().is_empty()
                || album_ref
                    .artist_title
                    .as_deref()
                    .map_or(true, |a| compare(a, artist, true).contains);
            if title_ok && artist_ok {
                albums.push(album_ref);
            }
        }
        debug!(
            artist = %fold_to_ascii(artist),
            album = %fold_to_ascii(album),
            hits = albums.len(),
            "catalog album search"
        );
        Ok(albums)
    }

    async fn get_album_tracks(&self, album: &AlbumRef) -> Result<Vec<CandidateTrack>, ProviderError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare_cached(
            "SELECT id, title, artist, album, source
             FROM tracks
             WHERE album_id = ?1
             ORDER BY row_id",
        )?;
        let rows = stmt.query_map([&album.id], candidate_from_row)?;
        let tracks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(tracks)
    }
}
