//! SQLite-backed caption store.
//!
//! Caption text is indexed in an FTS5 external-content table kept in sync by
//! triggers, so a successful `append_segments` guarantees the new rows are
//! already searchable. Relevance comes from FTS5's bm25().

use super::{CaptionSegment, CaptionStore, NewSegment, StoreStats, TextMatch, Video, VideoSummary};
use crate::error::{KilnsError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, ErrorCode};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, instrument};

/// SQLite-based caption store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS videos (
        video_id TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        uploader TEXT,
        upload_date TEXT,
        duration_seconds INTEGER,
        view_count INTEGER,
        description TEXT,
        thumbnail TEXT,
        thumbnail_text TEXT,
        tags TEXT NOT NULL DEFAULT '[]',
        playlists TEXT NOT NULL DEFAULT '[]',
        scraped_at TEXT NOT NULL
    );

    CREATE TABLE IF NOT EXISTS captions (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        video_id TEXT NOT NULL REFERENCES videos(video_id),
        sequence_number INTEGER NOT NULL,
        start_seconds REAL NOT NULL,
        end_seconds REAL NOT NULL,
        text TEXT NOT NULL,
        UNIQUE(video_id, sequence_number)
    );

    CREATE INDEX IF NOT EXISTS idx_captions_video_id ON captions(video_id);

    CREATE VIRTUAL TABLE IF NOT EXISTS captions_fts USING fts5(
        text,
        content='captions',
        content_rowid='id'
    );

    CREATE TRIGGER IF NOT EXISTS captions_ai AFTER INSERT ON captions BEGIN
        INSERT INTO captions_fts(rowid, text) VALUES (new.id, new.text);
    END;

    CREATE TRIGGER IF NOT EXISTS captions_ad AFTER DELETE ON captions BEGIN
        INSERT INTO captions_fts(captions_fts, rowid, text) VALUES ('delete', old.id, old.text);
    END;
"#;

impl SqliteStore {
    /// Open (or create) a caption store at the given path.
    #[instrument(skip_all)]
    pub fn new(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // WAL for better concurrent read performance
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;

        info!("Initialized caption store at {:?}", path);

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| KilnsError::Storage(format!("Failed to acquire lock: {}", e)))
    }

    /// Quote a term as an FTS5 phrase so user input is never parsed as
    /// query syntax. Embedded double quotes are doubled.
    fn fts_phrase(term: &str) -> String {
        format!("\"{}\"", term.replace('"', "\"\""))
    }

    fn video_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Video> {
        let tags_json: String = row.get(9)?;
        let playlists_json: String = row.get(10)?;
        let scraped_at_str: String = row.get(11)?;

        Ok(Video {
            video_id: row.get(0)?,
            title: row.get(1)?,
            uploader: row.get(2)?,
            upload_date: row.get(3)?,
            duration_seconds: row.get(4)?,
            view_count: row.get(5)?,
            description: row.get(6)?,
            thumbnail: row.get(7)?,
            thumbnail_text: row.get(8)?,
            tags: serde_json::from_str(&tags_json).unwrap_or_default(),
            playlists: serde_json::from_str(&playlists_json).unwrap_or_default(),
            scraped_at: DateTime::parse_from_rfc3339(&scraped_at_str)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or_else(|_| Utc::now()),
        })
    }
}

#[async_trait]
impl CaptionStore for SqliteStore {
    #[instrument(skip(self, video), fields(video_id = %video.video_id))]
    async fn upsert_video(&self, video: &Video) -> Result<String> {
        if video.title.trim().is_empty() {
            return Err(KilnsError::Conflict(format!(
                "Video {} is missing a title",
                video.video_id
            )));
        }

        let conn = self.lock()?;

        let existing: Option<(Option<String>, Option<String>, String, String)> = conn
            .query_row(
                "SELECT thumbnail, thumbnail_text, tags, playlists FROM videos WHERE video_id = ?1",
                params![video.video_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .map(Some)
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(None),
                other => Err(other),
            })?;

        let tags_json = serde_json::to_string(&video.tags)?;
        let playlists_json = serde_json::to_string(&video.playlists)?;

        match existing {
            None => {
                conn.execute(
                    r#"
                    INSERT INTO videos
                    (video_id, title, uploader, upload_date, duration_seconds, view_count,
                     description, thumbnail, thumbnail_text, tags, playlists, scraped_at)
                    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
                    "#,
                    params![
                        video.video_id,
                        video.title,
                        video.uploader,
                        video.upload_date,
                        video.duration_seconds,
                        video.view_count,
                        video.description,
                        video.thumbnail,
                        video.thumbnail_text,
                        tags_json,
                        playlists_json,
                        video.scraped_at.to_rfc3339(),
                    ],
                )?;
                debug!("Inserted video {}", video.video_id);
            }
            Some((thumbnail, thumbnail_text, tags, playlists)) => {
                let unchanged = thumbnail == video.thumbnail
                    && thumbnail_text == video.thumbnail_text
                    && tags == tags_json
                    && playlists == playlists_json;

                if unchanged {
                    debug!("Video {} unchanged, skipping", video.video_id);
                } else {
                    // Only mutable fields; title and the rest are immutable
                    conn.execute(
                        r#"
                        UPDATE videos
                        SET thumbnail = ?2, thumbnail_text = ?3, tags = ?4, playlists = ?5
                        WHERE video_id = ?1
                        "#,
                        params![
                            video.video_id,
                            video.thumbnail,
                            video.thumbnail_text,
                            tags_json,
                            playlists_json,
                        ],
                    )?;
                    debug!("Updated mutable fields for video {}", video.video_id);
                }
            }
        }

        Ok(video.video_id.clone())
    }

    #[instrument(skip(self, segments), fields(count = segments.len()))]
    async fn append_segments(&self, video_id: &str, segments: &[NewSegment]) -> Result<usize> {
        if segments.is_empty() {
            return Ok(0);
        }

        let mut prev: Option<&NewSegment> = None;
        for seg in segments {
            if seg.text.trim().is_empty() {
                return Err(KilnsError::Validation(format!(
                    "Segment {} of video {} has empty text",
                    seg.sequence_number, video_id
                )));
            }
            if seg.end_seconds < seg.start_seconds {
                return Err(KilnsError::Validation(format!(
                    "Segment {} of video {} ends before it starts",
                    seg.sequence_number, video_id
                )));
            }
            if let Some(p) = prev {
                if seg.sequence_number <= p.sequence_number || seg.start_seconds < p.start_seconds {
                    return Err(KilnsError::Validation(format!(
                        "Segments for video {} are not time-ordered at sequence {}",
                        video_id, seg.sequence_number
                    )));
                }
            }
            prev = Some(seg);
        }

        let conn = self.lock()?;

        let known: bool = conn
            .query_row(
                "SELECT 1 FROM videos WHERE video_id = ?1",
                params![video_id],
                |_| Ok(true),
            )
            .or_else(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => Ok(false),
                other => Err(other),
            })?;
        if !known {
            return Err(KilnsError::Validation(format!(
                "Unknown video: {}",
                video_id
            )));
        }

        // All-or-nothing; the FTS triggers run inside the same transaction,
        // so a successful return means the index already has the new text.
        let tx = conn.unchecked_transaction()?;
        for seg in segments {
            tx.execute(
                r#"
                INSERT INTO captions (video_id, sequence_number, start_seconds, end_seconds, text)
                VALUES (?1, ?2, ?3, ?4, ?5)
                "#,
                params![
                    video_id,
                    seg.sequence_number,
                    seg.start_seconds,
                    seg.end_seconds,
                    seg.text,
                ],
            )
            .map_err(|e| match e {
                rusqlite::Error::SqliteFailure(err, _)
                    if err.code == ErrorCode::ConstraintViolation =>
                {
                    KilnsError::Validation(format!(
                        "Duplicate sequence number {} for video {}",
                        seg.sequence_number, video_id
                    ))
                }
                other => other.into(),
            })?;
        }
        tx.commit()?;

        info!("Appended {} segments for video {}", segments.len(), video_id);
        Ok(segments.len())
    }

    #[instrument(skip(self))]
    async fn query_text(&self, term: &str, limit: usize) -> Result<Vec<TextMatch>> {
        if term.trim().is_empty() {
            return Err(KilnsError::Validation("Empty search term".to_string()));
        }

        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT c.video_id, c.sequence_number, c.start_seconds, c.end_seconds, c.text,
                   v.title, v.upload_date, -bm25(captions_fts) AS raw_score
            FROM captions_fts
            JOIN captions c ON captions_fts.rowid = c.id
            JOIN videos v ON v.video_id = c.video_id
            WHERE captions_fts MATCH ?1
            ORDER BY raw_score DESC, c.sequence_number ASC
            LIMIT ?2
            "#,
        )?;

        let rows = stmt.query_map(
            params![Self::fts_phrase(term), limit as i64],
            |row| {
                Ok(TextMatch {
                    segment: CaptionSegment {
                        video_id: row.get(0)?,
                        sequence_number: row.get(1)?,
                        start_seconds: row.get(2)?,
                        end_seconds: row.get(3)?,
                        text: row.get(4)?,
                    },
                    video_title: row.get(5)?,
                    upload_date: row.get(6)?,
                    raw_score: row.get(7)?,
                })
            },
        )?;

        let matches: Vec<TextMatch> = rows.collect::<rusqlite::Result<_>>()?;
        debug!("Term {:?} matched {} segments", term, matches.len());
        Ok(matches)
    }

    #[instrument(skip(self))]
    async fn get_video(&self, video_id: &str) -> Result<Option<Video>> {
        let conn = self.lock()?;

        let video = conn.query_row(
            r#"
            SELECT video_id, title, uploader, upload_date, duration_seconds, view_count,
                   description, thumbnail, thumbnail_text, tags, playlists, scraped_at
            FROM videos WHERE video_id = ?1
            "#,
            params![video_id],
            Self::video_from_row,
        );

        match video {
            Ok(v) => Ok(Some(v)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    #[instrument(skip(self))]
    async fn get_segments(&self, video_id: &str) -> Result<Vec<CaptionSegment>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT video_id, sequence_number, start_seconds, end_seconds, text
            FROM captions
            WHERE video_id = ?1
            ORDER BY sequence_number
            "#,
        )?;

        let rows = stmt.query_map(params![video_id], |row| {
            Ok(CaptionSegment {
                video_id: row.get(0)?,
                sequence_number: row.get(1)?,
                start_seconds: row.get(2)?,
                end_seconds: row.get(3)?,
                text: row.get(4)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    #[instrument(skip(self))]
    async fn list_videos(&self) -> Result<Vec<VideoSummary>> {
        let conn = self.lock()?;

        let mut stmt = conn.prepare(
            r#"
            SELECT v.video_id, v.title, v.upload_date, COUNT(c.id) AS segment_count
            FROM videos v
            LEFT JOIN captions c ON c.video_id = v.video_id
            GROUP BY v.video_id
            ORDER BY v.upload_date DESC, v.video_id ASC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(VideoSummary {
                video_id: row.get(0)?,
                title: row.get(1)?,
                upload_date: row.get(2)?,
                segment_count: row.get(3)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    #[instrument(skip(self))]
    async fn delete_video(&self, video_id: &str) -> Result<usize> {
        let conn = self.lock()?;

        let tx = conn.unchecked_transaction()?;
        let segments = tx.execute("DELETE FROM captions WHERE video_id = ?1", params![video_id])?;
        let videos = tx.execute("DELETE FROM videos WHERE video_id = ?1", params![video_id])?;
        tx.commit()?;

        if videos == 0 {
            return Err(KilnsError::NotFound(format!("Video {}", video_id)));
        }

        info!("Purged video {} ({} segments)", video_id, segments);
        Ok(segments)
    }

    async fn stats(&self) -> Result<StoreStats> {
        let conn = self.lock()?;

        let video_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM videos", [], |row| row.get(0))?;
        let segment_count: u64 =
            conn.query_row("SELECT COUNT(*) FROM captions", [], |row| row.get(0))?;
        let last_scraped: Option<String> =
            conn.query_row("SELECT MAX(scraped_at) FROM videos", [], |row| row.get(0))?;

        Ok(StoreStats {
            video_count,
            segment_count,
            last_scraped_at: last_scraped.and_then(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .ok()
                    .map(|dt| dt.with_timezone(&Utc))
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_video(id: &str) -> Video {
        let mut v = Video::new(id, format!("Video {}", id));
        v.uploader = Some("Wade Center Readings".to_string());
        v.upload_date = Some("20240315".to_string());
        v
    }

    fn seg(n: i64, start: f64, text: &str) -> NewSegment {
        NewSegment {
            sequence_number: n,
            start_seconds: start,
            end_seconds: start + 4.0,
            text: text.to_string(),
        }
    }

    #[tokio::test]
    async fn test_upsert_and_get() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();

        let video = store.get_video("V1").await.unwrap().unwrap();
        assert_eq!(video.title, "Video V1");
        assert_eq!(video.uploader.as_deref(), Some("Wade Center Readings"));

        assert!(store.get_video("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_upsert_rejects_missing_title() {
        let store = SqliteStore::in_memory().unwrap();
        let video = Video::new("V1", "  ");
        let err = store.upsert_video(&video).await.unwrap_err();
        assert!(matches!(err, KilnsError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_upsert_is_idempotent() {
        let store = SqliteStore::in_memory().unwrap();
        let video = sample_video("V1");
        store.upsert_video(&video).await.unwrap();
        store
            .append_segments("V1", &[seg(0, 10.0, "the wardrobe door")])
            .await
            .unwrap();

        let before = store.query_text("wardrobe", 10).await.unwrap();
        store.upsert_video(&video).await.unwrap();
        let after = store.query_text("wardrobe", 10).await.unwrap();

        assert_eq!(before.len(), after.len());
        assert_eq!(before[0].segment.text, after[0].segment.text);
        assert_eq!(before[0].raw_score, after[0].raw_score);
    }

    #[tokio::test]
    async fn test_upsert_updates_mutable_fields() {
        let store = SqliteStore::in_memory().unwrap();
        let mut video = sample_video("V1");
        store.upsert_video(&video).await.unwrap();

        video.thumbnail_text = Some("SURPRISED BY JOY".to_string());
        video.tags = vec!["lewis".to_string(), "diary".to_string()];
        store.upsert_video(&video).await.unwrap();

        let stored = store.get_video("V1").await.unwrap().unwrap();
        assert_eq!(stored.thumbnail_text.as_deref(), Some("SURPRISED BY JOY"));
        assert_eq!(stored.tags, vec!["lewis", "diary"]);
    }

    #[tokio::test]
    async fn test_append_rejects_unknown_video() {
        let store = SqliteStore::in_memory().unwrap();
        let err = store
            .append_segments("ghost", &[seg(0, 0.0, "hello")])
            .await
            .unwrap_err();
        assert!(matches!(err, KilnsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_rejects_unordered_segments() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();

        let err = store
            .append_segments("V1", &[seg(0, 10.0, "later"), seg(1, 5.0, "earlier")])
            .await
            .unwrap_err();
        assert!(matches!(err, KilnsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_rejects_empty_text() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();

        let err = store
            .append_segments("V1", &[seg(0, 0.0, "   ")])
            .await
            .unwrap_err();
        assert!(matches!(err, KilnsError::Validation(_)));
    }

    #[tokio::test]
    async fn test_append_is_all_or_nothing() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();
        store
            .append_segments("V1", &[seg(0, 0.0, "first batch")])
            .await
            .unwrap();

        // Second batch collides on sequence 0; nothing from it may land
        let err = store
            .append_segments("V1", &[seg(0, 10.0, "collides"), seg(1, 20.0, "stranded")])
            .await
            .unwrap_err();
        assert!(matches!(err, KilnsError::Validation(_)));
        assert!(store.query_text("stranded", 10).await.unwrap().is_empty());
        assert_eq!(store.get_segments("V1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_query_visible_after_append() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();
        store
            .append_segments(
                "V1",
                &[seg(0, 330.0, "Lewis discusses medieval literature with his tutor.")],
            )
            .await
            .unwrap();

        let matches = store.query_text("medieval literature", 10).await.unwrap();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].segment.video_id, "V1");
        assert_eq!(matches[0].segment.start_seconds, 330.0);
        assert!(matches[0].raw_score.is_finite());
    }

    #[tokio::test]
    async fn test_query_no_match_is_empty() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();
        store
            .append_segments("V1", &[seg(0, 0.0, "some ordinary text")])
            .await
            .unwrap();

        let matches = store.query_text("zzz_no_such_term_qqq", 10).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_query_quotes_are_escaped() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();
        store
            .append_segments("V1", &[seg(0, 0.0, "he said surprised by joy")])
            .await
            .unwrap();

        // Stray FTS syntax in the term must not error
        let matches = store.query_text("\"surprised\" OR (", 10).await.unwrap();
        assert!(matches.is_empty());
    }

    #[tokio::test]
    async fn test_delete_cascades_to_index() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();
        store
            .append_segments("V1", &[seg(0, 0.0, "narnia again"), seg(1, 10.0, "still narnia")])
            .await
            .unwrap();

        let removed = store.delete_video("V1").await.unwrap();
        assert_eq!(removed, 2);
        assert!(store.get_video("V1").await.unwrap().is_none());
        assert!(store.query_text("narnia", 10).await.unwrap().is_empty());

        let err = store.delete_video("V1").await.unwrap_err();
        assert!(matches!(err, KilnsError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_stats_and_list() {
        let store = SqliteStore::in_memory().unwrap();
        store.upsert_video(&sample_video("V1")).await.unwrap();
        store.upsert_video(&sample_video("V2")).await.unwrap();
        store
            .append_segments("V1", &[seg(0, 0.0, "one"), seg(1, 5.0, "two")])
            .await
            .unwrap();

        let stats = store.stats().await.unwrap();
        assert_eq!(stats.video_count, 2);
        assert_eq!(stats.segment_count, 2);
        assert!(stats.last_scraped_at.is_some());

        let listed = store.list_videos().await.unwrap();
        assert_eq!(listed.len(), 2);
        let v1 = listed.iter().find(|v| v.video_id == "V1").unwrap();
        assert_eq!(v1.segment_count, 2);
    }
}
