#![forbid(unsafe_code)]

//! SQLite persistence for the harvested metadata.
//!
//! All four tables share one conflict policy: `INSERT ... ON CONFLICT(pk)
//! DO UPDATE`, so re-harvesting a channel refreshes counts instead of
//! erroring or silently keeping stale rows. Every `execute` runs as its own
//! implicit transaction, which gives per-record durability.

use std::path::Path;

use anyhow::{Context, Result};
use libsql::{Builder, Connection, Row, Value, params};
use serde::Serialize;

use crate::mapper::{ChannelRow, CommentRow, PlaylistRow, VideoRow};

async fn configure_connection(conn: &Connection) -> Result<()> {
    // `PRAGMA journal_mode` returns a result row, which libsql's `execute`
    // path rejects ("Execute returned rows"), so issue the pragmas as queries.
    conn.query("PRAGMA journal_mode=WAL;", params![]).await?;
    conn.query("PRAGMA synchronous=NORMAL;", params![]).await?;
    Ok(())
}

// videos.channel_id and comments.video_id are deliberately not declared as
// foreign keys: harvest actions are independent and may run in any order.
async fn ensure_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS channels (
            channel_id TEXT PRIMARY KEY,
            channel_name TEXT NOT NULL,
            subscribers INTEGER NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            total_videos INTEGER NOT NULL DEFAULT 0,
            description TEXT DEFAULT '',
            uploads_playlist_id TEXT DEFAULT ''
        );

        CREATE TABLE IF NOT EXISTS videos (
            video_id TEXT PRIMARY KEY,
            channel_id TEXT NOT NULL,
            channel_title TEXT DEFAULT '',
            title TEXT NOT NULL,
            description TEXT DEFAULT '',
            published_at TEXT NOT NULL,
            duration TEXT NOT NULL DEFAULT '00:00:00',
            definition TEXT DEFAULT '',
            caption INTEGER NOT NULL DEFAULT 0,
            views INTEGER NOT NULL DEFAULT 0,
            comments INTEGER NOT NULL DEFAULT 0,
            favorites INTEGER NOT NULL DEFAULT 0,
            likes INTEGER NOT NULL DEFAULT 0,
            dislikes INTEGER NOT NULL DEFAULT 0,
            tags TEXT DEFAULT '',
            thumbnails_json TEXT DEFAULT '{}'
        );

        CREATE TABLE IF NOT EXISTS playlists (
            playlist_id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            channel_id TEXT NOT NULL,
            channel_title TEXT DEFAULT '',
            published_at TEXT NOT NULL,
            item_count INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS comments (
            comment_id TEXT PRIMARY KEY,
            video_id TEXT NOT NULL,
            author TEXT DEFAULT '',
            text TEXT DEFAULT '',
            published_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_videos_channel ON videos(channel_id);
        CREATE INDEX IF NOT EXISTS idx_comments_video ON comments(video_id);
        "#,
    )
    .await?;
    Ok(())
}

/// Result of one report query: fixed column headers plus JSON-typed cells,
/// ready to render as a table.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

/// Connection wrapper performing every read and write against the warehouse.
#[derive(Clone)]
pub struct Warehouse {
    conn: Connection,
}

impl Warehouse {
    /// Opens (and if necessary creates) the database file and makes sure the
    /// four tables exist.
    pub async fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).with_context(|| {
                    format!("creating database directory {}", parent.display())
                })?;
            }
        }

        let db = Builder::new_local(path)
            .build()
            .await
            .with_context(|| format!("opening warehouse DB {}", path.display()))?;
        let conn = db.connect()?;
        configure_connection(&conn).await?;
        ensure_schema(&conn).await?;
        Ok(Self { conn })
    }

    pub async fn upsert_channel(&self, row: &ChannelRow) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO channels (
                    channel_id, channel_name, subscribers, views, total_videos,
                    description, uploads_playlist_id
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                ON CONFLICT(channel_id) DO UPDATE SET
                    channel_name = excluded.channel_name,
                    subscribers = excluded.subscribers,
                    views = excluded.views,
                    total_videos = excluded.total_videos,
                    description = excluded.description,
                    uploads_playlist_id = excluded.uploads_playlist_id
                "#,
                params![
                    row.channel_id.as_str(),
                    row.channel_name.as_str(),
                    row.subscribers,
                    row.views,
                    row.total_videos,
                    row.description.as_str(),
                    row.uploads_playlist_id.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn upsert_video(&self, row: &VideoRow) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO videos (
                    video_id, channel_id, channel_title, title, description,
                    published_at, duration, definition, caption, views,
                    comments, favorites, likes, dislikes, tags, thumbnails_json
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
                ON CONFLICT(video_id) DO UPDATE SET
                    channel_id = excluded.channel_id,
                    channel_title = excluded.channel_title,
                    title = excluded.title,
                    description = excluded.description,
                    published_at = excluded.published_at,
                    duration = excluded.duration,
                    definition = excluded.definition,
                    caption = excluded.caption,
                    views = excluded.views,
                    comments = excluded.comments,
                    favorites = excluded.favorites,
                    likes = excluded.likes,
                    dislikes = excluded.dislikes,
                    tags = excluded.tags,
                    thumbnails_json = excluded.thumbnails_json
                "#,
                params![
                    row.video_id.as_str(),
                    row.channel_id.as_str(),
                    row.channel_title.as_str(),
                    row.title.as_str(),
                    row.description.as_str(),
                    row.published_at.as_str(),
                    row.duration.as_str(),
                    row.definition.as_str(),
                    row.caption as i64,
                    row.views,
                    row.comments,
                    row.favorites,
                    row.likes,
                    row.dislikes,
                    row.tags.as_str(),
                    row.thumbnails_json.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn upsert_playlist(&self, row: &PlaylistRow) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO playlists (
                    playlist_id, title, channel_id, channel_title,
                    published_at, item_count
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
                ON CONFLICT(playlist_id) DO UPDATE SET
                    title = excluded.title,
                    channel_id = excluded.channel_id,
                    channel_title = excluded.channel_title,
                    published_at = excluded.published_at,
                    item_count = excluded.item_count
                "#,
                params![
                    row.playlist_id.as_str(),
                    row.title.as_str(),
                    row.channel_id.as_str(),
                    row.channel_title.as_str(),
                    row.published_at.as_str(),
                    row.item_count,
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn upsert_comment(&self, row: &CommentRow) -> Result<()> {
        self.conn
            .execute(
                r#"
                INSERT INTO comments (
                    comment_id, video_id, author, text, published_at
                ) VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(comment_id) DO UPDATE SET
                    video_id = excluded.video_id,
                    author = excluded.author,
                    text = excluded.text,
                    published_at = excluded.published_at
                "#,
                params![
                    row.comment_id.as_str(),
                    row.video_id.as_str(),
                    row.author.as_str(),
                    row.text.as_str(),
                    row.published_at.as_str(),
                ],
            )
            .await?;
        Ok(())
    }

    pub async fn upsert_videos(&self, rows: &[VideoRow]) -> Result<usize> {
        for row in rows {
            self.upsert_video(row).await?;
        }
        Ok(rows.len())
    }

    pub async fn upsert_playlists(&self, rows: &[PlaylistRow]) -> Result<usize> {
        for row in rows {
            self.upsert_playlist(row).await?;
        }
        Ok(rows.len())
    }

    pub async fn upsert_comments(&self, rows: &[CommentRow]) -> Result<usize> {
        for row in rows {
            self.upsert_comment(row).await?;
        }
        Ok(rows.len())
    }

    pub async fn list_channels(&self) -> Result<Vec<ChannelRow>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT channel_id, channel_name, subscribers, views,
                       total_videos, description, uploads_playlist_id
                FROM channels
                ORDER BY channel_name ASC
                "#,
            )
            .await?;
        let mut rows = stmt.query(params![]).await?;
        let mut channels = Vec::new();
        while let Some(row) = rows.next().await? {
            channels.push(row_to_channel(&row)?);
        }
        Ok(channels)
    }

    pub async fn list_videos(&self) -> Result<Vec<VideoRow>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT video_id, channel_id, channel_title, title, description,
                       published_at, duration, definition, caption, views,
                       comments, favorites, likes, dislikes, tags, thumbnails_json
                FROM videos
                ORDER BY published_at DESC, rowid DESC
                "#,
            )
            .await?;
        let mut rows = stmt.query(params![]).await?;
        let mut videos = Vec::new();
        while let Some(row) = rows.next().await? {
            videos.push(row_to_video(&row)?);
        }
        Ok(videos)
    }

    pub async fn list_playlists(&self) -> Result<Vec<PlaylistRow>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT playlist_id, title, channel_id, channel_title,
                       published_at, item_count
                FROM playlists
                ORDER BY published_at DESC, rowid DESC
                "#,
            )
            .await?;
        let mut rows = stmt.query(params![]).await?;
        let mut playlists = Vec::new();
        while let Some(row) = rows.next().await? {
            playlists.push(row_to_playlist(&row)?);
        }
        Ok(playlists)
    }

    pub async fn list_comments(&self) -> Result<Vec<CommentRow>> {
        let mut stmt = self
            .conn
            .prepare(
                r#"
                SELECT comment_id, video_id, author, text, published_at
                FROM comments
                ORDER BY published_at ASC, rowid ASC
                "#,
            )
            .await?;
        let mut rows = stmt.query(params![]).await?;
        let mut comments = Vec::new();
        while let Some(row) = rows.next().await? {
            comments.push(row_to_comment(&row)?);
        }
        Ok(comments)
    }

    /// Executes one literal report SELECT. Headers come from the report
    /// definition so every question keeps its fixed column schema even over
    /// an empty result set.
    pub async fn run_report(&self, sql: &str, columns: &[&str]) -> Result<ReportTable> {
        let mut stmt = self.conn.prepare(sql).await.context("preparing report")?;
        let mut rows = stmt.query(params![]).await.context("running report")?;
        let mut table_rows = Vec::new();
        while let Some(row) = rows.next().await? {
            let mut cells = Vec::with_capacity(columns.len());
            for index in 0..columns.len() {
                cells.push(value_to_json(row.get_value(index as i32)?));
            }
            table_rows.push(cells);
        }
        Ok(ReportTable {
            columns: columns.iter().map(|name| name.to_string()).collect(),
            rows: table_rows,
        })
    }
}

fn value_to_json(value: Value) -> serde_json::Value {
    match value {
        Value::Null => serde_json::Value::Null,
        Value::Integer(number) => serde_json::Value::from(number),
        Value::Real(number) => serde_json::Value::from(number),
        Value::Text(text) => serde_json::Value::from(text),
        Value::Blob(bytes) => serde_json::Value::from(format!("<{} bytes>", bytes.len())),
    }
}

fn row_to_channel(row: &Row) -> Result<ChannelRow> {
    Ok(ChannelRow {
        channel_id: row.get(0)?,
        channel_name: row.get(1)?,
        subscribers: row.get(2)?,
        views: row.get(3)?,
        total_videos: row.get(4)?,
        description: row.get(5)?,
        uploads_playlist_id: row.get(6)?,
    })
}

fn row_to_video(row: &Row) -> Result<VideoRow> {
    Ok(VideoRow {
        video_id: row.get(0)?,
        channel_id: row.get(1)?,
        channel_title: row.get(2)?,
        title: row.get(3)?,
        description: row.get(4)?,
        published_at: row.get(5)?,
        duration: row.get(6)?,
        definition: row.get(7)?,
        caption: row.get::<i64>(8).map(|value| value != 0)?,
        views: row.get(9)?,
        comments: row.get(10)?,
        favorites: row.get(11)?,
        likes: row.get(12)?,
        dislikes: row.get(13)?,
        tags: row.get(14)?,
        thumbnails_json: row.get(15)?,
    })
}

fn row_to_playlist(row: &Row) -> Result<PlaylistRow> {
    Ok(PlaylistRow {
        playlist_id: row.get(0)?,
        title: row.get(1)?,
        channel_id: row.get(2)?,
        channel_title: row.get(3)?,
        published_at: row.get(4)?,
        item_count: row.get(5)?,
    })
}

fn row_to_comment(row: &Row) -> Result<CommentRow> {
    Ok(CommentRow {
        comment_id: row.get(0)?,
        video_id: row.get(1)?,
        author: row.get(2)?,
        text: row.get(3)?,
        published_at: row.get(4)?,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tempfile::tempdir;

    pub(crate) fn sample_channel(id: &str) -> ChannelRow {
        ChannelRow {
            channel_id: id.to_owned(),
            channel_name: format!("Channel {id}"),
            subscribers: 1_000,
            views: 50_000,
            total_videos: 12,
            description: "about".into(),
            uploads_playlist_id: format!("UU{id}"),
        }
    }

    pub(crate) fn sample_video(id: &str, channel_id: &str) -> VideoRow {
        VideoRow {
            video_id: id.to_owned(),
            channel_id: channel_id.to_owned(),
            channel_title: format!("Channel {channel_id}"),
            title: format!("Video {id}"),
            description: "desc".into(),
            published_at: "2023-06-01 12:00:00".into(),
            duration: "00:04:13".into(),
            definition: "hd".into(),
            caption: false,
            views: 100,
            comments: 3,
            favorites: 0,
            likes: 10,
            dislikes: 1,
            tags: "tech,review".into(),
            thumbnails_json: "{}".into(),
        }
    }

    pub(crate) fn sample_playlist(id: &str, channel_id: &str) -> PlaylistRow {
        PlaylistRow {
            playlist_id: id.to_owned(),
            title: format!("Playlist {id}"),
            channel_id: channel_id.to_owned(),
            channel_title: format!("Channel {channel_id}"),
            published_at: "2022-01-01 00:00:00".into(),
            item_count: 7,
        }
    }

    pub(crate) fn sample_comment(id: &str, video_id: &str) -> CommentRow {
        CommentRow {
            comment_id: id.to_owned(),
            video_id: video_id.to_owned(),
            author: format!("author-{id}"),
            text: format!("text-{id}"),
            published_at: "2023-06-02 08:00:00".into(),
        }
    }

    pub(crate) async fn create_warehouse() -> Result<(tempfile::TempDir, Warehouse)> {
        let dir = tempdir()?;
        let warehouse = Warehouse::open(&dir.path().join("test.db")).await?;
        Ok((dir, warehouse))
    }

    /// Opening must provision all four tables plus the lookup indexes.
    #[tokio::test]
    async fn open_creates_schema() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        for table in ["channels", "videos", "playlists", "comments"] {
            let mut rows = warehouse
                .conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type='table' AND name=?1",
                    [table],
                )
                .await?;
            let found: Option<String> = rows
                .next()
                .await?
                .map(|row| row.get::<String>(0))
                .transpose()?;
            assert_eq!(found.as_deref(), Some(table));
        }
        for index in ["idx_videos_channel", "idx_comments_video"] {
            let mut rows = warehouse
                .conn
                .query(
                    "SELECT name FROM sqlite_master WHERE type='index' AND name=?1",
                    [index],
                )
                .await?;
            assert!(rows.next().await?.is_some(), "missing index {index}");
        }
        Ok(())
    }

    /// Re-opening an existing database is idempotent.
    #[tokio::test]
    async fn open_is_idempotent() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("test.db");
        let first = Warehouse::open(&path).await?;
        first.upsert_channel(&sample_channel("UC1")).await?;
        let second = Warehouse::open(&path).await?;
        assert_eq!(second.list_channels().await?.len(), 1);
        Ok(())
    }

    /// Inserting the same channel id twice keeps exactly one row carrying the
    /// later values.
    #[tokio::test]
    async fn channel_upsert_deduplicates_on_primary_key() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        let mut row = sample_channel("UC1");
        warehouse.upsert_channel(&row).await?;
        row.subscribers = 2_000;
        warehouse.upsert_channel(&row).await?;

        let channels = warehouse.list_channels().await?;
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].subscribers, 2_000);
        Ok(())
    }

    /// Videos follow the same uniform policy: a re-harvested id refreshes the
    /// stored row rather than raising a primary-key violation.
    #[tokio::test]
    async fn video_upsert_refreshes_instead_of_erroring() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        let mut row = sample_video("vid-1", "UC1");
        warehouse.upsert_video(&row).await?;
        row.views = 250;
        row.title = "Updated".into();
        warehouse.upsert_video(&row).await?;

        let videos = warehouse.list_videos().await?;
        assert_eq!(videos.len(), 1);
        assert_eq!(videos[0].views, 250);
        assert_eq!(videos[0].title, "Updated");
        Ok(())
    }

    #[tokio::test]
    async fn playlist_and_comment_upserts_deduplicate() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        warehouse.upsert_playlist(&sample_playlist("PL1", "UC1")).await?;
        warehouse.upsert_playlist(&sample_playlist("PL1", "UC1")).await?;
        warehouse.upsert_comment(&sample_comment("c1", "vid-1")).await?;
        warehouse.upsert_comment(&sample_comment("c1", "vid-1")).await?;

        assert_eq!(warehouse.list_playlists().await?.len(), 1);
        assert_eq!(warehouse.list_comments().await?.len(), 1);
        Ok(())
    }

    /// Every field of a video must survive the write/read round trip,
    /// including the boolean caption flag stored as an INTEGER.
    #[tokio::test]
    async fn video_roundtrip_preserves_fields() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        let mut row = sample_video("vid-1", "UC1");
        row.caption = true;
        row.thumbnails_json = r#"{"default":{"url":"x"}}"#.into();
        warehouse.upsert_video(&row).await?;

        let fetched = &warehouse.list_videos().await?[0];
        assert_eq!(fetched.video_id, "vid-1");
        assert!(fetched.caption);
        assert_eq!(fetched.duration, "00:04:13");
        assert_eq!(fetched.tags, "tech,review");
        assert_eq!(fetched.thumbnails_json, r#"{"default":{"url":"x"}}"#);
        Ok(())
    }

    #[tokio::test]
    async fn batch_upserts_report_written_count() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        let rows = vec![
            sample_video("vid-1", "UC1"),
            sample_video("vid-2", "UC1"),
            sample_video("vid-3", "UC1"),
        ];
        assert_eq!(warehouse.upsert_videos(&rows).await?, 3);
        assert_eq!(warehouse.list_videos().await?.len(), 3);
        Ok(())
    }

    #[tokio::test]
    async fn run_report_returns_typed_cells() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        warehouse.upsert_channel(&sample_channel("UC1")).await?;
        warehouse.upsert_video(&sample_video("vid-1", "UC1")).await?;

        let table = warehouse
            .run_report(
                "SELECT v.title, v.views FROM videos v ORDER BY v.views DESC",
                &["Video_Title", "Views_Count"],
            )
            .await?;
        assert_eq!(table.columns, vec!["Video_Title", "Views_Count"]);
        assert_eq!(table.rows.len(), 1);
        assert_eq!(table.rows[0][0], serde_json::json!("Video vid-1"));
        assert_eq!(table.rows[0][1], serde_json::json!(100));
        Ok(())
    }

    #[tokio::test]
    async fn run_report_on_empty_table_yields_no_rows() -> Result<()> {
        let (_dir, warehouse) = create_warehouse().await?;
        let table = warehouse
            .run_report("SELECT title FROM videos", &["Video_Title"])
            .await?;
        assert!(table.rows.is_empty());
        assert_eq!(table.columns, vec!["Video_Title"]);
        Ok(())
    }
}
