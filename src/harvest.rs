#![forbid(unsafe_code)]

//! Fetch → map → write orchestration behind the four UI actions.
//!
//! The API client blocks, so every network phase runs on a blocking thread;
//! writes then go through the async store. Failures scoped to a single
//! record or video become warnings in the returned summary rather than
//! aborting the batch.

use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::task;
use tracing::warn;

use crate::mapper;
use crate::store::Warehouse;
use crate::youtube::{CommentThreadItem, CommentThreads, VideoItem, YouTubeClient};

/// What one harvest action did, rendered verbatim by the UI.
#[derive(Debug, Default, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HarvestSummary {
    pub fetched: usize,
    pub written: usize,
    pub skipped: usize,
    pub warnings: Vec<String>,
}

impl HarvestSummary {
    fn warn(&mut self, message: impl Into<String>) {
        let message = message.into();
        warn!("{message}");
        self.warnings.push(message);
    }
}

/// Runs a blocking fetch closure on a dedicated thread.
async fn fetch_blocking<T, F>(
    client: &Arc<YouTubeClient>,
    channel_id: &str,
    fetch: F,
) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce(Arc<YouTubeClient>, String) -> Result<T> + Send + 'static,
{
    let client = Arc::clone(client);
    let channel_id = channel_id.to_string();
    task::spawn_blocking(move || fetch(client, channel_id))
        .await
        .context("fetch task panicked")?
}

/// Fetches one channel's profile and upserts it.
pub async fn harvest_channel(
    client: &Arc<YouTubeClient>,
    warehouse: &Warehouse,
    channel_id: &str,
) -> Result<HarvestSummary> {
    let mut summary = HarvestSummary::default();
    let channel =
        fetch_blocking(client, channel_id, |client, id| client.fetch_channel(&id)).await?;

    let Some(channel) = channel else {
        summary.warn(format!("no channel found for id {channel_id}"));
        return Ok(summary);
    };

    summary.fetched = 1;
    warehouse.upsert_channel(&mapper::map_channel(&channel)).await?;
    summary.written = 1;
    Ok(summary)
}

/// Enumerates the channel's uploads playlist and upserts every video's
/// metadata.
pub async fn harvest_videos(
    client: &Arc<YouTubeClient>,
    warehouse: &Warehouse,
    channel_id: &str,
) -> Result<HarvestSummary> {
    let mut summary = HarvestSummary::default();
    let items = fetch_blocking(client, channel_id, |client, id| {
        let Some(playlist_id) = client.fetch_uploads_playlist(&id)? else {
            return Ok(None);
        };
        let video_ids = client.fetch_playlist_video_ids(&playlist_id)?;
        Ok(Some(client.fetch_video_details(&video_ids)?))
    })
    .await?;

    let Some(items) = items else {
        summary.warn(format!("no channel found for id {channel_id}"));
        return Ok(summary);
    };
    if items.is_empty() {
        summary.warn(format!("no videos found for channel {channel_id}"));
        return Ok(summary);
    }

    store_videos(warehouse, &items, &mut summary).await?;
    Ok(summary)
}

/// Drains the channel's playlists and upserts them.
pub async fn harvest_playlists(
    client: &Arc<YouTubeClient>,
    warehouse: &Warehouse,
    channel_id: &str,
) -> Result<HarvestSummary> {
    let mut summary = HarvestSummary::default();
    let entries = fetch_blocking(client, channel_id, |client, id| {
        client.fetch_playlists(&id)
    })
    .await?;

    if entries.is_empty() {
        summary.warn(format!("no playlists found for channel {channel_id}"));
        return Ok(summary);
    }

    summary.fetched = entries.len();
    for entry in &entries {
        match mapper::map_playlist(entry) {
            Ok(row) => {
                warehouse.upsert_playlist(&row).await?;
                summary.written += 1;
            }
            Err(err) => {
                summary.skipped += 1;
                summary.warn(format!("skipping playlist: {err:#}"));
            }
        }
    }
    Ok(summary)
}

/// Drains the comment threads of every video in the channel's uploads.
/// Videos with disabled comments (and other per-video API failures) become
/// warnings; the remaining videos keep fetching.
pub async fn harvest_comments(
    client: &Arc<YouTubeClient>,
    warehouse: &Warehouse,
    channel_id: &str,
) -> Result<HarvestSummary> {
    let mut summary = HarvestSummary::default();
    let fetched = fetch_blocking(client, channel_id, |client, id| {
        let Some(playlist_id) = client.fetch_uploads_playlist(&id)? else {
            return Ok(None);
        };
        let video_ids = client.fetch_playlist_video_ids(&playlist_id)?;

        let mut threads = Vec::new();
        let mut notes = Vec::new();
        for video_id in &video_ids {
            match client.fetch_comment_threads(video_id) {
                Ok(CommentThreads::Fetched(items)) => threads.extend(items),
                Ok(CommentThreads::Disabled) => {
                    notes.push(format!("comments are disabled for video {video_id}"));
                }
                Err(err) => {
                    notes.push(format!("comments for video {video_id} failed: {err:#}"));
                }
            }
        }
        Ok(Some((threads, notes)))
    })
    .await?;

    let Some((threads, notes)) = fetched else {
        summary.warn(format!("no channel found for id {channel_id}"));
        return Ok(summary);
    };
    for note in notes {
        summary.warn(note);
    }
    if threads.is_empty() {
        summary.warn(format!("no comments found for channel {channel_id}"));
        return Ok(summary);
    }

    store_comments(warehouse, &threads, &mut summary).await?;
    Ok(summary)
}

async fn store_videos(
    warehouse: &Warehouse,
    items: &[VideoItem],
    summary: &mut HarvestSummary,
) -> Result<()> {
    summary.fetched = items.len();
    for item in items {
        match mapper::map_video(item) {
            Ok(row) => {
                warehouse.upsert_video(&row).await?;
                summary.written += 1;
            }
            Err(err) => {
                summary.skipped += 1;
                summary.warn(format!("skipping video: {err:#}"));
            }
        }
    }
    Ok(())
}

async fn store_comments(
    warehouse: &Warehouse,
    threads: &[CommentThreadItem],
    summary: &mut HarvestSummary,
) -> Result<()> {
    summary.fetched = threads.len();
    for thread in threads {
        match mapper::map_comment(thread) {
            Ok(Some(row)) => {
                warehouse.upsert_comment(&row).await?;
                summary.written += 1;
            }
            // No top-level comment means nothing to store.
            Ok(None) => summary.skipped += 1,
            Err(err) => {
                summary.skipped += 1;
                summary.warn(format!("skipping comment: {err:#}"));
            }
        }
    }
    Ok(())
}
