#![forbid(unsafe_code)]

//! Blocking YouTube Data API v3 client.
//!
//! All list endpoints share the same envelope: an optional `items` array plus
//! an optional `nextPageToken` continuation cursor. [`drain_pages`] follows
//! the cursor until the API stops returning one; single-id lookups issue one
//! request per target. Callers run these methods on a blocking thread.

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::warn;

use crate::config::RuntimeConfig;

/// videos.list accepts at most this many ids per request.
const ID_BATCH_SIZE: usize = 50;

/// Marker string Google places in the 403 body when a video's owner has
/// turned comments off.
const COMMENTS_DISABLED_MARKER: &str = "commentsDisabled";

pub struct YouTubeClient {
    agent: ureq::Agent,
    api_base: String,
    api_key: String,
    page_size: u32,
}

/// One page of a cursor-paginated list response.
pub struct Page<T> {
    pub items: Vec<T>,
    pub next: Option<String>,
}

/// Outcome of a comment-thread fetch. Disabled comments are an expected
/// per-video condition, not a failure.
pub enum CommentThreads {
    Fetched(Vec<CommentThreadItem>),
    Disabled,
}

enum CallError {
    /// Non-2xx reply; the body is kept so callers can match vendor markers.
    Status { code: u16, body: String },
    Other(anyhow::Error),
}

impl CallError {
    fn into_anyhow(self, endpoint: &str) -> anyhow::Error {
        match self {
            CallError::Status { code, body } => {
                anyhow!("{endpoint} failed with HTTP {code}: {}", truncate(&body, 200))
            }
            CallError::Other(err) => err.context(format!("calling {endpoint}")),
        }
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Follows the continuation cursor until the API omits it, concatenating the
/// items of every page in page order.
pub fn drain_pages<T, E>(
    mut fetch_page: impl FnMut(Option<&str>) -> Result<Page<T>, E>,
) -> Result<Vec<T>, E> {
    let mut all = Vec::new();
    let mut token: Option<String> = None;
    loop {
        let page = fetch_page(token.as_deref())?;
        all.extend(page.items);
        match page.next {
            Some(next) => token = Some(next),
            None => break,
        }
    }
    Ok(all)
}

impl YouTubeClient {
    pub fn new(config: &RuntimeConfig) -> Self {
        Self {
            agent: ureq::agent(),
            api_base: config.api_base.clone(),
            api_key: config.api_key.clone(),
            page_size: config.page_size,
        }
    }

    /// Looks up a single channel. An empty `items` array means the id does
    /// not resolve to a channel and yields `Ok(None)`.
    pub fn fetch_channel(&self, channel_id: &str) -> Result<Option<ChannelItem>> {
        let response: ListResponse<ChannelItem> = self
            .call_list(
                "channels",
                &[
                    ("part", "snippet,contentDetails,statistics"),
                    ("id", channel_id),
                ],
            )
            .map_err(|err| err.into_anyhow("channels.list"))?;
        Ok(response.into_items().into_iter().next())
    }

    /// Resolves the uploads playlist that enumerates a channel's videos.
    pub fn fetch_uploads_playlist(&self, channel_id: &str) -> Result<Option<String>> {
        Ok(self
            .fetch_channel(channel_id)?
            .and_then(|channel| channel.content_details)
            .and_then(|details| details.related_playlists)
            .and_then(|playlists| playlists.uploads))
    }

    /// Drains a playlist into the ordered list of its video ids.
    pub fn fetch_playlist_video_ids(&self, playlist_id: &str) -> Result<Vec<String>> {
        let page_size = self.page_size.to_string();
        let items = drain_pages(|token| {
            let mut params = vec![
                ("part", "snippet"),
                ("playlistId", playlist_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = token {
                params.push(("pageToken", token));
            }
            let response: ListResponse<PlaylistVideoEntry> = self
                .call_list("playlistItems", &params)
                .map_err(|err| err.into_anyhow("playlistItems.list"))?;
            Ok::<_, anyhow::Error>(response.into_page())
        })?;

        Ok(items
            .into_iter()
            .filter_map(|entry| entry.snippet)
            .filter_map(|snippet| snippet.resource_id)
            .map(|resource| resource.video_id)
            .collect())
    }

    /// Fetches full metadata for the given video ids, batching up to 50 ids
    /// per request as the API allows.
    pub fn fetch_video_details(&self, video_ids: &[String]) -> Result<Vec<VideoItem>> {
        let mut details = Vec::with_capacity(video_ids.len());
        for chunk in video_ids.chunks(ID_BATCH_SIZE) {
            let ids = chunk.join(",");
            let response: ListResponse<VideoItem> = self
                .call_list(
                    "videos",
                    &[
                        ("part", "snippet,contentDetails,statistics"),
                        ("id", ids.as_str()),
                    ],
                )
                .map_err(|err| err.into_anyhow("videos.list"))?;
            details.extend(response.into_items());
        }
        Ok(details)
    }

    /// Drains every playlist owned by a channel.
    pub fn fetch_playlists(&self, channel_id: &str) -> Result<Vec<PlaylistEntry>> {
        let page_size = self.page_size.to_string();
        drain_pages(|token| {
            let mut params = vec![
                ("part", "snippet,contentDetails"),
                ("channelId", channel_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = token {
                params.push(("pageToken", token));
            }
            let response: ListResponse<PlaylistEntry> = self
                .call_list("playlists", &params)
                .map_err(|err| err.into_anyhow("playlists.list"))?;
            Ok(response.into_page())
        })
    }

    /// Drains the top-level comment threads of one video. A 403 carrying the
    /// `commentsDisabled` marker reports [`CommentThreads::Disabled`] instead
    /// of an error so sibling videos keep fetching.
    pub fn fetch_comment_threads(&self, video_id: &str) -> Result<CommentThreads> {
        let page_size = self.page_size.to_string();
        let result = drain_pages(|token| {
            let mut params = vec![
                ("part", "snippet"),
                ("videoId", video_id),
                ("maxResults", page_size.as_str()),
            ];
            if let Some(token) = token {
                params.push(("pageToken", token));
            }
            let response: ListResponse<CommentThreadItem> =
                self.call_list("commentThreads", &params)?;
            Ok::<_, CallError>(response.into_page())
        });

        match result {
            Ok(items) => Ok(CommentThreads::Fetched(items)),
            Err(CallError::Status { code, body }) if is_comments_disabled(code, &body) => {
                Ok(CommentThreads::Disabled)
            }
            Err(err) => Err(err.into_anyhow("commentThreads.list")),
        }
    }

    fn call_list<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        params: &[(&str, &str)],
    ) -> Result<ListResponse<T>, CallError> {
        let url = format!("{}/{}", self.api_base, endpoint);
        let mut request = self.agent.get(&url).query("key", &self.api_key);
        for (name, value) in params {
            request = request.query(name, value);
        }

        match request.call() {
            Ok(response) => response
                .into_json::<ListResponse<T>>()
                .with_context(|| format!("parsing {endpoint} response"))
                .map_err(CallError::Other),
            Err(ureq::Error::Status(code, response)) => {
                let body = response.into_string().unwrap_or_default();
                Err(CallError::Status { code, body })
            }
            Err(err) => Err(CallError::Other(
                anyhow::Error::new(err).context(format!("requesting {endpoint}")),
            )),
        }
    }
}

fn is_comments_disabled(code: u16, body: &str) -> bool {
    code == 403 && body.contains(COMMENTS_DISABLED_MARKER)
}

/// Shared list envelope. `items` is optional because the API omits the key
/// entirely when nothing matches; that is an empty result, not an error.
#[derive(Debug, Deserialize)]
struct ListResponse<T> {
    items: Option<Vec<T>>,
    #[serde(rename = "nextPageToken")]
    next_page_token: Option<String>,
}

impl<T> ListResponse<T> {
    fn into_items(self) -> Vec<T> {
        match self.items {
            Some(items) => items,
            None => {
                warn!("list response carried no items");
                Vec::new()
            }
        }
    }

    fn into_page(self) -> Page<T> {
        let next = self.next_page_token.clone();
        Page {
            items: self.into_items(),
            next,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelItem {
    pub id: String,
    pub snippet: ChannelSnippet,
    pub statistics: Option<ChannelStatistics>,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<ChannelContentDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelSnippet {
    pub title: String,
    #[serde(default)]
    pub description: String,
}

/// Statistics come back as JSON strings, not numbers.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChannelStatistics {
    #[serde(rename = "subscriberCount")]
    pub subscriber_count: Option<String>,
    #[serde(rename = "viewCount")]
    pub view_count: Option<String>,
    #[serde(rename = "videoCount")]
    pub video_count: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChannelContentDetails {
    #[serde(rename = "relatedPlaylists")]
    pub related_playlists: Option<RelatedPlaylists>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RelatedPlaylists {
    pub uploads: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PlaylistVideoEntry {
    snippet: Option<PlaylistVideoSnippet>,
}

#[derive(Debug, Deserialize)]
struct PlaylistVideoSnippet {
    #[serde(rename = "resourceId")]
    resource_id: Option<PlaylistResourceId>,
}

#[derive(Debug, Deserialize)]
struct PlaylistResourceId {
    #[serde(rename = "videoId")]
    video_id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoItem {
    pub id: String,
    pub snippet: VideoSnippet,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<VideoContentDetails>,
    pub statistics: Option<VideoStatistics>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct VideoSnippet {
    #[serde(rename = "channelId", default)]
    pub channel_id: String,
    #[serde(rename = "channelTitle", default)]
    pub channel_title: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub thumbnails: serde_json::Value,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoContentDetails {
    pub duration: Option<String>,
    pub definition: Option<String>,
    /// The API reports this boolean as the string "true"/"false".
    pub caption: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct VideoStatistics {
    #[serde(rename = "viewCount")]
    pub view_count: Option<String>,
    #[serde(rename = "commentCount")]
    pub comment_count: Option<String>,
    #[serde(rename = "favoriteCount")]
    pub favorite_count: Option<String>,
    #[serde(rename = "likeCount")]
    pub like_count: Option<String>,
    #[serde(rename = "dislikeCount")]
    pub dislike_count: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistEntry {
    pub id: String,
    pub snippet: PlaylistSnippet,
    #[serde(rename = "contentDetails")]
    pub content_details: Option<PlaylistContentDetails>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaylistSnippet {
    pub title: String,
    #[serde(rename = "channelId", default)]
    pub channel_id: String,
    #[serde(rename = "channelTitle", default)]
    pub channel_title: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PlaylistContentDetails {
    #[serde(rename = "itemCount")]
    pub item_count: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentThreadItem {
    pub id: String,
    pub snippet: CommentThreadSnippet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentThreadSnippet {
    #[serde(rename = "videoId", default)]
    pub video_id: String,
    #[serde(rename = "topLevelComment")]
    pub top_level_comment: Option<TopLevelComment>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TopLevelComment {
    pub snippet: CommentSnippet,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CommentSnippet {
    #[serde(rename = "textDisplay", default)]
    pub text_display: String,
    #[serde(rename = "authorDisplayName", default)]
    pub author_display_name: String,
    #[serde(rename = "publishedAt")]
    pub published_at: String,
}
