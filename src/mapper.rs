#![forbid(unsafe_code)]

//! Pure projections from raw API items to the flat rows stored in SQLite.
//!
//! Numeric statistics arrive as optional JSON strings and default to 0 when
//! absent or unparseable. Publish timestamps are the one strict input: a
//! record whose timestamp fails to parse is rejected here so the harvest
//! loop can skip it with a warning instead of aborting the batch.

use anyhow::{Result, anyhow};
use chrono::DateTime;
use serde::{Deserialize, Serialize};

use crate::youtube::{ChannelItem, CommentThreadItem, PlaylistEntry, VideoItem};

pub const DEFAULT_DURATION: &str = "00:00:00";

/// One row in the `channels` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelRow {
    pub channel_id: String,
    pub channel_name: String,
    pub subscribers: i64,
    pub views: i64,
    pub total_videos: i64,
    pub description: String,
    pub uploads_playlist_id: String,
}

/// One row in the `videos` table. Tags are stored comma-delimited and the
/// thumbnail set as a JSON blob; both are reporting-only payloads.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VideoRow {
    pub video_id: String,
    pub channel_id: String,
    pub channel_title: String,
    pub title: String,
    pub description: String,
    pub published_at: String,
    pub duration: String,
    pub definition: String,
    pub caption: bool,
    pub views: i64,
    pub comments: i64,
    pub favorites: i64,
    pub likes: i64,
    pub dislikes: i64,
    pub tags: String,
    pub thumbnails_json: String,
}

/// One row in the `playlists` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaylistRow {
    pub playlist_id: String,
    pub title: String,
    pub channel_id: String,
    pub channel_title: String,
    pub published_at: String,
    pub item_count: i64,
}

/// One row in the `comments` table.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentRow {
    pub comment_id: String,
    pub video_id: String,
    pub author: String,
    pub text: String,
    pub published_at: String,
}

/// Converts the API's compact ISO-8601 period (`PT#H#M#S`, any group
/// optional) into zero-padded `HH:MM:SS`. Anything that does not fit the
/// pattern renders as `00:00:00`.
pub fn convert_duration(raw: &str) -> String {
    parse_duration_parts(raw)
        .map(|(hours, minutes, seconds)| format!("{hours:02}:{minutes:02}:{seconds:02}"))
        .unwrap_or_else(|| DEFAULT_DURATION.to_string())
}

fn parse_duration_parts(raw: &str) -> Option<(u64, u64, u64)> {
    let rest = raw.strip_prefix("PT")?;
    let (mut hours, mut minutes, mut seconds) = (0u64, 0u64, 0u64);
    let mut digits = String::new();
    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let value = digits.parse::<u64>().ok()?;
        digits.clear();
        match ch {
            'H' => hours = value,
            'M' => minutes = value,
            'S' => seconds = value,
            _ => return None,
        }
    }
    // Trailing digits without a unit letter make the whole string invalid.
    if !digits.is_empty() {
        return None;
    }
    Some((hours, minutes, seconds))
}

/// Reformats an RFC 3339 publish timestamp (fractional seconds allowed) into
/// the SQL-friendly `YYYY-MM-DD HH:MM:SS` shape used by every table.
pub fn normalize_timestamp(raw: &str) -> Option<String> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|timestamp| timestamp.format("%Y-%m-%d %H:%M:%S").to_string())
}

fn required_timestamp(raw: &str, what: &str, id: &str) -> Result<String> {
    normalize_timestamp(raw)
        .ok_or_else(|| anyhow!("{what} {id} has unparseable timestamp {raw:?}"))
}

fn count(value: &Option<String>) -> i64 {
    value
        .as_deref()
        .and_then(|raw| raw.parse::<i64>().ok())
        .unwrap_or(0)
}

/// Channels carry no timestamp, so this projection is total.
pub fn map_channel(item: &ChannelItem) -> ChannelRow {
    let statistics = item.statistics.clone().unwrap_or_default();
    ChannelRow {
        channel_id: item.id.clone(),
        channel_name: item.snippet.title.clone(),
        subscribers: count(&statistics.subscriber_count),
        views: count(&statistics.view_count),
        total_videos: count(&statistics.video_count),
        description: item.snippet.description.clone(),
        uploads_playlist_id: item
            .content_details
            .as_ref()
            .and_then(|details| details.related_playlists.as_ref())
            .and_then(|playlists| playlists.uploads.clone())
            .unwrap_or_default(),
    }
}

pub fn map_video(item: &VideoItem) -> Result<VideoRow> {
    let content = item.content_details.clone().unwrap_or_default();
    let statistics = item.statistics.clone().unwrap_or_default();
    Ok(VideoRow {
        video_id: item.id.clone(),
        channel_id: item.snippet.channel_id.clone(),
        channel_title: item.snippet.channel_title.clone(),
        title: item.snippet.title.clone(),
        description: item.snippet.description.clone(),
        published_at: required_timestamp(&item.snippet.published_at, "video", &item.id)?,
        duration: convert_duration(content.duration.as_deref().unwrap_or_default()),
        definition: content.definition.unwrap_or_default(),
        caption: content.caption.as_deref() == Some("true"),
        views: count(&statistics.view_count),
        comments: count(&statistics.comment_count),
        favorites: count(&statistics.favorite_count),
        likes: count(&statistics.like_count),
        dislikes: count(&statistics.dislike_count),
        tags: item.snippet.tags.join(","),
        thumbnails_json: item.snippet.thumbnails.to_string(),
    })
}

pub fn map_playlist(entry: &PlaylistEntry) -> Result<PlaylistRow> {
    Ok(PlaylistRow {
        playlist_id: entry.id.clone(),
        title: entry.snippet.title.clone(),
        channel_id: entry.snippet.channel_id.clone(),
        channel_title: entry.snippet.channel_title.clone(),
        published_at: required_timestamp(&entry.snippet.published_at, "playlist", &entry.id)?,
        item_count: entry
            .content_details
            .as_ref()
            .and_then(|details| details.item_count)
            .unwrap_or(0),
    })
}

/// Threads without a top-level comment carry nothing worth storing.
pub fn map_comment(item: &CommentThreadItem) -> Result<Option<CommentRow>> {
    let Some(top_level) = item.snippet.top_level_comment.as_ref() else {
        return Ok(None);
    };
    Ok(Some(CommentRow {
        comment_id: item.id.clone(),
        video_id: item.snippet.video_id.clone(),
        author: top_level.snippet.author_display_name.clone(),
        text: top_level.snippet.text_display.clone(),
        published_at: required_timestamp(&top_level.snippet.published_at, "comment", &item.id)?,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::youtube::{ChannelItem, CommentThreadItem, PlaylistEntry, VideoItem};
    use serde_json::json;

    fn video_item(value: serde_json::Value) -> VideoItem {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn converts_full_duration() {
        assert_eq!(convert_duration("PT1H2M3S"), "01:02:03");
    }

    #[test]
    fn converts_seconds_only_duration() {
        assert_eq!(convert_duration("PT45S"), "00:00:45");
    }

    #[test]
    fn garbage_duration_renders_as_zero() {
        assert_eq!(convert_duration("garbage"), "00:00:00");
        assert_eq!(convert_duration(""), "00:00:00");
        assert_eq!(convert_duration("PT12"), "00:00:00");
        assert_eq!(convert_duration("P1DT2H"), "00:00:00");
    }

    #[test]
    fn partial_duration_groups_default_to_zero() {
        assert_eq!(convert_duration("PT7M"), "00:07:00");
        assert_eq!(convert_duration("PT3H"), "03:00:00");
        assert_eq!(convert_duration("PT"), "00:00:00");
    }

    #[test]
    fn normalizes_plain_and_fractional_timestamps() {
        assert_eq!(
            normalize_timestamp("2023-03-04T05:06:07Z").as_deref(),
            Some("2023-03-04 05:06:07")
        );
        assert_eq!(
            normalize_timestamp("2023-03-04T05:06:07.123Z").as_deref(),
            Some("2023-03-04 05:06:07")
        );
        assert!(normalize_timestamp("yesterday").is_none());
        assert!(normalize_timestamp("2023-03-04").is_none());
    }

    #[test]
    fn maps_channel_with_string_statistics() {
        let item: ChannelItem = serde_json::from_value(json!({
            "id": "UC9",
            "snippet": { "title": "Chan", "description": "d" },
            "statistics": { "subscriberCount": "12", "viewCount": "340", "videoCount": "5" },
            "contentDetails": { "relatedPlaylists": { "uploads": "UU9" } }
        }))
        .unwrap();
        let row = map_channel(&item);
        assert_eq!(row.subscribers, 12);
        assert_eq!(row.views, 340);
        assert_eq!(row.total_videos, 5);
        assert_eq!(row.uploads_playlist_id, "UU9");
    }

    #[test]
    fn channel_without_statistics_defaults_to_zero() {
        let item: ChannelItem = serde_json::from_value(json!({
            "id": "UC0",
            "snippet": { "title": "Bare" }
        }))
        .unwrap();
        let row = map_channel(&item);
        assert_eq!(row.subscribers, 0);
        assert_eq!(row.views, 0);
        assert_eq!(row.total_videos, 0);
        assert_eq!(row.uploads_playlist_id, "");
    }

    #[test]
    fn maps_video_with_defaults_for_missing_fields() {
        let item = video_item(json!({
            "id": "vid",
            "snippet": {
                "channelId": "UC9",
                "channelTitle": "Chan",
                "title": "T",
                "publishedAt": "2022-12-31T23:59:59Z"
            }
        }));
        let row = map_video(&item).unwrap();
        assert_eq!(row.published_at, "2022-12-31 23:59:59");
        assert_eq!(row.duration, "00:00:00");
        assert!(!row.caption);
        assert_eq!(row.views, 0);
        assert_eq!(row.comments, 0);
        assert_eq!(row.favorites, 0);
        assert_eq!(row.likes, 0);
        assert_eq!(row.dislikes, 0);
        assert_eq!(row.tags, "");
    }

    #[test]
    fn maps_video_statistics_tags_and_thumbnails() {
        let item = video_item(json!({
            "id": "vid",
            "snippet": {
                "channelId": "UC9",
                "channelTitle": "Chan",
                "title": "T",
                "publishedAt": "2023-01-02T03:04:05Z",
                "tags": ["rust", "sqlite"],
                "thumbnails": { "default": { "url": "https://i.ytimg.com/x.jpg" } }
            },
            "contentDetails": { "duration": "PT1M5S", "definition": "hd", "caption": "true" },
            "statistics": {
                "viewCount": "100", "commentCount": "4", "favoriteCount": "0",
                "likeCount": "9", "dislikeCount": "1"
            }
        }));
        let row = map_video(&item).unwrap();
        assert_eq!(row.duration, "00:01:05");
        assert!(row.caption);
        assert_eq!(row.views, 100);
        assert_eq!(row.likes, 9);
        assert_eq!(row.tags, "rust,sqlite");
        let thumbs: serde_json::Value = serde_json::from_str(&row.thumbnails_json).unwrap();
        assert_eq!(thumbs["default"]["url"], "https://i.ytimg.com/x.jpg");
    }

    #[test]
    fn video_with_bad_timestamp_is_rejected_not_mangled() {
        let item = video_item(json!({
            "id": "vid",
            "snippet": {
                "channelId": "UC9",
                "channelTitle": "Chan",
                "title": "T",
                "publishedAt": "not-a-date"
            }
        }));
        let err = map_video(&item).unwrap_err();
        assert!(err.to_string().contains("vid"));
    }

    #[test]
    fn maps_playlist_with_missing_item_count() {
        let entry: PlaylistEntry = serde_json::from_value(json!({
            "id": "PL1",
            "snippet": {
                "title": "Mix",
                "channelId": "UC9",
                "channelTitle": "Chan",
                "publishedAt": "2021-06-07T08:09:10Z"
            }
        }))
        .unwrap();
        let row = map_playlist(&entry).unwrap();
        assert_eq!(row.published_at, "2021-06-07 08:09:10");
        assert_eq!(row.item_count, 0);
    }

    #[test]
    fn maps_comment_thread_to_row() {
        let item: CommentThreadItem = serde_json::from_value(json!({
            "id": "cmt-1",
            "snippet": {
                "videoId": "vid",
                "topLevelComment": {
                    "snippet": {
                        "textDisplay": "nice",
                        "authorDisplayName": "viewer",
                        "publishedAt": "2024-02-03T04:05:06Z"
                    }
                }
            }
        }))
        .unwrap();
        let row = map_comment(&item).unwrap().unwrap();
        assert_eq!(row.comment_id, "cmt-1");
        assert_eq!(row.video_id, "vid");
        assert_eq!(row.author, "viewer");
        assert_eq!(row.published_at, "2024-02-03 04:05:06");
    }

    #[test]
    fn thread_without_top_level_comment_maps_to_none() {
        let item: CommentThreadItem = serde_json::from_value(json!({
            "id": "cmt-2",
            "snippet": { "videoId": "vid" }
        }))
        .unwrap();
        assert!(map_comment(&item).unwrap().is_none());
    }
}
