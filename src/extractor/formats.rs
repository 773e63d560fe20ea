//! Raw extractor metadata and the format listing built from it

use serde::Deserialize;
use std::collections::HashSet;

use crate::types::{FormatInfo, MediaInfo, PlaylistEntry, PlaylistInfo};

/// Formats shown to a user are capped so they fit in one chat keyboard
pub const MAX_LISTED_FORMATS: usize = 20;

/// Metadata as reported by the extractor (`yt-dlp -J`)
///
/// Field names follow the extractor's JSON output.
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawMediaInfo {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub formats: Vec<RawFormat>,
}

/// One format descriptor as reported by the extractor
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawFormat {
    #[serde(default)]
    pub format_id: Option<String>,
    #[serde(default)]
    pub format_note: Option<String>,
    #[serde(default)]
    pub ext: Option<String>,
    #[serde(default)]
    pub vcodec: Option<String>,
    #[serde(default)]
    pub acodec: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub fps: Option<f64>,
    #[serde(default)]
    pub filesize: Option<u64>,
    #[serde(default)]
    pub filesize_approx: Option<u64>,
}

/// Flat playlist listing (`yt-dlp -J --flat-playlist`)
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawPlaylist {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub thumbnail: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    /// `None` for a single video; inner `None`s are unavailable entries
    #[serde(default)]
    pub entries: Option<Vec<Option<RawPlaylistEntry>>>,
}

/// One flat playlist entry
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawPlaylistEntry {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub thumbnails: Option<Vec<RawThumbnail>>,
}

/// Thumbnail reference inside a playlist entry
#[allow(missing_docs)]
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct RawThumbnail {
    #[serde(default)]
    pub url: Option<String>,
}

fn has_codec(codec: &Option<String>) -> bool {
    matches!(codec.as_deref(), Some(c) if !c.is_empty() && c != "none")
}

fn resolution_label(format: &RawFormat, has_video: bool) -> String {
    match (format.width, format.height) {
        (Some(w), Some(h)) => format!("{w}x{h}"),
        (None, Some(h)) => format!("{h}p"),
        _ if !has_video => "audio only".to_string(),
        _ => "unknown".to_string(),
    }
}

fn seconds(duration: Option<f64>) -> u64 {
    duration.map(|d| d.max(0.0) as u64).unwrap_or(0)
}

/// Shape raw metadata into the list shown to users
///
/// Keeps formats with video and audio-only formats, deduplicates by format id
/// (alternate encodings of one resolution all survive), sorts by height then
/// fps, highest first, and keeps the top [`MAX_LISTED_FORMATS`].
pub fn build_media_info(raw: RawMediaInfo) -> MediaInfo {
    let mut seen = HashSet::new();
    let mut formats: Vec<FormatInfo> = Vec::new();

    for f in raw.formats {
        let has_video = has_codec(&f.vcodec);
        let has_audio = has_codec(&f.acodec);
        if !has_video && !has_audio {
            continue;
        }
        let format_id = f.format_id.clone().unwrap_or_else(|| "best".to_string());
        if !seen.insert(format_id.clone()) {
            continue;
        }

        formats.push(FormatInfo {
            resolution: resolution_label(&f, has_video),
            quality: f.format_note.clone().unwrap_or_else(|| "unknown".to_string()),
            ext: f.ext.clone().unwrap_or_else(|| "mp4".to_string()),
            filesize: f.filesize.or(f.filesize_approx).unwrap_or(0),
            fps: f.fps,
            vcodec: f.vcodec,
            acodec: f.acodec,
            has_video,
            has_audio,
            height: f.height,
            format_id,
        });
    }

    // Stable sort keeps extractor order among equal keys
    formats.sort_by(|a, b| {
        let ka = (a.height.unwrap_or(0), a.fps.unwrap_or(0.0));
        let kb = (b.height.unwrap_or(0), b.fps.unwrap_or(0.0));
        kb.0.cmp(&ka.0).then(kb.1.total_cmp(&ka.1))
    });
    formats.truncate(MAX_LISTED_FORMATS);

    MediaInfo {
        title: raw.title.unwrap_or_else(|| "Unknown".to_string()),
        thumbnail: raw.thumbnail.unwrap_or_default(),
        duration: seconds(raw.duration),
        formats,
    }
}

/// Shape a flat listing; a non-playlist becomes one entry pointing at `url`
pub fn build_playlist_info(raw: RawPlaylist, url: &str) -> PlaylistInfo {
    let Some(entries) = raw.entries else {
        let title = raw.title.unwrap_or_else(|| "Unknown".to_string());
        return PlaylistInfo {
            is_playlist: false,
            title: title.clone(),
            video_count: None,
            videos: vec![PlaylistEntry {
                id: raw.id,
                title,
                url: url.to_string(),
                thumbnail: raw.thumbnail.unwrap_or_default(),
                duration: seconds(raw.duration),
            }],
        };
    };

    let videos: Vec<PlaylistEntry> = entries
        .into_iter()
        .flatten()
        .map(|entry| {
            let url = entry.url.clone().unwrap_or_else(|| {
                format!(
                    "https://www.youtube.com/watch?v={}",
                    entry.id.as_deref().unwrap_or_default()
                )
            });
            PlaylistEntry {
                thumbnail: entry
                    .thumbnails
                    .as_deref()
                    .and_then(|t| t.first())
                    .and_then(|t| t.url.clone())
                    .unwrap_or_default(),
                title: entry.title.unwrap_or_else(|| "Unknown".to_string()),
                duration: seconds(entry.duration),
                id: entry.id,
                url,
            }
        })
        .collect();

    PlaylistInfo {
        is_playlist: true,
        title: raw.title.unwrap_or_else(|| "Playlist".to_string()),
        video_count: Some(videos.len()),
        videos,
    }
}
