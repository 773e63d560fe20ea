//! Human-readable message formatting for chat output

pub use crate::delivery::caption::{format_bytes, format_size};
use crate::delivery::UploadSnapshot;
use crate::types::{FormatInfo, JobSnapshot};

/// Button labels longer than this are cut with an ellipsis
pub const MAX_BUTTON_TEXT: usize = 60;

/// Bot API limit on callback data
pub const MAX_CALLBACK_BYTES: usize = 64;

/// `m:ss` or `h:mm:ss`; `Unknown` for zero
pub fn format_duration(seconds: u64) -> String {
    if seconds == 0 {
        return "Unknown".to_string();
    }
    let (h, m, s) = (seconds / 3600, seconds % 3600 / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// `42s`, `3m 5s`, `1h 20m`
pub fn format_eta(seconds: u64) -> String {
    if seconds < 60 {
        format!("{seconds}s")
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else {
        format!("{}h {}m", seconds / 3600, seconds % 3600 / 60)
    }
}

/// `[██████░░░░]` with `length` cells
pub fn progress_bar(percentage: f64, length: usize) -> String {
    let filled = ((length as f64 * percentage / 100.0) as usize).min(length);
    format!("[{}{}]", "█".repeat(filled), "░".repeat(length - filled))
}

/// Cut to `max` characters, ending in `...` when cut
pub fn truncate(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let kept: String = text.chars().take(max.saturating_sub(3)).collect();
    format!("{kept}...")
}

/// `1080p 60fps (mp4) - 120.50 MB`
pub fn format_button_text(format: &FormatInfo) -> String {
    let fps = format
        .fps
        .filter(|f| *f > 0.0)
        .map(|f| format!(" {}fps", f.round() as u64))
        .unwrap_or_default();
    let text = format!(
        "{}{} ({}) - {}",
        format.resolution,
        fps,
        format.ext,
        format_size(format.filesize)
    );
    truncate(&text, MAX_BUTTON_TEXT)
}

/// `dl:<pending>:<format>`, falling back to `best` when over the byte limit
///
/// `:` and `/` in the format id are replaced so the data splits cleanly.
pub fn format_callback(pending_id: &str, format_id: &str) -> String {
    let safe = format_id.replace([':', '/'], "_");
    let data = format!("dl:{pending_id}:{safe}");
    if data.len() > MAX_CALLBACK_BYTES {
        format!("dl:{pending_id}:best")
    } else {
        data
    }
}

/// Status text for a running retrieval
pub fn download_progress_text(snapshot: &JobSnapshot) -> String {
    format!(
        "📥 Downloading... {:.0}%\n{} {}\n{} / {}",
        snapshot.percentage,
        progress_bar(snapshot.percentage, 20),
        if snapshot.speed > 0.0 {
            format!("{}/s", format_bytes(snapshot.speed as u64))
        } else {
            String::new()
        },
        format_size(snapshot.downloaded_bytes),
        format_size(snapshot.total_bytes),
    )
}

/// Status text for a running upload
pub fn upload_progress_text(name: &str, snapshot: &UploadSnapshot) -> String {
    let header = if snapshot.parts > 1 {
        format!("⬆️ Uploading Part {}/{}", snapshot.part, snapshot.parts)
    } else {
        "⬆️ Uploading File".to_string()
    };
    let (speed, eta) = match (snapshot.speed, snapshot.eta) {
        (Some(speed), Some(eta)) => (
            format!("{}/s", format_bytes(speed as u64)),
            format_eta(eta),
        ),
        (Some(speed), None) => (format!("{}/s", format_bytes(speed as u64)), "-".to_string()),
        _ => ("Calculating...".to_string(), "Calculating...".to_string()),
    };
    format!(
        "{header}\n📄 {}\n\n{} {:.1}%\n\n📤 Uploaded: {} / {}\n⚡ Remaining: {}\n🚀 Speed: {speed}\n⏱️ ETA: {eta}",
        truncate(name, 40),
        progress_bar(snapshot.percentage, 20),
        snapshot.percentage,
        format_bytes(snapshot.uploaded),
        format_bytes(snapshot.total),
        format_bytes(snapshot.total.saturating_sub(snapshot.uploaded)),
    )
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn durations_and_etas() {
        assert_eq!(format_duration(0), "Unknown");
        assert_eq!(format_duration(65), "1:05");
        assert_eq!(format_duration(3725), "1:02:05");
        assert_eq!(format_eta(42), "42s");
        assert_eq!(format_eta(185), "3m 5s");
        assert_eq!(format_eta(4800), "1h 20m");
    }

    #[test]
    fn progress_bar_fills_proportionally() {
        assert_eq!(progress_bar(0.0, 4), "[░░░░]");
        assert_eq!(progress_bar(50.0, 4), "[██░░]");
        assert_eq!(progress_bar(250.0, 4), "[████]");
    }

    #[test]
    fn button_text_is_truncated() {
        let format = FormatInfo {
            format_id: "137".into(),
            quality: "1080p".into(),
            resolution: "1920x1080".into(),
            ext: "mp4".into(),
            filesize: 0,
            fps: Some(30.0),
            vcodec: None,
            acodec: None,
            has_video: true,
            has_audio: false,
            height: Some(1080),
        };
        assert_eq!(format_button_text(&format), "1920x1080 30fps (mp4) - Unknown");

        let long = FormatInfo {
            resolution: "x".repeat(80),
            ..format
        };
        let text = format_button_text(&long);
        assert_eq!(text.chars().count(), MAX_BUTTON_TEXT);
        assert!(text.ends_with("..."));
    }

    #[test]
    fn callback_data_respects_limit() {
        assert_eq!(format_callback("ab12cd34", "137"), "dl:ab12cd34:137");
        assert_eq!(format_callback("ab12cd34", "a:b/c"), "dl:ab12cd34:a_b_c");
        let long = "f".repeat(80);
        assert_eq!(format_callback("ab12cd34", &long), "dl:ab12cd34:best");
    }

    #[test]
    fn upload_text_shows_calculating_before_speed() {
        let snap = UploadSnapshot {
            uploaded: 10,
            total: 100,
            percentage: 10.0,
            speed: None,
            eta: None,
            elapsed: Duration::ZERO,
            part: 2,
            parts: 3,
        };
        let text = upload_progress_text("clip.mp4", &snap);
        assert!(text.contains("Part 2/3"));
        assert!(text.contains("Calculating..."));
    }
}
