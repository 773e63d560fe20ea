//! yt-dlp subprocess extractor

use super::{
    MediaExtractor, ProgressHook, ProgressSample, RawMediaInfo, RawPlaylist, RetrievalOutcome,
    RetrievalRequest,
};
use crate::config::ExtractorConfig;
use crate::error::{Error, Result};
use crate::types::DirectLink;
use async_trait::async_trait;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

const PROGRESS_PREFIX: &str = "[relay]";
const DONE_PREFIX: &str = "[relay-done]";

// One machine-readable line per progress tick
const PROGRESS_TEMPLATE: &str = "download:[relay] %(progress.status)s %(progress.downloaded_bytes)s \
     %(progress.total_bytes)s %(progress.total_bytes_estimate)s %(progress.speed)s %(progress.eta)s";

// Printed once after the final file is in place
const DONE_TEMPLATE: &str = "after_move:[relay-done] %(.{title,ext,filepath})j";

/// Extractor backed by the `yt-dlp` binary
///
/// Metadata calls use `-J`; retrieval parses a custom `--progress-template`
/// line per tick and kills the child when the hook or the token says stop.
///
/// ```no_run
/// use media_relay::config::ExtractorConfig;
/// use media_relay::extractor::{MediaExtractor, YtDlpExtractor};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let extractor = YtDlpExtractor::from_path(ExtractorConfig::default())
///     .expect("yt-dlp not found in PATH");
/// let info = extractor.probe("https://www.youtube.com/watch?v=dQw4w9WgXcQ").await?;
/// println!("{} formats", info.formats.len());
/// # Ok(())
/// # }
/// ```
pub struct YtDlpExtractor {
    program: PathBuf,
    leading_args: Vec<String>,
    config: ExtractorConfig,
}

impl YtDlpExtractor {
    /// Create an extractor with an explicit binary path
    pub fn new(binary_path: PathBuf, config: ExtractorConfig) -> Self {
        Self {
            program: binary_path,
            leading_args: Vec::new(),
            config,
        }
    }

    /// Attempt to find yt-dlp in PATH
    pub fn from_path(config: ExtractorConfig) -> Option<Self> {
        which::which("yt-dlp")
            .ok()
            .map(|path| Self::new(path, config))
    }

    /// Run a shell script in place of the binary
    #[cfg(test)]
    fn scripted(script: &std::path::Path, config: ExtractorConfig) -> Self {
        Self {
            program: PathBuf::from("sh"),
            leading_args: vec![script.display().to_string()],
            config,
        }
    }

    fn command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.leading_args)
            .args([
                "--no-warnings",
                "--no-colors",
                "--user-agent",
                &self.config.user_agent,
                "--retries",
                &self.config.retries.to_string(),
                "--fragment-retries",
                &self.config.fragment_retries.to_string(),
            ])
            .stdin(Stdio::null())
            .kill_on_drop(true);
        cmd
    }

    async fn dump_json<T: DeserializeOwned>(&self, args: &[&str], url: &str) -> Result<T> {
        let mut cmd = self.command();
        cmd.arg("-J").args(args).arg("--").arg(url);

        let output = tokio::time::timeout(self.config.probe_timeout, cmd.output())
            .await
            .map_err(|_| {
                Error::Retrieval(format!(
                    "metadata probe timed out after {}s",
                    self.config.probe_timeout.as_secs()
                ))
            })?
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;

        if !output.status.success() {
            return Err(Error::Retrieval(error_summary(&output.stderr)));
        }
        Ok(serde_json::from_slice(&output.stdout)?)
    }
}

#[derive(Debug, Deserialize)]
struct DirectLinkInfo {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    ext: Option<String>,
}

#[derive(Debug, Default, PartialEq, Deserialize)]
struct DoneLine {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    ext: Option<String>,
    #[serde(default)]
    filepath: Option<String>,
}

#[derive(Debug, PartialEq)]
enum OutputLine {
    Progress(ProgressSample),
    Finished(ProgressSample),
    Done(DoneLine),
}

fn parse_number(token: &str) -> Option<f64> {
    match token {
        "NA" | "None" | "null" => None,
        t => t.parse::<f64>().ok().filter(|v| v.is_finite() && *v >= 0.0),
    }
}

fn parse_output_line(line: &str) -> Option<OutputLine> {
    let line = line.trim();
    if let Some(json) = line.strip_prefix(DONE_PREFIX) {
        return serde_json::from_str(json.trim()).ok().map(OutputLine::Done);
    }
    let rest = line.strip_prefix(PROGRESS_PREFIX)?;
    let tokens: Vec<&str> = rest.split_whitespace().collect();
    let [status, downloaded, total, estimate, speed, eta] = tokens[..] else {
        return None;
    };

    let sample = ProgressSample {
        downloaded: parse_number(downloaded).map(|v| v as u64).unwrap_or(0),
        total: parse_number(total).map(|v| v as u64),
        total_estimate: parse_number(estimate).map(|v| v as u64),
        speed: parse_number(speed),
        eta: parse_number(eta).map(|v| v as u64),
    };
    match status {
        "finished" => Some(OutputLine::Finished(sample)),
        _ => Some(OutputLine::Progress(sample)),
    }
}

/// Last `ERROR:` line of yt-dlp's stderr, or its last non-empty line
fn error_summary(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    lines
        .iter()
        .rev()
        .find_map(|l| l.strip_prefix("ERROR:").map(str::trim))
        .or_else(|| lines.last().copied())
        .map(str::to_string)
        .unwrap_or_else(|| "yt-dlp failed without output".to_string())
}

#[async_trait]
impl MediaExtractor for YtDlpExtractor {
    async fn probe(&self, url: &str) -> Result<RawMediaInfo> {
        self.dump_json(&["--no-playlist"], url).await
    }

    async fn playlist(&self, url: &str) -> Result<RawPlaylist> {
        self.dump_json(&["--flat-playlist"], url).await
    }

    async fn direct_link(&self, url: &str, format: Option<&str>) -> Result<DirectLink> {
        let info: DirectLinkInfo = self
            .dump_json(&["--no-playlist", "-f", format.unwrap_or("best")], url)
            .await?;
        let direct_url = info
            .url
            .ok_or_else(|| Error::Retrieval("Could not get direct link".to_string()))?;
        Ok(DirectLink {
            direct_url,
            title: info.title.unwrap_or_else(|| "video".to_string()),
            ext: info.ext.unwrap_or_else(|| "mp4".to_string()),
        })
    }

    async fn retrieve(
        &self,
        request: &RetrievalRequest,
        hook: &dyn ProgressHook,
        cancel: &CancellationToken,
    ) -> Result<RetrievalOutcome> {
        let template = request
            .output_dir
            .join(format!("{}.%(ext)s", request.file_stem));
        let format = request.format.as_deref().unwrap_or("best");

        let mut cmd = self.command();
        cmd.args([
            "--quiet",
            "--progress",
            "--newline",
            "--no-playlist",
            "--no-simulate",
            "--progress-template",
            PROGRESS_TEMPLATE,
            "--print",
            DONE_TEMPLATE,
            "-f",
            format,
        ]);
        if format.contains('+') {
            cmd.args(["--merge-output-format", "mp4"]);
        }
        cmd.arg("-o")
            .arg(&template)
            .arg("--")
            .arg(&request.url)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::ExternalTool(format!("Failed to execute yt-dlp: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Other("yt-dlp stdout was not captured".into()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Other("yt-dlp stderr was not captured".into()))?;

        // Drain stderr concurrently so a chatty child never blocks on a full pipe
        let stderr_task = tokio::spawn(async move {
            let mut buf = Vec::new();
            let _ = stderr.read_to_end(&mut buf).await;
            buf
        });

        let mut lines = BufReader::new(stdout).lines();
        let mut done: Option<DoneLine> = None;

        loop {
            let line = tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = child.kill().await;
                    return Err(Error::Cancelled);
                }
                line = lines.next_line() => line?,
            };
            let Some(line) = line else { break };

            match parse_output_line(&line) {
                Some(OutputLine::Progress(sample)) => {
                    if let Err(e) = hook.on_progress(&sample) {
                        let _ = child.kill().await;
                        return Err(e);
                    }
                }
                Some(OutputLine::Finished(sample)) => {
                    if let Err(e) = hook.on_progress(&sample) {
                        let _ = child.kill().await;
                        return Err(e);
                    }
                    hook.on_finished();
                }
                Some(OutputLine::Done(line)) => done = Some(line),
                None => tracing::trace!(line = %line, "yt-dlp output"),
            }
        }

        let status = child.wait().await?;
        let stderr = stderr_task.await.unwrap_or_default();
        if !status.success() {
            return Err(Error::Retrieval(error_summary(&stderr)));
        }

        let done = done.ok_or_else(|| {
            Error::Retrieval("yt-dlp exited without reporting an output file".to_string())
        })?;
        Ok(RetrievalOutcome {
            title: done.title.unwrap_or_else(|| "video".to_string()),
            ext: done.ext.unwrap_or_else(|| "mp4".to_string()),
            path: done.filepath.map(PathBuf::from),
        })
    }

    fn name(&self) -> &'static str {
        "yt-dlp"
    }
}
