//! Metadata extraction and media download, delegated to `yt-dlp`.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use lazy_regex::regex_captures;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tokio::fs;
use walkdir::WalkDir;

use crate::{
    config::VaultConfig,
    error::VaultError,
    ident::VideoId,
    model::{VideoHandle, VideoManifest, VideoMetadata},
    progress::ProgressSink,
};

/// Prefer an mp4/m4a pair so the merge step is cheap; fall back to whatever
/// single file is best.
const FORMAT: &str = "bestvideo[ext=mp4]+bestaudio[ext=m4a]/best[ext=mp4]/best";

#[async_trait]
pub trait MediaFetcher: Send + Sync {
    async fn fetch_metadata(&self, id: &VideoId) -> Result<VideoMetadata, VaultError>;

    /// Download the media into the handle's temp path and promote it to the
    /// final path once confirmed non-empty. Returns the final path.
    async fn download(
        &self,
        metadata: &VideoMetadata,
        handle: &VideoHandle,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf, VaultError>;
}

#[derive(Debug, Clone)]
pub struct YtDlp {
    max_retries: u32,
}

impl YtDlp {
    pub fn new(config: &VaultConfig) -> Self {
        Self {
            max_retries: config.max_retries,
        }
    }

    /// Both yt-dlp and ffmpeg must be invocable before any work is accepted.
    pub async fn check_binaries() -> Result<(), VaultError> {
        for (binary, arg) in [("yt-dlp", "--version"), ("ffmpeg", "-version")] {
            let status = Command::new(binary)
                .arg(arg)
                .stdout(Stdio::null())
                .stderr(Stdio::null())
                .status()
                .await;

            match status {
                Ok(status) if status.success() => trace!("{binary} is available"),
                Ok(status) => {
                    return Err(VaultError::Configuration(format!(
                        "{binary} exited with {status}"
                    )))
                }
                Err(err) => {
                    return Err(VaultError::Configuration(format!(
                        "{binary} is not available: {err}"
                    )))
                }
            }
        }

        Ok(())
    }
}

#[async_trait]
impl MediaFetcher for YtDlp {
    async fn fetch_metadata(&self, id: &VideoId) -> Result<VideoMetadata, VaultError> {
        let url = id.watch_url();
        debug!("fetching video manifest for {url}");

        let mut cmd = Command::new("yt-dlp");
        cmd.args(["-j", "--no-playlist", "--retries"])
            .arg(self.max_retries.to_string())
            .arg(&url);
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd
            .output()
            .await
            .map_err(|err| VaultError::Download(format!("failed to run yt-dlp: {err}")))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(classify_metadata_failure(&stderr));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        let manifest: VideoManifest = serde_json::from_str(&stdout)
            .map_err(|err| VaultError::Download(format!("failed to parse video manifest: {err}")))?;

        classify_manifest(&manifest)?;
        trace!("fetched manifest for {:?}", manifest.title);

        Ok(VideoMetadata::from_manifest(id.clone(), manifest))
    }

    async fn download(
        &self,
        metadata: &VideoMetadata,
        handle: &VideoHandle,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf, VaultError> {
        info!("downloading {:?}", metadata.title);

        let mut cmd = Command::new("yt-dlp");
        cmd.args([
            "-f",
            FORMAT,
            "--merge-output-format",
            "mp4",
            "--no-playlist",
            // one progress line per update instead of carriage returns
            "--newline",
            "--retries",
        ])
        .arg(self.max_retries.to_string())
        .arg("-o")
        .arg(&handle.temp_path)
        .arg(metadata.id.watch_url());
        cmd.stdout(Stdio::piped()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|err| VaultError::Download(format!("failed to run yt-dlp: {err}")))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let mut stderr_buf = String::new();

        // drain both pipes before waiting so neither side can fill up and
        // stall the child
        tokio::join!(
            async {
                if let Some(stdout) = stdout {
                    let mut lines = BufReader::new(stdout).lines();
                    while let Ok(Some(line)) = lines.next_line().await {
                        if let Some(fraction) = parse_progress_line(&line) {
                            progress.report(fraction);
                        }
                    }
                }
            },
            async {
                if let Some(mut stderr) = stderr {
                    let _ = stderr.read_to_string(&mut stderr_buf).await;
                }
            },
        );

        let status = child
            .wait()
            .await
            .map_err(|err| VaultError::Download(format!("failed to wait for yt-dlp: {err}")))?;

        if !status.success() {
            cleanup_partial(&handle.temp_path).await;
            return Err(classify_download_failure(&stderr_buf));
        }

        promote(handle).await
    }
}

/// Promote a finished download from the temp location to the processed
/// location. The output must exist and be non-empty; a zero-byte file is
/// never promoted.
pub(crate) async fn promote(handle: &VideoHandle) -> Result<PathBuf, VaultError> {
    let output = match fs::metadata(&handle.temp_path).await {
        Ok(meta) => Some((handle.temp_path.clone(), meta.len())),
        // yt-dlp occasionally settles on its own extension
        Err(_) => locate_output(&handle.temp_path),
    };

    let Some((path, len)) = output else {
        return Err(VaultError::Download(
            "download finished but no output file was produced".into(),
        ));
    };

    if len == 0 {
        return Err(VaultError::Download("downloaded file is empty".into()));
    }

    if let Some(parent) = handle.final_path.parent() {
        fs::create_dir_all(parent).await.map_err(|err| {
            VaultError::Download(format!("failed to create {}: {err}", parent.display()))
        })?;
    }

    fs::rename(&path, &handle.final_path).await.map_err(|err| {
        VaultError::Download(format!("failed to move download into place: {err}"))
    })?;

    debug!("download promoted to {}", handle.final_path.display());
    Ok(handle.final_path.clone())
}

/// Find the file yt-dlp actually wrote when it is not at the expected path:
/// anything in the same directory sharing the expected stem.
fn locate_output(expected: &Path) -> Option<(PathBuf, u64)> {
    let dir = expected.parent()?;
    let stem = expected.file_stem()?.to_str()?.to_owned();

    WalkDir::new(dir)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .find_map(|entry| {
            let name = entry.file_name().to_str()?;
            if name.starts_with(&stem) {
                let len = entry.metadata().ok()?.len();
                Some((entry.path().to_owned(), len))
            } else {
                None
            }
        })
}

async fn cleanup_partial(temp_path: &Path) {
    if let Some((path, _)) = locate_output(temp_path) {
        match fs::remove_file(&path).await {
            Ok(()) => debug!("removed partial download {}", path.display()),
            Err(err) => warn!("failed to remove partial download {}: {err}", path.display()),
        }
    }
}

/// yt-dlp with `--newline` prints lines like
/// `[download]  42.7% of 120.53MiB at 4.21MiB/s ETA 00:17`.
fn parse_progress_line(line: &str) -> Option<f64> {
    let (_, percent) = regex_captures!(r"^\[download\]\s+(\d+(?:\.\d+)?)%", line)?;
    let percent: f64 = percent.parse().ok()?;
    Some((percent / 100.0).clamp(0.0, 1.0))
}

fn classify_manifest(manifest: &VideoManifest) -> Result<(), VaultError> {
    if manifest.manifest_type.as_deref() == Some("playlist") {
        return Err(VaultError::Unsupported(
            "the URL refers to a playlist, not a single video".into(),
        ));
    }
    if manifest.is_live {
        return Err(VaultError::Unsupported("live streams cannot be captured".into()));
    }
    if manifest.age_limit > 0 {
        return Err(VaultError::Unsupported(
            "age-restricted videos cannot be captured".into(),
        ));
    }

    Ok(())
}

fn classify_metadata_failure(stderr: &str) -> VaultError {
    if stderr.contains("Sign in to confirm your age") {
        VaultError::Unsupported("age-restricted videos cannot be captured".into())
    } else if stderr.contains("Video unavailable") {
        VaultError::Download("video is unavailable or has been removed".into())
    } else if stderr.contains("Private video") {
        VaultError::Download("this video is private".into())
    } else {
        VaultError::Download(format!("yt-dlp failed: {}", stderr.trim()))
    }
}

fn classify_download_failure(stderr: &str) -> VaultError {
    if stderr.contains("No video formats") {
        VaultError::Download("no suitable video formats found".into())
    } else if stderr.contains("Unsupported URL") {
        VaultError::Download("the URL is not supported".into())
    } else {
        VaultError::Download(format!("yt-dlp failed: {}", stderr.trim()))
    }
}
