//! The core workflow: validate input, fetch metadata, register intent,
//! download, upload, record the result, clean up. One URL at a time, fully
//! synchronously; compensating actions on partial failure.

use std::path::Path;

use crate::{
    config::{StoragePaths, VaultConfig},
    drive::FileStore,
    error::VaultError,
    fetcher::MediaFetcher,
    ident,
    model::{RemoteFileId, VideoMetadata},
    progress::LogProgress,
    sheets::{self, TrackingRow, TrackingSheet},
};

/// How a single invocation ended. A duplicate is an outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessOutcome {
    Processed,
    AlreadyExists,
}

pub struct VideoPipeline<F, S, T> {
    config: VaultConfig,
    paths: StoragePaths,
    fetcher: F,
    store: S,
    sheet: T,
}

impl<F, S, T> VideoPipeline<F, S, T>
where
    F: MediaFetcher,
    S: FileStore,
    T: TrackingSheet,
{
    pub fn new(config: VaultConfig, fetcher: F, store: S, sheet: T) -> Self {
        Self {
            paths: config.paths(),
            config,
            fetcher,
            store,
            sheet,
        }
    }

    /// Process one user-supplied URL or literal id to completion. Every
    /// failure past input validation is surfaced wrapped in the Processing
    /// kind with the inner error preserved; bad input comes back as-is.
    pub async fn process(&self, raw_input: &str) -> Result<ProcessOutcome, VaultError> {
        self.run(raw_input).await.map_err(VaultError::into_processing)
    }

    async fn run(&self, raw_input: &str) -> Result<ProcessOutcome, VaultError> {
        let id = ident::extract(raw_input)?;
        let metadata = self.fetcher.fetch_metadata(&id).await?;

        // Register intent before the download so a crash mid-transfer still
        // leaves a visible trace in the sheet. An existing row belongs to an
        // earlier run and must not be duplicated.
        let already_tracked = self.sheet.find_row(&metadata.title).await?.is_some();
        if already_tracked {
            debug!("tracking row for {:?} already present", metadata.title);
        } else {
            self.sheet
                .append_row(&TrackingRow::pending(&metadata, &self.config.playlist_tag))
                .await?;
        }

        let handle = metadata.as_handle(&self.paths);
        let download_progress = LogProgress::new("download");
        let local = self
            .fetcher
            .download(&metadata, &handle, &download_progress)
            .await?;

        let outcome = self.transfer(&metadata, &local, already_tracked).await;
        self.cleanup(&local).await;
        outcome
    }

    /// Everything that happens after the media is on disk: the duplicate
    /// abort, the upload (or the local-only bookkeeping), and the row update.
    async fn transfer(
        &self,
        metadata: &VideoMetadata,
        local: &Path,
        already_tracked: bool,
    ) -> Result<ProcessOutcome, VaultError> {
        if already_tracked {
            info!("{:?} is already recorded; skipping upload", metadata.title);
            return Ok(ProcessOutcome::AlreadyExists);
        }

        if !self.config.upload_to_drive {
            let row = self.require_row(&metadata.title).await?;
            self.sheet
                .update_cell(row, sheets::COL_DOWNLOAD_STATUS, sheets::STATUS_COMPLETED_LOCALLY)
                .await?;
            self.sheet
                .update_cell(row, sheets::COL_DRIVE_FILE_ID, &local.display().to_string())
                .await?;

            info!("video kept locally at {}", local.display());
            return Ok(ProcessOutcome::Processed);
        }

        let name = local
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| format!("{}.mp4", metadata.id));
        let upload_progress = LogProgress::new("upload");
        let remote = self.store.upload(local, &name, &upload_progress).await?;

        if let Err(err) = self.finalize(&metadata.title, &remote).await {
            // the upload went through but the sheet could not be updated;
            // remove the orphaned Drive file so store and sheet stay in step
            warn!("tracking update failed after upload; removing the uploaded file");
            if let Err(delete_err) = self.store.delete(&remote).await {
                warn!("failed to remove uploaded file {remote}: {delete_err}");
            }
            return Err(err);
        }

        info!("processed {:?}", metadata.title);
        Ok(ProcessOutcome::Processed)
    }

    async fn finalize(&self, title: &str, remote: &RemoteFileId) -> Result<(), VaultError> {
        let row = self.require_row(title).await?;

        self.sheet
            .update_cell(row, sheets::COL_DOWNLOAD_STATUS, sheets::STATUS_COMPLETED)
            .await?;
        self.sheet
            .update_cell(row, sheets::COL_DRIVE_FILE_ID, remote.as_str())
            .await?;
        // Upload Status is reserved for a separate verification pass and
        // stays Pending here.

        Ok(())
    }

    async fn require_row(&self, title: &str) -> Result<sheets::RowHandle, VaultError> {
        self.sheet
            .find_row(title)
            .await?
            .ok_or_else(|| VaultError::Tracking(format!("no tracking row found for {title:?}")))
    }

    /// Best-effort removal of the local file. Failures are logged and
    /// swallowed; they never override the outcome established above.
    async fn cleanup(&self, local: &Path) {
        if self.config.keep_files {
            debug!("keeping local file {}", local.display());
            return;
        }

        match tokio::fs::remove_file(local).await {
            Ok(()) => info!("deleted local file {}", local.display()),
            Err(err) => warn!("failed to delete local file {}: {err}", local.display()),
        }
    }
}
