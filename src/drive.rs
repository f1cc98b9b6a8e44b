//! Google Drive client speaking the v3 resumable-upload protocol: one
//! initiation request opens a session, then the file streams up in
//! `chunk_size` slices until Drive answers with the created file.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{CONTENT_RANGE, LOCATION};
use reqwest::StatusCode;
use tokio::fs::File;
use tokio::io::AsyncReadExt;

use crate::{
    auth::TokenProvider, config::VaultConfig, error::VaultError, model::RemoteFileId,
    progress::ProgressSink,
};

const UPLOAD_ENDPOINT: &str = "https://www.googleapis.com/upload/drive/v3/files";
const FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
const MIME_TYPE: &str = "video/mp4";

#[async_trait]
pub trait FileStore: Send + Sync {
    /// Upload `path` under `name`, reporting a progress fraction after each
    /// transport chunk. Returns the durable remote id.
    async fn upload(
        &self,
        path: &Path,
        name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<RemoteFileId, VaultError>;

    async fn delete(&self, id: &RemoteFileId) -> Result<(), VaultError>;

    async fn file_info(&self, id: &RemoteFileId) -> Result<FileInfo, VaultError>;
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub mime_type: String,
    /// Drive reports the byte size as a decimal string.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
}

#[derive(Deserialize)]
struct CreatedFile {
    id: String,
}

pub struct DriveStore {
    http: reqwest::Client,
    auth: Arc<TokenProvider>,
    folder_id: String,
    chunk_size: usize,
}

impl DriveStore {
    pub fn new(config: &VaultConfig, auth: Arc<TokenProvider>, http: reqwest::Client) -> Self {
        Self {
            http,
            auth,
            folder_id: config.drive_folder_id.clone(),
            chunk_size: config.chunk_size,
        }
    }

    /// Open a resumable upload session; the session URI comes back in the
    /// `Location` header and stays valid long enough for the whole transfer.
    async fn initiate_session(&self, name: &str, total: u64) -> Result<String, VaultError> {
        let token = self.auth.bearer_token().await?;
        let metadata = serde_json::json!({
            "name": name,
            "parents": [self.folder_id],
        });

        let response = self
            .http
            .post(format!("{UPLOAD_ENDPOINT}?uploadType=resumable&fields=id"))
            .bearer_auth(&token)
            .header("X-Upload-Content-Type", MIME_TYPE)
            .header("X-Upload-Content-Length", total.to_string())
            .json(&metadata)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(VaultError::Upload(format!(
                "upload initiation returned {}",
                response.status()
            )));
        }

        response
            .headers()
            .get(LOCATION)
            .and_then(|value| value.to_str().ok())
            .map(str::to_owned)
            .ok_or_else(|| {
                VaultError::Upload("upload initiation response carried no session URI".into())
            })
    }
}

#[async_trait]
impl FileStore for DriveStore {
    async fn upload(
        &self,
        path: &Path,
        name: &str,
        progress: &dyn ProgressSink,
    ) -> Result<RemoteFileId, VaultError> {
        let total = tokio::fs::metadata(path)
            .await
            .map_err(|err| VaultError::Upload(format!("cannot stat {}: {err}", path.display())))?
            .len();
        if total == 0 {
            return Err(VaultError::Upload("refusing to upload an empty file".into()));
        }

        let session_uri = self.initiate_session(name, total).await?;
        info!("uploading {name} ({total} bytes) to Drive");

        let mut file = File::open(path)
            .await
            .map_err(|err| VaultError::Upload(format!("cannot open {}: {err}", path.display())))?;

        let mut offset: u64 = 0;
        let mut file_id = None;

        while offset < total {
            let end = (offset + self.chunk_size as u64).min(total);
            let mut chunk = vec![0u8; (end - offset) as usize];
            file.read_exact(&mut chunk)
                .await
                .map_err(|err| VaultError::Upload(format!("failed to read chunk: {err}")))?;

            let token = self.auth.bearer_token().await?;
            let response = self
                .http
                .put(&session_uri)
                .bearer_auth(&token)
                .header(CONTENT_RANGE, content_range(offset, end, total))
                .body(chunk)
                .send()
                .await
                .map_err(transport_err)?;

            match response.status().as_u16() {
                // 308: the session took the chunk and expects more
                308 => {}
                200 | 201 => {
                    let created: CreatedFile = response.json().await.map_err(|err| {
                        VaultError::Upload(format!("failed to parse the upload response: {err}"))
                    })?;
                    file_id = Some(created.id);
                }
                other => {
                    return Err(VaultError::Upload(format!(
                        "chunk upload returned HTTP {other}"
                    )))
                }
            }

            offset = end;
            progress.report(offset as f64 / total as f64);
        }

        let id = file_id.ok_or_else(|| {
            VaultError::Upload("upload finished but Drive returned no file id".into())
        })?;
        info!("upload complete, file id {id}");

        Ok(RemoteFileId::new(id))
    }

    async fn delete(&self, id: &RemoteFileId) -> Result<(), VaultError> {
        let token = self.auth.bearer_token().await?;
        let response = self
            .http
            .delete(format!("{FILES_ENDPOINT}/{id}"))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_err)?;

        // a file that is already gone counts as deleted
        if response.status().is_success() || response.status() == StatusCode::NOT_FOUND {
            debug!("deleted Drive file {id}");
            Ok(())
        } else {
            Err(VaultError::Upload(format!(
                "delete returned {}",
                response.status()
            )))
        }
    }

    async fn file_info(&self, id: &RemoteFileId) -> Result<FileInfo, VaultError> {
        let token = self.auth.bearer_token().await?;
        let response = self
            .http
            .get(format!(
                "{FILES_ENDPOINT}/{id}?fields=id,name,mimeType,size,createdTime"
            ))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(VaultError::Upload(format!(
                "file lookup returned {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|err| VaultError::Upload(format!("failed to parse file info: {err}")))
    }
}

fn transport_err(err: reqwest::Error) -> VaultError {
    VaultError::Upload(err.to_string())
}

/// `Content-Range` for one chunk: inclusive byte range plus the total size.
fn content_range(start: u64, end: u64, total: u64) -> String {
    format!("bytes {}-{}/{}", start, end - 1, total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_ranges_are_inclusive() {
        assert_eq!(content_range(0, 100, 250), "bytes 0-99/250");
        assert_eq!(content_range(100, 200, 250), "bytes 100-199/250");
        assert_eq!(content_range(200, 250, 250), "bytes 200-249/250");
    }

    #[test]
    fn file_info_decodes_the_drive_shape() {
        let info: FileInfo = serde_json::from_str(
            r#"{
                "id": "abc123",
                "name": "clip.mp4",
                "mimeType": "video/mp4",
                "size": "1048576",
                "createdTime": "2024-05-01T12:00:00.000Z"
            }"#,
        )
        .unwrap();

        assert_eq!(info.id, "abc123");
        assert_eq!(info.mime_type, "video/mp4");
        assert_eq!(info.size.as_deref(), Some("1048576"));
    }
}
