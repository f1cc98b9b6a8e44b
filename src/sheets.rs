//! Google Sheets client for the tracking sheet: one row per video, located by
//! title, mutated in place as the video moves through the pipeline.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Local;

use crate::{
    auth::TokenProvider, config::VaultConfig, error::VaultError, model::VideoMetadata,
};

const ENDPOINT: &str = "https://sheets.googleapis.com/v4/spreadsheets";
const SHEET: &str = "Sheet1";

/// The fixed column schema. Order and presence are invariant; every row is a
/// positional tuple over these.
pub const COLUMNS: [&str; 10] = [
    "Title",
    "Description",
    "Tags",
    "Category",
    "Drive File ID",
    "Playlist",
    "Thumbnail",
    "Upload Date",
    "Download Status",
    "Upload Status",
];

pub const COL_TITLE: &str = "Title";
pub const COL_DRIVE_FILE_ID: &str = "Drive File ID";
pub const COL_DOWNLOAD_STATUS: &str = "Download Status";

pub const STATUS_PENDING: &str = "Pending";
pub const STATUS_COMPLETED: &str = "Completed";
pub const STATUS_COMPLETED_LOCALLY: &str = "Completed Locally";

/// One tracking row, field-per-column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackingRow {
    pub title: String,
    pub description: String,
    pub tags: String,
    pub category: String,
    pub drive_file_id: String,
    pub playlist: String,
    pub thumbnail: String,
    pub upload_date: String,
    pub download_status: String,
    pub upload_status: String,
}

impl TrackingRow {
    /// A freshly registered video: both statuses start out Pending and the
    /// Drive file id is filled in once the upload completes.
    pub fn pending(metadata: &VideoMetadata, playlist_tag: &str) -> Self {
        Self {
            title: metadata.title.clone(),
            description: metadata.description.clone(),
            tags: metadata.joined_tags(),
            category: metadata.category.clone(),
            drive_file_id: String::new(),
            playlist: playlist_tag.to_owned(),
            thumbnail: metadata.thumbnail.clone(),
            upload_date: Local::now().format("%Y-%m-%d").to_string(),
            download_status: STATUS_PENDING.to_owned(),
            upload_status: STATUS_PENDING.to_owned(),
        }
    }

    pub fn to_cells(&self) -> Vec<String> {
        vec![
            self.title.clone(),
            self.description.clone(),
            self.tags.clone(),
            self.category.clone(),
            self.drive_file_id.clone(),
            self.playlist.clone(),
            self.thumbnail.clone(),
            self.upload_date.clone(),
            self.download_status.clone(),
            self.upload_status.clone(),
        ]
    }
}

/// 1-based sheet row number, as returned by [`TrackingSheet::find_row`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RowHandle(pub u32);

#[async_trait]
pub trait TrackingSheet: Send + Sync {
    /// Provision the header row once at startup: written when the first row
    /// is empty, and the whole sheet is cleared and rewritten when the first
    /// row does not match the expected schema.
    async fn ensure_header(&self) -> Result<(), VaultError>;

    async fn append_row(&self, row: &TrackingRow) -> Result<(), VaultError>;

    async fn find_row(&self, title: &str) -> Result<Option<RowHandle>, VaultError>;

    async fn update_cell(&self, row: RowHandle, column: &str, value: &str)
        -> Result<(), VaultError>;

    /// Every cell of one column, header included. Used for duplicate
    /// scanning; lookup is a linear scan, which bounds practical scale to a
    /// few thousand rows.
    async fn column_values(&self, column: &str) -> Result<Vec<String>, VaultError>;
}

pub struct SheetsTracker {
    http: reqwest::Client,
    auth: Arc<TokenProvider>,
    spreadsheet_id: String,
}

#[derive(Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<String>>,
}

impl SheetsTracker {
    pub fn new(config: &VaultConfig, auth: Arc<TokenProvider>, http: reqwest::Client) -> Self {
        Self {
            http,
            auth,
            spreadsheet_id: config.spreadsheet_id.clone(),
        }
    }

    fn values_url(&self, range: &str) -> String {
        format!("{ENDPOINT}/{}/values/{range}", self.spreadsheet_id)
    }

    async fn get_values(&self, range: &str) -> Result<Vec<Vec<String>>, VaultError> {
        let token = self.auth.bearer_token().await?;
        let response = self
            .http
            .get(self.values_url(range))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(VaultError::Tracking(format!(
                "reading {range} returned {}",
                response.status()
            )));
        }

        let range: ValueRange = response.json().await.map_err(|err| {
            VaultError::Tracking(format!("failed to parse sheet values: {err}"))
        })?;
        Ok(range.values)
    }

    async fn put_values(&self, range: &str, values: Vec<Vec<String>>) -> Result<(), VaultError> {
        let token = self.auth.bearer_token().await?;
        let response = self
            .http
            .put(format!("{}?valueInputOption=RAW", self.values_url(range)))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "values": values }))
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(VaultError::Tracking(format!(
                "writing {range} returned {}",
                response.status()
            )));
        }
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), VaultError> {
        let token = self.auth.bearer_token().await?;
        let response = self
            .http
            .post(format!("{}:clear", self.values_url(SHEET)))
            .bearer_auth(&token)
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(VaultError::Tracking(format!(
                "clearing the sheet returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TrackingSheet for SheetsTracker {
    async fn ensure_header(&self) -> Result<(), VaultError> {
        let first_row = self
            .get_values(&format!("{SHEET}!1:1"))
            .await?
            .into_iter()
            .next()
            .unwrap_or_default();
        let expected: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();

        if first_row.is_empty() {
            info!("writing the tracking sheet header");
            self.put_values(&format!("{SHEET}!1:1"), vec![expected]).await?;
        } else if first_row != expected {
            // destructive on purpose: a sheet with a foreign schema is
            // replaced wholesale rather than written into blindly
            warn!("tracking sheet header does not match; clearing the sheet and rewriting it");
            self.clear_all().await?;
            self.put_values(&format!("{SHEET}!1:1"), vec![expected]).await?;
        }

        Ok(())
    }

    async fn append_row(&self, row: &TrackingRow) -> Result<(), VaultError> {
        let token = self.auth.bearer_token().await?;
        let response = self
            .http
            .post(format!(
                "{}:append?valueInputOption=RAW",
                self.values_url(&format!("{SHEET}!A1"))
            ))
            .bearer_auth(&token)
            .json(&serde_json::json!({ "values": [row.to_cells()] }))
            .send()
            .await
            .map_err(transport_err)?;

        if !response.status().is_success() {
            return Err(VaultError::Tracking(format!(
                "appending a row returned {}",
                response.status()
            )));
        }

        debug!("appended tracking row for {:?}", row.title);
        Ok(())
    }

    async fn find_row(&self, title: &str) -> Result<Option<RowHandle>, VaultError> {
        let column = self.column_values(COL_TITLE).await?;

        // index 0 is the header; sheet rows are 1-based
        Ok(column
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, cell)| cell.as_str() == title)
            .map(|(idx, _)| RowHandle(idx as u32 + 1)))
    }

    async fn update_cell(
        &self,
        row: RowHandle,
        column: &str,
        value: &str,
    ) -> Result<(), VaultError> {
        let letter = column_letter(column)?;
        self.put_values(
            &format!("{SHEET}!{letter}{}", row.0),
            vec![vec![value.to_owned()]],
        )
        .await
    }

    async fn column_values(&self, column: &str) -> Result<Vec<String>, VaultError> {
        let letter = column_letter(column)?;
        let rows = self.get_values(&format!("{SHEET}!{letter}:{letter}")).await?;

        Ok(rows
            .into_iter()
            .map(|mut row| {
                if row.is_empty() {
                    String::new()
                } else {
                    row.remove(0)
                }
            })
            .collect())
    }
}

fn transport_err(err: reqwest::Error) -> VaultError {
    VaultError::Tracking(err.to_string())
}

/// A1-notation letter for a named column. The schema is 10 columns wide, so a
/// single letter always suffices.
fn column_letter(column: &str) -> Result<char, VaultError> {
    COLUMNS
        .iter()
        .position(|candidate| *candidate == column)
        .map(|idx| (b'A' + idx as u8) as char)
        .ok_or_else(|| VaultError::Tracking(format!("unknown column {column:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ident;
    use crate::model::VideoMetadata;

    fn metadata() -> VideoMetadata {
        VideoMetadata {
            id: ident::extract("dQw4w9WgXcQ").unwrap(),
            title: "Never Gonna Give You Up".into(),
            description: "classic".into(),
            tags: vec!["music".into(), "80s".into()],
            category: "Music".into(),
            thumbnail: "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq720.jpg".into(),
        }
    }

    #[test]
    fn pending_rows_match_the_schema() {
        let row = TrackingRow::pending(&metadata(), "archive");
        let cells = row.to_cells();

        assert_eq!(cells.len(), COLUMNS.len());
        assert_eq!(cells[0], "Never Gonna Give You Up");
        assert_eq!(cells[2], "music, 80s");
        assert_eq!(cells[4], ""); // Drive File ID is filled after upload
        assert_eq!(cells[5], "archive");
        assert_eq!(cells[8], STATUS_PENDING);
        assert_eq!(cells[9], STATUS_PENDING);
    }

    #[test]
    fn column_letters_follow_the_schema_order() {
        assert_eq!(column_letter("Title").unwrap(), 'A');
        assert_eq!(column_letter("Drive File ID").unwrap(), 'E');
        assert_eq!(column_letter("Download Status").unwrap(), 'I');
        assert_eq!(column_letter("Upload Status").unwrap(), 'J');

        let err = column_letter("Not A Column").unwrap_err();
        assert!(matches!(err, VaultError::Tracking(_)));
    }
}
