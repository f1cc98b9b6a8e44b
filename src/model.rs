use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Deserializer};

use crate::{config::StoragePaths, ident::VideoId, sanitize::sanitize_title};

/// yt-dlp emits `null` for fields it could not populate, which plain
/// `#[serde(default)]` rejects.
fn null_to_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// The slice of a yt-dlp `-j` manifest the pipeline reads. Everything else in
/// the manifest is ignored.
#[derive(Debug, Clone, Deserialize)]
pub struct VideoManifest {
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub description: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub tags: Vec<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub categories: Vec<String>,
    #[serde(default, deserialize_with = "null_to_default")]
    pub thumbnail: String,
    #[serde(default, deserialize_with = "null_to_default")]
    pub is_live: bool,
    #[serde(default, deserialize_with = "null_to_default")]
    pub age_limit: u32,
    #[serde(rename = "_type", default)]
    pub manifest_type: Option<String>,
}

/// Everything the tracking sheet and the local filename need to know about a
/// video. Created once per processing attempt, never mutated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoMetadata {
    pub id: VideoId,
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
    pub category: String,
    pub thumbnail: String,
}

impl VideoMetadata {
    pub fn from_manifest(id: VideoId, manifest: VideoManifest) -> Self {
        Self {
            id,
            title: manifest.title,
            description: manifest.description,
            tags: manifest.tags,
            category: manifest.categories.into_iter().next().unwrap_or_default(),
            thumbnail: manifest.thumbnail,
        }
    }

    /// Where the media for this video lives on disk: downloaded into `temp`,
    /// promoted into `processed` once confirmed non-empty.
    pub fn as_handle(&self, paths: &StoragePaths) -> VideoHandle {
        let filename = format!("{}_{}.mp4", sanitize_title(&self.title), self.id);

        VideoHandle {
            temp_path: paths.temp.join(&filename),
            final_path: paths.processed.join(filename),
        }
    }

    /// The sheet stores tags as one comma-separated cell.
    pub fn joined_tags(&self) -> String {
        self.tags.join(", ")
    }
}

#[derive(Debug, Clone)]
pub struct VideoHandle {
    pub temp_path: PathBuf,
    pub final_path: PathBuf,
}

/// Opaque id assigned by the file store once an upload completes. Has no
/// meaning until then.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteFileId(String);

impl RemoteFileId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RemoteFileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::*;
    use crate::ident;

    fn manifest_json() -> &'static str {
        r#"{
            "id": "dQw4w9WgXcQ",
            "title": "Never Gonna Give You Up",
            "description": null,
            "tags": ["music", "80s"],
            "categories": ["Music"],
            "thumbnail": "https://i.ytimg.com/vi/dQw4w9WgXcQ/hq720.jpg",
            "is_live": false,
            "age_limit": 0,
            "_type": "video",
            "duration": 213
        }"#
    }

    #[test]
    fn manifest_tolerates_nulls_and_unknown_fields() {
        let manifest: VideoManifest = serde_json::from_str(manifest_json()).unwrap();

        assert_eq!(manifest.id, "dQw4w9WgXcQ");
        assert_eq!(manifest.description, "");
        assert_eq!(manifest.tags, vec!["music", "80s"]);
        assert!(!manifest.is_live);
        assert_eq!(manifest.manifest_type.as_deref(), Some("video"));
    }

    #[test]
    fn metadata_takes_the_first_category() {
        let manifest: VideoManifest = serde_json::from_str(manifest_json()).unwrap();
        let id = ident::extract("dQw4w9WgXcQ").unwrap();

        let metadata = VideoMetadata::from_manifest(id, manifest);
        assert_eq!(metadata.category, "Music");
        assert_eq!(metadata.joined_tags(), "music, 80s");
    }

    #[test]
    fn handle_paths_carry_the_sanitized_title_and_id() {
        let manifest: VideoManifest = serde_json::from_str(manifest_json()).unwrap();
        let id = ident::extract("dQw4w9WgXcQ").unwrap();
        let metadata = VideoMetadata::from_manifest(id, manifest);

        let paths = StoragePaths::under(&PathBuf::from("/tmp/tubevault-tests"));
        let handle = metadata.as_handle(&paths);

        assert_eq!(
            handle.temp_path,
            PathBuf::from("/tmp/tubevault-tests/videos/temp/Never Gonna Give You Up_dQw4w9WgXcQ.mp4")
        );
        assert_eq!(
            handle.final_path,
            PathBuf::from(
                "/tmp/tubevault-tests/videos/processed/Never Gonna Give You Up_dQw4w9WgXcQ.mp4"
            )
        );
    }
}
