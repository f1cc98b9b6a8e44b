use thiserror::Error;

/// Every failure the pipeline can surface. Collaborator-native errors
/// (reqwest, io, yt-dlp exit statuses) are converted into one of these at the
/// boundary of the component that calls the collaborator and never cross it
/// in their native form.
#[derive(Debug, Error)]
pub enum VaultError {
    /// Malformed or unparseable identifier/URL, or a missing local resource.
    #[error("invalid input: {0}")]
    Validation(String),

    /// Missing required configuration, missing media tooling, or a broken
    /// credentials structure. Fatal at startup.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Playlists, live streams and age-restricted videos are rejected, not
    /// retried.
    #[error("unsupported content: {0}")]
    Unsupported(String),

    #[error("download failed: {0}")]
    Download(String),

    #[error("upload failed: {0}")]
    Upload(String),

    #[error("tracking sheet error: {0}")]
    Tracking(String),

    /// Catch-all wrapper applied at the top-level pipeline boundary. The
    /// inner error keeps its kind and message via `source`.
    #[error("processing failed: {source}")]
    Processing {
        #[source]
        source: Box<VaultError>,
    },
}

impl VaultError {
    /// Wrap an error surfaced from the top-level pipeline call. Validation
    /// failures pass through unchanged so callers can tell bad input apart
    /// from a run that went wrong partway, and an already-wrapped error is
    /// not wrapped twice.
    pub fn into_processing(self) -> Self {
        match self {
            err @ (Self::Validation(_) | Self::Processing { .. }) => err,
            other => Self::Processing {
                source: Box::new(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn processing_wrap_keeps_kind_and_message() {
        let err = VaultError::Download("downloaded file is empty".into()).into_processing();

        let VaultError::Processing { source } = &err else {
            panic!("expected a Processing wrapper, got {err:?}");
        };
        assert!(matches!(**source, VaultError::Download(_)));
        assert_eq!(
            err.to_string(),
            "processing failed: download failed: downloaded file is empty"
        );
    }

    #[test]
    fn validation_passes_through_unwrapped() {
        let err = VaultError::Validation("not a video id".into()).into_processing();
        assert!(matches!(err, VaultError::Validation(_)));
    }

    #[test]
    fn wrapping_is_not_applied_twice() {
        let err = VaultError::Upload("chunk rejected".into())
            .into_processing()
            .into_processing();

        let VaultError::Processing { source } = err else {
            panic!("expected a Processing wrapper");
        };
        assert!(matches!(*source, VaultError::Upload(_)));
    }
}
