use std::fmt;

use lazy_regex::regex_is_match;
use url::Url;

use crate::error::VaultError;

/// Hosts whose URLs carry the identifier in the path or query.
const VIDEO_HOSTS: &[&str] = &["youtube.com", "www.youtube.com", "m.youtube.com"];
const SHORT_HOST: &str = "youtu.be";

/// The 11-character token naming one video on the platform. Immutable once
/// extracted; the only way to make one is [`extract`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VideoId(String);

impl VideoId {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The canonical watch URL every downstream request is built from,
    /// regardless of which surface syntax the user typed.
    pub fn watch_url(&self) -> String {
        format!("https://www.youtube.com/watch?v={}", self.0)
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

fn is_well_formed(candidate: &str) -> bool {
    regex_is_match!(r"^[A-Za-z0-9_-]{11}$", candidate)
}

/// Parse a user-supplied string into a [`VideoId`]. Accepts a literal
/// 11-character id, a `youtu.be` short link, and the `/watch`, `/shorts/`,
/// `/embed/` and `/v/` URL shapes on the youtube hosts. Everything else fails
/// with a Validation error, as does a URL whose extracted substring is not
/// itself a well-formed id.
#[instrument]
pub fn extract(input: &str) -> Result<VideoId, VaultError> {
    let input = input.trim();

    if is_well_formed(input) {
        return Ok(VideoId(input.to_owned()));
    }

    let url = Url::parse(input)
        .map_err(|err| VaultError::Validation(format!("not a video id or URL: {err}")))?;

    let candidate = match url.host_str() {
        Some(SHORT_HOST) => url
            .path_segments()
            .and_then(|mut segments| segments.next())
            .map(str::to_owned),
        Some(host) if VIDEO_HOSTS.contains(&host) => {
            if url.path() == "/watch" {
                url.query_pairs()
                    .find_map(|(key, value)| (key == "v").then(|| value.into_owned()))
            } else {
                segment_after(&url, "shorts")
                    .or_else(|| segment_after(&url, "embed"))
                    .or_else(|| segment_after(&url, "v"))
            }
        }
        _ => None,
    };

    // a URL can match one of the shapes above and still carry garbage where
    // the id belongs, so the extracted value is validated again
    match candidate {
        Some(id) if is_well_formed(&id) => Ok(VideoId(id)),
        _ => Err(VaultError::Validation(
            "could not extract a valid video id from the input".into(),
        )),
    }
}

/// The path segment immediately following `marker`, if present. The query
/// string is not part of the path, so it never leaks into the result.
fn segment_after(url: &Url, marker: &str) -> Option<String> {
    let mut segments = url.path_segments()?;
    segments.find(|segment| *segment == marker)?;
    segments.next().map(str::to_owned)
}
