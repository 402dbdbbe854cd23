//! Meeting identifier extraction from playback URLs.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};
use std::sync::OnceLock;
use tracing::{error, info};
use url::Url;

use super::error::PipelineError;

const URL_PATTERN: &str = r"(?i)/?(\d+\.\d+)/.*?([0-9a-f]{40}-\d{13})/?";
const MEETING_ID_PATTERN: &str = r"(?i)^[0-9a-f]{40}-\d{13}";
const FALLBACK_SCHEME: &str = "https";
const URL_SUFFIX_LEN: usize = 5;

fn url_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(URL_PATTERN).expect("meeting url pattern is valid"))
}

fn meeting_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(MEETING_ID_PATTERN).expect("meeting id pattern is valid"))
}

/// What a requester asked for. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeetingRequest {
    pub input_url: String,
    #[serde(default)]
    pub requested_name: String,
}

impl MeetingRequest {
    pub fn new(input_url: impl Into<String>, requested_name: impl Into<String>) -> Self {
        Self {
            input_url: input_url.into(),
            requested_name: requested_name.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MeetingIdentity {
    pub platform_version: String,
    pub meeting_id: String,
    pub base_url: String,
}

impl MeetingIdentity {
    /// Extracts version and meeting id from `input_url`. No identity is
    /// produced unless both capture groups match.
    pub fn parse(input_url: &str, presentation_server: &str) -> Result<Self, PipelineError> {
        let captures = url_regex().captures(input_url);
        let (version, meeting_id) = match captures
            .as_ref()
            .and_then(|c| Some((c.get(1)?, c.get(2)?)))
        {
            Some((version, meeting_id)) => (version.as_str(), meeting_id.as_str()),
            None => {
                error!("Meeting ID could not be found in the url {}", input_url);
                return Err(PipelineError::IdentifierNotFound(input_url.to_string()));
            }
        };

        info!("Detected bbb version:\t{}", version);
        info!("Detected meeting id:\t{}", meeting_id);

        let scheme = Url::parse(input_url)
            .map(|url| url.scheme().to_string())
            .unwrap_or_else(|_| FALLBACK_SCHEME.to_string());
        let base_url = format!(
            "{}://{}/presentation/{}/",
            scheme,
            presentation_server.trim_end_matches('/'),
            meeting_id
        );

        Ok(Self {
            platform_version: version.to_string(),
            meeting_id: meeting_id.to_string(),
            base_url,
        })
    }
}

/// Key of the working directory for a request: `{name}-{last 5 chars of url}`,
/// or the bare meeting id when no name was requested. The key is always a
/// single path component inside the downloads directory.
pub fn run_key(
    request: &MeetingRequest,
    identity: &MeetingIdentity,
) -> Result<String, PipelineError> {
    let name = &request.requested_name;
    if name.is_empty() {
        return Ok(identity.meeting_id.clone());
    }
    if !is_valid_name(name) {
        error!("Rejecting recording name {:?}", name);
        return Err(PipelineError::InvalidName(name.clone()));
    }

    let key = format!("{}-{}", name, url_suffix(&request.input_url));
    if !is_plain_name(&key) {
        return Err(PipelineError::InvalidName(key));
    }
    Ok(key)
}

fn is_valid_name(name: &str) -> bool {
    !name.contains("..")
        && !name
            .chars()
            .any(|c| c == '/' || c == '\\' || c.is_control())
}

/// Last characters of the url with trailing slashes dropped and any path
/// separator replaced, so it never adds a directory level.
fn url_suffix(input_url: &str) -> String {
    let trimmed = input_url.trim_end_matches('/');
    let count = trimmed.chars().count();
    trimmed
        .chars()
        .skip(count.saturating_sub(URL_SUFFIX_LEN))
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect()
}

/// A single normal path component, so the key cannot leave the downloads dir.
pub fn is_plain_name(run_key: &str) -> bool {
    if run_key.contains('\\') {
        return false;
    }
    let mut components = Path::new(run_key).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    )
}

/// True when `name` starts with a bare meeting id, i.e. no human readable
/// name was supplied for the run.
pub fn is_meeting_id(name: &str) -> bool {
    meeting_id_regex().is_match(name)
}
