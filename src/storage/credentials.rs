use serde::Deserialize;

use super::StorageError;

/// Remote storage credentials carried in the `X-Bearer` header as
/// `{"user": "...", "token": "..."}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XBearer {
    pub user: String,
    pub token: String,
}

#[derive(Deserialize)]
struct RawBearer {
    user: Option<String>,
    token: Option<String>,
}

impl XBearer {
    pub fn parse(raw: Option<&str>) -> Result<Self, StorageError> {
        let raw = raw.ok_or_else(|| invalid("missing X-Bearer header"))?;
        let parsed: RawBearer =
            serde_json::from_str(raw).map_err(|err| invalid(&format!("Incorrect X-BEARER: {}", err)))?;

        match (parsed.user, parsed.token) {
            (Some(user), Some(token)) if !user.is_empty() && !token.is_empty() => {
                Ok(Self { user, token })
            }
            _ => Err(invalid("Incorrect X-BEARER")),
        }
    }
}

fn invalid(message: &str) -> StorageError {
    StorageError::InvalidCredentials(message.to_string())
}
