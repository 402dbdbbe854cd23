//! Minimal WebDAV client for a user's remote drive.

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use tracing::debug;

use super::credentials::XBearer;
use super::StorageError;
use crate::config::RemoteStorageConfig;

pub struct WebDavClient {
    client: Client,
    base_user_url: String,
    token: String,
}

impl WebDavClient {
    pub fn new(client: Client, config: &RemoteStorageConfig, bearer: &XBearer) -> Self {
        let base_user_url = format!(
            "{}/{}/files/{}",
            config.api_url.trim_end_matches('/'),
            config.webdav_api.trim_matches('/'),
            bearer.user
        );
        Self {
            client,
            base_user_url,
            token: bearer.token.clone(),
        }
    }

    pub fn base_user_url(&self) -> &str {
        &self.base_user_url
    }

    fn authorized(&self, method: Method, url: &str) -> RequestBuilder {
        self.client.request(method, url).bearer_auth(&self.token)
    }

    /// Creates `folder` below the user root and returns the response status.
    /// An existing folder answers 405, which is not an error.
    pub async fn create_folder(&self, folder: &str) -> Result<u16, StorageError> {
        let url = format!("{}/{}", self.base_user_url, folder);
        let method = Method::from_bytes(b"MKCOL").map_err(|err| StorageError::Request {
            url: url.clone(),
            message: err.to_string(),
        })?;
        let response = send(self.authorized(method, &url), &url).await?;
        debug!("MKCOL {} -> {}", url, response.status());
        Ok(response.status().as_u16())
    }

    /// Downloads `file_url`, returning its base name and content.
    pub async fn get_file(&self, file_url: &str) -> Result<(String, Vec<u8>), StorageError> {
        let file_name = file_url
            .split(['?', '#'])
            .next()
            .unwrap_or(file_url)
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();

        let response = send(self.client.get(file_url), file_url).await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(StorageError::NotFound(file_url.to_string())),
            status if !status.is_success() => Err(StorageError::Http {
                url: file_url.to_string(),
                status: status.as_u16(),
            }),
            _ => {
                let body = response
                    .bytes()
                    .await
                    .map_err(|err| request_error(file_url, err))?;
                Ok((file_name, body.to_vec()))
            }
        }
    }

    /// Stores `body` as `{folder}/{file_name}` and returns the response status.
    pub async fn upload_file(
        &self,
        folder: &str,
        file_name: &str,
        body: Vec<u8>,
    ) -> Result<u16, StorageError> {
        let url = if folder.is_empty() {
            format!("{}/{}", self.base_user_url, file_name)
        } else {
            format!("{}/{}/{}", self.base_user_url, folder, file_name)
        };
        let response = send(self.authorized(Method::PUT, &url).body(body), &url).await?;
        debug!("PUT {} -> {}", url, response.status());
        Ok(response.status().as_u16())
    }
}

async fn send(builder: RequestBuilder, url: &str) -> Result<Response, StorageError> {
    builder.send().await.map_err(|err| request_error(url, err))
}

fn request_error(url: &str, err: reqwest::Error) -> StorageError {
    if err.is_timeout() {
        StorageError::Timeout(url.to_string())
    } else if err.is_connect() {
        StorageError::Unreachable {
            url: url.to_string(),
            message: err.to_string(),
        }
    } else {
        StorageError::Request {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}
