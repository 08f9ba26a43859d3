//! SoundCloud API client
//!
//! Uses the same private v2 API as the web uploader, authenticated with the
//! web session's OAuth token.

use std::path::Path;
use std::time::Duration;

use futures_util::stream;
use reqwest::header::{
    HeaderMap, HeaderName, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_LENGTH, USER_AGENT,
};
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncReadExt;
use tracing::debug;

use crate::error::{MixdownError, Result};
use crate::upload::api::{ChunkProgress, RemoteTrack, TrackApi, Transcoding, UploadPolicy};

pub const API_BASE: &str = "https://api-v2.soundcloud.com";
/// Account whose tracks are listed, unless configured otherwise.
pub const DEFAULT_USER_ID: u64 = 41506;

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) \
    AppleWebKit/537.36 (KHTML, like Gecko) Chrome/105.0.0.0 Safari/537.36";
const CHUNK_SIZE: usize = 64 * 1024;
const LIST_TIMEOUT: Duration = Duration::from_secs(10);
const PUT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const LIST_LIMIT: u32 = 999;

#[derive(Debug, Deserialize)]
struct TrackCollection {
    collection: Vec<RemoteTrack>,
}

/// Fail with the response body when a step isn't successful.
///
/// Bare status codes say little with this API; the body explains.
async fn check(step: &str, response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(MixdownError::Http {
        step: step.to_string(),
        status: status.as_u16(),
        body,
    })
}

/// Client for one SoundCloud account.
#[derive(Debug, Clone)]
pub struct SoundCloudClient {
    client: reqwest::Client,
    base_url: String,
    user_id: u64,
    headers: HeaderMap,
}

impl SoundCloudClient {
    /// Authenticate with `oauth_token`, sending `additional_headers` with every API call.
    pub fn new(
        oauth_token: &str,
        additional_headers: &[(String, String)],
        user_id: u64,
    ) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));
        headers.insert(AUTHORIZATION, header_value(&format!("OAuth {oauth_token}"))?);
        for (name, value) in additional_headers {
            headers.insert(header_name(name)?, header_value(value)?);
        }

        Ok(Self {
            client: reqwest::Client::new(),
            base_url: API_BASE.to_string(),
            user_id,
            headers,
        })
    }

    /// Point at another API host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn transcoding_url(&self, uid: &str) -> String {
        format!("{}/uploads/{uid}/track-transcoding", self.base_url)
    }
}

fn header_name(name: &str) -> Result<HeaderName> {
    HeaderName::from_bytes(name.as_bytes()).map_err(|e| MixdownError::InvalidArgument {
        reason: format!("invalid header name \"{name}\": {e}"),
    })
}

fn header_value(value: &str) -> Result<HeaderValue> {
    HeaderValue::from_str(value).map_err(|e| MixdownError::InvalidArgument {
        reason: format!("invalid header value: {e}"),
    })
}

impl TrackApi for SoundCloudClient {
    async fn list_tracks(&self) -> Result<Vec<RemoteTrack>> {
        let url = format!("{}/users/{}/tracks", self.base_url, self.user_id);
        let response = self
            .client
            .get(&url)
            .headers(self.headers.clone())
            .query(&[("limit", LIST_LIMIT)])
            .timeout(LIST_TIMEOUT)
            .send()
            .await?;
        let tracks: TrackCollection = check("Track list request", response).await?.json().await?;
        debug!("Listed {} remote tracks", tracks.collection.len());
        Ok(tracks.collection)
    }

    async fn upload_policy(&self, filename: &str, filesize: u64) -> Result<UploadPolicy> {
        let url = format!("{}/uploads/track-upload-policy", self.base_url);
        let response = self
            .client
            .post(&url)
            .headers(self.headers.clone())
            .json(&json!({ "filename": filename, "filesize": filesize }))
            .send()
            .await?;
        Ok(check("Upload policy request", response).await?.json().await?)
    }

    async fn put_file(
        &self,
        policy: &UploadPolicy,
        file: &Path,
        progress: ChunkProgress,
    ) -> Result<()> {
        let mut headers = HeaderMap::new();
        for (name, value) in &policy.headers {
            headers.insert(header_name(name)?, header_value(value)?);
        }

        let filesize = tokio::fs::metadata(file).await?.len();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(filesize));
        let reader = tokio::fs::File::open(file).await?;

        let chunks = stream::try_unfold((reader, progress), |(mut reader, progress)| async move {
            let mut chunk = vec![0u8; CHUNK_SIZE];
            let read = reader.read(&mut chunk).await?;
            if read == 0 {
                return Ok::<_, std::io::Error>(None);
            }
            chunk.truncate(read);
            progress(read as u64);
            Ok(Some((chunk, (reader, progress))))
        });

        let response = self
            .client
            .put(&policy.url)
            .headers(headers)
            .body(reqwest::Body::wrap_stream(chunks))
            .timeout(PUT_TIMEOUT)
            .send()
            .await?;
        check("File upload", response).await?;
        Ok(())
    }

    async fn start_transcoding(&self, uid: &str) -> Result<()> {
        let response = self
            .client
            .post(self.transcoding_url(uid))
            .headers(self.headers.clone())
            .send()
            .await?;
        check("Transcoding request", response).await?;
        Ok(())
    }

    async fn transcoding(&self, uid: &str) -> Result<Transcoding> {
        let response = self
            .client
            .get(self.transcoding_url(uid))
            .headers(self.headers.clone())
            .send()
            .await?;
        Ok(check("Transcoding status request", response).await?.json().await?)
    }

    async fn confirm(&self, track: &RemoteTrack, filename: &str, uid: &str) -> Result<()> {
        let url = format!("{}/tracks/soundcloud:tracks:{}", self.base_url, track.id);
        let response = self
            .client
            .put(&url)
            .headers(self.headers.clone())
            .json(&json!({
                "track": {
                    "title": track.title,
                    "replacing_original_filename": filename,
                    "replacing_uid": uid,
                }
            }))
            .send()
            .await?;
        check("Upload confirmation", response).await?;
        Ok(())
    }
}
