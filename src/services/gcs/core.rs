// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::fmt::Debug;
use std::fmt::Formatter;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::header::CONTENT_LENGTH;
use http::header::CONTENT_RANGE;
use http::header::CONTENT_TYPE;
use http::header::RANGE;
use http::Request;
use http::StatusCode;
use serde::Deserialize;

use super::credential::read_body;
use super::credential::GoogleTokenLoader;
use super::error::parse_error;
use crate::raw::*;
use crate::*;

/// Default service endpoint.
pub const DEFAULT_GCS_ENDPOINT: &str = "https://storage.googleapis.com";

/// Resumable-upload chunk size. The API requires a multiple of 256 KiB for
/// every chunk but the last.
pub const GCS_CHUNK_SIZE: usize = 1024 * 1024;

/// Environment variables carrying HMAC interoperability keys for presigning.
pub const GCS_HMAC_ACCESS_KEY_ENV: &str = "GCS_HMAC_ACCESS_KEY";
pub const GCS_HMAC_SECRET_ENV: &str = "GCS_HMAC_SECRET";

pub struct GcsCore {
    pub bucket: String,
    pub endpoint: String,

    pub client: HttpClient,
    pub tokens: Arc<TokenManager<GoogleTokenLoader>>,
}

impl Debug for GcsCore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsCore")
            .field("bucket", &self.bucket)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl GcsCore {
    /// Object resource URL of the JSON API. Keys are addressed as a single
    /// path segment, so `/` arrives encoded.
    fn object_url(&self, key: &str) -> String {
        format!(
            "{}/storage/v1/b/{}/o/{}",
            self.endpoint,
            self.bucket,
            percent_encode_component(key)
        )
    }

    async fn bearer(&self) -> Result<String> {
        let token = self.tokens.get("").await?;
        Ok(format!("Bearer {token}"))
    }

    pub async fn gcs_get_object_metadata(&self, key: &str) -> Result<Option<GcsObjectMeta>> {
        let url = self.object_url(key);

        let resp = self
            .client
            .execute(|| async {
                Request::get(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let bs = read_body(resp).await?;
                let meta = serde_json::from_slice(&bs).map_err(new_json_deserialize_error)?;
                Ok(Some(meta))
            }
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(parse_error(resp).await.with_operation("gcs::get_object_metadata")),
        }
    }

    pub async fn gcs_bucket_exists(&self) -> Result<bool> {
        let url = format!("{}/storage/v1/b/{}", self.endpoint, self.bucket);

        let resp = self
            .client
            .execute(|| async {
                Request::get(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(parse_error(resp).await.with_operation("gcs::bucket_exists")),
        }
    }

    pub async fn gcs_list_page(
        &self,
        args: &ListArgs,
        token: Option<&str>,
    ) -> Result<ListObjectsOutput> {
        let mut url = format!(
            "{}/storage/v1/b/{}/o?prefix={}",
            self.endpoint,
            self.bucket,
            percent_encode_component(&args.prefix)
        );
        if args.delimited {
            url.push_str("&delimiter=%2F");
        }
        if let Some(limit) = args.limit {
            url.push_str(&format!("&maxResults={limit}"));
        }
        if let Some(token) = token {
            url.push_str(&format!("&pageToken={}", percent_encode_component(token)));
        }

        let resp = self
            .client
            .execute(|| async {
                Request::get(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let bs = read_body(resp).await?;
                serde_json::from_slice(&bs).map_err(new_json_deserialize_error)
            }
            StatusCode::NOT_FOUND => Err(Error::new(ErrorKind::NotFound, "bucket not found")
                .with_context("bucket", self.bucket.clone())),
            _ => Err(parse_error(resp).await.with_operation("gcs::list_objects")),
        }
    }

    pub async fn gcs_delete_object(&self, key: &str) -> Result<()> {
        let url = self.object_url(key);

        let resp = self
            .client
            .execute(|| async {
                Request::delete(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::NO_CONTENT => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::new(ErrorKind::NotFound, "no such object")
                .with_context("key", key)
                .with_operation("gcs::delete_object")),
            _ => Err(parse_error(resp).await.with_operation("gcs::delete_object")),
        }
    }

    /// Create a zero-byte object via the simple media upload.
    pub async fn gcs_insert_empty_object(&self, key: &str) -> Result<()> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=media&name={}",
            self.endpoint,
            self.bucket,
            percent_encode_component(key)
        );

        let resp = self
            .client
            .execute(|| async {
                Request::post(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .header(CONTENT_LENGTH, 0)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(()),
            _ => Err(parse_error(resp).await.with_operation("gcs::insert_empty_object")),
        }
    }

    /// One step of the rewrite loop.
    pub async fn gcs_rewrite_step(
        &self,
        src_bucket: &str,
        src_key: &str,
        dst_key: &str,
        rewrite_token: Option<&str>,
    ) -> Result<RewriteOutput> {
        let mut url = format!(
            "{}/storage/v1/b/{}/o/{}/rewriteTo/b/{}/o/{}",
            self.endpoint,
            src_bucket,
            percent_encode_component(src_key),
            self.bucket,
            percent_encode_component(dst_key)
        );
        if let Some(token) = rewrite_token {
            url.push_str(&format!("?rewriteToken={}", percent_encode_component(token)));
        }

        let resp = self
            .client
            .execute(|| async {
                Request::post(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .header(CONTENT_LENGTH, 0)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let bs = read_body(resp).await?;
                serde_json::from_slice(&bs).map_err(new_json_deserialize_error)
            }
            StatusCode::NOT_FOUND => Err(Error::new(ErrorKind::NotFound, "source object not found")
                .with_context("key", src_key)
                .with_operation("gcs::rewrite")),
            _ => Err(parse_error(resp).await.with_operation("gcs::rewrite")),
        }
    }

    /// Open a ranged download. `Ok(None)` translates 416 into end-of-stream.
    pub async fn gcs_open_range(&self, key: &str, offset: u64) -> Result<Option<HttpBody>> {
        let url = format!("{}?alt=media", self.object_url(key));

        let resp = self
            .client
            .execute(|| async {
                Request::get(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .header(RANGE, range_from(offset))
                    .body(Bytes::new())
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::PARTIAL_CONTENT | StatusCode::OK => Ok(Some(HttpBody::new(resp))),
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(None),
            _ => Err(parse_error(resp).await.with_operation("gcs::read_object")),
        }
    }

    /// Start a resumable upload session, returning the session URL.
    pub async fn gcs_start_resumable_upload(&self, key: &str) -> Result<String> {
        let url = format!(
            "{}/upload/storage/v1/b/{}/o?uploadType=resumable",
            self.endpoint, self.bucket
        );
        let body = serde_json::json!({ "name": key }).to_string();

        let resp = self
            .client
            .execute(|| async {
                Request::post(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .header(CONTENT_TYPE, "application/json; charset=UTF-8")
                    .body(Bytes::from(body.clone()))
                    .map_err(new_request_build_error)
            })
            .await?;

        if resp.status() != StatusCode::OK {
            return Err(parse_error(resp).await.with_operation("gcs::start_resumable_upload"));
        }
        resp.headers()
            .get(http::header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string())
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Unexpected,
                    "resumable upload response had no session url",
                )
                .with_operation("gcs::start_resumable_upload")
            })
    }

    /// Upload one chunk to a resumable session.
    ///
    /// Non-final chunks report the total as `*` and expect `308 Resume
    /// Incomplete`; the final chunk carries the definitive size and expects
    /// `200`/`201`. An empty finalizing chunk is expressed as `bytes */N`.
    pub async fn gcs_upload_chunk(
        &self,
        session_url: &str,
        offset: u64,
        chunk: Bytes,
        finalize: bool,
    ) -> Result<()> {
        let content_range = if finalize {
            let total = offset + chunk.len() as u64;
            if chunk.is_empty() {
                format!("bytes */{total}")
            } else {
                format!("bytes {}-{}/{total}", offset, total - 1)
            }
        } else {
            debug_assert!(!chunk.is_empty(), "non-final chunks are whole chunks");
            format!("bytes {}-{}/*", offset, offset + chunk.len() as u64 - 1)
        };

        let resp = self
            .client
            .execute(|| async {
                Request::put(session_url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .header(CONTENT_TYPE, "application/octet-stream")
                    .header(CONTENT_RANGE, content_range.clone())
                    .body(chunk.clone())
                    .map_err(new_request_build_error)
            })
            .await?;

        let status = resp.status();
        let accepted = if finalize {
            status == StatusCode::OK || status == StatusCode::CREATED
        } else {
            status.as_u16() == 308
        };
        if accepted {
            return Ok(());
        }
        Err(parse_error(resp)
            .await
            .with_operation("gcs::upload_chunk")
            .with_context("content_range", content_range))
    }

    /// Best-effort metadata patch storing a computed MD5.
    ///
    /// `generation` guards against concurrent overwrites; `false` means the
    /// object changed and the update was abandoned.
    pub async fn gcs_patch_md5(
        &self,
        key: &str,
        md5_b64: &str,
        generation: Option<&str>,
    ) -> Result<bool> {
        let mut url = self.object_url(key);
        if let Some(generation) = generation {
            url.push_str(&format!(
                "?ifGenerationMatch={}",
                percent_encode_component(generation)
            ));
        }
        let body = serde_json::json!({ "md5Hash": md5_b64 }).to_string();

        let resp = self
            .client
            .execute(|| async {
                Request::patch(&url)
                    .header(AUTHORIZATION, self.bearer().await?)
                    .header(CONTENT_TYPE, "application/json; charset=UTF-8")
                    .body(Bytes::from(body.clone()))
                    .map_err(new_request_build_error)
            })
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::PRECONDITION_FAILED => Ok(false),
            _ => Err(parse_error(resp).await.with_operation("gcs::patch_md5")),
        }
    }

    /// Presign a GET against the XML endpoint using HMAC interoperability
    /// keys from the environment.
    pub fn gcs_presign_read(&self, key: &str, expire: Duration) -> Result<SignedUrl> {
        let access_key = std::env::var(GCS_HMAC_ACCESS_KEY_ENV).ok();
        let secret_key = std::env::var(GCS_HMAC_SECRET_ENV).ok();
        let (Some(access_key), Some(secret_key)) = (access_key, secret_key) else {
            return Err(Error::new(
                ErrorKind::ConfigInvalid,
                "presigning requires hmac interoperability keys",
            )
            .with_context("env", GCS_HMAC_ACCESS_KEY_ENV)
            .with_operation("gcs::presign"));
        };

        let signer = QuerySigner {
            algorithm: "GOOG4-HMAC-SHA256",
            key_prefix: "GOOG4",
            scope_suffix: "goog4_request",
            param_prefix: "X-Goog",
            service: "storage".to_string(),
            region: "auto".to_string(),
            access_key,
            secret_key,
        };

        let url = signer.presign(
            "GET",
            "storage.googleapis.com",
            &format!("/{}/{}", self.bucket, key),
            expire.as_secs(),
            Utc::now(),
        )?;
        Ok(SignedUrl {
            url,
            expires_in: Some(expire.as_secs()),
        })
    }
}

/// Object resource of the JSON API. Numeric fields arrive as strings.
#[derive(Clone, Default, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct GcsObjectMeta {
    pub name: String,
    pub size: String,
    pub updated: String,
    pub md5_hash: Option<String>,
    pub generation: String,
}

impl GcsObjectMeta {
    pub fn to_stat(&self) -> Result<Stat> {
        let size = self.size.parse::<u64>().map_err(|err| {
            Error::new(ErrorKind::Unexpected, "invalid object size")
                .with_context("size", self.size.clone())
                .with_source(err)
        })?;
        let mtime = chrono::DateTime::parse_from_rfc3339(&self.updated)
            .map_err(|err| {
                Error::new(ErrorKind::Unexpected, "invalid update timestamp")
                    .with_context("updated", self.updated.clone())
                    .with_source(err)
            })?
            .timestamp_millis() as f64
            / 1000.0;

        let md5 = match &self.md5_hash {
            Some(b64) => Some(md5_base64_to_hex(b64)?),
            None => None,
        };

        Ok(Stat {
            size,
            mtime,
            md5,
            version: (!self.generation.is_empty()).then(|| self.generation.clone()),
        })
    }
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ListObjectsOutput {
    pub items: Vec<GcsObjectMeta>,
    pub prefixes: Vec<String>,
    pub next_page_token: Option<String>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RewriteOutput {
    pub done: bool,
    pub rewrite_token: Option<String>,
    pub resource: Option<GcsObjectMeta>,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse_list_output() {
        let bs = r#"{
  "kind": "storage#objects",
  "prefixes": ["dir/sub/"],
  "items": [
    {
      "kind": "storage#object",
      "name": "dir/a.txt",
      "bucket": "examplebucket",
      "generation": "1660561204863653",
      "size": "11",
      "updated": "2022-08-15T11:04:34.866Z",
      "md5Hash": "fv1pjcqnkkk25Pf7zlLjZQ=="
    }
  ],
  "nextPageToken": "CgZkaXIvYg=="
}"#;
        let out: ListObjectsOutput = serde_json::from_str(bs).unwrap();
        assert_eq!(out.prefixes, vec!["dir/sub/"]);
        assert_eq!(out.items.len(), 1);
        assert_eq!(out.items[0].name, "dir/a.txt");
        assert_eq!(out.next_page_token.as_deref(), Some("CgZkaXIvYg=="));

        let stat = out.items[0].to_stat().unwrap();
        assert_eq!(stat.size, 11);
        assert_eq!(stat.version.as_deref(), Some("1660561204863653"));
        assert_eq!(
            stat.md5.as_deref(),
            Some("7efd698dcaa7924936e4f7fbce52e365")
        );
        assert_eq!(stat.mtime, 1660561474.866);
    }

    #[test]
    fn test_parse_rewrite_output() {
        let pending = r#"{
  "kind": "storage#rewriteResponse",
  "totalBytesRewritten": "1048576",
  "objectSize": "10000000000",
  "done": false,
  "rewriteToken": "TOKEN_VALUE"
}"#;
        let out: RewriteOutput = serde_json::from_str(pending).unwrap();
        assert!(!out.done);
        assert_eq!(out.rewrite_token.as_deref(), Some("TOKEN_VALUE"));
        assert!(out.resource.is_none());

        let finished = r#"{
  "done": true,
  "resource": {
    "name": "dst.txt",
    "size": "5",
    "updated": "2022-08-15T11:04:34.866Z",
    "generation": "1",
    "md5Hash": "XUFAKrxLKna5cZ2REBfFkg=="
  }
}"#;
        let out: RewriteOutput = serde_json::from_str(finished).unwrap();
        assert!(out.done);
        assert_eq!(
            out.resource.unwrap().md5_hash.as_deref(),
            Some("XUFAKrxLKna5cZ2REBfFkg==")
        );
    }

    #[test]
    fn test_missing_md5_means_composite() {
        let bs = r#"{"name": "composite", "size": "4", "updated": "2022-08-15T11:04:34.866Z", "generation": "7"}"#;
        let meta: GcsObjectMeta = serde_json::from_str(bs).unwrap();
        assert_eq!(meta.to_stat().unwrap().md5, None);
    }
}
