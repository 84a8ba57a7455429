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

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::fmt::Formatter;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::Duration;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use chrono::DateTime;
use chrono::Utc;
use http::header::AUTHORIZATION;
use http::header::CONTENT_LENGTH;
use http::header::RANGE;
use http::HeaderMap;
use http::Request;
use http::StatusCode;
use percent_encoding::percent_decode_str;
use serde::Deserialize;

use super::credential::read_body;
use super::credential::AzureToken;
use super::credential::AzureTokenLoader;
use super::credential::DelegationKeyLoader;
use super::error::parse_error;
use crate::raw::*;
use crate::*;

/// Service version sent as `x-ms-version` and `sv`.
pub const STORAGE_VERSION: &str = "2020-02-10";

/// Append-block size; also the service's per-block maximum.
pub const AZBLOB_CHUNK_SIZE: usize = 4 * 1024 * 1024;

pub struct AzblobCore {
    pub account: String,
    pub container: String,

    pub client: HttpClient,
    pub tokens: Arc<TokenManager<AzureTokenLoader>>,
    pub delegation_keys: Arc<TokenManager<DelegationKeyLoader>>,
}

impl Debug for AzblobCore {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AzblobCore")
            .field("account", &self.account)
            .field("container", &self.container)
            .finish_non_exhaustive()
    }
}

impl AzblobCore {
    pub fn blob_url(&self, key: &str) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}/{}",
            self.account,
            self.container,
            percent_encode_path(key)
        )
    }

    fn container_url(&self) -> String {
        format!(
            "https://{}.blob.core.windows.net/{}",
            self.account, self.container
        )
    }

    /// Authorize a request with the account's current token.
    async fn signed(&self, mut req: Request<Bytes>) -> Result<Request<Bytes>> {
        match self.tokens.get(&self.account).await? {
            AzureToken::SharedKey(key) => {
                sign_shared_key(&mut req, &self.account, &key, Utc::now())?
            }
            AzureToken::Oauth(bearer) => sign_oauth(&mut req, &bearer)?,
        }
        Ok(req)
    }

    pub async fn azblob_head_blob(&self, key: &str) -> Result<Option<HeaderMap>> {
        let url = self.blob_url(key);

        let resp = self
            .client
            .execute(|| async {
                let req = Request::head(&url)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(Some(resp.headers().clone())),
            StatusCode::NOT_FOUND => Ok(None),
            _ => Err(parse_error(resp).await.with_operation("azblob::head_blob")),
        }
    }

    pub async fn azblob_container_exists(&self) -> Result<bool> {
        let url = format!("{}?restype=container", self.container_url());

        let resp = self
            .client
            .execute(|| async {
                let req = Request::get(&url)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(parse_error(resp)
                .await
                .with_operation("azblob::container_exists")),
        }
    }

    pub async fn azblob_list_page(
        &self,
        args: &ListArgs,
        marker: Option<&str>,
    ) -> Result<ListBlobsOutput> {
        let mut url = format!(
            "{}?comp=list&restype=container&prefix={}",
            self.container_url(),
            percent_encode_component(&args.prefix)
        );
        if args.delimited {
            url.push_str("&delimiter=%2F");
        }
        if let Some(limit) = args.limit {
            url.push_str(&format!("&maxresults={limit}"));
        }
        if let Some(marker) = marker {
            url.push_str(&format!("&marker={}", percent_encode_component(marker)));
        }

        let resp = self
            .client
            .execute(|| async {
                let req = Request::get(&url)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::OK => {
                let bs = read_body(resp).await?;
                let mut out: ListBlobsOutput =
                    quick_xml::de::from_reader(bs.as_ref()).map_err(new_xml_deserialize_error)?;
                // An empty <NextMarker /> terminates the enumeration.
                out.next_marker = out.next_marker.filter(|v| !v.is_empty());
                Ok(out)
            }
            StatusCode::NOT_FOUND => Err(Error::new(ErrorKind::NotFound, "container not found")
                .with_context("container", self.container.clone())),
            _ => Err(parse_error(resp).await.with_operation("azblob::list_blobs")),
        }
    }

    pub async fn azblob_delete_blob(&self, key: &str) -> Result<()> {
        let url = self.blob_url(key);

        let resp = self
            .client
            .execute(|| async {
                let req = Request::delete(&url)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::ACCEPTED => Ok(()),
            StatusCode::NOT_FOUND => Err(Error::new(ErrorKind::NotFound, "no such blob")
                .with_context("key", key)
                .with_operation("azblob::delete_blob")),
            _ => Err(parse_error(resp).await.with_operation("azblob::delete_blob")),
        }
    }

    /// Zero-byte `BlockBlob` marking a pseudo-directory.
    pub async fn azblob_create_dir_marker(&self, key: &str) -> Result<()> {
        let url = self.blob_url(key);

        let resp = self
            .client
            .execute(|| async {
                let req = Request::put(&url)
                    .header("x-ms-blob-type", "BlockBlob")
                    .header(CONTENT_LENGTH, 0)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::CREATED => Ok(()),
            _ => Err(parse_error(resp)
                .await
                .with_operation("azblob::create_dir_marker")),
        }
    }

    /// Open a ranged download. `Ok(None)` translates 416 into end-of-stream.
    pub async fn azblob_open_range(&self, key: &str, offset: u64) -> Result<Option<HttpBody>> {
        let url = self.blob_url(key);

        let resp = self
            .client
            .execute(|| async {
                let req = Request::get(&url)
                    .header(RANGE, range_from(offset))
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::PARTIAL_CONTENT | StatusCode::OK => Ok(Some(HttpBody::new(resp))),
            StatusCode::RANGE_NOT_SATISFIABLE => Ok(None),
            _ => Err(parse_error(resp).await.with_operation("azblob::read_blob")),
        }
    }

    /// Create the append blob a write stream targets.
    ///
    /// A 409 means a blob of another type already occupies the name; the
    /// writer removes it and retries once.
    pub async fn azblob_create_append_blob(&self, key: &str) -> Result<()> {
        let url = self.blob_url(key);

        let resp = self
            .client
            .execute(|| async {
                let req = Request::put(&url)
                    .header("x-ms-blob-type", "AppendBlob")
                    .header(CONTENT_LENGTH, 0)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::CREATED => Ok(()),
            _ => Err(parse_error(resp)
                .await
                .with_operation("azblob::create_append_blob")),
        }
    }

    /// Append one block at `offset`.
    ///
    /// The append-position precondition is how a losing writer detects the
    /// race: a 412 means someone else advanced the blob.
    pub async fn azblob_append_block(&self, key: &str, offset: u64, chunk: Bytes) -> Result<()> {
        let url = format!("{}?comp=appendblock", self.blob_url(key));

        let resp = self
            .client
            .execute(|| async {
                let req = Request::put(&url)
                    .header(CONTENT_LENGTH, chunk.len())
                    .header("x-ms-blob-condition-appendpos", offset)
                    .body(chunk.clone())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::CREATED => Ok(()),
            StatusCode::PRECONDITION_FAILED => Err(Error::new(
                ErrorKind::ConcurrentWrite,
                "another writer advanced this blob",
            )
            .with_context("key", key)
            .with_context("offset", offset.to_string())
            .with_operation("azblob::append_block")),
            _ => Err(parse_error(resp).await.with_operation("azblob::append_block")),
        }
    }

    /// Store a content MD5 into blob properties.
    ///
    /// With `if_match` set, a 412 reports that the blob changed and the
    /// update was abandoned; the caller treats that as success-without-store.
    pub async fn azblob_set_content_md5(
        &self,
        key: &str,
        md5_b64: &str,
        if_match: Option<&str>,
    ) -> Result<bool> {
        let url = format!("{}?comp=properties", self.blob_url(key));

        let resp = self
            .client
            .execute(|| async {
                let mut req = Request::put(&url)
                    .header("x-ms-blob-content-md5", md5_b64)
                    .header(CONTENT_LENGTH, 0);
                if let Some(etag) = if_match {
                    req = req.header(http::header::IF_MATCH, etag);
                }
                let req = req.body(Bytes::new()).map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::OK => Ok(true),
            StatusCode::PRECONDITION_FAILED if if_match.is_some() => Ok(false),
            _ => Err(parse_error(resp)
                .await
                .with_operation("azblob::set_content_md5")),
        }
    }

    /// Start a server-side copy onto `dst_key`, returning the initial copy
    /// status.
    pub async fn azblob_start_copy(&self, src_url: &str, dst_key: &str) -> Result<String> {
        let url = self.blob_url(dst_key);

        let resp = self
            .client
            .execute(|| async {
                let req = Request::put(&url)
                    .header("x-ms-copy-source", src_url)
                    .header(CONTENT_LENGTH, 0)
                    .body(Bytes::new())
                    .map_err(new_request_build_error)?;
                self.signed(req).await
            })
            .await?;

        match resp.status() {
            StatusCode::ACCEPTED => Ok(header_str(resp.headers(), "x-ms-copy-status")),
            StatusCode::NOT_FOUND => Err(Error::new(ErrorKind::NotFound, "copy source not found")
                .with_operation("azblob::start_copy")),
            _ => Err(parse_error(resp).await.with_operation("azblob::start_copy")),
        }
    }

    /// Read the copy status off the destination's properties.
    pub async fn azblob_copy_status(&self, key: &str) -> Result<String> {
        let headers = self.azblob_head_blob(key).await?.ok_or_else(|| {
            Error::new(ErrorKind::NotFound, "copy destination disappeared")
                .with_context("key", key)
                .with_operation("azblob::copy_status")
        })?;
        Ok(header_str(&headers, "x-ms-copy-status"))
    }

    /// Presign a GET with a user-delegation SAS.
    pub async fn azblob_presign_read(&self, key: &str, expire: Duration) -> Result<SignedUrl> {
        let udk = self.delegation_keys.get(&self.account).await?;

        let start = Utc::now();
        let expiry = start + chrono::Duration::seconds(expire.as_secs() as i64);
        let st = start.format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let se = expiry.format("%Y-%m-%dT%H:%M:%SZ").to_string();

        let canonicalized_resource =
            format!("/blob/{}/{}/{}", self.account, self.container, key);

        // One line per field of the 2020-02-10 user-delegation layout; the
        // unused optional fields stay empty but keep their line.
        let string_to_sign = [
            "r",
            st.as_str(),
            se.as_str(),
            canonicalized_resource.as_str(),
            udk.signed_oid.as_str(),
            udk.signed_tid.as_str(),
            udk.signed_start.as_str(),
            udk.signed_expiry.as_str(),
            udk.signed_service.as_str(),
            udk.signed_version.as_str(),
            "", // signedAuthorizedUserObjectId
            "", // signedUnauthorizedUserObjectId
            "", // signedCorrelationId
            "", // signedIP
            "https",
            STORAGE_VERSION,
            "b",
            "", // signedSnapshotTime
            "", // rscc
            "", // rscd
            "", // rsce
            "", // rscl
            "", // rsct
        ]
        .join("\n");

        let signing_key = BASE64_STANDARD.decode(&udk.value).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "invalid user delegation key")
                .with_source(err)
        })?;
        let signature =
            BASE64_STANDARD.encode(hmac_sha256(&signing_key, string_to_sign.as_bytes()));

        let query = [
            ("sv", STORAGE_VERSION.to_string()),
            ("sr", "b".to_string()),
            ("st", st),
            ("se", se),
            ("sp", "r".to_string()),
            ("spr", "https".to_string()),
            ("skoid", udk.signed_oid.clone()),
            ("sktid", udk.signed_tid.clone()),
            ("skt", udk.signed_start.clone()),
            ("ske", udk.signed_expiry.clone()),
            ("sks", udk.signed_service.clone()),
            ("skv", udk.signed_version.clone()),
            ("sig", signature),
        ]
        .iter()
        .map(|(k, v)| format!("{k}={}", percent_encode_component(v)))
        .collect::<Vec<_>>()
        .join("&");

        Ok(SignedUrl {
            url: format!("{}?{query}", self.blob_url(key)),
            expires_in: Some(expire.as_secs()),
        })
    }
}

fn header_str(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

/// Parse blob property headers into a [`Stat`].
pub fn parse_blob_headers(headers: &HeaderMap) -> Result<Stat> {
    let size = headers
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| Error::new(ErrorKind::Unexpected, "blob has no content length"))?;

    let last_modified = header_str(headers, "last-modified");
    let mtime = DateTime::parse_from_rfc2822(&last_modified)
        .map_err(|err| {
            Error::new(ErrorKind::Unexpected, "invalid last-modified header")
                .with_context("last_modified", last_modified.clone())
                .with_source(err)
        })?
        .timestamp() as f64;

    let md5 = match headers.get("content-md5") {
        Some(v) => {
            let b64 = v.to_str().map_err(|err| {
                Error::new(ErrorKind::Unexpected, "invalid content-md5 header").with_source(err)
            })?;
            Some(md5_base64_to_hex(b64)?)
        }
        None => None,
    };

    let version = headers
        .get(http::header::ETAG)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.to_string());

    Ok(Stat {
        size,
        mtime,
        md5,
        version,
    })
}

fn format_http_date(now: DateTime<Utc>) -> String {
    now.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn sign_oauth(req: &mut Request<Bytes>, bearer: &str) -> Result<()> {
    let headers = req.headers_mut();
    headers.insert("x-ms-version", static_header(STORAGE_VERSION)?);
    headers.insert("x-ms-date", parse_header(format_http_date(Utc::now()))?);
    headers.insert(AUTHORIZATION, parse_header(format!("Bearer {bearer}"))?);
    Ok(())
}

/// Azure Storage shared-key authorization.
///
/// Reference: [Authorize with Shared Key](https://docs.microsoft.com/en-us/rest/api/storageservices/authorize-with-shared-key).
fn sign_shared_key(
    req: &mut Request<Bytes>,
    account: &str,
    key_b64: &str,
    now: DateTime<Utc>,
) -> Result<()> {
    {
        let headers = req.headers_mut();
        headers.insert("x-ms-date", parse_header(format_http_date(now))?);
        headers.insert("x-ms-version", static_header(STORAGE_VERSION)?);
    }

    let string_to_sign = string_to_sign(req, account)?;
    let key = BASE64_STANDARD.decode(key_b64).map_err(|err| {
        Error::new(ErrorKind::ConfigInvalid, "storage account key is not base64")
            .with_source(err)
    })?;
    let signature = BASE64_STANDARD.encode(hmac_sha256(&key, string_to_sign.as_bytes()));

    let mut value = parse_header(format!("SharedKey {account}:{signature}"))?;
    value.set_sensitive(true);
    req.headers_mut().insert(AUTHORIZATION, value);
    Ok(())
}

/// ```text
/// VERB + "\n" +
/// Content-Encoding + ... + Range + "\n" +
/// CanonicalizedHeaders +
/// CanonicalizedResource
/// ```
fn string_to_sign(req: &Request<Bytes>, account: &str) -> Result<String> {
    let h = req.headers();
    let get = |name: &str| -> &str {
        h.get(name).and_then(|v| v.to_str().ok()).unwrap_or("")
    };

    let mut s = String::with_capacity(256);
    writeln!(&mut s, "{}", req.method().as_str()).ok();
    writeln!(&mut s, "{}", get("content-encoding")).ok();
    writeln!(&mut s, "{}", get("content-language")).ok();
    // Since service version 2015-02-21, a zero length is represented as the
    // empty string.
    let content_length = get("content-length");
    writeln!(
        &mut s,
        "{}",
        if content_length == "0" { "" } else { content_length }
    )
    .ok();
    writeln!(&mut s, "{}", get("content-md5")).ok();
    writeln!(&mut s, "{}", get("content-type")).ok();
    writeln!(&mut s, "{}", get("date")).ok();
    writeln!(&mut s, "{}", get("if-modified-since")).ok();
    writeln!(&mut s, "{}", get("if-match")).ok();
    writeln!(&mut s, "{}", get("if-none-match")).ok();
    writeln!(&mut s, "{}", get("if-unmodified-since")).ok();
    writeln!(&mut s, "{}", get("range")).ok();
    writeln!(&mut s, "{}", canonicalized_headers(h)).ok();
    write!(&mut s, "{}", canonicalized_resource(req, account)).ok();
    Ok(s)
}

fn canonicalized_headers(headers: &HeaderMap) -> String {
    let mut entries: Vec<(String, String)> = headers
        .iter()
        .filter(|(name, _)| name.as_str().starts_with("x-ms-"))
        .map(|(name, value)| {
            (
                name.as_str().to_string(),
                value.to_str().unwrap_or_default().trim().to_string(),
            )
        })
        .collect();
    entries.sort();
    entries
        .into_iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn canonicalized_resource(req: &Request<Bytes>, account: &str) -> String {
    let path = percent_decode_str(req.uri().path())
        .decode_utf8_lossy()
        .into_owned();

    let query = req.uri().query().unwrap_or("");
    if query.is_empty() {
        return format!("/{account}{path}");
    }

    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for pair in query.split('&') {
        let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
        let k = percent_decode_str(k).decode_utf8_lossy().to_lowercase();
        let v = percent_decode_str(v).decode_utf8_lossy().into_owned();
        params.entry(k).or_default().push(v);
    }
    let query_lines = params
        .into_iter()
        .map(|(k, v)| format!("{k}:{}", v.join(",")))
        .collect::<Vec<_>>()
        .join("\n");

    format!("/{account}{path}\n{query_lines}")
}

fn parse_header(value: String) -> Result<http::HeaderValue> {
    value.parse().map_err(|err: http::header::InvalidHeaderValue| {
        Error::new(ErrorKind::Unexpected, "invalid header value").with_source(err)
    })
}

fn static_header(value: &'static str) -> Result<http::HeaderValue> {
    Ok(http::HeaderValue::from_static(value))
}

/// Listing results arrive as XML `EnumerationResults` documents.
#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct ListBlobsOutput {
    pub blobs: Blobs,
    pub next_marker: Option<String>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Blobs {
    pub blob: Vec<Blob>,
    pub blob_prefix: Vec<BlobPrefix>,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct Blob {
    pub name: String,
    pub properties: BlobProperties,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
pub struct BlobPrefix {
    pub name: String,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default)]
pub struct BlobProperties {
    #[serde(rename = "Content-Length")]
    pub content_length: u64,
    #[serde(rename = "Last-Modified")]
    pub last_modified: String,
    #[serde(rename = "Content-MD5")]
    pub content_md5: Option<String>,
    #[serde(rename = "Etag")]
    pub etag: Option<String>,
}
