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

use std::time::Duration;

use async_trait::async_trait;

use crate::raw::*;
use crate::*;

/// A URL a plain HTTP client (or browser) can open directly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedUrl {
    /// The presigned URL.
    pub url: String,
    /// Seconds until it expires, when the scheme expires at all.
    pub expires_in: Option<u64>,
}

/// The interface a remote object store exposes to the directory-emulation
/// layer, the copy coordinator and the hash subsystem.
///
/// Implementations are cheap handles: construction performs no I/O, and
/// credentials are resolved lazily through the process-wide token managers.
#[async_trait]
pub trait Accessor: Send + Sync + 'static {
    /// `scheme://netloc` of this store, without trailing slash.
    fn root_url(&self) -> String;

    /// Fetch metadata for `key`. `Ok(None)` when the object is absent.
    async fn head(&self, key: &str) -> Result<Option<Stat>>;

    /// Whether the bucket or container itself exists.
    async fn container_exists(&self) -> Result<bool>;

    /// Start a lazy listing.
    fn list(&self, args: ListArgs) -> PageLister;

    /// Delete one object. Absence surfaces as [`ErrorKind::NotFound`].
    async fn delete(&self, key: &str) -> Result<()>;

    /// Create the zero-byte, slash-terminated object marking a directory.
    async fn create_dir_marker(&self, key: &str) -> Result<()>;

    /// Server-side copy from `src` (same scheme, possibly another
    /// bucket/container) onto `dst_key` of this store.
    ///
    /// Returns the destination's MD5 hex when `want_md5` is set and the
    /// service reports one.
    async fn copy_from(&self, src: &BlobPath, dst_key: &str, want_md5: bool)
        -> Result<Option<String>>;

    /// Best-effort write-back of a computed MD5 into object metadata.
    ///
    /// `version` is the concurrency token observed when the hash was
    /// computed; returns `false` when the object changed in the meantime and
    /// the update was abandoned.
    async fn store_md5(&self, key: &str, md5_hex: &str, version: Option<&str>) -> Result<bool>;

    /// Produce a presigned GET URL.
    async fn presign(&self, key: &str, expire: Duration) -> Result<SignedUrl>;

    /// Open a streaming reader. Fails with [`ErrorKind::NotFound`] when the
    /// object is absent.
    async fn reader(&self, key: &str) -> Result<RangeReader>;

    /// Open a streaming writer, creating or replacing the object.
    async fn writer(&self, key: &str) -> Result<ChunkWriter>;
}
