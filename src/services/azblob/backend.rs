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

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use super::core::parse_blob_headers;
use super::core::AzblobCore;
use super::lister::AzblobLister;
use super::reader::AzblobReader;
use super::writer::AzblobWriter;
use crate::raw::*;
use crate::*;

/// Azure Blob Storage backend.
#[derive(Clone, Debug)]
pub struct AzblobBackend {
    core: Arc<AzblobCore>,
}

impl AzblobBackend {
    pub fn new(core: AzblobCore) -> Self {
        AzblobBackend {
            core: Arc::new(core),
        }
    }
}

#[async_trait]
impl Accessor for AzblobBackend {
    fn root_url(&self) -> String {
        format!("as://{}-{}", self.core.account, self.core.container)
    }

    async fn head(&self, key: &str) -> Result<Option<Stat>> {
        match self.core.azblob_head_blob(key).await? {
            Some(headers) => Ok(Some(parse_blob_headers(&headers)?)),
            None => Ok(None),
        }
    }

    async fn container_exists(&self) -> Result<bool> {
        self.core.azblob_container_exists().await
    }

    fn list(&self, args: ListArgs) -> PageLister {
        PageLister::new(Box::new(AzblobLister::new(self.core.clone(), args)))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.core.azblob_delete_blob(key).await
    }

    async fn create_dir_marker(&self, key: &str) -> Result<()> {
        self.core.azblob_create_dir_marker(key).await
    }

    async fn copy_from(
        &self,
        src: &BlobPath,
        dst_key: &str,
        want_md5: bool,
    ) -> Result<Option<String>> {
        let BlobPath::Azblob {
            account,
            container,
            key,
        } = src
        else {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "copy-blob requires an azure source",
            )
            .with_context("src", src.to_string()));
        };

        let src_url = format!(
            "https://{account}.blob.core.windows.net/{container}/{}",
            percent_encode_path(key)
        );

        let mut status = self.core.azblob_start_copy(&src_url, dst_key).await?;
        while status == "pending" {
            tokio::time::sleep(Duration::from_millis(100)).await;
            status = self.core.azblob_copy_status(dst_key).await?;
        }
        if status != "success" {
            return Err(Error::new(ErrorKind::Unexpected, "server-side copy failed")
                .with_context("copy_status", status)
                .with_operation("azblob::copy"));
        }

        if !want_md5 {
            return Ok(None);
        }
        // Reported only when the source carried one; the caller computes it
        // otherwise.
        Ok(self.head(dst_key).await?.and_then(|stat| stat.md5))
    }

    async fn store_md5(&self, key: &str, md5_hex: &str, version: Option<&str>) -> Result<bool> {
        let digest = hex::decode(md5_hex).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "invalid md5 hex")
                .with_context("md5", md5_hex)
                .with_source(err)
        })?;
        let b64 = base64::Engine::encode(&base64::prelude::BASE64_STANDARD, digest);
        self.core.azblob_set_content_md5(key, &b64, version).await
    }

    async fn presign(&self, key: &str, expire: Duration) -> Result<SignedUrl> {
        self.core.azblob_presign_read(key, expire).await
    }

    async fn reader(&self, key: &str) -> Result<RangeReader> {
        let stat = self.head(key).await?.ok_or_else(|| {
            Error::new(ErrorKind::NotFound, "no such blob")
                .with_context("key", key)
                .with_operation("azblob::reader")
        })?;

        let path = format!("{}/{}", self.root_url(), key);
        Ok(RangeReader::new(
            Box::new(AzblobReader::new(self.core.clone(), key)),
            &path,
            stat.size,
        ))
    }

    async fn writer(&self, key: &str) -> Result<ChunkWriter> {
        ChunkWriter::open(Box::new(AzblobWriter::new(self.core.clone(), key))).await
    }
}
