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

use async_trait::async_trait;
use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use bytes::Bytes;
use md5::Digest;
use md5::Md5;

use super::core::AzblobCore;
use super::core::AZBLOB_CHUNK_SIZE;
use crate::raw::*;
use crate::*;

/// Append-blob upload state machine.
///
/// `init` creates the append blob, replacing a blob of another type once.
/// Every chunk is appended with the append-position precondition, so a
/// concurrent writer surfaces as [`ErrorKind::ConcurrentWrite`] instead of
/// silently interleaving. The service does not compute MD5s across appends;
/// a running digest is maintained here and stored into the blob's properties
/// after each successful block.
pub struct AzblobWriter {
    core: Arc<AzblobCore>,
    key: String,

    md5: Md5,
}

impl AzblobWriter {
    pub fn new(core: Arc<AzblobCore>, key: &str) -> Self {
        AzblobWriter {
            core,
            key: key.to_string(),
            md5: Md5::new(),
        }
    }
}

#[async_trait]
impl ChunkUpload for AzblobWriter {
    fn chunk_size(&self) -> usize {
        AZBLOB_CHUNK_SIZE
    }

    async fn init(&mut self) -> Result<()> {
        match self.core.azblob_create_append_blob(&self.key).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                // A blob of a different type occupies the name.
                self.core.azblob_delete_blob(&self.key).await?;
                self.core.azblob_create_append_blob(&self.key).await
            }
            Err(err) => Err(err),
        }
    }

    async fn upload(&mut self, offset: u64, chunk: Bytes, finalize: bool) -> Result<()> {
        let _ = finalize;
        if chunk.is_empty() {
            // Creating the blob already produced the zero-byte object.
            return Ok(());
        }

        self.md5.update(&chunk);
        self.core
            .azblob_append_block(&self.key, offset, chunk)
            .await?;

        let digest = BASE64_STANDARD.encode(self.md5.clone().finalize());
        self.core
            .azblob_set_content_md5(&self.key, &digest, None)
            .await?;
        Ok(())
    }
}
