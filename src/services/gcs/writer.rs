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
use bytes::Bytes;

use super::core::GcsCore;
use super::core::GCS_CHUNK_SIZE;
use crate::raw::*;
use crate::*;

/// Resumable-upload state machine.
///
/// `init` opens the session; every chunk is a `PUT` against the session URL
/// with a `Content-Range` describing its place in the object.
pub struct GcsWriter {
    core: Arc<GcsCore>,
    key: String,

    session_url: Option<String>,
}

impl GcsWriter {
    pub fn new(core: Arc<GcsCore>, key: &str) -> Self {
        GcsWriter {
            core,
            key: key.to_string(),
            session_url: None,
        }
    }
}

#[async_trait]
impl ChunkUpload for GcsWriter {
    fn chunk_size(&self) -> usize {
        GCS_CHUNK_SIZE
    }

    async fn init(&mut self) -> Result<()> {
        let session_url = self.core.gcs_start_resumable_upload(&self.key).await?;
        self.session_url = Some(session_url);
        Ok(())
    }

    async fn upload(&mut self, offset: u64, chunk: Bytes, finalize: bool) -> Result<()> {
        let session_url = self.session_url.as_ref().ok_or_else(|| {
            Error::new(ErrorKind::Unexpected, "upload session was never opened")
                .with_operation("GcsWriter::upload")
        })?;

        self.core
            .gcs_upload_chunk(session_url, offset, chunk, finalize)
            .await
    }
}
