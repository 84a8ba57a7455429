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

use async_trait::async_trait;
use bytes::Bytes;
use bytes::BytesMut;

use crate::*;

/// The per-service half of a streaming writer.
///
/// Implementations hold the cloud-side upload state: the resumable session
/// URL for GCS, the append-blob position and running MD5 for Azure.
#[async_trait]
pub trait ChunkUpload: Send + 'static {
    /// The upload granularity. Non-final chunks handed to [`upload`] are
    /// exactly this long.
    ///
    /// [`upload`]: ChunkUpload::upload
    fn chunk_size(&self) -> usize;

    /// Create the upload session. Called once before any chunk.
    async fn init(&mut self) -> Result<()>;

    /// Upload one chunk whose first byte lands at `offset`.
    ///
    /// `finalize` marks the closing chunk, which may be short or empty.
    async fn upload(&mut self, offset: u64, chunk: Bytes, finalize: bool) -> Result<()>;
}

/// Chunked upload driver shared by every backend.
///
/// Bytes accumulate in an internal buffer; whenever the buffer exceeds the
/// chunk size, leading whole chunks are uploaded. `close` flushes the final,
/// possibly short, chunk with the finalize flag.
pub struct ChunkWriter {
    inner: Box<dyn ChunkUpload>,
    /// Bytes successfully uploaded so far. Advances only after a chunk
    /// upload succeeds; `offset + buf.len()` always equals the bytes
    /// accepted from the caller.
    offset: u64,
    buf: BytesMut,
    closed: bool,
}

impl std::fmt::Debug for ChunkWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkWriter")
            .field("offset", &self.offset)
            .field("buf", &self.buf)
            .field("closed", &self.closed)
            .finish()
    }
}

impl ChunkWriter {
    /// Open the upload session and return the writer.
    pub async fn open(mut inner: Box<dyn ChunkUpload>) -> Result<Self> {
        inner.init().await?;
        Ok(ChunkWriter {
            inner,
            offset: 0,
            buf: BytesMut::new(),
            closed: false,
        })
    }

    /// Append bytes, uploading any completed chunks.
    pub async fn write(&mut self, bs: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::Unexpected, "writer is closed")
                .with_operation("ChunkWriter::write"));
        }

        self.buf.extend_from_slice(bs);

        let chunk_size = self.inner.chunk_size();
        while self.buf.len() > chunk_size {
            let chunk = Bytes::copy_from_slice(&self.buf[..chunk_size]);
            self.inner.upload(self.offset, chunk, false).await?;
            let _ = self.buf.split_to(chunk_size);
            self.offset += chunk_size as u64;
        }
        Ok(())
    }

    /// Flush the remaining buffer as the finalizing chunk.
    ///
    /// Idempotent: a second close is a no-op.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        let chunk = Bytes::copy_from_slice(&self.buf);
        self.inner.upload(self.offset, chunk, true).await?;
        self.offset += self.buf.len() as u64;
        self.buf.clear();
        self.closed = true;
        Ok(())
    }

    /// Bytes uploaded so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Bytes accepted but not yet uploaded.
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    #[derive(Default)]
    struct UploadLog {
        initialized: bool,
        chunks: Vec<(u64, usize, bool)>,
        content: Vec<u8>,
        fail_next: bool,
    }

    struct FakeUpload {
        chunk_size: usize,
        log: Arc<Mutex<UploadLog>>,
    }

    #[async_trait]
    impl ChunkUpload for FakeUpload {
        fn chunk_size(&self) -> usize {
            self.chunk_size
        }

        async fn init(&mut self) -> Result<()> {
            self.log.lock().unwrap().initialized = true;
            Ok(())
        }

        async fn upload(&mut self, offset: u64, chunk: Bytes, finalize: bool) -> Result<()> {
            let mut log = self.log.lock().unwrap();
            if log.fail_next {
                log.fail_next = false;
                return Err(Error::new(ErrorKind::Unexpected, "scripted failure"));
            }
            assert_eq!(offset as usize, log.content.len(), "chunks must be contiguous");
            log.chunks.push((offset, chunk.len(), finalize));
            log.content.extend_from_slice(&chunk);
            Ok(())
        }
    }

    async fn writer(chunk_size: usize) -> (ChunkWriter, Arc<Mutex<UploadLog>>) {
        let log = Arc::new(Mutex::new(UploadLog::default()));
        let w = ChunkWriter::open(Box::new(FakeUpload {
            chunk_size,
            log: log.clone(),
        }))
        .await
        .unwrap();
        assert!(log.lock().unwrap().initialized);
        (w, log)
    }

    #[tokio::test]
    async fn test_small_write_flushes_on_close() {
        let (mut w, log) = writer(8).await;
        w.write(b"hi").await.unwrap();
        assert_eq!(log.lock().unwrap().chunks, vec![]);

        w.close().await.unwrap();
        assert_eq!(log.lock().unwrap().chunks, vec![(0, 2, true)]);
        assert_eq!(log.lock().unwrap().content, b"hi");
    }

    #[tokio::test]
    async fn test_empty_file_finalizes_empty_chunk() {
        let (mut w, log) = writer(8).await;
        w.close().await.unwrap();
        assert_eq!(log.lock().unwrap().chunks, vec![(0, 0, true)]);
    }

    #[tokio::test]
    async fn test_chunk_boundaries() {
        let (mut w, log) = writer(4).await;
        // 4 bytes: exactly one chunk stays buffered until close.
        w.write(b"abcd").await.unwrap();
        assert_eq!(log.lock().unwrap().chunks, vec![]);

        // 10 total: two whole chunks go out, 2 bytes stay.
        w.write(b"efghij").await.unwrap();
        assert_eq!(
            log.lock().unwrap().chunks,
            vec![(0, 4, false), (4, 4, false)]
        );
        assert_eq!(w.offset(), 8);
        assert_eq!(w.buffered(), 2);

        w.close().await.unwrap();
        assert_eq!(
            log.lock().unwrap().chunks,
            vec![(0, 4, false), (4, 4, false), (8, 2, true)]
        );
        assert_eq!(log.lock().unwrap().content, b"abcdefghij");
        assert_eq!(w.offset(), 10);
        assert_eq!(w.buffered(), 0);
    }

    #[tokio::test]
    async fn test_offset_held_back_on_failure() {
        let (mut w, log) = writer(4).await;
        log.lock().unwrap().fail_next = true;

        assert!(w.write(b"abcdefgh").await.is_err());
        // The failed chunk stays buffered: offset + buffered == accepted.
        assert_eq!(w.offset(), 0);
        assert_eq!(w.buffered(), 8);
    }

    #[tokio::test]
    async fn test_double_close_is_noop() {
        let (mut w, log) = writer(4).await;
        w.write(b"xy").await.unwrap();
        w.close().await.unwrap();
        w.close().await.unwrap();
        assert_eq!(log.lock().unwrap().chunks.len(), 1);
    }
}
