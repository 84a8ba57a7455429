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

use std::io::SeekFrom;

use async_trait::async_trait;
use bytes::Bytes;
use bytes::BytesMut;
use log::warn;

use crate::raw::http_client::backoff_schedule;
use crate::raw::HttpBody;
use crate::*;

/// Attempts per `read` call before a persistent failure is surfaced.
const MAX_READ_ATTEMPTS: usize = 15;

/// Log read failures starting from this zero-based attempt.
const LOG_FROM_ATTEMPT: usize = 3;

/// A streaming body yielding chunks of bytes.
#[async_trait]
pub trait ReadBody: Send {
    /// Pull the next chunk. `None` means the stream ended.
    async fn chunk(&mut self) -> Result<Option<Bytes>>;
}

#[async_trait]
impl ReadBody for HttpBody {
    async fn chunk(&mut self) -> Result<Option<Bytes>> {
        HttpBody::chunk(self).await
    }
}

/// The per-service half of a streaming reader: open a ranged GET.
#[async_trait]
pub trait RangeRead: Send + Sync + 'static {
    /// Open the object's body starting at `offset`.
    ///
    /// `Ok(None)` reports a `416 Requested Range Not Satisfiable`: the object
    /// was truncated beneath us and the caller must treat the position as
    /// end-of-stream.
    async fn open_range(&self, offset: u64) -> Result<Option<Box<dyn ReadBody>>>;
}

/// A seekable byte stream over ranged GETs.
///
/// One driver serves every backend; resumption, truncation handling and the
/// failure counters live here while [`RangeRead`] supplies the transport.
pub struct RangeReader {
    inner: Box<dyn RangeRead>,
    path: String,

    size: u64,
    offset: u64,
    body: Option<Box<dyn ReadBody>>,
    /// Bytes received but not yet handed to the caller; always contiguous
    /// with `offset`.
    pending: Bytes,

    requests: u64,
    failures: u64,
    bytes_read: u64,
}

impl std::fmt::Debug for RangeReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RangeReader")
            .field("path", &self.path)
            .field("size", &self.size)
            .field("offset", &self.offset)
            .field("pending", &self.pending)
            .field("requests", &self.requests)
            .field("failures", &self.failures)
            .field("bytes_read", &self.bytes_read)
            .finish()
    }
}

impl RangeReader {
    /// Create a reader over `inner` for an object of `size` bytes.
    pub fn new(inner: Box<dyn RangeRead>, path: &str, size: u64) -> Self {
        RangeReader {
            inner,
            path: path.to_string(),
            size,
            offset: 0,
            body: None,
            pending: Bytes::new(),
            requests: 0,
            failures: 0,
            bytes_read: 0,
        }
    }

    /// Total object size observed at open time.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Current logical offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read statistics so far.
    pub fn stats(&self) -> ReadStats {
        ReadStats {
            bytes_read: self.bytes_read,
            requests: self.requests,
            failures: self.failures,
        }
    }

    /// Read up to `n` bytes. An empty result is end-of-stream.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        if n == 0 || self.offset >= self.size {
            return Ok(Bytes::new());
        }

        if self.pending.is_empty() && !self.fill_pending().await? {
            return Ok(Bytes::new());
        }

        let served = self.pending.split_to(n.min(self.pending.len()));
        self.offset += served.len() as u64;
        self.bytes_read += served.len() as u64;
        Ok(served)
    }

    /// Pull the next non-empty chunk into `pending`, resuming across
    /// mid-stream failures. Returns `false` on end-of-stream.
    async fn fill_pending(&mut self) -> Result<bool> {
        let mut backoff = backoff_schedule();

        for attempt in 0..MAX_READ_ATTEMPTS {
            if self.body.is_none() {
                match self.inner.open_range(self.offset).await {
                    Ok(Some(body)) => {
                        self.requests += 1;
                        self.body = Some(body);
                    }
                    // The file was truncated beneath us; this is a clean EOF.
                    Ok(None) => return Ok(false),
                    Err(err) if err.is_temporary() => {
                        self.note_failure(attempt, &mut backoff, &err.to_string()).await;
                        continue;
                    }
                    Err(err) => return Err(err),
                }
            }

            let body = self.body.as_mut().expect("body was just opened");
            match body.chunk().await {
                Ok(Some(chunk)) if !chunk.is_empty() => {
                    self.pending = chunk;
                    return Ok(true);
                }
                Ok(Some(_)) => continue,
                Ok(None) => {
                    // The connection ended early; assume it died and resume
                    // at the current offset. A reopen at true EOF comes back
                    // as a 416 and terminates cleanly.
                    self.body = None;
                    self.note_failure(attempt, &mut backoff, "connection ended mid-file")
                        .await;
                }
                Err(err) if err.is_temporary() => {
                    self.body = None;
                    self.note_failure(attempt, &mut backoff, &err.to_string()).await;
                }
                Err(err) => return Err(err),
            }
        }

        Err(Error::new(ErrorKind::Unexpected, "read attempts exhausted")
            .with_operation("RangeReader::read")
            .with_context("path", self.path.clone())
            .with_context("offset", self.offset.to_string())
            .set_persistent())
    }

    async fn note_failure(
        &mut self,
        attempt: usize,
        backoff: &mut impl Iterator<Item = std::time::Duration>,
        err: &str,
    ) {
        self.failures += 1;
        let delay = backoff.next().expect("backoff schedule is unbounded");
        if attempt >= LOG_FROM_ATTEMPT {
            warn!(
                target: "blobpath::read",
                "error {err} reading {} at offset {}, sleeping {}s",
                self.path,
                self.offset,
                delay.as_secs_f64()
            );
        }
        tokio::time::sleep(delay).await;
    }

    /// Move the logical offset. Seeking away from the open body discards it
    /// so the next read reopens at the new position.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let new_offset = match pos {
            SeekFrom::Start(v) => v as i64,
            SeekFrom::Current(v) => self.offset as i64 + v,
            SeekFrom::End(v) => self.size as i64 + v,
        };
        if new_offset < 0 {
            return Err(Error::new(
                ErrorKind::Unexpected,
                "cannot seek before the start of the file",
            )
            .with_operation("RangeReader::seek"));
        }

        let new_offset = new_offset as u64;
        if new_offset != self.offset {
            self.offset = new_offset;
            self.body = None;
            self.pending = Bytes::new();
        }
        Ok(self.offset)
    }

    /// Read from the current offset to the end of the stream.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = BytesMut::new();
        loop {
            let chunk = self.read(64 * 1024).await?;
            if chunk.is_empty() {
                return Ok(out.to_vec());
            }
            out.extend_from_slice(&chunk);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    /// An object served in fixed-size network chunks, with scripted faults.
    struct FakeObject {
        content: Mutex<Bytes>,
        net_chunk: usize,
        /// Each open consumes one entry: the number of chunks the body
        /// serves before dying (`usize::MAX` = healthy body).
        body_budgets: Mutex<Vec<usize>>,
    }

    impl FakeObject {
        fn new(content: &[u8], net_chunk: usize) -> Arc<Self> {
            Arc::new(FakeObject {
                content: Mutex::new(Bytes::copy_from_slice(content)),
                net_chunk,
                body_budgets: Mutex::new(Vec::new()),
            })
        }

        fn truncate_to(&self, len: usize) {
            let mut content = self.content.lock().unwrap();
            let shorter = content.slice(..len);
            *content = shorter;
        }
    }

    struct FakeBody {
        remaining: Bytes,
        net_chunk: usize,
        chunks_left: usize,
    }

    #[async_trait]
    impl ReadBody for FakeBody {
        async fn chunk(&mut self) -> Result<Option<Bytes>> {
            if self.remaining.is_empty() || self.chunks_left == 0 {
                return Ok(None);
            }
            self.chunks_left -= 1;
            let n = self.net_chunk.min(self.remaining.len());
            Ok(Some(self.remaining.split_to(n)))
        }
    }

    struct FakeRange(Arc<FakeObject>);

    #[async_trait]
    impl RangeRead for FakeRange {
        async fn open_range(&self, offset: u64) -> Result<Option<Box<dyn ReadBody>>> {
            let content = self.0.content.lock().unwrap().clone();
            if offset as usize >= content.len() {
                return Ok(None);
            }
            let chunks_left = self
                .0
                .body_budgets
                .lock()
                .unwrap()
                .pop()
                .unwrap_or(usize::MAX);
            Ok(Some(Box::new(FakeBody {
                remaining: content.slice(offset as usize..),
                net_chunk: self.0.net_chunk,
                chunks_left,
            })))
        }
    }

    fn reader(obj: &Arc<FakeObject>) -> RangeReader {
        let size = obj.content.lock().unwrap().len() as u64;
        RangeReader::new(Box::new(FakeRange(obj.clone())), "fake://x", size)
    }

    #[tokio::test(start_paused = true)]
    async fn test_reads_whole_object() {
        let obj = FakeObject::new(b"hello streaming world", 4);
        let mut r = reader(&obj);

        assert_eq!(r.read_to_end().await.unwrap(), b"hello streaming world");
        let stats = r.stats();
        assert_eq!(stats.requests, 1);
        assert_eq!(stats.failures, 0);
        assert_eq!(stats.bytes_read, 21);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_caps_at_requested_len() {
        let obj = FakeObject::new(b"abcdefgh", 4);
        let mut r = reader(&obj);

        assert_eq!(r.read(2).await.unwrap(), Bytes::from_static(b"ab"));
        assert_eq!(r.offset(), 2);
        assert_eq!(r.read(16).await.unwrap(), Bytes::from_static(b"cd"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_resumes_after_dead_connection() {
        let obj = FakeObject::new(b"0123456789abcdef", 4);
        // First body dies after one 4-byte chunk.
        obj.body_budgets.lock().unwrap().push(1);
        let mut r = reader(&obj);

        assert_eq!(r.read_to_end().await.unwrap(), b"0123456789abcdef");
        let stats = r.stats();
        assert_eq!(stats.requests, 2);
        assert_eq!(stats.failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_truncation_is_clean_eof() {
        let obj = FakeObject::new(b"0123456789", 4);
        obj.body_budgets.lock().unwrap().push(1);
        let mut r = reader(&obj);

        // Consume the first chunk, then the file shrinks to 6 bytes.
        assert_eq!(r.read(4).await.unwrap(), Bytes::from_static(b"0123"));
        obj.truncate_to(6);

        // The dead body resumes at offset 4, serving the remaining 2 bytes,
        // and the reopen at offset 6 reports 416 -> EOF.
        assert_eq!(r.read(4).await.unwrap(), Bytes::from_static(b"45"));
        assert_eq!(r.read(4).await.unwrap(), Bytes::new());
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_reopens_at_new_offset() {
        let obj = FakeObject::new(b"0123456789", 16);
        let mut r = reader(&obj);

        assert_eq!(r.read(2).await.unwrap(), Bytes::from_static(b"01"));
        r.seek(SeekFrom::Start(6)).unwrap();
        assert_eq!(r.read(4).await.unwrap(), Bytes::from_static(b"6789"));
        assert_eq!(r.stats().requests, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_seek_past_end_reads_empty() {
        let obj = FakeObject::new(b"0123", 16);
        let mut r = reader(&obj);
        r.seek(SeekFrom::End(10)).unwrap();
        assert_eq!(r.read(4).await.unwrap(), Bytes::new());
    }
}
