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
use std::path::PathBuf;

use bytes::Bytes;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncSeekExt;

use crate::raw::RangeReader;
use crate::*;

/// A seekable binary stream opened by [`Operator::reader`].
///
/// Remote paths stream through resumable ranged GETs; local paths read the
/// file directly. Either way the stream is single-owner: it is not safe to
/// share one `Reader` between tasks.
#[derive(Debug)]
pub struct Reader {
    inner: ReaderInner,
}

#[derive(Debug)]
enum ReaderInner {
    Local {
        file: tokio::fs::File,
        size: u64,
        bytes_read: u64,
    },
    Remote(RangeReader),
}

impl Reader {
    pub(crate) async fn open_local(path: PathBuf) -> Result<Self> {
        let file = tokio::fs::File::open(&path).await.map_err(new_std_io_error)?;
        let size = file.metadata().await.map_err(new_std_io_error)?.len();
        Ok(Reader {
            inner: ReaderInner::Local {
                file,
                size,
                bytes_read: 0,
            },
        })
    }

    pub(crate) fn from_remote(reader: RangeReader) -> Self {
        Reader {
            inner: ReaderInner::Remote(reader),
        }
    }

    /// Total size of the stream, observed at open time.
    pub fn size(&self) -> u64 {
        match &self.inner {
            ReaderInner::Local { size, .. } => *size,
            ReaderInner::Remote(r) => r.size(),
        }
    }

    /// Read up to `n` bytes. An empty result is end-of-stream.
    pub async fn read(&mut self, n: usize) -> Result<Bytes> {
        match &mut self.inner {
            ReaderInner::Local {
                file, bytes_read, ..
            } => {
                let mut buf = vec![0u8; n];
                let read = file.read(&mut buf).await.map_err(new_std_io_error)?;
                buf.truncate(read);
                *bytes_read += read as u64;
                Ok(Bytes::from(buf))
            }
            ReaderInner::Remote(r) => r.read(n).await,
        }
    }

    /// Move the read position.
    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        match &mut self.inner {
            ReaderInner::Local { file, .. } => file.seek(pos).await.map_err(new_std_io_error),
            ReaderInner::Remote(r) => r.seek(pos),
        }
    }

    /// Read from the current position to the end of the stream.
    pub async fn read_to_end(&mut self) -> Result<Vec<u8>> {
        match &mut self.inner {
            ReaderInner::Local {
                file, bytes_read, ..
            } => {
                let mut out = Vec::new();
                let read = file.read_to_end(&mut out).await.map_err(new_std_io_error)?;
                *bytes_read += read as u64;
                Ok(out)
            }
            ReaderInner::Remote(r) => r.read_to_end().await,
        }
    }

    /// Counters for diagnostics; request/failure counts stay zero for local
    /// files.
    pub fn stats(&self) -> ReadStats {
        match &self.inner {
            ReaderInner::Local { bytes_read, .. } => ReadStats {
                bytes_read: *bytes_read,
                requests: 0,
                failures: 0,
            },
            ReaderInner::Remote(r) => r.stats(),
        }
    }
}
