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

use std::path::PathBuf;

use tokio::io::AsyncWriteExt;

use crate::raw::ChunkWriter;
use crate::*;

/// A binary write stream opened by [`Operator::writer`].
///
/// Remote paths upload in chunks as bytes accumulate; nothing is visible at
/// the destination until `close` finalizes the object (GCS) or as blocks
/// land (Azure). Dropping a writer without closing it abandons the upload.
#[derive(Debug)]
pub struct Writer {
    inner: WriterInner,
    closed: bool,
}

#[derive(Debug)]
enum WriterInner {
    Local(tokio::fs::File),
    Remote(ChunkWriter),
}

impl Writer {
    pub(crate) async fn create_local(path: PathBuf) -> Result<Self> {
        let file = tokio::fs::File::create(&path)
            .await
            .map_err(new_std_io_error)?;
        Ok(Writer {
            inner: WriterInner::Local(file),
            closed: false,
        })
    }

    pub(crate) fn from_remote(writer: ChunkWriter) -> Self {
        Writer {
            inner: WriterInner::Remote(writer),
            closed: false,
        }
    }

    /// Append bytes to the stream.
    pub async fn write(&mut self, bs: &[u8]) -> Result<()> {
        if self.closed {
            return Err(Error::new(ErrorKind::Unexpected, "writer is closed")
                .with_operation("Writer::write"));
        }
        match &mut self.inner {
            WriterInner::Local(file) => file.write_all(bs).await.map_err(new_std_io_error),
            WriterInner::Remote(w) => w.write(bs).await,
        }
    }

    /// Flush remaining bytes and finalize the object.
    pub async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        match &mut self.inner {
            WriterInner::Local(file) => {
                file.flush().await.map_err(new_std_io_error)?;
            }
            WriterInner::Remote(w) => w.close().await?,
        }
        self.closed = true;
        Ok(())
    }
}
