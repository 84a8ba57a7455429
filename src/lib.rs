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

//! blobpath: one path API for local files, Google Cloud Storage and Azure
//! Blob Storage.
//!
//! Paths select the backend: plain strings are host paths,
//! `gs://bucket/key` is a GCS object and `as://account-container/key` (or
//! the equivalent `https://account.blob.core.windows.net/container/key`) is
//! an Azure blob. Objects stream in both directions, so files larger than
//! memory are fine.
//!
//! ```no_run
//! use blobpath::Operator;
//!
//! #[tokio::main]
//! async fn main() -> blobpath::Result<()> {
//!     let op = Operator::new();
//!
//!     op.write("gs://bucket/x/y.txt", b"meow!\npurr\n").await?;
//!     let content = op.read("gs://bucket/x/y.txt").await?;
//!     assert_eq!(content, b"meow!\npurr\n");
//!
//!     let mut entries = op.list("gs://bucket/x/").await?;
//!     while let Some(entry) = entries.next().await? {
//!         println!("{}", entry.path);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! Credentials are discovered from the environment: application-default
//! credentials or the metadata service for GCS; a storage key, a refresh
//! token or a service principal for Azure. Requests retry transient
//! failures on an exponential schedule, and streams resume mid-transfer.

mod error;
pub(crate) use error::new_json_deserialize_error;
pub(crate) use error::new_request_build_error;
pub(crate) use error::new_std_io_error;
pub(crate) use error::new_xml_deserialize_error;
pub use error::Error;
pub use error::ErrorKind;
pub use error::Result;

mod operator;
pub use operator::CopyOptions;
pub use operator::Lister;
pub use operator::Operator;

pub mod raw;
pub use raw::SignedUrl;
pub mod services;

mod types;
pub use types::basename;
pub use types::dirname;
pub use types::join;
pub use types::BlobPath;
pub use types::DirEntry;
pub use types::ReadStats;
pub use types::Reader;
pub use types::Stat;
pub use types::WalkEntry;
pub use types::Writer;
