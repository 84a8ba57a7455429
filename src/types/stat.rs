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

/// Metadata of a file or object.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Stat {
    /// Size in bytes.
    pub size: u64,
    /// Modification time, seconds since the epoch.
    pub mtime: f64,
    /// Content MD5 as a hex string, when the backend reports one.
    pub md5: Option<String>,
    /// The backend's concurrency token: GCS generation or Azure ETag.
    pub version: Option<String>,
}

/// One entry of a directory listing.
#[derive(Clone, Debug, PartialEq)]
pub struct DirEntry {
    /// Name relative to the listed directory, without trailing slash.
    pub name: String,
    /// Full path of the entry.
    pub path: String,
    /// Whether the entry is a (pseudo-)directory.
    pub is_dir: bool,
    /// Metadata, when the listing produced it without extra requests.
    pub stat: Option<Stat>,
}

impl DirEntry {
    /// Whether the entry is a regular file or object.
    pub fn is_file(&self) -> bool {
        !self.is_dir
    }
}

/// Counters exposed by streaming readers, for tests and diagnostics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReadStats {
    /// Bytes handed to the caller.
    pub bytes_read: u64,
    /// Ranged requests issued.
    pub requests: u64,
    /// Mid-stream failures recovered from.
    pub failures: u64,
}

/// One level of a directory tree walk.
#[derive(Clone, Debug, PartialEq)]
pub struct WalkEntry {
    /// The directory being reported, without trailing slash.
    pub root: String,
    /// Names of subdirectories directly under `root`.
    pub dirs: Vec<String>,
    /// Names of files directly under `root`.
    pub files: Vec<String>,
}
