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

//! Local filesystem passthrough.
//!
//! Local paths delegate straight to the host OS; only enough surface exists
//! here to mirror the remote operations.

use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::time::UNIX_EPOCH;

use crate::*;

pub async fn stat(path: &Path) -> Result<Stat> {
    let meta = tokio::fs::metadata(path).await.map_err(new_std_io_error)?;
    let mtime = meta
        .modified()
        .map_err(new_std_io_error)?
        .duration_since(UNIX_EPOCH)
        .map(|v| v.as_secs_f64())
        .unwrap_or(0.0);

    Ok(Stat {
        size: meta.len(),
        mtime,
        md5: None,
        version: None,
    })
}

pub async fn exists(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(_) => Ok(true),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(new_std_io_error(err)),
    }
}

pub async fn is_file(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_file()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(new_std_io_error(err)),
    }
}

pub async fn is_dir(path: &Path) -> Result<bool> {
    match tokio::fs::metadata(path).await {
        Ok(meta) => Ok(meta.is_dir()),
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(err) => Err(new_std_io_error(err)),
    }
}

/// Entries of the directory as `(name, is_dir)` pairs, sorted by name.
pub async fn list_dir_entries(path: &Path) -> Result<Vec<(String, bool)>> {
    let mut rd = tokio::fs::read_dir(path).await.map_err(new_std_io_error)?;

    let mut entries = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(new_std_io_error)? {
        let kind = entry.file_type().await.map_err(new_std_io_error)?;
        entries.push((
            entry.file_name().to_string_lossy().into_owned(),
            kind.is_dir(),
        ));
    }
    entries.sort();
    Ok(entries)
}

/// Names of the directory's entries, sorted.
pub async fn list_dir(path: &Path) -> Result<Vec<String>> {
    let mut rd = tokio::fs::read_dir(path).await.map_err(|err| {
        let err = new_std_io_error(err);
        if err.kind() == ErrorKind::NotFound {
            err
        } else {
            err.with_context("path", path.to_string_lossy())
        }
    })?;

    let mut names = Vec::new();
    while let Some(entry) = rd.next_entry().await.map_err(new_std_io_error)? {
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    names.sort();
    Ok(names)
}

/// Walk a directory tree with sorted entries.
///
/// `topdown` yields parents before children; `false` reverses into a
/// bottom-up order.
pub async fn walk(path: &Path, topdown: bool) -> Result<Vec<WalkEntry>> {
    if !is_dir(path).await? {
        return Ok(Vec::new());
    }

    let mut out = Vec::new();
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    queue.push_back(path.to_path_buf());

    while let Some(dir) = queue.pop_front() {
        let mut rd = tokio::fs::read_dir(&dir).await.map_err(new_std_io_error)?;
        let mut dirs = Vec::new();
        let mut files = Vec::new();
        while let Some(entry) = rd.next_entry().await.map_err(new_std_io_error)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let kind = entry.file_type().await.map_err(new_std_io_error)?;
            if kind.is_dir() {
                dirs.push(name);
            } else {
                files.push(name);
            }
        }
        dirs.sort();
        files.sort();

        for d in &dirs {
            queue.push_back(dir.join(d));
        }
        let root = dir.to_string_lossy();
        out.push(WalkEntry {
            root: crate::types::blob_path::strip_slash(&root).to_string(),
            dirs,
            files,
        });
    }

    if !topdown {
        out.reverse();
    }
    Ok(out)
}

pub async fn create_dir_all(path: &Path) -> Result<()> {
    tokio::fs::create_dir_all(path).await.map_err(new_std_io_error)
}

pub async fn remove_file(path: &Path) -> Result<()> {
    tokio::fs::remove_file(path).await.map_err(new_std_io_error)
}

/// Remove an empty directory. Removing a missing directory succeeds.
pub async fn remove_dir(path: &Path) -> Result<()> {
    if !exists(path).await? {
        return Ok(());
    }
    if !list_dir(path).await?.is_empty() {
        return Err(Error::new(ErrorKind::DirectoryNotEmpty, "directory not empty")
            .with_context("path", path.to_string_lossy()));
    }
    tokio::fs::remove_dir(path).await.map_err(new_std_io_error)
}

pub async fn remove_tree(path: &Path) -> Result<()> {
    tokio::fs::remove_dir_all(path).await.map_err(new_std_io_error)
}
