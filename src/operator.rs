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

use std::collections::HashSet;
use std::collections::VecDeque;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use md5::Digest;
use md5::Md5;

use crate::raw::*;
use crate::services::azblob::core::AzblobCore;
use crate::services::azblob::AzblobBackend;
use crate::services::azblob::AzureTokenLoader;
use crate::services::azblob::DelegationKeyLoader;
use crate::services::fs;
use crate::services::gcs::core::GcsCore;
use crate::services::gcs::core::DEFAULT_GCS_ENDPOINT;
use crate::services::gcs::GcsBackend;
use crate::services::gcs::GoogleTokenLoader;
use crate::types::blob_path::strip_slash;
use crate::*;

/// Piece size for streamed copies and hash computation.
const COPY_CHUNK_SIZE: usize = 1024 * 1024;

/// Options of [`Operator::copy`].
#[derive(Clone, Copy, Debug, Default)]
pub struct CopyOptions {
    /// Replace an existing destination instead of failing with
    /// [`ErrorKind::AlreadyExists`].
    pub overwrite: bool,
    /// Compute (or fetch) the destination's MD5 during the copy.
    pub return_md5: bool,
}

/// The entry point of blobpath: one path API over the local filesystem,
/// `gs://` buckets and `as://` containers.
///
/// The operator is cheap to clone and share. Credentials are discovered
/// lazily per backend and cached process-wide with refresh; the HTTP pool is
/// process-wide and rebuilt transparently after a fork.
#[derive(Clone)]
pub struct Operator {
    ctx: Arc<Context>,
}

impl Default for Operator {
    fn default() -> Self {
        Operator::new()
    }
}

pub(crate) struct Context {
    client: HttpClient,
    google_tokens: Arc<TokenManager<GoogleTokenLoader>>,
    azure_tokens: Arc<TokenManager<AzureTokenLoader>>,
    azure_delegation_keys: Arc<TokenManager<DelegationKeyLoader>>,
}

impl Context {
    fn accessor(&self, path: &BlobPath) -> Result<Arc<dyn Accessor>> {
        match path {
            BlobPath::Local(_) => Err(Error::new(
                ErrorKind::Unexpected,
                "local paths are handled by the filesystem passthrough",
            )),
            BlobPath::Gcs { bucket, .. } => Ok(Arc::new(GcsBackend::new(GcsCore {
                bucket: bucket.clone(),
                endpoint: DEFAULT_GCS_ENDPOINT.to_string(),
                client: self.client,
                tokens: self.google_tokens.clone(),
            }))),
            BlobPath::Azblob {
                account, container, ..
            } => Ok(Arc::new(AzblobBackend::new(AzblobCore {
                account: account.clone(),
                container: container.clone(),
                client: self.client,
                tokens: self.azure_tokens.clone(),
                delegation_keys: self.azure_delegation_keys.clone(),
            }))),
        }
    }

    /// Whether a remote path names an object.
    async fn is_file(&self, path: &BlobPath) -> Result<bool> {
        let key = path.key().unwrap_or("");
        if key.is_empty() {
            return Ok(false);
        }
        let acc = self.accessor(path)?;
        Ok(acc.head(key).await?.is_some())
    }

    /// Whether a remote path names a (pseudo-)directory.
    ///
    /// An empty key asks about the bucket/container itself; anything else is
    /// a one-entry delimited listing.
    async fn is_dir(&self, path: &BlobPath) -> Result<bool> {
        let dir = path.as_dir();
        let key = dir.key().unwrap_or("").to_string();
        let acc = self.accessor(&dir)?;

        if key.is_empty() {
            return acc.container_exists().await;
        }

        let mut pages = acc.list(ListArgs::delimited(&key).with_limit(1));
        match pages.next().await {
            Ok(entry) => Ok(entry.is_some()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn path_exists(&self, path: &BlobPath) -> Result<bool> {
        if self.is_file(path).await? {
            return Ok(true);
        }
        self.is_dir(path).await
    }
}

impl Operator {
    /// Create an operator. No credentials are touched until an operation
    /// needs them.
    pub fn new() -> Self {
        let client = HttpClient::new();
        let azure_tokens = Arc::new(TokenManager::new(AzureTokenLoader::new(client)));
        Operator {
            ctx: Arc::new(Context {
                client,
                google_tokens: Arc::new(TokenManager::new(GoogleTokenLoader::new(client))),
                azure_delegation_keys: Arc::new(TokenManager::new(DelegationKeyLoader::new(
                    client,
                    azure_tokens.clone(),
                ))),
                azure_tokens,
            }),
        }
    }

    /// Whether the path exists, as a file or a directory.
    pub async fn exists(&self, path: &str) -> Result<bool> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::exists(lp).await;
        }
        self.ctx.path_exists(&p).await
    }

    /// Whether the path names a regular file or object.
    pub async fn is_file(&self, path: &str) -> Result<bool> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::is_file(lp).await;
        }
        self.ctx.is_file(&p).await
    }

    /// Whether the path names an existing directory.
    pub async fn is_dir(&self, path: &str) -> Result<bool> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::is_dir(lp).await;
        }
        self.ctx.is_dir(&p).await
    }

    /// Metadata of a file or object.
    pub async fn stat(&self, path: &str) -> Result<Stat> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::stat(lp).await;
        }

        let key = p.key().unwrap_or("");
        if key.is_empty() {
            return Err(not_found(path));
        }
        let acc = self.ctx.accessor(&p)?;
        acc.head(key).await?.ok_or_else(|| not_found(path))
    }

    /// List the contents of a directory.
    pub async fn list(&self, path: &str) -> Result<Lister> {
        self.list_sharded(path, 0).await
    }

    /// List a directory, optionally fanning out over generated key prefixes.
    ///
    /// With `shard_prefix_length > 0` every possible prefix of up to that
    /// many characters is queried independently on a worker pool, which
    /// speeds up huge directories of uniformly distributed names. Entries
    /// arrive in no particular order.
    pub async fn list_sharded(&self, path: &str, shard_prefix_length: usize) -> Result<Lister> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            let entries = fs::list_dir_entries(lp).await?;
            let entries = entries
                .into_iter()
                .map(|(name, is_dir)| DirEntry {
                    path: lp.join(&name).to_string_lossy().into_owned(),
                    name,
                    is_dir,
                    stat: None,
                })
                .collect();
            return Ok(Lister {
                inner: ListerInner::Entries(entries),
            });
        }

        let dir = p.as_dir();
        if !self.ctx.path_exists(&dir).await? {
            return Err(not_found(path));
        }
        if !self.ctx.is_dir(&dir).await? {
            return Err(Error::new(ErrorKind::NotADirectory, "not a directory")
                .with_context("path", path));
        }

        let prefix = dir.key().unwrap_or("").to_string();
        if shard_prefix_length == 0 {
            let acc = self.ctx.accessor(&dir)?;
            return Ok(Lister {
                inner: ListerInner::Page {
                    pages: acc.list(ListArgs::delimited(&prefix)),
                    base: dir,
                    prefix,
                },
            });
        }

        let ctx = self.ctx.clone();
        let worker_dir = dir.clone();
        let tasks = shard_prefixes(shard_prefix_length);
        let lister = spawn_sharded_listing(tasks, move |task, tx| {
            let ctx = ctx.clone();
            let dir = worker_dir.clone();
            async move {
                let base_key = dir.key().unwrap_or("").to_string();
                if task.exact {
                    let full = dir.with_key(&format!("{base_key}{}", task.prefix));
                    if ctx.is_file(&full).await? {
                        let _ = tx.send(Ok(Some(task.prefix))).await;
                    } else if ctx.is_dir(&full).await? {
                        let _ = tx.send(Ok(Some(format!("{}/", task.prefix)))).await;
                    }
                } else {
                    let acc = ctx.accessor(&dir)?;
                    let mut pages =
                        acc.list(ListArgs::delimited(&format!("{base_key}{}", task.prefix)));
                    while let Some(name) = pages.next().await? {
                        let suffix = name[base_key.len()..].to_string();
                        let _ = tx.send(Ok(Some(suffix))).await;
                    }
                }
                Ok(())
            }
        });

        Ok(Lister {
            inner: ListerInner::Sharded {
                lister,
                base: dir,
                prefix,
            },
        })
    }

    /// Walk a directory tree.
    ///
    /// Remote trees are visited breadth first with one delimited listing per
    /// directory; only top-down order is supported there. A missing
    /// directory walks as empty.
    pub async fn walk(&self, path: &str, topdown: bool) -> Result<Vec<WalkEntry>> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::walk(lp, topdown).await;
        }
        if !topdown {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "bottom-up walks are only supported on local paths",
            ));
        }

        if !self.ctx.is_dir(&p).await? {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        let mut queue: VecDeque<BlobPath> = VecDeque::new();
        queue.push_back(p.as_dir());

        while let Some(cur) = queue.pop_front() {
            let key = cur.key().unwrap_or("").to_string();
            let acc = self.ctx.accessor(&cur)?;
            let mut pages = acc.list(ListArgs::delimited(&key));

            let mut dirs = Vec::new();
            let mut files = Vec::new();
            while let Some(name) = pages.next().await? {
                if name == key {
                    continue;
                }
                let mut suffix = name[key.len()..].to_string();
                if suffix.ends_with('/') {
                    suffix.pop();
                    dirs.push(suffix);
                } else {
                    files.push(suffix);
                }
            }

            for d in &dirs {
                queue.push_back(cur.with_key(&format!("{key}{d}/")));
            }
            out.push(WalkEntry {
                root: strip_slash(&cur.to_string()).to_string(),
                dirs,
                files,
            });
        }
        Ok(out)
    }

    /// Find paths matching a pattern; only `*` and `**` are supported.
    ///
    /// On remote paths everything under the literal prefix is enumerated
    /// once, and implicit parent directories participate in matching.
    pub async fn glob(&self, pattern: &str) -> Result<Vec<String>> {
        let re = compile_glob(pattern)?;

        let Some((prefix, _)) = pattern.split_once('*') else {
            // No wildcard at all: the pattern is a literal path.
            return Ok(if self.exists(pattern).await? {
                vec![strip_slash(pattern).to_string()]
            } else {
                Vec::new()
            });
        };

        let parsed = BlobPath::parse(prefix)?;
        if let BlobPath::Local(_) = &parsed {
            return self.glob_local(pattern, prefix).await;
        }

        let key_prefix = parsed.key().ok_or_else(|| {
            Error::new(
                ErrorKind::ConfigInvalid,
                "glob wildcards must come after the bucket or container",
            )
            .with_context("pattern", pattern)
        })?;
        let root = parsed.root_url();

        let acc = self.ctx.accessor(&parsed)?;
        let mut pages = acc.list(ListArgs::flat(key_prefix));

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        while let Some(name) = pages.next().await? {
            // Expand implicit parent directories so the glob can match
            // them even when no marker object exists.
            let parts: Vec<&str> = name.split('/').collect();
            let mut cur = String::new();
            for (i, part) in parts.iter().enumerate() {
                cur.push_str(part);
                if i < parts.len() - 1 {
                    cur.push('/');
                }
                if !seen.insert(cur.clone()) {
                    continue;
                }
                let filepath = format!("{root}/{cur}");
                if re.is_match(&filepath) {
                    if filepath == prefix && filepath.ends_with('/') {
                        // We matched the directory being globbed itself.
                        continue;
                    }
                    out.push(strip_slash(&filepath).to_string());
                }
            }
        }
        Ok(out)
    }

    async fn glob_local(&self, pattern: &str, prefix: &str) -> Result<Vec<String>> {
        // Local globbing keeps `*` semantics for any star run: `**` does not
        // descend, matching how OS-level globbing treats it.
        let collapsed = collapse_star_runs(pattern);
        let re = compile_glob(&collapsed)?;

        let root_dir = match prefix.rsplit_once('/') {
            Some((dir, _)) if !dir.is_empty() => dir.to_string(),
            Some(_) => "/".to_string(),
            None => ".".to_string(),
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut out = Vec::new();
        for entry in fs::walk(Path::new(&root_dir), true).await? {
            for name in entry.dirs.iter().chain(entry.files.iter()) {
                let candidate = format!("{}/{name}", entry.root);
                if seen.insert(candidate.clone()) && re.is_match(&candidate) {
                    out.push(candidate);
                }
            }
        }
        Ok(out)
    }

    /// Ensure the path is a directory, creating it if needed.
    ///
    /// Remote directories are a zero-byte marker object whose key ends in
    /// `/`; no intermediate markers are needed over a flat namespace.
    pub async fn create_dir_all(&self, path: &str) -> Result<()> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::create_dir_all(lp).await;
        }

        let dir = p.as_dir();
        let key = dir.key().unwrap_or("");
        if key.is_empty() {
            // The container root always exists (or is not ours to create).
            return Ok(());
        }
        let acc = self.ctx.accessor(&dir)?;
        acc.create_dir_marker(key).await
    }

    /// Remove a file or object.
    pub async fn remove(&self, path: &str) -> Result<()> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::remove_file(lp).await;
        }

        let key = p.key().unwrap_or("");
        if key.is_empty() || key.ends_with('/') {
            return Err(Error::new(ErrorKind::IsADirectory, "is a directory")
                .with_context("path", path));
        }
        let acc = self.ctx.accessor(&p)?;
        acc.delete(key).await
    }

    /// Remove an empty directory.
    ///
    /// Removing a directory that does not exist succeeds silently; removing
    /// a non-empty one fails with [`ErrorKind::DirectoryNotEmpty`]. The
    /// bucket/container root is never deleted.
    pub async fn remove_dir(&self, path: &str) -> Result<()> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return fs::remove_dir(lp).await;
        }

        let dir = p.as_dir();
        let key = dir.key().unwrap_or("").to_string();
        if key.is_empty() {
            return Err(Error::new(
                ErrorKind::Unsupported,
                "cannot delete a bucket or container root",
            )
            .with_context("path", path));
        }

        if !self.ctx.path_exists(&dir).await? {
            // Already gone; deleting twice is fine.
            return Ok(());
        }

        let acc = self.ctx.accessor(&dir)?;
        let mut pages = acc.list(ListArgs::delimited(&key));
        loop {
            match pages.next().await? {
                Some(name) if name == key => continue,
                Some(_) => {
                    return Err(Error::new(ErrorKind::DirectoryNotEmpty, "directory not empty")
                        .with_context("path", path))
                }
                None => break,
            }
        }

        // Empty but existing: the only thing holding it up is the marker.
        acc.delete(&key).await
    }

    /// Remove a directory tree.
    ///
    /// Every object under the prefix is deleted; objects that vanish
    /// mid-delete are treated as already gone, so a retried partial removal
    /// converges.
    pub async fn remove_all(&self, path: &str) -> Result<()> {
        let p = BlobPath::parse(path)?;
        if !self.is_dir(path).await? {
            return Err(Error::new(ErrorKind::NotADirectory, "not a directory")
                .with_context("path", path));
        }
        if let BlobPath::Local(lp) = &p {
            return fs::remove_tree(lp).await;
        }

        let dir = p.as_dir();
        let key = dir.key().unwrap_or("").to_string();
        let acc = self.ctx.accessor(&dir)?;
        let mut pages = acc.list(ListArgs::flat(&key));
        while let Some(name) = pages.next().await? {
            match acc.delete(&name).await {
                Ok(()) => {}
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err),
            }
        }
        Ok(())
    }

    /// Copy a file.
    ///
    /// Same-cloud copies run server side (rewrite on GCS, copy-blob with
    /// polling on Azure); everything else streams through this process in
    /// [`COPY_CHUNK_SIZE`] pieces. Returns the destination MD5 when
    /// requested.
    pub async fn copy(&self, src: &str, dst: &str, opts: CopyOptions) -> Result<Option<String>> {
        if !opts.overwrite && self.exists(dst).await? {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                "destination already exists and overwrite is disabled",
            )
            .with_context("dst", dst));
        }

        let src_path = BlobPath::parse(src)?;
        let dst_path = BlobPath::parse(dst)?;

        let same_cloud = matches!(
            (&src_path, &dst_path),
            (BlobPath::Gcs { .. }, BlobPath::Gcs { .. })
                | (BlobPath::Azblob { .. }, BlobPath::Azblob { .. })
        );
        if same_cloud {
            let acc = self.ctx.accessor(&dst_path)?;
            let dst_key = dst_path.key().unwrap_or("");
            let md5 = acc.copy_from(&src_path, dst_key, opts.return_md5).await?;
            if opts.return_md5 && md5.is_none() {
                return Ok(Some(self.content_md5(dst).await?));
            }
            return Ok(md5);
        }

        let mut reader = self.reader(src).await?;
        let mut writer = self.writer(dst).await?;
        let mut hasher = opts.return_md5.then(Md5::new);
        loop {
            let chunk = reader.read(COPY_CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            if let Some(hasher) = &mut hasher {
                hasher.update(&chunk);
            }
            writer.write(&chunk).await?;
        }
        writer.close().await?;

        Ok(hasher.map(|h| hex::encode(h.finalize())))
    }

    /// The MD5 of a file, in hex.
    ///
    /// GCS usually reports it in metadata; Azure may or may not. Whenever it
    /// has to be computed by streaming, the result is written back to the
    /// object's metadata best-effort, guarded by the version observed before
    /// hashing so a concurrent overwrite abandons the update.
    pub async fn content_md5(&self, path: &str) -> Result<String> {
        let p = BlobPath::parse(path)?;
        if p.is_local() {
            return self.compute_md5(path).await;
        }

        let key = p.key().unwrap_or("");
        if key.is_empty() {
            return Err(not_found(path));
        }
        let acc = self.ctx.accessor(&p)?;
        let stat = acc.head(key).await?.ok_or_else(|| not_found(path))?;
        if let Some(md5) = stat.md5 {
            return Ok(md5);
        }

        let md5 = self.compute_md5(path).await?;
        // Best effort: a concurrent overwrite makes this fail or report
        // `false`, both of which we ignore.
        let _ = acc.store_md5(key, &md5, stat.version.as_deref()).await;
        Ok(md5)
    }

    async fn compute_md5(&self, path: &str) -> Result<String> {
        let mut reader = self.reader(path).await?;
        let mut hasher = Md5::new();
        loop {
            let chunk = reader.read(COPY_CHUNK_SIZE).await?;
            if chunk.is_empty() {
                break;
            }
            hasher.update(&chunk);
        }
        Ok(hex::encode(hasher.finalize()))
    }

    /// Produce a URL a plain HTTP client could open.
    ///
    /// Local paths become `file://` URLs with no expiry; GCS uses a V4
    /// query signature and Azure a user-delegation SAS.
    pub async fn signed_url(&self, path: &str, expire: Duration) -> Result<SignedUrl> {
        let p = BlobPath::parse(path)?;
        if let BlobPath::Local(lp) = &p {
            return Ok(SignedUrl {
                url: format!("file://{}", lp.to_string_lossy()),
                expires_in: None,
            });
        }

        let acc = self.ctx.accessor(&p)?;
        acc.presign(p.key().unwrap_or(""), expire).await
    }

    /// Open a file for streaming reads.
    pub async fn reader(&self, path: &str) -> Result<Reader> {
        let p = BlobPath::parse(path)?;
        if p.key().is_some_and(|k| k.is_empty() || k.ends_with('/')) {
            return Err(Error::new(ErrorKind::IsADirectory, "cannot open a directory")
                .with_context("path", path));
        }
        match &p {
            BlobPath::Local(lp) => Reader::open_local(PathBuf::from(lp)).await,
            _ => {
                let acc = self.ctx.accessor(&p)?;
                let inner = acc.reader(p.key().unwrap_or("")).await?;
                Ok(Reader::from_remote(inner))
            }
        }
    }

    /// Open a file for streaming writes, creating or replacing it.
    ///
    /// Appending to remote paths is not supported: a concurrent writer
    /// could lose data between download and re-upload, so no atomicity
    /// could be promised.
    pub async fn writer(&self, path: &str) -> Result<Writer> {
        let p = BlobPath::parse(path)?;
        if p.key().is_some_and(|k| k.is_empty() || k.ends_with('/')) {
            return Err(Error::new(ErrorKind::IsADirectory, "cannot open a directory")
                .with_context("path", path));
        }
        match &p {
            BlobPath::Local(lp) => Writer::create_local(PathBuf::from(lp)).await,
            _ => {
                let acc = self.ctx.accessor(&p)?;
                let inner = acc.writer(p.key().unwrap_or("")).await?;
                Ok(Writer::from_remote(inner))
            }
        }
    }

    /// Read the whole file.
    pub async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let mut reader = self.reader(path).await?;
        reader.read_to_end().await
    }

    /// Read the whole file as UTF-8.
    pub async fn read_to_string(&self, path: &str) -> Result<String> {
        String::from_utf8(self.read(path).await?).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "file is not valid utf-8")
                .with_context("path", path)
                .with_source(err)
        })
    }

    /// Write the whole file.
    pub async fn write(&self, path: &str, bs: &[u8]) -> Result<()> {
        let mut writer = self.writer(path).await?;
        writer.write(bs).await?;
        writer.close().await
    }
}

fn not_found(path: &str) -> Error {
    Error::new(ErrorKind::NotFound, "no such file or directory").with_context("path", path)
}

fn collapse_star_runs(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut in_run = false;
    for c in pattern.chars() {
        if c == '*' {
            if !in_run {
                out.push(c);
            }
            in_run = true;
        } else {
            out.push(c);
            in_run = false;
        }
    }
    out
}

/// Lazy enumeration of one directory, returned by [`Operator::list`].
#[derive(Debug)]
pub struct Lister {
    inner: ListerInner,
}

#[derive(Debug)]
enum ListerInner {
    /// Local listings are read eagerly; directories are small there.
    Entries(Vec<DirEntry>),
    Page {
        pages: PageLister,
        base: BlobPath,
        prefix: String,
    },
    Sharded {
        lister: ShardedLister,
        base: BlobPath,
        prefix: String,
    },
}

impl Lister {
    /// The next entry, or `None` at the end of the listing.
    pub async fn next(&mut self) -> Result<Option<DirEntry>> {
        match &mut self.inner {
            ListerInner::Entries(entries) => {
                if entries.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some(entries.remove(0)))
                }
            }
            ListerInner::Page {
                pages,
                base,
                prefix,
            } => loop {
                let Some(name) = pages.next().await? else {
                    return Ok(None);
                };
                // The directory's own marker is not one of its entries.
                if name == *prefix {
                    continue;
                }
                let suffix = name[prefix.len()..].to_string();
                return Ok(Some(suffix_entry(base, prefix, suffix)));
            },
            ListerInner::Sharded {
                lister,
                base,
                prefix,
            } => {
                let Some(suffix) = lister.next().await? else {
                    return Ok(None);
                };
                Ok(Some(suffix_entry(base, prefix, suffix)))
            }
        }
    }

    /// Drain the remaining entries.
    pub async fn collect(&mut self) -> Result<Vec<DirEntry>> {
        let mut out = Vec::new();
        while let Some(entry) = self.next().await? {
            out.push(entry);
        }
        Ok(out)
    }

    /// Drain the remaining entries into names only.
    pub async fn names(&mut self) -> Result<Vec<String>> {
        Ok(self.collect().await?.into_iter().map(|e| e.name).collect())
    }
}

fn suffix_entry(base: &BlobPath, prefix: &str, suffix: String) -> DirEntry {
    let is_dir = suffix.ends_with('/');
    let name = strip_slash(&suffix).to_string();
    let full = base.with_key(&format!("{prefix}{name}"));
    DirEntry {
        name,
        path: full.to_string(),
        is_dir,
        stat: None,
    }
}
