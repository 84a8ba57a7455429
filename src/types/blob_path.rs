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

use std::fmt;
use std::fmt::Display;
use std::fmt::Formatter;
use std::path::PathBuf;

use crate::*;

/// Suffix of the HTTPS form of an Azure blob endpoint.
const AZURE_BLOB_HOST_SUFFIX: &str = ".blob.core.windows.net";

/// A parsed blobpath path.
///
/// Three shapes are accepted:
///
/// - host OS paths, handled by the local filesystem
/// - `gs://<bucket>/<key>` for Google Cloud Storage
/// - `as://<account>-<container>/<key>` for Azure Blob Storage, with the
///   equivalent `https://<account>.blob.core.windows.net/<container>/<key>`
///   form canonicalized to the `as://` shape on input
///
/// Keys are opaque. A trailing `/` denotes directory intent.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlobPath {
    /// A host OS path.
    Local(PathBuf),
    /// A Google Cloud Storage object.
    Gcs {
        /// Bucket name.
        bucket: String,
        /// Object key, possibly empty for the bucket root.
        key: String,
    },
    /// An Azure Blob Storage object.
    Azblob {
        /// Storage account name.
        account: String,
        /// Container name.
        container: String,
        /// Blob key, possibly empty for the container root.
        key: String,
    },
}

impl BlobPath {
    /// Parse a path string into a [`BlobPath`].
    ///
    /// Strings without a scheme are local paths. Unknown schemes are
    /// rejected.
    pub fn parse(path: &str) -> Result<Self> {
        let Some((scheme, rest)) = path.split_once("://") else {
            return Ok(BlobPath::Local(PathBuf::from(path)));
        };

        match scheme {
            "gs" => {
                let (bucket, key) = rest.split_once('/').unwrap_or((rest, ""));
                if bucket.is_empty() {
                    return Err(Error::new(ErrorKind::ConfigInvalid, "bucket name is empty")
                        .with_context("path", path));
                }
                Ok(BlobPath::Gcs {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                })
            }
            "as" => {
                let (netloc, key) = rest.split_once('/').unwrap_or((rest, ""));
                // Storage account names are strictly alphanumeric, so the
                // first `-` always separates account from container.
                let Some((account, container)) = netloc.split_once('-') else {
                    return Err(Error::new(
                        ErrorKind::ConfigInvalid,
                        "expected as://<account>-<container>/<key>",
                    )
                    .with_context("path", path));
                };
                if account.is_empty() || container.is_empty() {
                    return Err(Error::new(
                        ErrorKind::ConfigInvalid,
                        "account or container name is empty",
                    )
                    .with_context("path", path));
                }
                Ok(BlobPath::Azblob {
                    account: account.to_string(),
                    container: container.to_string(),
                    key: key.to_string(),
                })
            }
            "https" => {
                let (host, rest) = rest.split_once('/').unwrap_or((rest, ""));
                let Some(account) = host.strip_suffix(AZURE_BLOB_HOST_SUFFIX) else {
                    return Err(Error::new(
                        ErrorKind::ConfigInvalid,
                        "https paths must point at an azure blob endpoint",
                    )
                    .with_context("path", path));
                };
                let (container, key) = rest.split_once('/').unwrap_or((rest, ""));
                if account.is_empty() || container.is_empty() {
                    return Err(Error::new(
                        ErrorKind::ConfigInvalid,
                        "account or container name is empty",
                    )
                    .with_context("path", path));
                }
                Ok(BlobPath::Azblob {
                    account: account.to_string(),
                    container: container.to_string(),
                    key: key.to_string(),
                })
            }
            _ => Err(
                Error::new(ErrorKind::ConfigInvalid, "unrecognized path scheme")
                    .with_context("path", path),
            ),
        }
    }

    /// Whether this path lives on the local filesystem.
    pub fn is_local(&self) -> bool {
        matches!(self, BlobPath::Local(_))
    }

    /// The object key for remote paths, `None` for local ones.
    pub fn key(&self) -> Option<&str> {
        match self {
            BlobPath::Local(_) => None,
            BlobPath::Gcs { key, .. } => Some(key),
            BlobPath::Azblob { key, .. } => Some(key),
        }
    }

    /// Whether the path carries directory intent (trailing `/` or empty key).
    pub fn is_dir_intent(&self) -> bool {
        match self {
            BlobPath::Local(p) => p.as_os_str().to_string_lossy().ends_with('/'),
            BlobPath::Gcs { key, .. } | BlobPath::Azblob { key, .. } => {
                key.is_empty() || key.ends_with('/')
            }
        }
    }

    /// Return a copy whose key is slash-terminated.
    pub fn as_dir(&self) -> Self {
        let mut p = self.clone();
        match &mut p {
            BlobPath::Local(_) => {}
            BlobPath::Gcs { key, .. } | BlobPath::Azblob { key, .. } => {
                if !key.is_empty() && !key.ends_with('/') {
                    key.push('/');
                }
            }
        }
        p
    }

    /// Return a copy with the given key, for remote paths.
    pub(crate) fn with_key(&self, new_key: &str) -> Self {
        let mut p = self.clone();
        match &mut p {
            BlobPath::Local(_) => {}
            BlobPath::Gcs { key, .. } | BlobPath::Azblob { key, .. } => {
                *key = new_key.to_string();
            }
        }
        p
    }

    /// The `scheme://netloc` root of a remote path, without trailing slash.
    pub fn root_url(&self) -> String {
        match self {
            BlobPath::Local(p) => p.to_string_lossy().into_owned(),
            BlobPath::Gcs { bucket, .. } => format!("gs://{bucket}"),
            BlobPath::Azblob {
                account, container, ..
            } => {
                format!("as://{account}-{container}")
            }
        }
    }
}

impl Display for BlobPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            BlobPath::Local(p) => write!(f, "{}", p.to_string_lossy()),
            BlobPath::Gcs { bucket, key } => write!(f, "gs://{bucket}/{key}"),
            BlobPath::Azblob {
                account,
                container,
                key,
            } => write!(f, "as://{account}-{container}/{key}"),
        }
    }
}

/// Join path segments onto a base path.
///
/// A segment starting with `/` replaces the whole key; `.` and `..` segments
/// are resolved against the base.
pub fn join(base: &str, parts: &[&str]) -> Result<String> {
    let mut out = base.to_string();
    for part in parts {
        out = join2(&out, part)?;
    }
    Ok(out)
}

fn join2(a: &str, b: &str) -> Result<String> {
    let parsed = BlobPath::parse(a)?;
    if parsed.is_local() {
        let mut p = PathBuf::from(a);
        p.push(b);
        return Ok(p.to_string_lossy().into_owned());
    }

    if b.contains("://") {
        return Err(Error::new(
            ErrorKind::ConfigInvalid,
            "joined segment must be relative",
        )
        .with_context("segment", b));
    }

    let dir = parsed.as_dir();
    let key = dir.key().unwrap_or("");

    let mut segments: Vec<&str> = if b.starts_with('/') {
        Vec::new()
    } else {
        key.split('/').filter(|s| !s.is_empty()).collect()
    };
    let trailing = b.ends_with('/') || b.is_empty();
    for seg in b.split('/') {
        match seg {
            "" | "." => {}
            ".." => {
                segments.pop();
            }
            other => segments.push(other),
        }
    }

    let mut joined = segments.join("/");
    if trailing && !joined.is_empty() {
        joined.push('/');
    }
    Ok(format!("{}/{}", dir.root_url(), joined))
}

/// Get the filename component of the path.
///
/// For remote paths this is the part after the last `/` of the key.
pub fn basename(path: &str) -> String {
    match BlobPath::parse(path) {
        Ok(BlobPath::Local(_)) | Err(_) => PathBuf::from(path)
            .file_name()
            .map(|v| v.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Ok(p) => {
            let key = p.key().unwrap_or("");
            key.rsplit('/').next().unwrap_or("").to_string()
        }
    }
}

/// Get the directory name of the path.
///
/// For remote paths the root directory is `scheme://netloc`.
pub fn dirname(path: &str) -> String {
    match BlobPath::parse(path) {
        Ok(BlobPath::Local(_)) | Err(_) => PathBuf::from(path)
            .parent()
            .map(|v| v.to_string_lossy().into_owned())
            .unwrap_or_default(),
        Ok(p) => {
            let key = p.key().unwrap_or("");
            let key = key.strip_suffix('/').unwrap_or(key);
            match key.rsplit_once('/') {
                Some((parent, _)) => format!("{}/{}", p.root_url(), parent),
                None => p.root_url(),
            }
        }
    }
}

/// Strip one trailing slash, if present.
pub(crate) fn strip_slash(path: &str) -> &str {
    path.strip_suffix('/').unwrap_or(path)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn test_parse() {
        let cases = vec![
            (
                "gcs file",
                "gs://bucket/a/b.txt",
                BlobPath::Gcs {
                    bucket: "bucket".to_string(),
                    key: "a/b.txt".to_string(),
                },
            ),
            (
                "gcs bucket root",
                "gs://bucket",
                BlobPath::Gcs {
                    bucket: "bucket".to_string(),
                    key: "".to_string(),
                },
            ),
            (
                "azure native form",
                "as://myaccount-my-container/a/b.txt",
                BlobPath::Azblob {
                    account: "myaccount".to_string(),
                    container: "my-container".to_string(),
                    key: "a/b.txt".to_string(),
                },
            ),
            (
                "azure https form",
                "https://myaccount.blob.core.windows.net/my-container/a/b.txt",
                BlobPath::Azblob {
                    account: "myaccount".to_string(),
                    container: "my-container".to_string(),
                    key: "a/b.txt".to_string(),
                },
            ),
            (
                "local path",
                "/tmp/a/b.txt",
                BlobPath::Local(PathBuf::from("/tmp/a/b.txt")),
            ),
            (
                "relative local path",
                "a/b.txt",
                BlobPath::Local(PathBuf::from("a/b.txt")),
            ),
        ];

        for (name, input, expect) in cases {
            assert_eq!(BlobPath::parse(input).unwrap(), expect, "{name}")
        }
    }

    #[test]
    fn test_parse_rejects() {
        for input in [
            "ftp://bucket/key",
            "https://example.com/container/key",
            "gs://",
            "as://plain/key",
        ] {
            let err = BlobPath::parse(input).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::ConfigInvalid, "{input}");
        }
    }

    #[test]
    fn test_join() {
        let cases = vec![
            ("simple", "gs://bucket/a", &["b"][..], "gs://bucket/a/b"),
            ("trailing base", "gs://bucket/a/", &["b"], "gs://bucket/a/b"),
            ("multi", "gs://bucket", &["a", "b"], "gs://bucket/a/b"),
            ("parent", "gs://bucket/a/b", &["../c"], "gs://bucket/a/c"),
            ("absolute", "gs://bucket/a/b", &["/c"], "gs://bucket/c"),
            (
                "dir result",
                "as://acct-cont/a",
                &["b/"],
                "as://acct-cont/a/b/",
            ),
        ];

        for (name, base, parts, expect) in cases {
            assert_eq!(join(base, parts).unwrap(), expect, "{name}")
        }
    }

    #[test]
    fn test_basename_dirname() {
        assert_eq!(basename("gs://bucket/a/b.txt"), "b.txt");
        assert_eq!(basename("as://acct-cont/a"), "a");
        assert_eq!(dirname("gs://bucket/a/b.txt"), "gs://bucket/a");
        assert_eq!(dirname("gs://bucket/a"), "gs://bucket");
        assert_eq!(dirname("gs://bucket/a/b/"), "gs://bucket/a");
    }

    #[test]
    fn test_dir_intent() {
        assert!(BlobPath::parse("gs://bucket/a/").unwrap().is_dir_intent());
        assert!(BlobPath::parse("gs://bucket").unwrap().is_dir_intent());
        assert!(!BlobPath::parse("gs://bucket/a").unwrap().is_dir_intent());
        assert_eq!(
            BlobPath::parse("gs://bucket/a").unwrap().as_dir().to_string(),
            "gs://bucket/a/"
        );
    }
}
