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

//! Raw building blocks shared by the service implementations.
//!
//! Users should not rely on anything in here: the public surface is
//! [`crate::Operator`] and the types it returns.

mod http_client;
pub use http_client::HttpBody;
pub use http_client::HttpClient;
pub use http_client::CONNECT_TIMEOUT;
pub use http_client::READ_TIMEOUT;

mod token;
pub(crate) use token::now_epoch;
pub use token::TokenLoad;
pub use token::TokenManager;
pub use token::EARLY_EXPIRATION_SECONDS;

mod page;
pub use page::ListArgs;
pub use page::ListPage;
pub use page::PageList;
pub use page::PageLister;

mod range_read;
pub use range_read::RangeRead;
pub use range_read::RangeReader;
pub use range_read::ReadBody;

mod chunk_write;
pub use chunk_write::ChunkUpload;
pub use chunk_write::ChunkWriter;

mod accessor;
pub use accessor::Accessor;
pub use accessor::SignedUrl;

mod glob;
pub use glob::compile_glob;

mod shard;
pub use shard::shard_prefixes;
pub use shard::spawn_sharded_listing;
pub use shard::ShardTask;
pub use shard::ShardedLister;

mod presign;
pub(crate) use presign::hmac_sha256;
pub use presign::QuerySigner;

use base64::prelude::BASE64_STANDARD;
use base64::Engine;
use percent_encoding::utf8_percent_encode;
use percent_encoding::AsciiSet;
use percent_encoding::NON_ALPHANUMERIC;

/// Characters kept verbatim in any encoded component (RFC 3986 unreserved).
const COMPONENT_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Like [`COMPONENT_SET`] but keeps `/` so multi-segment paths stay readable.
const PATH_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~')
    .remove(b'/');

/// Percent-encode a path, keeping `/` separators.
pub fn percent_encode_path(path: &str) -> String {
    utf8_percent_encode(path, PATH_SET).to_string()
}

/// Percent-encode a single component, including `/`.
///
/// The GCS JSON API addresses objects as one path segment, so keys containing
/// `/` must arrive as `%2F`.
pub fn percent_encode_component(value: &str) -> String {
    utf8_percent_encode(value, COMPONENT_SET).to_string()
}

/// Build a `Range` header value for an open-ended read starting at `offset`.
pub fn range_from(offset: u64) -> String {
    format!("bytes={offset}-")
}

/// Decode a base64 MD5 digest, as the services report them, into hex.
pub fn md5_base64_to_hex(b64: &str) -> crate::Result<String> {
    let digest = BASE64_STANDARD.decode(b64).map_err(|err| {
        crate::Error::new(crate::ErrorKind::Unexpected, "invalid base64 md5")
            .with_context("md5", b64)
            .with_source(err)
    })?;
    Ok(hex::encode(digest))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_encode() {
        assert_eq!(percent_encode_path("a/b c.txt"), "a/b%20c.txt");
        assert_eq!(percent_encode_component("a/b c.txt"), "a%2Fb%20c.txt");
        assert_eq!(percent_encode_component("plain-name_1.txt~"), "plain-name_1.txt~");
    }

    #[test]
    fn test_range_from() {
        assert_eq!(range_from(0), "bytes=0-");
        assert_eq!(range_from(1024), "bytes=1024-");
    }
}
