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

use md5::Digest;
use md5::Md5;
use rand::distributions::Alphanumeric;
use rand::Rng;

pub fn md5_hex(bs: &[u8]) -> String {
    hex_encode(&Md5::digest(bs))
}

fn hex_encode(bs: &[u8]) -> String {
    bs.iter().map(|b| format!("{b:02x}")).collect()
}

pub fn random_bytes(len: usize) -> Vec<u8> {
    let mut out = vec![0u8; len];
    rand::thread_rng().fill(&mut out[..]);
    out
}

/// A unique name so concurrent test runs don't collide.
pub fn unique_name(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(12)
        .map(char::from)
        .collect();
    format!("{prefix}-{suffix}")
}

/// Root of the GCS test area, e.g. `gs://some-bucket/blobpath-tests`.
pub fn gcs_test_root() -> Option<String> {
    std::env::var("BLOBPATH_TEST_GCS_BUCKET")
        .ok()
        .map(|bucket| format!("gs://{bucket}/blobpath-tests"))
}

/// Root of the Azure test area; `BLOBPATH_TEST_AZURE_PATH` holds
/// `account-container`.
pub fn azure_test_root() -> Option<String> {
    std::env::var("BLOBPATH_TEST_AZURE_PATH")
        .ok()
        .map(|netloc| format!("as://{netloc}/blobpath-tests"))
}
