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

use http::StatusCode;
use serde::Deserialize;

use crate::*;

#[derive(Default, Debug, Deserialize)]
#[serde(default)]
struct GcsErrorResponse {
    error: GcsErrorDetail,
}

#[derive(Default, Debug, Deserialize)]
#[serde(default)]
struct GcsErrorDetail {
    code: u16,
    message: String,
}

/// Map a non-retryable GCS response into an [`Error`].
pub async fn parse_error(resp: reqwest::Response) -> Error {
    let status = resp.status();
    let bs = resp.bytes().await.unwrap_or_default();

    let kind = match status {
        StatusCode::NOT_FOUND => ErrorKind::NotFound,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ErrorKind::PermissionDenied,
        StatusCode::CONFLICT => ErrorKind::AlreadyExists,
        StatusCode::PRECONDITION_FAILED => ErrorKind::ConditionNotMatch,
        StatusCode::RANGE_NOT_SATISFIABLE => ErrorKind::RangeNotSatisfied,
        _ => ErrorKind::Unexpected,
    };

    let message = parse_error_response(&bs);

    Error::new(kind, message).with_context("status", status.to_string())
}

fn parse_error_response(bs: &[u8]) -> String {
    match serde_json::from_slice::<GcsErrorResponse>(bs) {
        Ok(v) if !v.error.message.is_empty() => v.error.message,
        _ => String::from_utf8_lossy(bs).into_owned(),
    }
}
