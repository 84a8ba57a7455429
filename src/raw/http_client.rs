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

use std::future::Future;
use std::process;
use std::sync::Mutex;
use std::time::Duration;

use backon::BackoffBuilder;
use backon::ExponentialBuilder;
use bytes::Bytes;
use log::warn;
use reqwest::redirect::Policy;
use reqwest::ClientBuilder;

use crate::*;

/// Timeout for establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
/// Timeout for reading from an established connection.
pub const READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Statuses treated as transient by the executor.
const RETRY_STATUSES: [u16; 5] = [429, 500, 502, 503, 504];

/// Log transient failures starting from this zero-based attempt.
const LOG_FROM_ATTEMPT: usize = 3;

struct PoolSlot {
    pid: u32,
    generation: u64,
    client: reqwest::Client,
}

/// One connection pool per process.
///
/// TLS state must not cross a fork, so the slot is keyed by the process id
/// observed at construction and rebuilt whenever the current id differs.
static HTTP_POOL: Mutex<Option<PoolSlot>> = Mutex::new(None);

fn build_pool() -> Result<reqwest::Client> {
    let mut builder = ClientBuilder::new();

    // Bodies are consumed as streams; auto decompression would corrupt
    // ranged reads and content hashes.
    builder = builder.no_gzip();
    builder = builder.no_brotli();
    builder = builder.no_deflate();
    // Redirects are handled by our services.
    builder = builder.redirect(Policy::none());

    builder = builder.connect_timeout(CONNECT_TIMEOUT);
    builder = builder.read_timeout(READ_TIMEOUT);
    builder = builder.min_tls_version(reqwest::tls::Version::TLS_1_2);

    builder.build().map_err(|err| {
        Error::new(ErrorKind::Unexpected, "building http client")
            .with_operation("HttpClient::new")
            .with_source(err)
    })
}

fn pool_for_pid(pid: u32) -> Result<(reqwest::Client, u64)> {
    let mut slot = HTTP_POOL.lock().expect("http pool lock must not be poisoned");
    match slot.as_ref() {
        Some(v) if v.pid == pid => Ok((v.client.clone(), v.generation)),
        _ => {
            let generation = slot.as_ref().map(|v| v.generation + 1).unwrap_or(0);
            let client = build_pool()?;
            *slot = Some(PoolSlot {
                pid,
                generation,
                client: client.clone(),
            });
            Ok((client, generation))
        }
    }
}

/// The exponential delay schedule shared by the executor and the streaming
/// reader: 0.1 s initial, doubling, capped at 60 s, unbounded.
pub(crate) fn backoff_schedule() -> impl Iterator<Item = Duration> {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(100))
        .with_max_delay(Duration::from_secs(60))
        .with_factor(2.0)
        .without_max_times()
        .build()
}

/// HttpClient used across blobpath.
///
/// The handle itself is stateless: every call resolves the process-wide
/// connection pool, so forked children transparently get a fresh pool.
#[derive(Clone, Copy, Debug, Default)]
pub struct HttpClient {
    _private: (),
}

impl HttpClient {
    /// Create a new http client handle.
    pub fn new() -> Self {
        HttpClient { _private: () }
    }

    fn pool(&self) -> Result<reqwest::Client> {
        pool_for_pid(process::id()).map(|(client, _)| client)
    }

    /// The generation of the current process's pool, for fork-safety checks.
    pub fn pool_generation(&self) -> Result<u64> {
        pool_for_pid(process::id()).map(|(_, generation)| generation)
    }

    /// Send a single request without retrying.
    ///
    /// Connection-level failures come back marked temporary so callers can
    /// decide whether to retry; the response status is not inspected.
    pub async fn send(&self, req: http::Request<Bytes>) -> Result<reqwest::Response> {
        let pool = self.pool()?;

        let req = reqwest::Request::try_from(req).map_err(|err| {
            Error::new(ErrorKind::Unexpected, "converting http request")
                .with_operation("HttpClient::send")
                .with_source(err)
        })?;

        pool.execute(req).await.map_err(classify_reqwest_error)
    }

    /// Execute a request with the full retry ladder.
    ///
    /// `build_request` is called once per attempt so signatures and bodies
    /// can be re-derived: signing is time sensitive and tokens may rotate
    /// between attempts. Transient connection failures and the statuses
    /// 429/500/502/503/504 are retried on an unbounded exponential schedule;
    /// any other response is returned unread for the caller to inspect.
    pub async fn execute<F, Fut>(&self, build_request: F) -> Result<reqwest::Response>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<http::Request<Bytes>>>,
    {
        let mut backoff = backoff_schedule();

        for attempt in 0.. {
            let req = build_request().await?;
            let url = req.uri().to_string();

            let err = match self.send(req).await {
                Ok(resp) => {
                    if !RETRY_STATUSES.contains(&resp.status().as_u16()) {
                        return Ok(resp);
                    }
                    let status = resp.status();
                    // Drain so the connection can go back to the pool.
                    let _ = resp.bytes().await;
                    format!("request failed with status {status}")
                }
                Err(err) if err.is_temporary() => err.to_string(),
                Err(err) => return Err(err),
            };

            let delay = backoff.next().expect("backoff schedule is unbounded");
            if attempt >= LOG_FROM_ATTEMPT {
                warn!(
                    target: "blobpath::http",
                    "error {err} when executing request to {url}, sleeping {}s",
                    delay.as_secs_f64()
                );
            }
            tokio::time::sleep(delay).await;
        }

        unreachable!("retry loop only exits by returning")
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> Error {
    // Builder related errors and redirect-policy errors should not be
    // retried; everything that reached the wire may be.
    let temporary = !err.is_builder() && !err.is_redirect() && !err.is_status();

    let e = Error::new(ErrorKind::Unexpected, "sending http request")
        .with_operation("HttpClient::send")
        .with_source(err);

    if temporary {
        e.set_temporary()
    } else {
        e
    }
}

/// A streaming response body.
///
/// Read failures are classified as temporary so the streaming reader can
/// resume with a fresh ranged request.
pub struct HttpBody {
    resp: reqwest::Response,
}

impl HttpBody {
    pub(crate) fn new(resp: reqwest::Response) -> Self {
        HttpBody { resp }
    }

    /// Pull the next chunk of the body. `None` means the stream ended.
    pub async fn chunk(&mut self) -> Result<Option<Bytes>> {
        self.resp.chunk().await.map_err(|err| {
            Error::new(ErrorKind::Unexpected, "reading response body")
                .with_operation("HttpBody::chunk")
                .with_source(err)
                .set_temporary()
        })
    }
}
