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

use std::collections::HashMap;
use std::process;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::*;

/// Tokens are refreshed this many seconds before their reported expiration.
pub const EARLY_EXPIRATION_SECONDS: f64 = 300.0;

/// A credential loader driven by [`TokenManager`].
///
/// `key` selects the credential scope: the storage account for Azure, a
/// single empty key for GCS.
#[async_trait]
pub trait TokenLoad: Send + Sync + 'static {
    /// The cached value.
    type Token: Clone + Send + Sync + 'static;

    /// Fetch a fresh token and its expiration as seconds since the epoch.
    async fn load(&self, key: &str) -> Result<(Self::Token, f64)>;
}

struct TokenState<T> {
    pid: u32,
    tokens: HashMap<String, (T, f64)>,
}

/// Automatically refresh a token when it expires.
///
/// Loads are serialized under one mutex, so concurrent callers hitting an
/// expired slot trigger a single refresh. Cached records are dropped when the
/// process id changes: a forked child must never reuse the parent's tokens,
/// since their refresh may be entangled with the parent's connections.
pub struct TokenManager<L: TokenLoad> {
    loader: L,
    state: Mutex<TokenState<L::Token>>,
}

impl<L: TokenLoad> TokenManager<L> {
    /// Create a manager around `loader`. Nothing is fetched eagerly.
    pub fn new(loader: L) -> Self {
        TokenManager {
            loader,
            state: Mutex::new(TokenState {
                pid: process::id(),
                tokens: HashMap::new(),
            }),
        }
    }

    /// Get the token for `key`, loading or refreshing if needed.
    pub async fn get(&self, key: &str) -> Result<L::Token> {
        let mut state = self.state.lock().await;

        let pid = process::id();
        if state.pid != pid {
            state.tokens.clear();
            state.pid = pid;
        }

        let now = now_epoch();
        if let Some((token, expiration)) = state.tokens.get(key) {
            if now + EARLY_EXPIRATION_SECONDS < *expiration {
                return Ok(token.clone());
            }
            state.tokens.remove(key);
        }

        let (token, expiration) = self
            .loader
            .load(key)
            .await
            .map_err(|err| err.with_operation("TokenManager::get"))?;
        state.tokens.insert(key.to_string(), (token.clone(), expiration));
        Ok(token)
    }

    #[cfg(test)]
    async fn poison_pid(&self, pid: u32) {
        self.state.lock().await.pid = pid;
    }
}

/// Current wall-clock time as seconds since the epoch.
pub(crate) fn now_epoch() -> f64 {
    let now = chrono::Utc::now();
    now.timestamp() as f64 + f64::from(now.timestamp_subsec_millis()) / 1000.0
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use pretty_assertions::assert_eq;

    use super::*;

    struct CountingLoader {
        calls: AtomicUsize,
        lifetime: f64,
    }

    #[async_trait]
    impl TokenLoad for CountingLoader {
        type Token = String;

        async fn load(&self, key: &str) -> Result<(String, f64)> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok((format!("{key}:{n}"), now_epoch() + self.lifetime))
        }
    }

    fn manager(lifetime: f64) -> TokenManager<CountingLoader> {
        TokenManager::new(CountingLoader {
            calls: AtomicUsize::new(0),
            lifetime,
        })
    }

    #[tokio::test]
    async fn test_cached_while_fresh() {
        let m = manager(3600.0);
        assert_eq!(m.get("acct").await.unwrap(), "acct:0");
        assert_eq!(m.get("acct").await.unwrap(), "acct:0");
    }

    #[tokio::test]
    async fn test_refresh_inside_early_margin() {
        // Expires in one minute: within the 300s margin, so every get
        // reloads.
        let m = manager(60.0);
        assert_eq!(m.get("acct").await.unwrap(), "acct:0");
        assert_eq!(m.get("acct").await.unwrap(), "acct:1");
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let m = manager(3600.0);
        assert_eq!(m.get("a").await.unwrap(), "a:0");
        assert_eq!(m.get("b").await.unwrap(), "b:1");
        assert_eq!(m.get("a").await.unwrap(), "a:0");
    }

    #[tokio::test]
    async fn test_fork_invalidates_cache() {
        let m = manager(3600.0);
        assert_eq!(m.get("acct").await.unwrap(), "acct:0");

        m.poison_pid(process::id().wrapping_add(1)).await;
        assert_eq!(m.get("acct").await.unwrap(), "acct:1");
    }
}
