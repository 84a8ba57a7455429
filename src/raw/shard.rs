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
use std::sync::Arc;
use std::thread::available_parallelism;

use tokio::sync::mpsc;
use tokio::sync::Mutex;

use crate::*;

/// Upper bound on sharded-listing workers.
const MAX_SHARD_WORKERS: usize = 16;

/// Code points that must never appear in generated key prefixes.
///
/// `0x00..=0x08`, `0x0B..=0x0D`, `0x0E..=0x1F` are rejected by both GCS
/// object naming and the XML character set Azure listings are returned in.
/// Carriage return is in the set: XML parsing normalizes it to a line feed,
/// which would corrupt round-tripped names.
pub fn is_invalid_prefix_char(c: u32) -> bool {
    matches!(c, 0x00..=0x08 | 0x0B..=0x0D | 0x0E..=0x1F)
}

/// One unit of sharded listing work.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShardTask {
    /// The generated key prefix.
    pub prefix: String,
    /// Shorter-than-maximum prefixes check for an exact-match object instead
    /// of listing: a one-character name would otherwise be missed entirely
    /// by length-two listings.
    pub exact: bool,
}

/// The alphabet prefixes are drawn from: code points `0x00..=0xFF` minus the
/// invalid set minus the `/` separator.
fn prefix_alphabet() -> Vec<char> {
    (0u32..=0xFF)
        .filter(|&c| !is_invalid_prefix_char(c) && c != u32::from('/'))
        .map(|c| char::from_u32(c).expect("code points below 0x100 are valid chars"))
        .collect()
}

/// Enumerate every prefix of lengths `1..=max_len` over the valid alphabet.
pub fn shard_prefixes(max_len: usize) -> Vec<ShardTask> {
    let alphabet = prefix_alphabet();
    let mut out = Vec::new();

    let mut current: Vec<String> = vec![String::new()];
    for len in 1..=max_len {
        let mut next = Vec::with_capacity(current.len() * alphabet.len());
        for base in &current {
            for &c in &alphabet {
                let mut prefix = base.clone();
                prefix.push(c);
                out.push(ShardTask {
                    prefix: prefix.clone(),
                    exact: len != max_len,
                });
                next.push(prefix);
            }
        }
        current = next;
    }
    out
}

/// Names produced by a sharded listing, in arrival order.
///
/// Every worker sends `Some(name)` items followed by one `None` sentinel per
/// completed task; iteration ends once every sentinel arrived.
#[derive(Debug)]
pub struct ShardedLister {
    rx: mpsc::Receiver<Result<Option<String>>>,
    tasks_remaining: usize,
}

impl ShardedLister {
    /// The next name, or `None` once every shard finished.
    pub async fn next(&mut self) -> Result<Option<String>> {
        while self.tasks_remaining > 0 {
            let item = match self.rx.recv().await {
                Some(v) => v?,
                None => break,
            };
            match item {
                Some(name) => return Ok(Some(name)),
                None => self.tasks_remaining -= 1,
            }
        }
        Ok(None)
    }
}

/// Fan `tasks` out to a bounded worker pool.
///
/// `handler` performs one task and sends each produced name through the
/// given sender; the pool appends the completion sentinel itself. This is a
/// read-only speculative fan-out: most prefixes produce nothing.
pub fn spawn_sharded_listing<F, Fut>(tasks: Vec<ShardTask>, handler: F) -> ShardedLister
where
    F: Fn(ShardTask, mpsc::Sender<Result<Option<String>>>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    let total = tasks.len();
    let workers = available_parallelism()
        .map(|v| v.get())
        .unwrap_or(4)
        .min(MAX_SHARD_WORKERS)
        .max(1);

    let (out_tx, out_rx) = mpsc::channel(256);
    let queue = Arc::new(Mutex::new(tasks.into_iter()));
    let handler = Arc::new(handler);

    for _ in 0..workers {
        let queue = queue.clone();
        let out_tx = out_tx.clone();
        let handler = handler.clone();
        tokio::spawn(async move {
            loop {
                let task = match queue.lock().await.next() {
                    Some(v) => v,
                    None => return,
                };
                let result = handler(task, out_tx.clone()).await;
                let sentinel = match result {
                    Ok(()) => Ok(None),
                    Err(err) => Err(err),
                };
                if out_tx.send(sentinel).await.is_err() {
                    // The consumer dropped the lister; stop early.
                    return;
                }
            }
        });
    }

    ShardedLister {
        rx: out_rx,
        tasks_remaining: total,
    }
}
