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

use std::collections::VecDeque;

use async_trait::async_trait;

use crate::*;

/// Arguments of one listing.
#[derive(Clone, Debug, Default)]
pub struct ListArgs {
    /// Key prefix to list under.
    pub prefix: String,
    /// Group keys into common prefixes on `/`.
    pub delimited: bool,
    /// Page size hint.
    pub limit: Option<usize>,
}

impl ListArgs {
    /// List everything under `prefix` without grouping.
    pub fn flat(prefix: &str) -> Self {
        ListArgs {
            prefix: prefix.to_string(),
            delimited: false,
            limit: None,
        }
    }

    /// List direct children of `prefix`, grouping on `/`.
    pub fn delimited(prefix: &str) -> Self {
        ListArgs {
            prefix: prefix.to_string(),
            delimited: true,
            limit: None,
        }
    }

    /// Set the page size hint.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// One page of listing results.
#[derive(Debug, Default)]
pub struct ListPage {
    /// Full object keys on this page.
    pub entries: Vec<String>,
    /// Common prefixes on this page, slash terminated.
    pub prefixes: Vec<String>,
    /// Continuation token; `None` terminates the enumeration.
    pub next_token: Option<String>,
}

/// A service's paginated list API.
#[async_trait]
pub trait PageList: Send + Sync {
    /// Fetch the page after `token` (`None` for the first page).
    async fn next_page(&self, token: Option<&str>) -> Result<ListPage>;
}

/// Lazy flattening of [`PageList`] pages into names.
///
/// Common prefixes are emitted with their trailing slash, objects verbatim.
/// The iteration is finite and non-restartable; continuation tokens never
/// outlive it.
pub struct PageLister {
    inner: Box<dyn PageList>,
    token: Option<String>,
    buffer: VecDeque<String>,
    done: bool,
}

impl std::fmt::Debug for PageLister {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageLister")
            .field("token", &self.token)
            .field("buffer", &self.buffer)
            .field("done", &self.done)
            .finish()
    }
}

impl PageLister {
    /// Create a lister over `inner`.
    pub fn new(inner: Box<dyn PageList>) -> Self {
        PageLister {
            inner,
            token: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// The next name, or `None` once the enumeration is exhausted.
    pub async fn next(&mut self) -> Result<Option<String>> {
        loop {
            if let Some(v) = self.buffer.pop_front() {
                return Ok(Some(v));
            }
            if self.done {
                return Ok(None);
            }

            let page = self.inner.next_page(self.token.as_deref()).await?;
            self.buffer.extend(page.prefixes);
            self.buffer.extend(page.entries);
            match page.next_token {
                Some(t) => self.token = Some(t),
                None => self.done = true,
            }
        }
    }

    /// Drain the remaining names into a vector.
    pub async fn collect(&mut self) -> Result<Vec<String>> {
        let mut out = Vec::new();
        while let Some(v) = self.next().await? {
            out.push(v);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;

    struct FakePages {
        pages: Mutex<VecDeque<ListPage>>,
    }

    impl FakePages {
        fn new(pages: Vec<ListPage>) -> Self {
            FakePages {
                pages: Mutex::new(pages.into()),
            }
        }
    }

    #[async_trait]
    impl PageList for FakePages {
        async fn next_page(&self, token: Option<&str>) -> Result<ListPage> {
            let mut pages = self.pages.lock().unwrap();
            // The lister must thread the previous page's token back in.
            if pages.len() == 1 {
                assert_eq!(token, Some("next"));
            }
            Ok(pages.pop_front().expect("no page requested past the end"))
        }
    }

    #[tokio::test]
    async fn test_flattens_pages_lazily() {
        let pages = vec![
            ListPage {
                entries: vec!["dir/a".to_string()],
                prefixes: vec!["dir/sub/".to_string()],
                next_token: Some("next".to_string()),
            },
            ListPage {
                entries: vec!["dir/b".to_string()],
                prefixes: vec![],
                next_token: None,
            },
        ];

        let mut lister = PageLister::new(Box::new(FakePages::new(pages)));
        assert_eq!(
            lister.collect().await.unwrap(),
            vec!["dir/sub/", "dir/a", "dir/b"]
        );
        assert_eq!(lister.next().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_empty_listing() {
        let pages = vec![ListPage::default()];
        let mut lister = PageLister::new(Box::new(FakePages::new(pages)));
        assert_eq!(lister.next().await.unwrap(), None);
    }
}
