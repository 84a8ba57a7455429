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

use std::sync::Arc;

use async_trait::async_trait;

use super::core::GcsCore;
use crate::raw::*;
use crate::*;

pub struct GcsLister {
    core: Arc<GcsCore>,
    args: ListArgs,
}

impl GcsLister {
    pub fn new(core: Arc<GcsCore>, args: ListArgs) -> Self {
        GcsLister { core, args }
    }
}

#[async_trait]
impl PageList for GcsLister {
    async fn next_page(&self, token: Option<&str>) -> Result<ListPage> {
        let out = self.core.gcs_list_page(&self.args, token).await?;

        Ok(ListPage {
            entries: out.items.into_iter().map(|v| v.name).collect(),
            prefixes: out.prefixes,
            next_token: out.next_page_token,
        })
    }
}
