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

pub struct GcsReader {
    core: Arc<GcsCore>,
    key: String,
}

impl GcsReader {
    pub fn new(core: Arc<GcsCore>, key: &str) -> Self {
        GcsReader {
            core,
            key: key.to_string(),
        }
    }
}

#[async_trait]
impl RangeRead for GcsReader {
    async fn open_range(&self, offset: u64) -> Result<Option<Box<dyn ReadBody>>> {
        let body = self.core.gcs_open_range(&self.key, offset).await?;
        Ok(body.map(|v| Box::new(v) as Box<dyn ReadBody>))
    }
}
