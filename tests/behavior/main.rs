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

//! Behavior tests.
//!
//! The local suite always runs. The cloud suites need real buckets and
//! credentials and are skipped unless `BLOBPATH_TEST_GCS_BUCKET` /
//! `BLOBPATH_TEST_AZURE_PATH` point somewhere writable.

mod local;
mod remote;
mod utils;
