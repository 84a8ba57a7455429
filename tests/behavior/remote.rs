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

//! Cloud behavior tests, skipped without test buckets configured.

use std::collections::BTreeSet;

use blobpath::CopyOptions;
use blobpath::ErrorKind;
use blobpath::Operator;
use pretty_assertions::assert_eq;

use crate::utils::*;

/// Test roots for every configured cloud.
fn roots() -> Vec<String> {
    gcs_test_root().into_iter().chain(azure_test_root()).collect()
}

#[tokio::test]
async fn test_round_trip_across_chunk_sizes() {
    let op = Operator::new();
    for root in roots() {
        let dir = format!("{root}/{}", unique_name("round-trip"));
        // 4 MiB + 1 crosses both the GCS (1 MiB) and Azure (4 MiB) chunk
        // thresholds.
        for size in [0usize, 1, 256 * 1024, 4 * 1024 * 1024 + 1] {
            let content = random_bytes(size);
            let path = format!("{dir}/file-{size}");

            op.write(&path, &content).await.unwrap();
            assert_eq!(op.read(&path).await.unwrap(), content, "{path}");

            let stat = op.stat(&path).await.unwrap();
            assert_eq!(stat.size, size as u64);

            assert_eq!(op.content_md5(&path).await.unwrap(), md5_hex(&content));
        }
        op.remove_all(&dir).await.unwrap();
    }
}

#[tokio::test]
async fn test_write_then_read_lines() {
    let op = Operator::new();
    for root in roots() {
        let path = format!("{root}/{}/x/y.txt", unique_name("lines"));
        op.write(&path, b"meow!\npurr\n").await.unwrap();

        let content = op.read(&path).await.unwrap();
        let lines: Vec<&[u8]> = content.split_inclusive(|b| *b == b'\n').collect();
        assert_eq!(lines, vec![b"meow!\n".as_slice(), b"purr\n".as_slice()]);

        op.remove(&path).await.unwrap();
    }
}

#[tokio::test]
async fn test_walk_fixture() {
    let op = Operator::new();
    for root in roots() {
        let dir = format!("{root}/{}", unique_name("walk"));
        op.write(&format!("{dir}/a"), b"").await.unwrap();
        op.write(&format!("{dir}/c/d/b"), b"").await.unwrap();

        let walked = op.walk(&dir, true).await.unwrap();
        let shape: Vec<(String, Vec<String>, Vec<String>)> = walked
            .into_iter()
            .map(|e| (e.root, e.dirs, e.files))
            .collect();
        assert_eq!(
            shape,
            vec![
                (dir.clone(), vec!["c".into()], vec!["a".into()]),
                (format!("{dir}/c"), vec!["d".into()], vec![]),
                (format!("{dir}/c/d"), vec![], vec!["b".into()]),
            ]
        );

        op.remove_all(&dir).await.unwrap();
    }
}

#[tokio::test]
async fn test_glob_fixture() {
    let op = Operator::new();
    for root in roots() {
        let dir = format!("{root}/{}", unique_name("glob"));
        for f in ["ab", "bb", "sub/test.txt", "sub/sub/test.txt"] {
            op.write(&format!("{dir}/{f}"), b"").await.unwrap();
        }

        let got: BTreeSet<_> = op.glob(&format!("{dir}/*b")).await.unwrap().into_iter().collect();
        assert_eq!(got, BTreeSet::from([format!("{dir}/ab"), format!("{dir}/bb")]));

        let got: BTreeSet<_> = op
            .glob(&format!("{dir}/*/test.txt"))
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(got, BTreeSet::from([format!("{dir}/sub/test.txt")]));

        // `**` descends on remote paths.
        let got: BTreeSet<_> = op
            .glob(&format!("{dir}/**.txt"))
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            got,
            BTreeSet::from([
                format!("{dir}/sub/test.txt"),
                format!("{dir}/sub/sub/test.txt"),
            ])
        );

        op.remove_all(&dir).await.unwrap();
    }
}

#[tokio::test]
async fn test_listdir_and_sharded_parity() {
    let op = Operator::new();
    for root in roots() {
        let dir = format!("{root}/{}", unique_name("shard"));
        for f in ["ab", "bb", "cc/inner"] {
            op.write(&format!("{dir}/{f}"), b"").await.unwrap();
        }

        let plain: BTreeSet<_> = op
            .list(&dir)
            .await
            .unwrap()
            .names()
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(
            plain,
            BTreeSet::from(["ab".to_string(), "bb".to_string(), "cc".to_string()])
        );

        let sharded: BTreeSet<_> = op
            .list_sharded(&dir, 1)
            .await
            .unwrap()
            .names()
            .await
            .unwrap()
            .into_iter()
            .collect();
        assert_eq!(sharded, plain);

        op.remove_all(&dir).await.unwrap();
    }
}

#[tokio::test]
async fn test_remove_dir_semantics() {
    let op = Operator::new();
    for root in roots() {
        let dir = format!("{root}/{}", unique_name("rmdir"));
        op.create_dir_all(&dir).await.unwrap();
        assert!(op.is_dir(&dir).await.unwrap());

        op.remove_dir(&dir).await.unwrap();
        // Idempotent: the directory is gone now, and that's fine.
        op.remove_dir(&dir).await.unwrap();
        assert!(!op.exists(&dir).await.unwrap());

        op.write(&format!("{dir}/x"), b"1").await.unwrap();
        let err = op.remove_dir(&dir).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);
        op.remove_all(&dir).await.unwrap();
    }
}

#[tokio::test]
async fn test_listdir_of_missing_bucket() {
    let op = Operator::new();
    if gcs_test_root().is_none() {
        return;
    }
    let err = op
        .list("gs://blobpath-bucket-that-does-not-exist/")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_copy_matrix() {
    let op = Operator::new();
    let local = tempfile::tempdir().unwrap();
    let local_root = local.path().to_string_lossy().into_owned();

    let mut dirs: Vec<String> = roots()
        .into_iter()
        .map(|root| format!("{root}/{}", unique_name("copy")))
        .collect();
    dirs.push(local_root);
    if dirs.len() == 1 {
        return;
    }

    let content = random_bytes(1024 * 1024 + 17);
    let expected = md5_hex(&content);

    for src_dir in &dirs {
        let src = format!("{src_dir}/copy-src");
        op.write(&src, &content).await.unwrap();

        for (i, dst_dir) in dirs.iter().enumerate() {
            let dst = format!("{dst_dir}/copy-dst-{i}");
            let md5 = op
                .copy(&src, &dst, CopyOptions { overwrite: true, return_md5: true })
                .await
                .unwrap();
            assert_eq!(md5.as_deref(), Some(expected.as_str()), "{src} -> {dst}");

            let err = op
                .copy(&src, &dst, CopyOptions::default())
                .await
                .unwrap_err();
            assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        }
    }

    for dir in &dirs {
        if dir.contains("://") {
            op.remove_all(dir).await.unwrap();
        }
    }
}

#[tokio::test]
async fn test_truncation_reads_as_eof() {
    let op = Operator::new();
    let Some(root) = gcs_test_root() else { return };
    let path = format!("{root}/{}/shrinking", unique_name("trunc"));

    // Three chunks of distinguishable content.
    let chunk = 1024 * 1024;
    let original = random_bytes(3 * chunk);
    op.write(&path, &original).await.unwrap();

    let mut reader = op.reader(&path).await.unwrap();
    let mut first = Vec::new();
    while first.len() < chunk {
        let bs = reader.read(chunk - first.len()).await.unwrap();
        assert!(!bs.is_empty());
        first.extend_from_slice(&bs);
    }
    assert_eq!(first, original[..chunk]);

    // Replace with a shorter object mid-read.
    let replacement = random_bytes(2 * chunk);
    op.write(&path, &replacement).await.unwrap();

    // Whatever arrives once the old body dies comes from the new
    // generation, and the stream ends cleanly at its shorter length.
    let rest = reader.read_to_end().await.unwrap();
    assert!(rest.len() <= 2 * chunk);
    assert!(reader.read(1).await.unwrap().is_empty());

    op.remove(&path).await.unwrap();
}

#[tokio::test]
async fn test_azure_concurrent_writer_detection() {
    let op = Operator::new();
    let Some(root) = azure_test_root() else { return };
    let path = format!("{root}/{}/contested", unique_name("race"));

    let mut outer = op.writer(&path).await.unwrap();
    outer.write(b"outer contents").await.unwrap();

    // A second writer opens, writes and finishes first.
    let mut inner = op.writer(&path).await.unwrap();
    inner.write(b"inner wins").await.unwrap();
    inner.close().await.unwrap();

    // The outer close now appends at a stale position.
    let err = outer.close().await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConcurrentWrite);
    assert_eq!(op.read(&path).await.unwrap(), b"inner wins");

    op.remove(&path).await.unwrap();
}
