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

use std::collections::BTreeSet;
use std::io::SeekFrom;
use std::time::Duration;

use blobpath::CopyOptions;
use blobpath::ErrorKind;
use blobpath::Operator;
use pretty_assertions::assert_eq;

use crate::utils::*;

fn path_in(dir: &tempfile::TempDir, name: &str) -> String {
    dir.path().join(name).to_string_lossy().into_owned()
}

#[tokio::test]
async fn test_round_trip() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();

    for size in [0usize, 1, 1000, 2 * 1024 * 1024 + 123] {
        let content = random_bytes(size);
        let path = path_in(&dir, &format!("file-{size}"));

        op.write(&path, &content).await.unwrap();
        assert_eq!(op.read(&path).await.unwrap(), content, "size {size}");
        assert_eq!(op.stat(&path).await.unwrap().size, size as u64);
    }
}

#[tokio::test]
async fn test_stat_mtime_is_fresh() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "fresh");

    op.write(&path, b"x").await.unwrap();
    let stat = op.stat(&path).await.unwrap();
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap()
        .as_secs_f64();
    assert!((now - stat.mtime).abs() <= 20.0);
}

#[tokio::test]
async fn test_exists_and_kinds() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let file = path_in(&dir, "f");
    let sub = path_in(&dir, "sub");

    assert!(!op.exists(&file).await.unwrap());
    op.write(&file, b"data").await.unwrap();
    op.create_dir_all(&sub).await.unwrap();

    assert!(op.exists(&file).await.unwrap());
    assert!(op.is_file(&file).await.unwrap());
    assert!(!op.is_dir(&file).await.unwrap());
    assert!(op.is_dir(&sub).await.unwrap());
    assert!(!op.is_file(&sub).await.unwrap());
}

#[tokio::test]
async fn test_list_entries() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    op.write(&path_in(&dir, "b"), b"1").await.unwrap();
    op.write(&path_in(&dir, "a"), b"2").await.unwrap();
    op.create_dir_all(&path_in(&dir, "c")).await.unwrap();

    let entries = op
        .list(&dir.path().to_string_lossy())
        .await
        .unwrap()
        .collect()
        .await
        .unwrap();

    let names: Vec<_> = entries.iter().map(|e| e.name.clone()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
    assert!(entries[2].is_dir);
    assert!(entries[0].is_file());
}

#[tokio::test]
async fn test_list_missing_dir_is_not_found() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let err = op.list(&path_in(&dir, "nope")).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_walk_fixture() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().into_owned();

    op.write(&path_in(&dir, "a"), b"").await.unwrap();
    op.create_dir_all(&path_in(&dir, "c/d")).await.unwrap();
    op.write(&path_in(&dir, "c/d/b"), b"").await.unwrap();

    let walked = op.walk(&root, true).await.unwrap();
    let shape: Vec<(String, Vec<String>, Vec<String>)> = walked
        .into_iter()
        .map(|e| (e.root, e.dirs, e.files))
        .collect();

    assert_eq!(
        shape,
        vec![
            (root.clone(), vec!["c".into()], vec!["a".into()]),
            (format!("{root}/c"), vec!["d".into()], vec![]),
            (format!("{root}/c/d"), vec![], vec!["b".into()]),
        ]
    );

    // Bottom-up visits children before parents.
    let reversed = op.walk(&root, false).await.unwrap();
    assert_eq!(reversed.first().unwrap().root, format!("{root}/c/d"));
    assert_eq!(reversed.last().unwrap().root, root);
}

#[tokio::test]
async fn test_glob_fixture() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_string_lossy().into_owned();

    for f in ["ab", "bb"] {
        op.write(&path_in(&dir, f), b"").await.unwrap();
    }
    op.create_dir_all(&path_in(&dir, "sub/sub")).await.unwrap();
    op.write(&path_in(&dir, "sub/test.txt"), b"").await.unwrap();
    op.write(&path_in(&dir, "sub/sub/test.txt"), b"").await.unwrap();

    let matches: BTreeSet<_> = op.glob(&format!("{root}/*b")).await.unwrap().into_iter().collect();
    let expect: BTreeSet<_> = [format!("{root}/ab"), format!("{root}/bb")].into();
    assert_eq!(matches, expect);

    let matches: BTreeSet<_> = op
        .glob(&format!("{root}/*/test.txt"))
        .await
        .unwrap()
        .into_iter()
        .collect();
    let expect: BTreeSet<_> = [format!("{root}/sub/test.txt")].into();
    assert_eq!(matches, expect);

    // Locally `**` keeps single-star semantics.
    let matches = op.glob(&format!("{root}/**.txt")).await.unwrap();
    assert!(matches.is_empty());

    // Literal patterns are existence checks.
    assert_eq!(
        op.glob(&format!("{root}/ab")).await.unwrap(),
        vec![format!("{root}/ab")]
    );
    assert!(op.glob(&format!("{root}/zz")).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_glob_rejects_unsupported_punctuation() {
    let op = Operator::new();
    let err = op.glob("/tmp/a[0-9]").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Unsupported);
}

#[tokio::test]
async fn test_remove_dir_semantics() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let empty = path_in(&dir, "empty");
    op.create_dir_all(&empty).await.unwrap();

    // Twice on an empty directory: success both times.
    op.remove_dir(&empty).await.unwrap();
    op.remove_dir(&empty).await.unwrap();

    let full = path_in(&dir, "full");
    op.create_dir_all(&full).await.unwrap();
    op.write(&path_in(&dir, "full/x"), b"1").await.unwrap();
    let err = op.remove_dir(&full).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DirectoryNotEmpty);
}

#[tokio::test]
async fn test_remove_all() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let root = path_in(&dir, "tree");
    op.create_dir_all(&path_in(&dir, "tree/deep")).await.unwrap();
    op.write(&path_in(&dir, "tree/x"), b"1").await.unwrap();
    op.write(&path_in(&dir, "tree/deep/y"), b"2").await.unwrap();

    op.remove_all(&root).await.unwrap();
    assert!(!op.exists(&root).await.unwrap());

    let err = op.remove_all(&root).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotADirectory);
}

#[tokio::test]
async fn test_remove_file() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let file = path_in(&dir, "f");
    op.write(&file, b"1").await.unwrap();
    op.remove(&file).await.unwrap();
    let err = op.remove(&file).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn test_copy_with_md5() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let src = path_in(&dir, "src");
    let dst = path_in(&dir, "dst");
    let content = random_bytes(3 * 1024 * 1024 + 7);
    op.write(&src, &content).await.unwrap();

    let md5 = op
        .copy(&src, &dst, CopyOptions { overwrite: false, return_md5: true })
        .await
        .unwrap();
    assert_eq!(md5.as_deref(), Some(md5_hex(&content).as_str()));
    assert_eq!(op.read(&dst).await.unwrap(), content);

    // A second copy without overwrite refuses.
    let err = op
        .copy(&src, &dst, CopyOptions::default())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyExists);

    // With overwrite it goes through.
    op.copy(&src, &dst, CopyOptions { overwrite: true, return_md5: false })
        .await
        .unwrap();
}

#[tokio::test]
async fn test_read_to_string() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "text");

    op.write(&path, b"meow!\npurr\n").await.unwrap();
    assert_eq!(op.read_to_string(&path).await.unwrap(), "meow!\npurr\n");

    // Non-UTF-8 content is an error, not a lossy conversion.
    op.write(&path, &[0xff, 0xfe, 0x00]).await.unwrap();
    assert!(op.read_to_string(&path).await.is_err());
}

#[tokio::test]
async fn test_content_md5() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "hashed");
    let content = b"meow!\npurr\n";
    op.write(&path, content).await.unwrap();

    assert_eq!(op.content_md5(&path).await.unwrap(), md5_hex(content));
}

#[tokio::test]
async fn test_reader_seek_and_stats() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "seekable");
    op.write(&path, b"0123456789").await.unwrap();

    let mut reader = op.reader(&path).await.unwrap();
    assert_eq!(reader.size(), 10);

    assert_eq!(reader.read(4).await.unwrap().to_vec(), b"0123");
    reader.seek(SeekFrom::Start(8)).await.unwrap();
    assert_eq!(reader.read(8).await.unwrap().to_vec(), b"89");
    assert!(reader.read(1).await.unwrap().is_empty());
    assert_eq!(reader.stats().bytes_read, 6);
}

#[tokio::test]
async fn test_signed_url_local() {
    let op = Operator::new();
    let dir = tempfile::tempdir().unwrap();
    let path = path_in(&dir, "s");
    op.write(&path, b"x").await.unwrap();

    let signed = op
        .signed_url(&path, Duration::from_secs(3600))
        .await
        .unwrap();
    assert_eq!(signed.url, format!("file://{path}"));
    assert_eq!(signed.expires_in, None);
}

#[tokio::test]
async fn test_open_directory_is_rejected() {
    let op = Operator::new();
    let err = op.reader("gs://bucket/dir/").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsADirectory);
    let err = op.writer("as://acct-cont/dir/").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IsADirectory);
}

#[tokio::test]
async fn test_unrecognized_scheme() {
    let op = Operator::new();
    let err = op.exists("ftp://bucket/key").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::ConfigInvalid);
}
