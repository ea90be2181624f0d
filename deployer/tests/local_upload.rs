//! Uploads through `LocalSession` against a real filesystem.
//!
//! The "remote" side is a temp directory, so the mirrored tree can be compared
//! byte for byte.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use deployer::DeployError;
use deployer::io::local::LocalSession;
use deployer::io::transfer::{upload_directory, upload_file};

fn snapshot(root: &Path) -> BTreeMap<String, Option<Vec<u8>>> {
    let mut out = BTreeMap::new();
    walk(root, root, &mut out);
    out
}

fn walk(root: &Path, dir: &Path, out: &mut BTreeMap<String, Option<Vec<u8>>>) {
    for entry in fs::read_dir(dir).expect("read_dir") {
        let path = entry.expect("entry").path();
        let key = path
            .strip_prefix(root)
            .expect("under root")
            .to_string_lossy()
            .into_owned();
        if path.is_dir() {
            out.insert(key, None);
            walk(root, &path, out);
        } else {
            out.insert(key, Some(fs::read(&path).expect("read")));
        }
    }
}

fn remote(path: &Path) -> &str {
    path.to_str().expect("utf8 temp path")
}

#[test]
fn directory_upload_is_idempotent_and_additive() {
    let local = tempfile::tempdir().expect("local");
    fs::create_dir_all(local.path().join("app").join("static")).expect("mkdir");
    fs::create_dir_all(local.path().join("empty")).expect("mkdir");
    fs::write(local.path().join("app").join("main.py"), "print('hi')\n").expect("write");
    fs::write(local.path().join("app").join("static").join("a.css"), "body{}\n").expect("write");
    fs::write(local.path().join("requirements.txt"), "flask\n").expect("write");

    let host = tempfile::tempdir().expect("host");
    let target = host.path().join("srv").join("app");
    fs::create_dir_all(&target).expect("mkdir target");
    fs::write(target.join("extra.log"), "keep").expect("write extra");

    let session = LocalSession::new();
    upload_directory(&session, local.path(), remote(&target)).expect("first upload");
    let first = snapshot(&target);
    upload_directory(&session, local.path(), remote(&target)).expect("second upload");
    let second = snapshot(&target);

    assert_eq!(first, second);
    assert_eq!(
        second.get("app/main.py"),
        Some(&Some(b"print('hi')\n".to_vec()))
    );
    assert_eq!(second.get("empty"), Some(&None));
    assert_eq!(second.get("extra.log"), Some(&Some(b"keep".to_vec())));
}

#[test]
fn file_upload_creates_missing_parents() {
    let local = tempfile::tempdir().expect("local");
    let src = local.path().join("worker.env");
    fs::write(&src, "WORKERS=4\n").expect("write");

    let host = tempfile::tempdir().expect("host");
    let dst = host.path().join("etc").join("app").join("worker.env");
    upload_file(&LocalSession::new(), &src, remote(&dst)).expect("upload");
    assert_eq!(fs::read_to_string(&dst).expect("read"), "WORKERS=4\n");
}

#[test]
fn missing_local_source_is_reported() {
    let local = tempfile::tempdir().expect("local");
    let host = tempfile::tempdir().expect("host");
    let err = upload_directory(
        &LocalSession::new(),
        &local.path().join("absent"),
        remote(host.path()),
    )
    .unwrap_err();
    assert!(matches!(err, DeployError::LocalNotFound(_)));
}
