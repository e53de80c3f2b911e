use shmseg::SegmentManager;
use std::process::{Command, Output};

fn key(tag: &str) -> String {
    format!("xp{}{}", std::process::id(), tag)
}

fn shmseg(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_shmseg"))
        .args(args)
        .output()
        .expect("failed to run shmseg")
}

#[test]
fn child_reads_what_parent_wrote() {
    let manager = SegmentManager::default();
    let key = key("pw");

    let mut view = manager.create(&key, 1024).unwrap();
    let pattern: Vec<u8> = (0..100).map(|i| (i % 256) as u8).collect();
    view.write_at(0, &pattern).unwrap();

    let out = shmseg(&["get", &key, "--verify"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains(&format!("/{} 1024", key)), "{}", stdout);

    assert!(manager.remove(&key).unwrap());
}

#[test]
fn parent_reads_what_child_wrote() {
    let key = key("cw");

    let out = shmseg(&["set", &key, "1024", "--pattern"]);
    assert!(out.status.success(), "{}", String::from_utf8_lossy(&out.stderr));

    // The child has exited; its name is still there.
    let manager = SegmentManager::default();
    let view = manager.open(&key).unwrap();
    assert_eq!(view.len(), 1024);
    for i in 0..100 {
        assert_eq!(view.get(i), Some((i % 256) as u8));
    }

    assert!(manager.remove(&key).unwrap());
}

#[test]
fn child_removal_is_visible() {
    let manager = SegmentManager::default();
    let key = key("cr");
    let mut view = manager.create(&key, 64).unwrap();

    let out = shmseg(&["remove", &key]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "removed true");

    assert!(manager.open(&key).unwrap_err().is_not_found());
    // Our mapping still works on the unlinked pages.
    view.set(63, 1).unwrap();
    assert_eq!(view.get(63), Some(1));

    let out = shmseg(&["remove", &key]);
    assert!(out.status.success());
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "removed false");
}

#[test]
fn child_get_missing_fails() {
    let out = shmseg(&["get", &key("gm")]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("does not exist"));
}

#[test]
fn child_verify_detects_foreign_bytes() {
    let manager = SegmentManager::default();
    let key = key("vf");
    manager.create(&key, 200).unwrap().fill(0xee);

    let out = shmseg(&["get", &key, "--verify", "--remove"]);
    assert!(!out.status.success());
    assert!(!manager.exists(&key).unwrap());
}
