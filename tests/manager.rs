use shmseg::{CreatePolicy, Error, ManagerConfig, SegmentManager};
use std::sync::Arc;
use std::thread;

fn key(tag: &str) -> String {
    format!("it{}{}", std::process::id(), tag)
}

fn manager(policy: CreatePolicy) -> SegmentManager {
    SegmentManager::new(ManagerConfig::default().with_create_policy(policy)).unwrap()
}

#[test]
fn seg_a_round_trip() {
    let manager = SegmentManager::default();
    let key = key("a");

    let mut view = manager.create(&key, 1024).unwrap();
    for i in 0..100 {
        view.set(i, (i % 256) as u8).unwrap();
    }

    let other = SegmentManager::default();
    let read = other.open(&key).unwrap();
    assert_eq!(read.len(), 1024);
    let expected: Vec<u8> = (0..100).map(|i| (i % 256) as u8).collect();
    assert_eq!(&read.to_vec()[..100], &expected[..]);
    assert!(read.to_vec()[100..].iter().all(|&b| b == 0));

    assert!(manager.remove(&key).unwrap());
    assert!(other.open(&key).unwrap_err().is_not_found());
    assert!(!other.remove(&key).unwrap());
}

#[test]
fn seg_b_create_twice_reopens() {
    let manager = manager(CreatePolicy::OpenExisting);
    let key = key("b");

    let mut first = manager.create(&key, 20).unwrap();
    let second = manager.create(&key, 20).unwrap();
    assert_eq!(second.len(), 20);
    assert!(first.same_mapping(&second));

    first.write_at(0, b"twenty").unwrap();
    let mut buf = [0; 6];
    second.read_at(0, &mut buf).unwrap();
    assert_eq!(&buf, b"twenty");

    assert!(manager.remove(&key).unwrap());
}

#[test]
fn open_existing_surfaces_actual_size() {
    let manager = manager(CreatePolicy::OpenExisting);
    let key = key("sz");

    manager.create(&key, 64).unwrap();
    let again = manager.create(&key, 4096).unwrap();
    assert_eq!(again.len(), 64);

    assert!(manager.remove(&key).unwrap());
}

#[test]
fn writes_cross_independent_mappings() {
    let key = key("x");
    let writer = SegmentManager::default();
    let reader = SegmentManager::default();

    let mut w = writer.create(&key, 256).unwrap();
    let r = reader.open(&key).unwrap();
    assert!(!w.same_mapping(&r));

    w.write_at(128, &[1, 2, 3]).unwrap();
    assert_eq!(r.get(129), Some(2));

    assert!(reader.remove(&key).unwrap());
}

#[test]
fn fail_if_exists_policy() {
    let manager = manager(CreatePolicy::FailIfExists);
    let key = key("f");

    manager.create(&key, 16).unwrap();
    match manager.create(&key, 16) {
        Err(Error::AlreadyExists { name }) => assert!(name.ends_with(&key)),
        other => panic!("unexpected {:?}", other),
    }
    assert!(manager.remove(&key).unwrap());
}

#[test]
fn require_same_size_policy() {
    let manager = manager(CreatePolicy::RequireSameSize);
    let key = key("s");

    let first = manager.create(&key, 16).unwrap();
    let same = manager.create(&key, 16).unwrap();
    assert!(first.same_mapping(&same));
    match manager.create(&key, 32) {
        Err(Error::SizeMismatch {
            requested, actual, ..
        }) => {
            assert_eq!(requested, 32);
            assert_eq!(actual, 16);
        }
        other => panic!("unexpected {:?}", other),
    }
    assert!(manager.remove(&key).unwrap());
}

#[test]
fn replace_policy() {
    let manager = manager(CreatePolicy::Replace);
    let key = key("r");

    let mut old = manager.create(&key, 16).unwrap();
    old.set(0, 0xaa).unwrap();

    let fresh = manager.create(&key, 48).unwrap();
    assert_eq!(fresh.len(), 48);
    assert_eq!(fresh.get(0), Some(0));
    assert!(!old.same_mapping(&fresh));
    // The old view keeps its detached pages.
    assert_eq!(old.get(0), Some(0xaa));

    assert_eq!(manager.open(&key).unwrap().len(), 48);
    assert!(manager.remove(&key).unwrap());
}

#[test]
fn open_missing_registers_nothing() {
    let manager = SegmentManager::default();
    let key = key("m");

    assert!(manager.open(&key).unwrap_err().is_not_found());
    assert!(manager.registered_keys().is_empty());
    assert!(!manager.exists(&key).unwrap());
}

#[test]
fn failed_create_leaves_nothing_behind() {
    let manager = SegmentManager::default();
    let key = key("fc");

    // Sizing succeeds on tmpfs, the mapping cannot.
    match manager.create(&key, isize::MAX as usize) {
        Err(Error::AllocationFailed { op, .. }) => assert_eq!(op, "mmap"),
        other => panic!("unexpected {:?}", other),
    }
    assert!(!manager.exists(&key).unwrap());
    assert!(manager.registered_keys().is_empty());
}

#[test]
fn open_after_external_removal() {
    let manager = SegmentManager::default();
    let other = SegmentManager::default();
    let key = key("e");

    manager.create(&key, 8).unwrap();
    assert!(other.remove(&key).unwrap());

    assert!(manager.open(&key).unwrap_err().is_not_found());
    assert!(manager.registered_keys().is_empty());
}

#[test]
fn recreated_elsewhere_is_remapped() {
    let manager = SegmentManager::default();
    let other = SegmentManager::default();
    let key = key("re");

    let stale = manager.create(&key, 8).unwrap();
    assert!(other.remove(&key).unwrap());
    let mut fresh = other.create(&key, 8).unwrap();
    fresh.set(1, 5).unwrap();

    let reopened = manager.open(&key).unwrap();
    assert!(!reopened.same_mapping(&stale));
    assert_eq!(reopened.get(1), Some(5));

    assert!(manager.remove(&key).unwrap());
}

#[test]
fn release_keeps_name() {
    let manager = SegmentManager::default();
    let key = key("rl");

    manager.create(&key, 8).unwrap();
    assert!(manager.release(&key).unwrap());
    assert!(!manager.release(&key).unwrap());
    assert!(manager.exists(&key).unwrap());
    assert!(manager.remove(&key).unwrap());
}

#[test]
fn remove_created_only_touches_own_segments() {
    let creator = SegmentManager::default();
    let opener = SegmentManager::default();
    let mine = key("o1");
    let theirs = key("o2");

    creator.create(&mine, 8).unwrap();
    opener.create(&theirs, 8).unwrap();
    creator.open(&theirs).unwrap();

    assert_eq!(creator.remove_created().unwrap(), 1);
    assert!(!creator.exists(&mine).unwrap());
    assert!(creator.exists(&theirs).unwrap());
    assert_eq!(creator.registered_keys(), vec![theirs.clone()]);

    assert_eq!(opener.remove_created().unwrap(), 1);
    assert!(!opener.exists(&theirs).unwrap());
}

#[test]
fn prefix_namespaces_keys() {
    let plain = SegmentManager::default();
    let prefixed = SegmentManager::new(ManagerConfig::default().with_prefix("p.")).unwrap();
    let key = key("p");

    let view = prefixed.create(&key, 8).unwrap();
    assert_eq!(view.key(), key);
    assert_eq!(view.name(), format!("/p.{}", key));
    assert!(plain.open(&key).unwrap_err().is_not_found());

    assert!(prefixed.remove(&key).unwrap());
}

#[test]
fn concurrent_creates_share_one_mapping() {
    let manager = Arc::new(SegmentManager::default());
    let key = key("cc");

    let views: Vec<_> = (0..8)
        .map(|_| {
            let manager = manager.clone();
            let key = key.clone();
            thread::spawn(move || manager.create(&key, 4096).unwrap())
        })
        .collect::<Vec<_>>()
        .into_iter()
        .map(|handle| handle.join().unwrap())
        .collect();

    assert!(views.iter().all(|view| view.same_mapping(&views[0])));
    assert!(views.iter().all(|view| view.len() == 4096));
    assert!(manager.remove(&key).unwrap());
}

#[test]
fn global_functions() {
    let key = key("g");
    let mut view = shmseg::create(&key, 32).unwrap();
    view.set(31, 1).unwrap();
    assert_eq!(shmseg::open(&key).unwrap().get(31), Some(1));
    assert!(shmseg::global().registered_keys().contains(&key));
    assert!(shmseg::remove(&key).unwrap());
    assert!(!shmseg::remove(&key).unwrap());
}
