use crate::config::{CreatePolicy, ManagerConfig};
use crate::err::{Error, Result, FILE_EXISTS, INVALID_ARGUMENT};
use crate::key::SegmentKey;
use crate::mapped_region::MappedRegion;
use crate::segment::{Segment, SegmentView};
use crate::shared_memory::SharedMemoryObject;

use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

type Registry = HashMap<String, Arc<Segment>>;

/// Creates, opens and removes named shared memory segments.
///
/// Every call goes back to the OS namespace: the registry only avoids mapping
/// the same object twice and remembers what this instance created. All
/// registry work happens under one lock, so concurrent `create`/`open` calls
/// for the same key inside a process cannot race each other.
///
/// Dropping the manager unmaps whatever no view still references but never
/// unlinks a name. Objects outlive the process until someone calls
/// [`remove`](SegmentManager::remove) or
/// [`remove_created`](SegmentManager::remove_created).
pub struct SegmentManager {
    config: ManagerConfig,
    registry: Mutex<Registry>,
}

impl SegmentManager {
    pub fn new(config: ManagerConfig) -> Result<Self> {
        config.validate()?;
        Ok(SegmentManager {
            config,
            registry: Mutex::new(HashMap::new()),
        })
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    fn resolve(&self, key: &str) -> Result<SegmentKey> {
        SegmentKey::new(&self.config.prefix, key)
    }

    /// Creates the segment `key` with `size` bytes and maps it.
    ///
    /// A fresh object is zero-filled by the OS. When the name already exists
    /// the configured [`CreatePolicy`] decides what happens; with the default
    /// `OpenExisting` the returned view has the existing object's length,
    /// which may differ from `size`.
    pub fn create(&self, key: &str, size: usize) -> Result<SegmentView> {
        let key = self.resolve(key)?;
        if size == 0 {
            return Err(Error::InvalidSize {
                size,
                reason: "must be positive",
            });
        }
        if size > self.config.max_segment_size {
            return Err(Error::InvalidSize {
                size,
                reason: "exceeds max_segment_size",
            });
        }

        let mut registry = self.registry.lock();
        let segment = loop {
            match SharedMemoryObject::create(key.name(), self.config.permissions) {
                Ok(obj) => break self.init_created(&key, obj, size)?,
                Err(FILE_EXISTS) => {}
                Err(ec) => return Err(ec.into_error("shm_open", key.name_str())),
            }
            match self.create_existing(&key, size, &mut registry) {
                Ok(Some(segment)) => break segment,
                // Unlinked since our attempt, or replaced on purpose.
                Ok(None) | Err(Error::NotFound { .. }) => continue,
                Err(err) => return Err(err),
            }
        };

        registry.insert(key.as_str().to_string(), segment.clone());
        Ok(SegmentView::new(segment))
    }

    fn init_created(&self, key: &SegmentKey, obj: SharedMemoryObject, size: usize) -> Result<Arc<Segment>> {
        let name = key.name_str();
        let mapped = obj
            .truncate(size)
            .map_err(|ec| ec.into_error("ftruncate", name))
            .and_then(|_| obj.status().map_err(|ec| ec.into_error("fstat", name)))
            .and_then(|status| {
                MappedRegion::new(obj.handle(), size)
                    .map(|region| (region, status.identity))
                    .map_err(|ec| ec.into_error("mmap", name))
            });

        match mapped {
            Ok((region, identity)) => {
                info!("created shared memory {} ({} bytes)", name, size);
                Ok(Arc::new(Segment::new(key.clone(), region, identity, true)))
            }
            Err(err) => {
                drop(obj);
                if let Err(ec) = SharedMemoryObject::remove(key.name()) {
                    warn!("could not unlink half-created {}: {:?}", name, ec);
                }
                Err(err)
            }
        }
    }

    /// Handles `create` on a name that is already taken. `Ok(None)` asks the
    /// caller to try creating again.
    fn create_existing(&self, key: &SegmentKey, size: usize, registry: &mut Registry) -> Result<Option<Arc<Segment>>> {
        let name = key.name_str();
        match self.config.create_policy {
            CreatePolicy::FailIfExists => Err(Error::AlreadyExists {
                name: name.to_string(),
            }),
            CreatePolicy::Replace => {
                warn!("replacing existing shared memory {}", name);
                unlink(key)?;
                registry.remove(key.as_str());
                Ok(None)
            }
            CreatePolicy::RequireSameSize => self.attach(key, Some(size), true, registry).map(Some),
            CreatePolicy::OpenExisting => {
                let segment = self.attach(key, Some(size), false, registry)?;
                if segment.len() != size {
                    warn!(
                        "shared memory {} already exists with {} bytes, {} requested; using existing",
                        name,
                        segment.len(),
                        size
                    );
                } else {
                    warn!("shared memory {} already exists, reopening", name);
                }
                Ok(Some(segment))
            }
        }
    }

    /// Opens the existing object for `key` and maps it, reusing the
    /// registered mapping when it still refers to the same object.
    ///
    /// With `requested` set (the `create` path) an object that nobody has
    /// sized yet is grown to `requested` first; `strict` then demands the
    /// final size match exactly.
    fn attach(&self, key: &SegmentKey, requested: Option<usize>, strict: bool, registry: &Registry) -> Result<Arc<Segment>> {
        let name = key.name_str();
        let obj = SharedMemoryObject::open(key.name()).map_err(|ec| ec.into_error("shm_open", name))?;
        let mut status = obj.status().map_err(|ec| ec.into_error("fstat", name))?;

        // Its creator sits between shm_open and ftruncate, or died there.
        if status.size == 0 {
            match requested {
                Some(size) => {
                    obj.truncate(size).map_err(|ec| ec.into_error("ftruncate", name))?;
                    status = obj.status().map_err(|ec| ec.into_error("fstat", name))?;
                    warn!("shared memory {} existed unsized, sized it to {} bytes", name, status.size);
                }
                None => return Err(INVALID_ARGUMENT.into_error("mmap", name)),
            }
        }

        if let (Some(requested), true) = (requested, strict) {
            if requested != status.size {
                return Err(Error::SizeMismatch {
                    name: name.to_string(),
                    requested,
                    actual: status.size,
                });
            }
        }

        if let Some(segment) = registry.get(key.as_str()) {
            if segment.identity() == status.identity && segment.len() == status.size {
                debug!("reusing mapping of {}", name);
                return Ok(segment.clone());
            }
            debug!("registered mapping of {} is stale, remapping", name);
        }

        let region = MappedRegion::new(obj.handle(), status.size).map_err(|ec| ec.into_error("mmap", name))?;
        info!("opened shared memory {} ({} bytes)", name, status.size);
        Ok(Arc::new(Segment::new(key.clone(), region, status.identity, false)))
    }

    /// Opens the existing segment `key` at its current size.
    ///
    /// Never creates anything; a missing name is `NotFound`.
    pub fn open(&self, key: &str) -> Result<SegmentView> {
        let key = self.resolve(key)?;
        let mut registry = self.registry.lock();
        match self.attach(&key, None, false, &registry) {
            Ok(segment) => {
                registry.insert(key.as_str().to_string(), segment.clone());
                Ok(SegmentView::new(segment))
            }
            Err(err) => {
                if err.is_not_found() && registry.remove(key.as_str()).is_some() {
                    debug!("dropped registry entry for vanished {}", key.name_str());
                }
                Err(err)
            }
        }
    }

    /// Unlinks the segment `key` from the OS namespace.
    ///
    /// Returns `false` if there was nothing to remove. The local mapping is
    /// released once no [`SegmentView`] refers to it any more; other
    /// processes keep their mappings of the old pages until they unmap, but
    /// can no longer open the name.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let key = self.resolve(key)?;
        let mut registry = self.registry.lock();
        let removed = unlink(&key)?;
        registry.remove(key.as_str());
        if removed {
            info!("removed shared memory {}", key.name_str());
        } else {
            debug!("shared memory {} was not present", key.name_str());
        }
        Ok(removed)
    }

    /// Whether `key` currently names an object in the OS namespace.
    pub fn exists(&self, key: &str) -> Result<bool> {
        let key = self.resolve(key)?;
        match SharedMemoryObject::open(key.name()) {
            Ok(_) => Ok(true),
            Err(ec) if ec.is_permission() => Ok(true),
            Err(ec) => match ec.into_error("shm_open", key.name_str()) {
                Error::NotFound { .. } => Ok(false),
                err => Err(err),
            },
        }
    }

    /// Drops this manager's handle on `key` without unlinking the name.
    pub fn release(&self, key: &str) -> Result<bool> {
        let key = self.resolve(key)?;
        Ok(self.registry.lock().remove(key.as_str()).is_some())
    }

    /// Unlinks every registered segment this manager created and returns
    /// how many names were actually removed.
    ///
    /// Stops at the first failure; segments not yet processed stay
    /// registered.
    pub fn remove_created(&self) -> Result<usize> {
        let mut registry = self.registry.lock();
        let mut keys: Vec<String> = registry
            .iter()
            .filter(|(_, segment)| segment.created())
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();

        let mut removed = 0;
        for key in keys {
            let key = self.resolve(&key)?;
            if unlink(&key)? {
                removed += 1;
            }
            registry.remove(key.as_str());
        }
        info!("removed {} shared memory segments created by this process", removed);
        Ok(removed)
    }

    pub fn registered_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.registry.lock().keys().cloned().collect();
        keys.sort();
        keys
    }
}

fn unlink(key: &SegmentKey) -> Result<bool> {
    let name = key.name_str();
    SharedMemoryObject::remove(key.name()).map_err(|ec| {
        if ec.is_permission() {
            Error::PermissionDenied {
                op: "shm_unlink",
                name: name.to_string(),
                source: ec.into(),
            }
        } else {
            Error::RemovalFailed {
                name: name.to_string(),
                source: ec.into(),
            }
        }
    })
}

impl Default for SegmentManager {
    fn default() -> Self {
        SegmentManager {
            config: ManagerConfig::default(),
            registry: Mutex::new(HashMap::new()),
        }
    }
}

impl Drop for SegmentManager {
    fn drop(&mut self) {
        let registry = self.registry.get_mut();
        let leaked: Vec<&str> = registry
            .values()
            .filter(|segment| segment.created())
            .map(|segment| segment.key().name_str())
            .collect();
        if !leaked.is_empty() {
            warn!(
                "{} shared memory segments created here stay in the OS namespace: {}",
                leaked.len(),
                leaked.join(", ")
            );
        }
    }
}

#[cfg(test)]
fn test_key(tag: &str) -> String {
    format!("shmm{}{}", std::process::id(), tag)
}

#[test]
fn test_create_open_remove() {
    let manager = SegmentManager::default();
    let key = test_key("cor");

    let mut view = manager.create(&key, 1024).unwrap();
    assert_eq!(view.len(), 1024);
    for i in 0..100 {
        view.set(i, i as u8).unwrap();
    }

    let other = manager.open(&key).unwrap();
    assert_eq!(other.len(), 1024);
    assert!(other.same_mapping(&view));
    assert_eq!(&other.to_vec()[..100], &(0..100u8).collect::<Vec<_>>()[..]);
    assert_eq!(manager.registered_keys(), vec![key.clone()]);

    assert!(manager.remove(&key).unwrap());
    assert!(manager.registered_keys().is_empty());
    assert!(!manager.remove(&key).unwrap());
    assert!(manager.open(&key).unwrap_err().is_not_found());

    // Views stay usable after the name is gone.
    assert_eq!(view.get(99), Some(99));
}

#[test]
fn test_invalid_arguments() {
    let manager = SegmentManager::default();
    assert!(matches!(manager.create("", 10), Err(Error::InvalidKey { .. })));
    assert!(matches!(manager.create("a/b", 10), Err(Error::InvalidKey { .. })));
    assert!(matches!(
        manager.create(&test_key("zero"), 0),
        Err(Error::InvalidSize { .. })
    ));
    assert!(matches!(manager.open(""), Err(Error::InvalidKey { .. })));
    assert!(matches!(manager.remove("x\\y"), Err(Error::InvalidKey { .. })));

    let small = SegmentManager::new(ManagerConfig::default().with_max_segment_size(16)).unwrap();
    assert!(matches!(
        small.create(&test_key("big"), 17),
        Err(Error::InvalidSize { .. })
    ));
    assert!(SegmentManager::new(ManagerConfig::default().with_prefix("a/")).is_err());
}

#[test]
fn test_drop_keeps_name() {
    let key = test_key("drop");
    {
        let manager = SegmentManager::default();
        manager.create(&key, 32).unwrap().set(0, 42).unwrap();
    }
    let manager = SegmentManager::default();
    assert!(manager.exists(&key).unwrap());
    assert_eq!(manager.open(&key).unwrap().get(0), Some(42));
    assert!(manager.remove(&key).unwrap());
    assert!(!manager.exists(&key).unwrap());
}

#[cfg(test)]
fn unsized_object(key: &str) {
    use crate::ffi::Permissions;

    let key = SegmentKey::new("", key).unwrap();
    let _ = SharedMemoryObject::remove(key.name());
    SharedMemoryObject::create(key.name(), Permissions::default()).unwrap();
}

#[test]
fn test_create_sizes_unsized_object() {
    let key = test_key("uz");
    unsized_object(&key);

    let manager = SegmentManager::default();
    // Nobody sized it yet, open has nothing to map.
    assert!(matches!(
        manager.open(&key),
        Err(Error::AllocationFailed { op: "mmap", .. })
    ));
    assert!(manager.registered_keys().is_empty());

    let mut view = manager.create(&key, 16).unwrap();
    assert_eq!(view.len(), 16);
    view.set(15, 3).unwrap();
    assert_eq!(manager.open(&key).unwrap().get(15), Some(3));

    assert!(manager.remove(&key).unwrap());
}

#[test]
fn test_create_same_size_sizes_unsized_object() {
    let key = test_key("us");
    unsized_object(&key);

    let manager = SegmentManager::new(
        ManagerConfig::default().with_create_policy(CreatePolicy::RequireSameSize),
    )
    .unwrap();
    assert_eq!(manager.create(&key, 24).unwrap().len(), 24);
    assert!(matches!(
        manager.create(&key, 32),
        Err(Error::SizeMismatch { actual: 24, .. })
    ));

    assert!(manager.remove(&key).unwrap());
}
