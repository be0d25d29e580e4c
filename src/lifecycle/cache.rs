//! Object caches with exactly-once construction.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use ahash::AHashMap;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use tracing::trace;

use crate::error::DiResult;
use crate::instance::InstanceId;
use crate::internal::{circular, next_id, BuilderId};
use crate::key::TypeKey;
use crate::value::Value;

/// Identifies one cached object: a plugin type and an instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct CacheKey {
    pub(crate) plugin: TypeKey,
    pub(crate) instance: InstanceId,
}

impl CacheKey {
    pub(crate) fn new(plugin: TypeKey, instance: InstanceId) -> Self {
        Self { plugin, instance }
    }
}

struct Slot {
    id: u64,
    value: OnceCell<Value>,
    // Serialize first builds, one lock for each resolution style.
    building: Mutex<()>,
    building_async: tokio::sync::Mutex<()>,
}

impl Slot {
    fn new() -> Self {
        Self {
            id: next_id(),
            value: OnceCell::new(),
            building: Mutex::new(()),
            building_async: tokio::sync::Mutex::new(()),
        }
    }
}

/// Previously built objects of one lifecycle scope.
///
/// Each key moves from uncreated to created exactly once. Concurrent first
/// requests for the same key build one object; every caller observes it.
/// Returning to uncreated requires [`ObjectCache::eject`], which disposes the
/// object first.
#[derive(Default)]
pub struct ObjectCache {
    slots: RwLock<AHashMap<CacheKey, Arc<Slot>>>,
}

impl ObjectCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, key: &CacheKey) -> Arc<Slot> {
        if let Some(slot) = self.slots.read().get(key) {
            return slot.clone();
        }
        let mut slots = self.slots.write();
        slots.entry(key.clone()).or_insert_with(|| Arc::new(Slot::new())).clone()
    }

    #[cfg(test)]
    pub(crate) fn get(&self, key: &CacheKey) -> Option<Value> {
        self.slots.read().get(key).and_then(|slot| slot.value.get().cloned())
    }

    #[cfg(test)]
    pub(crate) fn has(&self, key: &CacheKey) -> bool {
        self.get(key).is_some()
    }

    /// Returns the cached object for `key`, building it on the first request.
    ///
    /// A failed build leaves the key uncreated. Blocking on a slot whose
    /// builder is itself waiting, directly or through other builders, on
    /// `builder` fails with [`DiError::Circular`](crate::DiError::Circular).
    pub(crate) fn get_or_build<F>(
        &self,
        key: &CacheKey,
        builder: BuilderId,
        label: impl FnOnce() -> String,
        build: F,
    ) -> DiResult<Value>
    where
        F: FnOnce() -> DiResult<Value>,
    {
        let slot = self.slot(key);
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let _building = match slot.building.try_lock() {
            Some(guard) => guard,
            None => {
                let _waiting = circular::wait_for(slot.id, builder)?;
                slot.building.lock()
            }
        };
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let _claim = circular::claim(slot.id, builder, label);
        let built = build()?;
        // An async request may have filled the slot meanwhile; it wins.
        Ok(slot.value.get_or_init(|| built).clone())
    }

    /// Async variant of [`get_or_build`](Self::get_or_build).
    pub(crate) async fn get_or_build_async<F, Fut>(
        &self,
        key: &CacheKey,
        builder: BuilderId,
        label: impl FnOnce() -> String,
        build: F,
    ) -> DiResult<Value>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DiResult<Value>>,
    {
        let slot = self.slot(key);
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let _building = match slot.building_async.try_lock() {
            Ok(guard) => guard,
            Err(_) => {
                let _waiting = circular::wait_for(slot.id, builder)?;
                slot.building_async.lock().await
            }
        };
        if let Some(value) = slot.value.get() {
            return Ok(value.clone());
        }

        let _claim = circular::claim(slot.id, builder, label);
        let built = build().await?;
        // A synchronous request may have filled the slot meanwhile; it wins.
        Ok(slot.value.get_or_init(|| built).clone())
    }

    /// Removes the object for `key`, disposing it. Returns false when nothing
    /// was cached.
    pub(crate) fn eject(&self, key: &CacheKey) -> bool {
        let removed = self.slots.write().remove(key);
        match removed.and_then(|slot| slot.value.get().cloned()) {
            Some(value) => {
                trace!(target: "ferrous_ioc", plugin = %key.plugin, instance = %key.instance, "ejecting cached object");
                dispose(&value);
                true
            }
            None => false,
        }
    }

    /// Ejects every key matching `predicate`.
    pub(crate) fn eject_where<P>(&self, predicate: P) -> usize
    where
        P: Fn(&CacheKey) -> bool,
    {
        let removed: Vec<Arc<Slot>> = {
            let mut slots = self.slots.write();
            let keys: Vec<CacheKey> = slots.keys().filter(|k| predicate(k)).cloned().collect();
            keys.iter().filter_map(|k| slots.remove(k)).collect()
        };
        dispose_all(removed)
    }

    /// Ejects and disposes everything.
    pub fn eject_all(&self) {
        let removed: Vec<Arc<Slot>> = self.slots.write().drain().map(|(_, slot)| slot).collect();
        dispose_all(removed);
    }

    /// Number of created objects.
    pub fn len(&self) -> usize {
        self.slots.read().values().filter(|slot| slot.value.get().is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn dispose(value: &Value) {
    if let Some(disposer) = value.disposer() {
        disposer.dispose();
    }
}

fn dispose_all(slots: Vec<Arc<Slot>>) -> usize {
    let mut count = 0;
    for slot in slots {
        if let Some(value) = slot.value.get() {
            dispose(value);
            count += 1;
        }
    }
    count
}

impl fmt::Debug for ObjectCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectCache").field("created", &self.len()).finish()
    }
}
