//! Circular dependency detection, within one build session and between
//! sessions waiting on each other's cache slots.

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread::{self, ThreadId};

use ahash::AHashMap;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::error::{DiError, DiResult};
use crate::instance::InstanceId;
use crate::key::TypeKey;

const MAX_DEPTH: usize = 256;

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// A process-wide unique id for sessions and cache slots.
pub(crate) fn next_id() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// One plan being built: a plugin type and the instance building it.
#[derive(Debug, Clone)]
pub(crate) struct Frame {
    pub(crate) plugin: TypeKey,
    pub(crate) instance: InstanceId,
    pub(crate) name: String,
}

impl Frame {
    fn same_build(&self, other: &Frame) -> bool {
        self.plugin == other.plugin && self.instance == other.instance
    }

    pub(crate) fn describe(&self) -> String {
        format!("{} ('{}')", self.plugin, self.name)
    }
}

/// Stack of plans currently being built within a session.
#[derive(Debug, Default)]
pub(crate) struct ResolutionStack {
    frames: Mutex<Vec<Frame>>,
}

impl ResolutionStack {
    /// Pushes `frame`, failing with [`DiError::Circular`] when the same
    /// plugin type and instance are already being built.
    pub(crate) fn enter(&self, frame: Frame) -> DiResult<StackGuard<'_>> {
        let mut frames = self.frames.lock();

        // Circular detection before pushing the new frame
        if frames.iter().any(|f| f.same_build(&frame)) || frames.len() >= MAX_DEPTH {
            let mut path: Vec<String> = frames.iter().map(Frame::describe).collect();
            path.push(frame.describe());
            return Err(DiError::Circular { path });
        }

        frames.push(frame);
        Ok(StackGuard { stack: self })
    }

    pub(crate) fn depth(&self) -> usize {
        self.frames.lock().len()
    }
}

/// Pops its frame when dropped, including on early return.
pub(crate) struct StackGuard<'a> {
    stack: &'a ResolutionStack,
}

impl Drop for StackGuard<'_> {
    fn drop(&mut self) {
        self.stack.frames.lock().pop();
    }
}

/// The session building a cache slot. Synchronous builds also record their
/// thread; an async build may move between threads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct BuilderId {
    session: u64,
    thread: Option<ThreadId>,
}

impl BuilderId {
    pub(crate) fn on_current_thread(session: u64) -> Self {
        Self {
            session,
            thread: Some(thread::current().id()),
        }
    }

    pub(crate) fn detached(session: u64) -> Self {
        Self { session, thread: None }
    }

    /// True when waiting on a slot built by `owner` can never finish.
    fn deadlocks_with(&self, owner: &BuilderId) -> bool {
        self.session == owner.session || (self.thread.is_some() && self.thread == owner.thread)
    }
}

/// Which session builds each slot and which slot each session waits on.
#[derive(Default)]
struct WaitGraph {
    owners: AHashMap<u64, (BuilderId, String)>,
    waiting: AHashMap<u64, u64>,
}

static WAITS: Lazy<Mutex<WaitGraph>> = Lazy::new(|| Mutex::new(WaitGraph::default()));

/// Records `builder` as building `slot` until the returned guard drops.
pub(crate) fn claim(slot: u64, builder: BuilderId, label: impl FnOnce() -> String) -> Claim {
    WAITS.lock().owners.entry(slot).or_insert_with(|| (builder, label()));
    Claim { slot, builder }
}

/// Records that `builder` is about to block on `slot`, failing with
/// [`DiError::Circular`] when the owners of the slots along the wait chain
/// lead back to `builder`.
pub(crate) fn wait_for(slot: u64, builder: BuilderId) -> DiResult<Waiting> {
    let mut graph = WAITS.lock();
    let mut labels = Vec::new();
    let mut current = slot;
    while let Some((owner, label)) = graph.owners.get(&current) {
        labels.push(label.clone());
        if builder.deadlocks_with(owner) {
            let mut path = Vec::with_capacity(labels.len() + 1);
            path.extend(labels.last().cloned());
            path.extend(labels);
            return Err(DiError::Circular { path });
        }
        match graph.waiting.get(&owner.session) {
            Some(next) if labels.len() <= graph.owners.len() => current = *next,
            _ => break,
        }
    }
    graph.waiting.insert(builder.session, slot);
    Ok(Waiting {
        session: builder.session,
    })
}

/// Releases a slot claim when dropped.
pub(crate) struct Claim {
    slot: u64,
    builder: BuilderId,
}

impl Drop for Claim {
    fn drop(&mut self) {
        let mut graph = WAITS.lock();
        if graph.owners.get(&self.slot).map_or(false, |(owner, _)| *owner == self.builder) {
            graph.owners.remove(&self.slot);
        }
    }
}

/// Clears a wait edge when dropped.
pub(crate) struct Waiting {
    session: u64,
}

impl Drop for Waiting {
    fn drop(&mut self) {
        WAITS.lock().waiting.remove(&self.session);
    }
}
