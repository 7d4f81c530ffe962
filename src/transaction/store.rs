//! Transaction store trees.
//!
//! Every store tree lives in its own arena, created together with the tree's root. Nodes
//! reference their parent by [`StoreId`], never by pointer, and are reference counted inside
//! the arena: a node stays alive while a [`StoreHandle`] or a child node refers to it.
//!
//! ```text
//!   StoreArena (one per tree)
//!   ┌──────────────────────────────────────────────┐
//!   │  root ◄── child ◄── child                     │
//!   │   │         ▲                                 │
//!   │   │         └── child                         │
//!   │   ▼                                           │
//!   │  RootState: participants, scratch, context    │
//!   └──────────────────────────────────────────────┘
//! ```
//!
//! Only the root owns live state. Every operation on a child walks the parent links to the
//! root before taking effect.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use ulid::Ulid;

use crate::transaction::context::Context;
use crate::transaction::error::{RollbackErrors, RollbackFailure, ScopeError, ScopeResult};
use crate::transaction::key::{AnyKey, OpaqueKey};
use crate::transaction::participant::Participant;

/// Identifier of a store node.
pub type StoreId = Ulid;

type ScratchValue = Arc<dyn Any + Send + Sync>;

/// State owned by the root of a store tree.
pub(crate) struct RootState {
    /// Context the root was created against.
    bound: Context,
    /// Participants in registration order.
    participants: Mutex<Vec<Arc<dyn Participant>>>,
    /// Held for a whole commit or rollback pass; `add` only takes `participants`.
    finalize: Mutex<()>,
    scratch: RwLock<HashMap<AnyKey, ScratchValue>>,
}

enum NodeKind {
    Root(Arc<RootState>),
    Child { parent: StoreId },
}

struct StoreNode {
    kind: NodeKind,
    depth: usize,
    /// Handles plus child nodes referring to this node.
    refs: usize,
}

/// Arena holding the nodes of one store tree.
struct StoreArena {
    nodes: RwLock<HashMap<StoreId, StoreNode>>,
}

impl StoreArena {
    /// Follow parent links to the root state.
    fn resolve(&self, id: StoreId) -> (bool, Arc<RootState>) {
        let nodes = self.nodes.read();
        let mut current = id;
        loop {
            // A live handle keeps every ancestor of its node in the arena.
            match &nodes[&current].kind {
                NodeKind::Root(state) => return (current == id, state.clone()),
                NodeKind::Child { parent } => current = *parent,
            }
        }
    }

    fn release(&self, id: StoreId) {
        let mut removed = Vec::new();
        {
            let mut nodes = self.nodes.write();
            let mut next = Some(id);
            while let Some(current) = next.take() {
                let Some(node) = nodes.get_mut(&current) else {
                    break;
                };
                node.refs -= 1;
                if node.refs > 0 {
                    break;
                }
                if let Some(node) = nodes.remove(&current) {
                    if let NodeKind::Child { parent } = node.kind {
                        next = Some(parent);
                    }
                    tracing::debug!(store = %current, depth = node.depth, "store released");
                    removed.push(node);
                }
            }
        }
        // Root state may own participants holding handles into other trees.
        drop(removed);
    }
}

struct HandleInner {
    arena: Arc<StoreArena>,
    id: StoreId,
    depth: usize,
}

impl Drop for HandleInner {
    fn drop(&mut self) {
        self.arena.release(self.id);
    }
}

/// Handle to one node of a store tree.
///
/// Cloning a handle is cheap and refers to the same node.
#[derive(Clone)]
pub struct StoreHandle {
    inner: Arc<HandleInner>,
}

impl StoreHandle {
    /// Create the root of a new tree, bound to `bound`.
    pub(crate) fn new_root(bound: Context) -> Self {
        let id = Ulid::new();
        let state = RootState {
            bound,
            participants: Mutex::new(Vec::new()),
            finalize: Mutex::new(()),
            scratch: RwLock::new(HashMap::new()),
        };
        let mut nodes = HashMap::new();
        nodes.insert(
            id,
            StoreNode {
                kind: NodeKind::Root(Arc::new(state)),
                depth: 0,
                refs: 1,
            },
        );
        tracing::debug!(store = %id, "root store created");
        Self {
            inner: Arc::new(HandleInner {
                arena: Arc::new(StoreArena {
                    nodes: RwLock::new(nodes),
                }),
                id,
                depth: 0,
            }),
        }
    }

    /// Create a child of this node.
    pub fn child(&self) -> Self {
        let id = Ulid::new();
        let depth = self.inner.depth + 1;
        {
            let mut nodes = self.inner.arena.nodes.write();
            if let Some(parent) = nodes.get_mut(&self.inner.id) {
                parent.refs += 1;
            }
            nodes.insert(
                id,
                StoreNode {
                    kind: NodeKind::Child {
                        parent: self.inner.id,
                    },
                    depth,
                    refs: 1,
                },
            );
        }
        tracing::debug!(store = %id, parent = %self.inner.id, depth, "child store created");
        Self {
            inner: Arc::new(HandleInner {
                arena: self.inner.arena.clone(),
                id,
                depth,
            }),
        }
    }

    /// This node's identifier.
    pub fn id(&self) -> StoreId {
        self.inner.id
    }

    /// Identifier of the tree's root.
    pub fn root_id(&self) -> StoreId {
        let nodes = self.inner.arena.nodes.read();
        let mut current = self.inner.id;
        while let NodeKind::Child { parent } = &nodes[&current].kind {
            current = *parent;
        }
        current
    }

    /// Distance from the root; the root has depth 0.
    pub fn depth(&self) -> usize {
        self.inner.depth
    }

    /// Check if this node is the root of its tree.
    pub fn is_root(&self) -> bool {
        self.inner.depth == 0
    }

    /// Number of nodes currently alive in this tree.
    pub fn tree_size(&self) -> usize {
        self.inner.arena.nodes.read().len()
    }

    /// Context the tree's root was created against.
    pub fn bound_context(&self) -> Context {
        self.root().bound.clone()
    }

    fn root(&self) -> Arc<RootState> {
        self.inner.arena.resolve(self.inner.id).1
    }

    /// Append participants to the root, preserving order.
    pub fn add(&self, participants: impl IntoIterator<Item = Arc<dyn Participant>>) {
        let root = self.root();
        let mut list = root.participants.lock();
        let before = list.len();
        list.extend(participants);
        tracing::debug!(
            store = %self.inner.id,
            added = list.len() - before,
            total = list.len(),
            "participants registered"
        );
    }

    /// Participants currently registered at the root.
    pub fn participant_count(&self) -> usize {
        self.root().participants.lock().len()
    }

    /// Commit every participant in registration order, stopping at the first failure.
    ///
    /// Does nothing on a non-root node. On success the committed participants are removed,
    /// so a second commit is a no-op. Passes over one root are serialized; calling `commit`
    /// or `rollback` on the same root from inside a participant deadlocks.
    pub fn commit(&self, ctx: &Context) -> ScopeResult<()> {
        let (is_root, root) = self.inner.arena.resolve(self.inner.id);
        if !is_root {
            return Ok(());
        }

        let _finalizing = root.finalize.lock();
        let pending = root.participants.lock().clone();
        tracing::debug!(store = %self.inner.id, participants = pending.len(), "commit started");
        for (position, participant) in pending.iter().enumerate() {
            if let Err(source) = participant.commit(ctx) {
                tracing::warn!(
                    store = %self.inner.id,
                    position,
                    error = %source,
                    "participant commit failed"
                );
                return Err(ScopeError::Commit { position, source });
            }
        }

        drain_front(&root, pending.len());
        tracing::debug!(store = %self.inner.id, "commit finished");
        Ok(())
    }

    /// Roll back every participant in registration order, collecting all failures.
    ///
    /// Does nothing on a non-root node. The visited participants are removed whatever the
    /// outcome, so a second rollback is a no-op. Serialized with `commit` on the same root.
    pub fn rollback(&self, ctx: &Context) -> ScopeResult<()> {
        let (is_root, root) = self.inner.arena.resolve(self.inner.id);
        if !is_root {
            return Ok(());
        }

        let _finalizing = root.finalize.lock();
        let pending = root.participants.lock().clone();
        tracing::debug!(store = %self.inner.id, participants = pending.len(), "rollback started");
        let mut failures = Vec::new();
        for (position, participant) in pending.iter().enumerate() {
            if let Err(error) = participant.rollback(ctx) {
                tracing::warn!(
                    store = %self.inner.id,
                    position,
                    error = %error,
                    "participant rollback failed"
                );
                failures.push(RollbackFailure { position, error });
            }
        }

        drain_front(&root, pending.len());
        if failures.is_empty() {
            tracing::debug!(store = %self.inner.id, "rollback finished");
            Ok(())
        } else {
            Err(RollbackErrors::new(failures).into())
        }
    }

    /// Look up a scratch value stored at the root.
    pub fn get_value<K, V>(&self, key: K) -> Option<V>
    where
        K: OpaqueKey,
        V: Clone + Send + Sync + 'static,
    {
        let root = self.root();
        let scratch = root.scratch.read();
        scratch
            .get(&AnyKey::slot::<K, V>(key))
            .and_then(|value| value.downcast_ref::<V>())
            .cloned()
    }

    /// Store a scratch value at the root, replacing any previous one.
    pub fn set_value<K, V>(&self, key: K, value: V)
    where
        K: OpaqueKey,
        V: Clone + Send + Sync + 'static,
    {
        let root = self.root();
        root.scratch
            .write()
            .insert(AnyKey::slot::<K, V>(key), Arc::new(value));
    }

    /// Return the stored value, storing `value` first if the key is absent.
    ///
    /// The boolean is `true` when the value was already present. The check and the store
    /// happen under one write lock, so concurrent callers see exactly one winner.
    pub fn get_value_or_store<K, V>(&self, key: K, value: V) -> (V, bool)
    where
        K: OpaqueKey,
        V: Clone + Send + Sync + 'static,
    {
        let root = self.root();
        let mut scratch = root.scratch.write();
        let slot = AnyKey::slot::<K, V>(key);
        if let Some(existing) = scratch.get(&slot).and_then(|v| v.downcast_ref::<V>()) {
            return (existing.clone(), true);
        }
        scratch.insert(slot, Arc::new(value.clone()));
        (value, false)
    }
}

/// Remove the first `count` participants, keeping any registered while they ran.
///
/// Callers hold the root's finalize lock, so the first `count` entries are the ones visited.
fn drain_front(root: &RootState, count: usize) {
    let drained: Vec<_> = {
        let mut list = root.participants.lock();
        let count = count.min(list.len());
        list.drain(..count).collect()
    };
    drop(drained);
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("id", &self.inner.id)
            .field("depth", &self.inner.depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transaction::participant::CallbackParticipant;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting(counter: &Arc<AtomicUsize>) -> Arc<dyn Participant> {
        let c = counter.clone();
        Arc::new(CallbackParticipant::new().on_commit(move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }))
    }

    #[test]
    fn test_root_and_children() {
        let root = StoreHandle::new_root(Context::background());
        let child = root.child();
        let grandchild = child.child();

        assert!(root.is_root());
        assert!(!child.is_root());
        assert_eq!(grandchild.depth(), 2);
        assert_eq!(grandchild.root_id(), root.id());
        assert_eq!(root.tree_size(), 3);
    }

    #[test]
    fn test_children_forward_to_root() {
        let root = StoreHandle::new_root(Context::background());
        let child = root.child().child();
        let commits = Arc::new(AtomicUsize::new(0));

        child.add([counting(&commits)]);
        assert_eq!(root.participant_count(), 1);

        // Non-root commit leaves the list untouched.
        child.commit(&Context::background()).unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 0);
        assert_eq!(root.participant_count(), 1);

        root.commit(&Context::background()).unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(child.participant_count(), 0);
    }

    #[test]
    fn test_nodes_released_when_handles_drop() {
        let root = StoreHandle::new_root(Context::background());
        let child = root.child();
        let grandchild = child.child();
        assert_eq!(root.tree_size(), 3);

        // The grandchild keeps its parent alive.
        drop(child);
        assert_eq!(root.tree_size(), 3);
        assert_eq!(grandchild.root_id(), root.id());

        drop(grandchild);
        assert_eq!(root.tree_size(), 1);
    }

    #[test]
    fn test_root_outlived_by_child() {
        let root = StoreHandle::new_root(Context::background());
        let child = root.child();
        let root_id = root.id();
        drop(root);

        child.set_value("k", 5u8);
        assert_eq!(child.get_value::<_, u8>("k"), Some(5));
        assert_eq!(child.root_id(), root_id);
        assert_eq!(child.tree_size(), 2);
    }

    #[test]
    fn test_scratch_slots_are_typed() {
        let root = StoreHandle::new_root(Context::background());
        root.set_value("n", 1u32);
        root.set_value("n", String::from("one"));

        assert_eq!(root.get_value::<_, u32>("n"), Some(1));
        assert_eq!(root.get_value::<_, String>("n"), Some("one".to_string()));
        assert_eq!(root.get_value::<_, u64>("n"), None);
    }

    #[test]
    fn test_get_value_or_store() {
        let root = StoreHandle::new_root(Context::background());
        let child = root.child();

        assert_eq!(child.get_value_or_store("id", 10u32), (10, false));
        assert_eq!(root.get_value_or_store("id", 20u32), (10, true));
        assert_eq!(root.get_value::<_, u32>("id"), Some(10));
    }

    #[test]
    fn test_participant_added_during_commit_stays_queued() {
        let root = StoreHandle::new_root(Context::background());
        let late = Arc::new(AtomicUsize::new(0));
        let reentrant = {
            let root = root.clone();
            let late = late.clone();
            CallbackParticipant::new().on_commit(move |_| {
                root.add([counting(&late)]);
                Ok(())
            })
        };
        root.add([Arc::new(reentrant) as Arc<dyn Participant>]);

        root.commit(&Context::background()).unwrap();
        assert_eq!(root.participant_count(), 1);
        assert_eq!(late.load(Ordering::SeqCst), 0);

        root.commit(&Context::background()).unwrap();
        assert_eq!(late.load(Ordering::SeqCst), 1);
        assert_eq!(root.participant_count(), 0);
    }
}
