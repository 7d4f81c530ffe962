//! Scope operations over a [`Context`].
//!
//! These are the functions application code calls. Every one of them is safe to call on a
//! context that carries no scope: mutations are dropped and lookups find nothing.

use std::sync::Arc;

use crate::transaction::context::Context;
use crate::transaction::error::{ScopeError, ScopeResult};
use crate::transaction::key::OpaqueKey;
use crate::transaction::participant::Participant;
use crate::transaction::store::StoreHandle;

pub use crate::transaction::participant::{on_commit, on_rollback};

/// Begin a scope.
///
/// If `ctx` already carries a store, the returned context carries a new child of it.
/// Otherwise it carries the root of a new tree bound to `ctx`. `ctx` itself is unchanged.
pub fn begin(ctx: &Context) -> Context {
    match ctx.store() {
        Some(store) => ctx.with_store(store.child()),
        None => ctx.with_store(StoreHandle::new_root(ctx.clone())),
    }
}

/// Register a participant with the root of the scope bound to `ctx`.
pub fn add<P: Participant + 'static>(ctx: &Context, participant: P) {
    add_all(ctx, [Arc::new(participant) as Arc<dyn Participant>]);
}

/// Register several participants, preserving their order.
pub fn add_all<I>(ctx: &Context, participants: I)
where
    I: IntoIterator<Item = Arc<dyn Participant>>,
{
    if let Some(store) = ctx.store() {
        store.add(participants);
    }
}

/// Commit the scope bound to `ctx`.
///
/// Only a root scope commits; nested scopes return `Ok(())` and leave the participants to
/// the outermost caller.
pub fn commit(ctx: &Context) -> ScopeResult<()> {
    match ctx.store() {
        Some(store) => store.commit(ctx),
        None => Ok(()),
    }
}

/// Roll back the scope bound to `ctx`.
///
/// Only a root scope rolls back; nested scopes return `Ok(())`.
pub fn rollback(ctx: &Context) -> ScopeResult<()> {
    match ctx.store() {
        Some(store) => store.rollback(ctx),
        None => Ok(()),
    }
}

/// Look up a scratch value shared by the whole scope tree.
pub fn get_value<K, V>(ctx: &Context, key: K) -> Option<V>
where
    K: OpaqueKey,
    V: Clone + Send + Sync + 'static,
{
    ctx.store().and_then(|store| store.get_value(key))
}

/// Return the stored scratch value, storing `value` first if the key is absent.
///
/// Returns `None` outside a scope; otherwise the value and whether it was already present.
pub fn get_value_or_store<K, V>(ctx: &Context, key: K, value: V) -> Option<(V, bool)>
where
    K: OpaqueKey,
    V: Clone + Send + Sync + 'static,
{
    ctx.store()
        .map(|store| store.get_value_or_store(key, value))
}

/// Store a scratch value shared by the whole scope tree.
pub fn set_value<K, V>(ctx: &Context, key: K, value: V)
where
    K: OpaqueKey,
    V: Clone + Send + Sync + 'static,
{
    if let Some(store) = ctx.store() {
        store.set_value(key, value);
    }
}

/// Check if `ctx` carries a scope.
pub fn is_tx_context(ctx: &Context) -> bool {
    ctx.is_tx_context()
}

/// Number of participants waiting at the root of the scope bound to `ctx`.
pub fn participant_count(ctx: &Context) -> usize {
    ctx.store().map_or(0, StoreHandle::participant_count)
}

/// Run `f` in a new scope, committing on `Ok` and rolling back on `Err`.
///
/// Nested inside another scope this only layers a child: the outermost scope still decides.
/// If committing a root scope fails, the scope is rolled back and the commit error returned.
/// Rollback failures are logged; the error from `f` or from the commit is what the caller sees.
pub fn run_in_scope<F, T, E>(ctx: &Context, f: F) -> Result<T, E>
where
    F: FnOnce(&Context) -> Result<T, E>,
    E: From<ScopeError>,
{
    let scoped = begin(ctx);

    match f(&scoped) {
        Ok(result) => {
            if let Err(e) = commit(&scoped) {
                if let Err(rollback_err) = rollback(&scoped) {
                    tracing::warn!(error = %rollback_err, "rollback after failed commit failed");
                }
                return Err(e.into());
            }
            Ok(result)
        }
        Err(e) => {
            if let Err(rollback_err) = rollback(&scoped) {
                tracing::warn!(error = %rollback_err, "rollback after failed scope failed");
            }
            Err(e)
        }
    }
}
