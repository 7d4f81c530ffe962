//! Transaction participants.
//!
//! A participant is anything that can be committed or rolled back: a database transaction,
//! a pending message batch, a compensating HTTP call. The coordinator never looks inside one.

use crate::transaction::context::Context;
use crate::transaction::error::BoxError;
use crate::transaction::scope;

/// A unit of transactional work.
pub trait Participant: Send + Sync {
    /// Make the participant's effects permanent.
    fn commit(&self, ctx: &Context) -> Result<(), BoxError>;

    /// Discard the participant's effects.
    fn rollback(&self, ctx: &Context) -> Result<(), BoxError>;
}

type Callback = Box<dyn Fn(&Context) -> Result<(), BoxError> + Send + Sync>;

/// A participant built from optional commit and rollback callbacks.
///
/// A missing callback succeeds without doing anything.
#[derive(Default)]
pub struct CallbackParticipant {
    on_commit: Option<Callback>,
    on_rollback: Option<Callback>,
}

impl CallbackParticipant {
    /// A participant with no callbacks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the commit callback.
    pub fn on_commit<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_commit = Some(Box::new(callback));
        self
    }

    /// Set the rollback callback.
    pub fn on_rollback<F>(mut self, callback: F) -> Self
    where
        F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        self.on_rollback = Some(Box::new(callback));
        self
    }
}

impl Participant for CallbackParticipant {
    fn commit(&self, ctx: &Context) -> Result<(), BoxError> {
        match &self.on_commit {
            Some(callback) => callback(ctx),
            None => Ok(()),
        }
    }

    fn rollback(&self, ctx: &Context) -> Result<(), BoxError> {
        match &self.on_rollback {
            Some(callback) => callback(ctx),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for CallbackParticipant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackParticipant")
            .field("on_commit", &self.on_commit.is_some())
            .field("on_rollback", &self.on_rollback.is_some())
            .finish()
    }
}

/// Run `callback` when the scope bound to `ctx` commits.
///
/// Does nothing when `ctx` carries no scope.
pub fn on_commit<F>(ctx: &Context, callback: F)
where
    F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
{
    scope::add(ctx, CallbackParticipant::new().on_commit(callback));
}

/// Run `callback` when the scope bound to `ctx` rolls back.
///
/// Does nothing when `ctx` carries no scope.
pub fn on_rollback<F>(ctx: &Context, callback: F)
where
    F: Fn(&Context) -> Result<(), BoxError> + Send + Sync + 'static,
{
    scope::add(ctx, CallbackParticipant::new().on_rollback(callback));
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_empty_callbacks_succeed() {
        let ctx = Context::background();
        let participant = CallbackParticipant::new();
        assert!(participant.commit(&ctx).is_ok());
        assert!(participant.rollback(&ctx).is_ok());
    }

    #[test]
    fn test_callbacks_are_invoked_separately() {
        let commits = Arc::new(AtomicUsize::new(0));
        let rollbacks = Arc::new(AtomicUsize::new(0));
        let c = commits.clone();
        let r = rollbacks.clone();
        let participant = CallbackParticipant::new()
            .on_commit(move |_| {
                c.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .on_rollback(move |_| {
                r.fetch_add(1, Ordering::SeqCst);
                Err("compensation failed".into())
            });

        let ctx = Context::background();
        participant.commit(&ctx).unwrap();
        let err = participant.rollback(&ctx).unwrap_err();

        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(rollbacks.load(Ordering::SeqCst), 1);
        assert_eq!(err.to_string(), "compensation failed");
    }

    #[test]
    fn test_callback_sees_context_values() {
        let ctx = Context::background().with_value(17u32);
        let participant = CallbackParticipant::new().on_commit(|ctx| match ctx.value::<u32>() {
            Some(&17) => Ok(()),
            other => Err(format!("unexpected value {:?}", other).into()),
        });
        assert!(participant.commit(&ctx).is_ok());
    }

    #[test]
    fn test_sugar_registers_on_scope() {
        let ctx = scope::begin(&Context::background());
        let commits = Arc::new(AtomicUsize::new(0));
        let c = commits.clone();

        on_commit(&ctx, move |_| {
            c.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        on_rollback(&ctx, |_| Err("not expected".into()));
        assert_eq!(scope::participant_count(&ctx), 2);

        scope::commit(&ctx).unwrap();
        assert_eq!(commits.load(Ordering::SeqCst), 1);
        assert_eq!(scope::participant_count(&ctx), 0);
    }

    #[test]
    fn test_sugar_outside_scope_is_noop() {
        let ctx = Context::background();
        on_commit(&ctx, |_| Err("never registered".into()));
        assert!(scope::commit(&ctx).is_ok());
    }
}
