//! txscope - context-scoped unit of work coordination
//!
//! This crate lets code running under a shared [`Context`] register transactional
//! participants and scratch values, so that a single top-level caller can commit or roll
//! back all of them. Commit stops at the first failure; rollback visits every participant
//! and reports every failure.
//!
//! # Example
//!
//! ```
//! use txscope::{scope, CallbackParticipant, Context};
//!
//! let ctx = scope::begin(&Context::background());
//! scope::add(&ctx, CallbackParticipant::new().on_commit(|_| Ok(())));
//!
//! let nested = scope::begin(&ctx);
//! scope::set_value(&nested, "attempt", 1u32);
//! scope::commit(&nested).unwrap(); // nested scopes never finalize
//!
//! assert_eq!(scope::get_value::<_, u32>(&ctx, "attempt"), Some(1));
//! scope::commit(&ctx).unwrap();
//! ```

pub mod transaction;

pub use transaction::{
    on_commit, on_rollback, scope, BoxError, CallbackParticipant, Context, DuplicateKeyPolicy,
    LongTransactionInfo, LongTransactions, OpaqueKey, Participant, RegistryConfig,
    RollbackErrors, RollbackFailure, ScopeError, ScopeResult, StoreHandle, StoreId,
};
