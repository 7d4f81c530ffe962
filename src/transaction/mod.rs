//! Context-scoped transaction coordination.
//!
//! Independent pieces of code sharing one [`Context`] register participants (anything that
//! can commit or roll back) and scratch values. The outermost caller finalizes them all.
//! Nested scopes form a tree of stores; only the root holds state and every other node
//! forwards to it.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   LongTransactions                          │
//! │      (keyed roots that outlive the creating context)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//!  ┌─────────────┐       ┌─────────────┐       ┌─────────────┐
//!  │   Context   │──────▶│ StoreHandle │──────▶│ Participant │
//!  │ (values +   │       │ (arena node,│       │ (commit /   │
//!  │  store slot)│       │  root state)│       │  rollback)  │
//!  └─────────────┘       └─────────────┘       └─────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use txscope::transaction::{scope, Context};
//!
//! let ctx = scope::begin(&Context::background());
//! scope::add(&ctx, sql_tx);
//!
//! // Deeper code nests freely; its participants land on the same root.
//! let nested = scope::begin(&ctx);
//! scope::on_commit(&nested, |_| Ok(invalidate_cache()));
//! scope::commit(&nested)?;   // no-op: not the root
//!
//! scope::commit(&ctx)?;      // or scope::rollback(&ctx)?
//! ```

mod context;
mod error;
mod key;
mod participant;
mod policy;
mod registry;
pub mod scope;
mod store;

pub use context::Context;
pub use error::{BoxError, RollbackErrors, RollbackFailure, ScopeError, ScopeResult};
pub use key::OpaqueKey;
pub use participant::{on_commit, on_rollback, CallbackParticipant, Participant};
pub use policy::DuplicateKeyPolicy;
pub use registry::{LongTransactionInfo, LongTransactions, RegistryConfig};
pub use store::{StoreHandle, StoreId};
