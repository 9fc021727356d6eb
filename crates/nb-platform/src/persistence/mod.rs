//! Persistence Layer
//!
//! Transaction binding per logical scope, hook queues on entity instances,
//! and the save pipeline that ties them to the underlying writes.

pub mod hooks;
pub mod mysql;
pub mod save;
pub mod transaction;

pub use hooks::{HookOptions, HookPhase, Persistable, SaveHook, SaveHooks};
pub use mysql::{MySqlTransaction, MySqlTransactionSource};
pub use save::{EntityStore, EntityWrite, SaveOptions, SavePipeline, WriteTarget};
pub use transaction::{
    OpenTransaction, TransactionContext, TransactionGuard, TransactionHandle, TransactionSource,
};
