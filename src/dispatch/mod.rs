//! Dispatch subsystem.
//!
//! # Data Flow
//! ```text
//! Sync call  → pool.rs (run on caller thread, runtime entered)
//! Async call → pool.rs (admitted? spawn : run on caller thread)
//!            → future.rs (ApiFuture handed back to the caller)
//! Every HTTP attempt
//!            → dispatcher.rs (global + per-host permits)
//!            → guard.rs (queued/running counts, released on drop)
//! ```
//!
//! # Design Decisions
//! - Connection reuse is left to the HTTP client; this layer only bounds
//!   concurrency and threads
//! - Overload degrades to caller-runs instead of dropping work

pub mod dispatcher;
pub mod future;
pub mod guard;
pub mod pool;

pub use dispatcher::Dispatcher;
pub use future::ApiFuture;
pub use pool::WorkerPool;
