//! Wire and domain types.
//!
//! # Data Flow
//! ```text
//! GET /users (JSON array)
//!     → user.rs (User, Address, Geo, Company; unknown fields ignored)
//!     → transform (pure projection)
//!     → summary.rs (UserSummary)
//!     → POST /posts (JSON object, snake_case keys)
//! ```
//!
//! # Design Decisions
//! - Types are created per call and never mutated after construction
//! - Missing JSON fields fall back to defaults instead of failing the decode

pub mod summary;
pub mod user;

pub use summary::UserSummary;
pub use user::{Address, Company, Geo, User};
