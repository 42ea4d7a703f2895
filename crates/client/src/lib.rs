#![warn(missing_docs)]
//! Client-side game session: optimistic action application, the local
//! action queue with conflict resolution, rollback snapshots, and the
//! message-driven session loop over any [`gridtown_net::Wire`].

pub mod apply;
pub mod queue;
pub mod rollback;
pub mod session;

pub use apply::ApplyError;
pub use queue::{ActionQueue, QueueDecision, ReleasedActions};
pub use rollback::{RollbackPoint, RollbackStack, ROLLBACK_DEPTH};
pub use session::Session;
