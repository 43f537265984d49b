//! View models a UI binds to. Each one owns the local display state of one
//! screen element and goes through the query client for remote work.

pub mod auth;
pub mod post_stats;
pub mod profile;

pub use auth::AuthContext;
pub use post_stats::{PostStats, PostStatsController};
pub use profile::{FollowController, FollowState};
