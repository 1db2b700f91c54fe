//! Discovery scoring over rows that were already loaded.
//!
//! Nothing here touches the database. Handlers fetch candidates, these
//! functions rank and group them.

pub mod availability;
pub mod horizons;
pub mod recommendations;
pub mod trending;

pub use availability::TierSummary;
pub use horizons::UpcomingBuckets;
pub use recommendations::{recommend, History, RECOMMENDATION_LIMIT};
pub use trending::{rank, Engagement, Ranked};
