mod common;
mod coupon;
mod event;
mod order;
mod schedule;
mod ticket_tier;
mod user;

pub use common::*;
pub use coupon::*;
pub use event::*;
pub use order::*;
pub use schedule::*;
pub use ticket_tier::*;
pub use user::*;
