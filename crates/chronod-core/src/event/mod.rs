//! Event bus for execution lifecycle events.

mod bus;

pub use bus::{EventBus, Subscription};
