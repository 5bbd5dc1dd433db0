pub mod events;
pub mod loader;
pub mod market;
pub mod pubsub;
pub mod controller;

pub use market::{DataFile, StockMarket};
pub use pubsub::{spawn_cleanup_task, Publisher, Subscriber, SubscriberSettings};
pub use controller::{ControlError, MarketController, ServiceInfo};
