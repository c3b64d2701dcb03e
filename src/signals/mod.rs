//! Signal counting: dispatch of confirmed payments into project counters

pub mod counter;
pub mod dedup;
pub mod dispatch;

pub use counter::SignalCounter;
pub use dedup::DeliveryLedger;
pub use dispatch::{Dispatcher, Outcome};
