//! Bridge controller and its observable state.
//!
//! - `controller` - the tick loop, link handling and sink recovery
//! - `state` - state machine values and the status published over `watch`

pub mod controller;
pub mod state;

pub use controller::{BridgeController, BridgeHandle};
pub use state::{BridgeState, BridgeStats, BridgeStatus, ConnectionState};
