pub mod controller;
pub mod heartbeat;
pub mod manager;
pub mod observer;

pub use controller::controller_ws_handler;
pub use heartbeat::start_heartbeat;
pub use manager::{ConnectionRole, WsManager};
pub use observer::{observer_ws_handler, ObserverReply, ObserverRequest};
