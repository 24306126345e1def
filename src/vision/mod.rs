pub mod controller;
pub mod link_worker;
pub mod messages;

pub use controller::VisionLink;
pub use messages::{LinkEvent, LinkStatus, OutboundMessage, VisionSample};
