pub mod controller;
pub mod state;

pub use controller::SessionController;
pub use state::{SessionSnapshot, SessionState, SessionStatus};
