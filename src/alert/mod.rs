pub mod assets;
pub mod player;
pub mod scheduler;

pub use assets::{AlertCategory, AssetCatalog};
pub use player::AlertPlayer;
pub use scheduler::{AlertScheduler, QueuedAlert, DEBOUNCE_DELAY};
