pub mod duration;
pub mod manager;

pub use duration::parse_duration_secs;
pub use manager::PauseManager;
