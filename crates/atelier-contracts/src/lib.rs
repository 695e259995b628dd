pub mod config;
pub mod error;
pub mod payloads;
pub mod providers;
pub mod reference;
pub mod styles;
pub mod video;
