pub mod config;
pub mod error;
pub mod lifecycle;
pub mod notifier;
pub mod presence;
pub mod signin;
pub mod terminal;
