pub mod classify;
pub mod client;
pub mod config;
pub mod context;
pub mod diff;
pub mod error;
pub mod export;
pub mod paginate;
pub mod record;
pub mod sink;
pub mod value;
pub mod window;
