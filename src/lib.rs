pub mod cancel;
pub mod config;
pub mod inference;
pub mod pipeline;
pub mod warehouse;
pub mod workers;
