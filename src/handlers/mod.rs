pub mod config;
pub mod flow;
pub mod webhook;

pub use config::*;
pub use flow::*;
pub use webhook::*;
