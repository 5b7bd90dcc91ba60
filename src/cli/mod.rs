pub mod app;
pub mod commands;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod env;
pub mod query;
pub mod runtime;
pub mod session;

pub use app::run;
