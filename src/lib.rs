//! dashprobe
//!
//! Signs in through SSO, drives the embedded operations dashboards and reads
//! the latest ticket or the delivery success rate for a customer.

pub mod cli;
pub mod config;
pub mod logging;
pub mod login;
pub mod report;

pub use config::Config;
pub use login::{LoginError, SsoLogin};
pub use report::OutputFormat;
