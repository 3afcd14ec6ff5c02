//! Bulk Campaign — personalized, paced message dispatch over a messaging session.

pub mod config;
pub mod dispatch;
pub mod error;
pub mod personalize;
pub mod recipients;
pub mod report;
pub mod server;
pub mod session;
