pub mod client;
#[cfg(test)]
pub mod fake;
pub mod gateway;
pub mod models;

pub use client::HttpGateway;
pub use gateway::{Command, CommandGateway, GatewayError, ServiceManager};
pub use models::GatewayConfig;
