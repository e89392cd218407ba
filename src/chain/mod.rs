//! Chain access layer
//!
//! Endpoint selection and failover, contract-binding cache, health checks,
//! and transaction submission. Every outbound call goes through the shared
//! rate limiter and the endpoint circuit breaker.

pub mod connector;
pub mod contracts;
pub mod gas;

pub use connector::{ChainClient, ChainConnector};
pub use gas::FeeStrategy;
