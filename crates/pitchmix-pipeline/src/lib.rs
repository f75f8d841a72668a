// Library root: every pipeline stage is public so the binaries, the lookup
// crate and integration tests can drive them directly.

pub mod aggregate;
pub mod cluster;
pub mod config;
pub mod features;
pub mod identity;
pub mod metrics;
pub mod pipeline;
pub mod publish;
pub mod statcast;
