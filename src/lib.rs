//! Core library for the `volley` CLI.
//!
//! The [`engine`] module holds the load generator itself: a pool of virtual
//! users draining a shared work queue, an optional constant-rate throttle,
//! and an orchestrator that collects every result, publishes live progress
//! and runs the throughput/latency analysis once the run is over. The
//! remaining modules cover CLI arguments, configuration files and report
//! output for the `volley` binary; library APIs may evolve with it.
pub mod args;
pub mod config;
pub mod engine;
pub mod error;
pub mod report;
