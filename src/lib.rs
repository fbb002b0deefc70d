//! Live SvxLink / SvxReflector node table rebuilt from the producer's log and pushed to
//! websocket observers.

pub mod app;
pub mod cli;
pub mod config;
pub mod domain;
pub mod infra;
pub mod server;
