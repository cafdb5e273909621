//! HintEval console: session reconciliation and answer-space elimination for
//! hint sequences, served over HTTP and WebSocket.

pub mod cache;
pub mod color;
pub mod config;
pub mod console;
pub mod domain;
pub mod elimination;
pub mod error;
pub mod metrics;
pub mod protocol;
pub mod reduction;
pub mod routes;
pub mod seeds;
pub mod service;
pub mod similarity;
pub mod snapshot;
pub mod sort;
pub mod telemetry;
pub mod util;
