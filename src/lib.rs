// Silence warnings for crates used only in binaries or indirectly
#![allow(unused_crate_dependencies)]

pub mod geo;
pub mod middleware;
pub mod mode;
pub mod preview;
pub mod privilege;
pub mod server;
pub mod store;
pub mod telemetry;
pub mod tls;
pub mod topology;
pub mod utils;
pub mod viewer;

