//! Log server lifecycle controller.
//!
//! Assembles the RPC pipeline of a log server, runs it until it is told to
//! stop, announces it in a coordination store and garbage-collects deleted
//! trees in the background.

// Core subsystems
pub mod config;
pub mod net;
pub mod rpc;
pub mod storage;

// Services
pub mod admin;
pub mod health;
pub mod http;
pub mod quota;

// Cross-cutting concerns
pub mod clock;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod observability;
pub mod registry;

pub use config::schema::ServerConfig;
pub use error::{BoxError, Error};
pub use lifecycle::{Main, Shutdown};
pub use registry::Registry;
pub use rpc::{RegisterServer, RpcServer};
