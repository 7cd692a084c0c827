// ABOUTME: Roost gateway client library shared by the browser and mobile shells
// ABOUTME: One supervised connection, correlated RPC, session and config helpers

pub mod client;
pub mod config;
pub mod config_writer;
pub mod diagnostics;
pub mod dispatcher;
pub mod error;
pub mod models;
pub mod session;
pub mod supervisor;
pub mod testing;
pub mod transport;

pub use client::RoostClient;
pub use config::GatewayConfig;
pub use diagnostics::{mask_endpoint, DiagnosticsSnapshot};
pub use dispatcher::MethodCandidates;
pub use error::{GatewayError, Result};
pub use models::{ChatMessage, ContentBlock, GatewayEvent, GatewayStatus, RunRecord, SessionInfo};
pub use session::{ResolvedSession, ResolvedVia, SessionSelector};
pub use supervisor::ConnectionStatus;
