//! # Link Bridge Server
//!
//! The HTTP surface that connects a chat platform to a remote collaboration
//! service.
//!
//! ```text
//!   chat client ──► /links, /config, /graphql, /login ──► LinkManager / RemoteClient ──► remote
//!   remote ──► /notify/{channel_id} ──► RequestVerifier ──► NotificationSink
//! ```
//!
//! - Link handlers keep the team/channel relation through
//!   [`linkbridge_storage::LinkManager`]
//! - Inbound notifications are accepted only with a valid signature
//! - Outbound calls are signed and forward the client's application
//!   authorization through a length and character guard
//! - Configuration lives in one [`ConfigHolder`]; handlers take a snapshot
//!   per request and derive signers and verifiers from it
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use linkbridge_server::{AppState, BridgeConfig, ConfigHolder, build_router};
//! use linkbridge_storage::MemoryBackend;
//!
//! let config = BridgeConfig::from_json(
//!     r#"{ "remote_url": "https://remote.example", "signature": { "secret": "s" } }"#,
//! )?;
//! let state = AppState::builder()
//!     .config(ConfigHolder::new(config)?)
//!     .store(Arc::new(MemoryBackend::new()))
//!     .build()?;
//! let _router = build_router(state);
//! # Ok::<(), linkbridge_server::ServerError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod directory;
pub mod error;
pub mod headers;
pub mod remote;
pub mod routes;
pub mod sink;
pub mod state;
pub mod telemetry;

pub use config::{BridgeConfig, ConfigError, ConfigHolder, LogFormat, StoreSettings};
pub use directory::{DirectoryError, StaticDirectory, UserDirectory};
pub use error::{AppError, ServerError};
pub use headers::{HeaderCopyError, MAX_HEADER_LENGTH, safe_copy_header};
pub use remote::{RemoteClient, RemoteError, RemoteResponse};
pub use routes::{AuthenticatedUser, LinkRequest, build_router};
pub use sink::{LogSink, Notification, NotificationSink, SinkError};
pub use state::{AppState, SharedStore};
