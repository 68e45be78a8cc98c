//! Switchboard: streaming orchestration gateway.
//!
//! Authenticates a caller, enriches the prompt with UI-state context,
//! launches a run on an external agent runtime, and relays the run's
//! event stream to the caller as typed server-sent events while
//! extracting embedded UI-action directives from the generated text.
//!
//! # Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use switchboard::config::SwitchboardConfig;
//! use switchboard::runtime::HttpAgentRuntime;
//! use switchboard::server::{router, AppState};
//!
//! # fn example() -> switchboard::error::Result<()> {
//! let config = SwitchboardConfig::load(None)?;
//! let runtime = HttpAgentRuntime::new(config.upstream.base_url.clone());
//! let app = router(AppState {
//!     authenticator: Arc::new(switchboard::auth::JwtAuthenticator::new()),
//!     sessions: Arc::new(switchboard::session::MemorySessionStore::new()),
//!     runtime: Arc::new(runtime),
//!     config: Arc::new(config),
//! });
//! # let _ = app;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod knowledge;
pub mod relay;
pub mod runtime;
pub mod server;
pub mod session;
