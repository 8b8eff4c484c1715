//! Provider Integration
//!
//! Abstracted access to the turn and quota services through a common trait
//! interface.
//!
//! # Available Providers
//!
//! - **HTTP**: the companion service's JSON API
//!
//! # Usage
//!
//! ```ignore
//! use companion_core::backend::{HttpTurnProvider, TurnProvider, TurnRequest};
//!
//! let provider = HttpTurnProvider::new("https://api.example.com", timeout)?;
//! let request = TurnRequest::new(user_id, persona_id, "Hello!");
//! let response = provider.send_turn(&request).await?;
//! ```

mod http;
mod traits;

pub use http::{HttpQuotaProvider, HttpTurnProvider, DEFAULT_HTTP_TIMEOUT};
pub use traits::{QuotaProvider, RemoteQuota, TurnProvider, TurnRequest, TurnResponse};
