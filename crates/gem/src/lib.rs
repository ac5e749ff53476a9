//! Facade crate for the `gem` Gemini-family browser engine.
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use gem::{GmRequest, RequestContext};
//! use std::sync::Arc;
//!
//! # async fn run(ctx: Arc<RequestContext>) -> gem::Result<()> {
//! let req = GmRequest::new(ctx);
//! req.set_url("gemini://gemini.circumlunar.space/")?;
//! req.submit().await?;
//! let body = req.lock_response().body.clone();
//! println!("{} bytes", body.len());
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - `default` (`rustls`) - Use rustls for TLS (recommended)
//! - `native-tls` - Use the platform's native TLS stack instead
//! - `identity-gen` - Enable self-signed client-certificate generation
//!   in [`store::identity`]
//! - `fonts` - Pull in the font-pack registry ([`fonts`])
//! - `full` - Enable every optional subsystem

#![doc(html_root_url = "https://docs.rs/gem/2.0.0")]

// Re-export core types (URL, data model, status codes, errors).
pub use gem_core::*;

// Re-export the request pipeline, transports and filter hooks.
pub use gem_net::{filters, guppy, request, transport};
pub use gem_net::{GmRequest, NetError, NetResult, RequestContext, ResponseFilter};

// Re-export the persistent stores under one `store` namespace so
// callers write `gem::store::bookmarks::Bookmarks` rather than
// depending on `gem-store` directly.
pub mod store {
    pub use gem_store::*;
}

// Re-export the font-pack registry if enabled.
#[cfg(feature = "fonts")]
pub use gem_fonts as fonts;

// Re-export the async runtime and serialization crates so downstream
// crates don't need to redeclare matching versions.
pub use serde;
pub use serde_json;
pub use tokio;
