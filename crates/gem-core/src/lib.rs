//! Core types and traits shared across the gem browser-engine crates.
//!
//! This crate provides the foundational pieces used by the rest of the
//! workspace:
//!
//! - **URL**: Gemini-flavored URL parsing and canonicalization ([`GemUrl`])
//! - **Types**: Data model shared by the stores and the request pipeline
//! - **Errors**: Comprehensive error handling with [`Error`]
//!
//! # Example
//!
//! ```rust,ignore
//! use gem_core::{GemUrl, Result};
//!
//! fn root_of(url: &str) -> Result<String> {
//!     let url = GemUrl::parse(url)?;
//!     Ok(url.root())
//! }
//! ```

#![doc(html_root_url = "https://docs.rs/gem-core/2.0.0")]

mod error;
pub mod resources;
pub mod status;
pub mod types;
pub mod url;

pub use error::{Error, Result};
pub use status::GmStatusCode;
pub use types::*;
pub use url::GemUrl;
