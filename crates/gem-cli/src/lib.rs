//! # gem-cli
//!
//! Command-line client for the `gem` Gemini-family browser engine.
//!
//! ## Features
//!
//! - **Fetch**: resolve any supported scheme (`gemini:`, `titan:`,
//!   `gopher:`, `finger:`, `spartan:`, `guppy:`, `about:`, `file:`,
//!   `data:`) and print or save the response
//! - **Bookmarks**: add, remove, list, import/export
//! - **Identities**: generate, list, sign in/out of a URL prefix
//! - **Trust**: list and forget TOFU entries
//! - **Feeds**: poll subscribed bookmarks and list unread entries
//! - **Fonts**: discover and list installed font packs
//! - **Export/import**: bundle the whole profile into one zip

pub mod cli;
pub mod config;
pub mod output;
pub mod services;

pub use cli::run;
