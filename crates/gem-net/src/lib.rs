//! Request pipeline, scheme transports, Guppy UDP sessions and mime
//! filter hooks for the gem browser engine.
//!
//! [`GmRequest`] is the centerpiece: one state machine per in-flight
//! request, dispatched by scheme to the transports in [`transport`] (or
//! [`guppy`] for `guppy:` URLs), with its body optionally rewritten by
//! a [`filters::MimeHooks`] registry before the **finished** signal
//! fires.

#![doc(html_root_url = "https://docs.rs/gem-net/2.0.0")]

pub mod error;
pub mod filters;
pub mod guppy;
pub mod request;
pub mod transport;

pub use error::{NetError, NetResult};
pub use request::{GmRequest, RequestContext, ResponseFilter};
