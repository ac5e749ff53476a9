//! Per-scheme transports dispatched by [`crate::request::GmRequest`].

pub mod line;
pub mod local;
pub mod tls;
