//! Live-mode passthrough: outbound forwarding and request correlation.

pub mod correlation;
pub mod forward;
