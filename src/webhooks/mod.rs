//! GitHub webhook handling.
//!
//! - Signature verification (HMAC-SHA256)
//! - Parsing of check run button presses into deploy signals

pub mod check_run;
pub mod signature;

pub use check_run::{ActionSignal, ParseError, RequestedActionEvent, parse_webhook};
pub use signature::{
    compute_signature, format_signature_header, parse_signature_header, verify_signature,
};
