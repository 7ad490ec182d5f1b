//! Core types shared by the dynamock crates
//!
//! Wire-level error codes and request identifiers used by the protocol
//! front end and the server binary.

pub mod error;
pub mod request_id;

pub use error::{AwsError, ErrorCode};
pub use request_id::RequestId;
