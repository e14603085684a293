//! Wire layer of the controller/worker bridge.
//!
//! - **protocol**: message types for both directions of the channel
//! - **codec**: length-prefixed JSON framing over AsyncRead/AsyncWrite

pub mod codec;
pub mod protocol;
