//! HTTP ingress: external clients POST messages that are sent through a bot.
//!
//! Single route-less server: every request goes through decode, access check and one send
//! attempt. See `decode` for the accepted encodings.

mod decode;
mod handler;
mod server;

pub use decode::{
    decode_request, path_destination, BodyEncoding, DecodeError, DecodedRequest, MAX_BODY_BYTES,
};
pub use handler::{ingress, IngressState};
pub use server::{router, run_http_server, serve, GRACEFUL_SHUTDOWN};
