//! BarentsWatch Adapters
//!
//! Implementations of the feed ports for the BarentsWatch live AIS API:
//!
//! - `OauthTokenSource`: client-credentials grant at the identity endpoint
//! - `BarentswatchTransport`: long-lived HTTP stream of JSON lines
//! - `JsonFrameDecoder`: tagged JSON frame decoding

mod codec;
mod oauth;
mod stream;

pub use codec::JsonFrameDecoder;
pub use oauth::{AIS_SCOPE, ClientCredentials, DEFAULT_TOKEN_URL, OauthTokenSource};
pub use stream::{
    AisFilter, BarentswatchTransport, DEFAULT_MAX_FRAME_BYTES, DEFAULT_STREAM_URL, line_frames,
};
