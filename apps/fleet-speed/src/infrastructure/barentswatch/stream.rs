//! Live AIS Stream Transport
//!
//! Opens the BarentsWatch streaming endpoint and re-frames the chunked
//! response body into newline-delimited frames.

use std::fmt;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures::stream::{self, BoxStream, Stream, StreamExt};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use tokio_util::codec::{AnyDelimiterCodec, AnyDelimiterCodecError, Decoder};

use crate::application::ports::{AccessToken, ConnectionError, FeedTransport, FrameStream};
use crate::infrastructure::metrics;

/// Default BarentsWatch live AIS endpoint.
pub const DEFAULT_STREAM_URL: &str = "https://live.ais.barentswatch.no/v1/ais";

/// Default maximum frame length in bytes.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 8192;

/// Longest response body kept in error messages.
const MAX_ERROR_BODY: usize = 512;

/// Message classes requested from the feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AisFilter {
    /// Let the provider thin out position reports.
    pub downsample: bool,
    /// Position reports.
    #[serde(rename = "includePosition")]
    pub include_position: bool,
    /// Static vessel data.
    #[serde(rename = "includeStatic")]
    pub include_static: bool,
    /// Aid-to-navigation reports.
    #[serde(rename = "includeAton")]
    pub include_aton: bool,
    /// Safety-related broadcasts.
    #[serde(rename = "includeSafetyRelated")]
    pub include_safety_related: bool,
    /// Meteorological and hydrological binary broadcasts.
    #[serde(rename = "includeBinaryBroadcastMetHyd")]
    pub include_binary_broadcast: bool,
}

impl Default for AisFilter {
    fn default() -> Self {
        Self {
            downsample: false,
            include_position: true,
            include_static: true,
            include_aton: false,
            include_safety_related: false,
            include_binary_broadcast: false,
        }
    }
}

/// HTTP streaming transport for the live AIS feed.
#[derive(Debug, Clone)]
pub struct BarentswatchTransport {
    client: Client,
    stream_url: String,
    filter: AisFilter,
    max_frame_bytes: usize,
}

impl BarentswatchTransport {
    /// Create a transport for `stream_url`.
    #[must_use]
    pub fn new(client: Client, stream_url: impl Into<String>) -> Self {
        Self {
            client,
            stream_url: stream_url.into(),
            filter: AisFilter::default(),
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
        }
    }

    /// Override the message filter.
    #[must_use]
    pub const fn with_filter(mut self, filter: AisFilter) -> Self {
        self.filter = filter;
        self
    }

    /// Override the maximum frame length.
    #[must_use]
    pub const fn with_max_frame_bytes(mut self, max_frame_bytes: usize) -> Self {
        self.max_frame_bytes = max_frame_bytes;
        self
    }
}

#[async_trait]
impl FeedTransport for BarentswatchTransport {
    async fn open(&self, token: &AccessToken) -> Result<FrameStream, ConnectionError> {
        let response = self
            .client
            .post(&self.stream_url)
            .bearer_auth(token.secret())
            .json(&self.filter)
            .send()
            .await
            .map_err(|e| ConnectionError::Connect(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(ConnectionError::Unauthorized {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let mut body = response.text().await.unwrap_or_default();
            if body.len() > MAX_ERROR_BODY {
                let mut end = MAX_ERROR_BODY;
                while !body.is_char_boundary(end) {
                    end -= 1;
                }
                body.truncate(end);
            }
            return Err(ConnectionError::Http {
                status: status.as_u16(),
                body,
            });
        }

        tracing::debug!(url = %self.stream_url, "Stream session opened");
        Ok(line_frames(response.bytes_stream(), self.max_frame_bytes))
    }
}

// =============================================================================
// Line Framing
// =============================================================================

/// Split a chunked body into lines of at most `max_frame_bytes`.
///
/// Longer lines are discarded up to the next newline and counted; the
/// stream continues with the following line. Lines that are not valid UTF-8
/// are passed on with replacement characters, so they fail decoding rather
/// than the session. A trailing line without a newline is emitted when the
/// body ends.
pub fn line_frames<S, E>(body: S, max_frame_bytes: usize) -> FrameStream
where
    S: Stream<Item = Result<Bytes, E>> + Send + 'static,
    E: fmt::Display + Send + 'static,
{
    let framer = LineFramer {
        body: body.boxed(),
        buffer: BytesMut::new(),
        codec: AnyDelimiterCodec::new_with_max_length(b"\n".to_vec(), Vec::new(), max_frame_bytes),
        eof: false,
    };
    stream::unfold(framer, |mut framer| async move {
        framer.next_frame().await.map(|frame| (frame, framer))
    })
    .boxed()
}

struct LineFramer<E> {
    body: BoxStream<'static, Result<Bytes, E>>,
    buffer: BytesMut,
    codec: AnyDelimiterCodec,
    eof: bool,
}

impl<E: fmt::Display> LineFramer<E> {
    async fn next_frame(&mut self) -> Option<Result<String, ConnectionError>> {
        loop {
            let decoded = if self.eof {
                self.codec.decode_eof(&mut self.buffer)
            } else {
                self.codec.decode(&mut self.buffer)
            };

            match decoded {
                Ok(Some(line)) => return Some(Ok(to_text(&line))),
                Ok(None) if self.eof => return None,
                Ok(None) => {}
                Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => {
                    metrics::record_oversized_frame();
                    tracing::debug!(
                        max_bytes = self.codec.max_length(),
                        "Skipping oversized frame"
                    );
                    continue;
                }
                Err(AnyDelimiterCodecError::Io(e)) => {
                    return Some(Err(ConnectionError::Transport(e.to_string())));
                }
            }

            match self.body.next().await {
                Some(Ok(chunk)) => self.buffer.extend_from_slice(&chunk),
                Some(Err(e)) => return Some(Err(ConnectionError::Transport(e.to_string()))),
                None => self.eof = true,
            }
        }
    }
}

/// Strip a trailing `\r` and decode, replacing invalid UTF-8.
fn to_text(line: &[u8]) -> String {
    let line = line.strip_suffix(b"\r").unwrap_or(line);
    String::from_utf8_lossy(line).into_owned()
}
