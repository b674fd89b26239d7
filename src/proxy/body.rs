//! Replayable request body — buffered once, replayed per failover attempt
//!
//! The client body is read exactly once. A gzip body is decompressed
//! eagerly so a malformed stream is rejected before any upstream attempt,
//! and both forms are kept so each target can receive whichever one it
//! accepts.

use std::io::Read;

use bytes::Bytes;
use flate2::read::GzDecoder;

use crate::error::{GatewayError, Result};
use crate::target::Target;

const GZIP: &str = "gzip";

/// A client request body that can be forwarded to any number of targets
#[derive(Debug, Clone)]
pub struct ReplayableBody {
    /// Bytes exactly as the client sent them
    bytes: Bytes,
    /// The client's Content-Encoding, None for identity
    encoding: Option<String>,
    /// Decompressed form, present only when the encoding is gzip
    plain: Option<Bytes>,
}

impl ReplayableBody {
    /// Buffer the client body. Returns an error for a gzip body that does
    /// not decode; any other encoding is stored verbatim.
    pub fn materialize(bytes: Bytes, content_encoding: Option<&str>) -> Result<Self> {
        let encoding = content_encoding
            .map(str::to_string)
            .filter(|e| !e.is_empty());

        let plain = match encoding.as_deref() {
            Some(e) if e.eq_ignore_ascii_case(GZIP) => {
                let mut decoder = GzDecoder::new(bytes.as_ref());
                let mut out = Vec::new();
                decoder.read_to_end(&mut out).map_err(|e| {
                    GatewayError::InvalidBody(format!("malformed gzip body: {}", e))
                })?;
                Some(Bytes::from(out))
            }
            _ => None,
        };

        Ok(Self {
            bytes,
            encoding,
            plain,
        })
    }

    /// Whether the client sent a gzip body
    pub fn is_gzip(&self) -> bool {
        self.plain.is_some()
    }

    /// The client's Content-Encoding value, if any
    pub fn original_encoding(&self) -> Option<&str> {
        self.encoding.as_deref()
    }

    /// Body bytes and Content-Encoding header value for one target.
    ///
    /// A gzip body goes to a compression-supporting target unchanged and
    /// to any other target decompressed with the header dropped. The
    /// caller derives Content-Length from the returned bytes.
    pub fn for_target(&self, target: &Target) -> (Bytes, Option<&str>) {
        match &self.plain {
            Some(plain) if !target.supports_compression => (plain.clone(), None),
            _ => (self.bytes.clone(), self.encoding.as_deref()),
        }
    }
}
