//! Length-delimited framing for worker reply channels.
//!
//! Wraps [`tokio_util::codec::LengthDelimitedCodec`] with a fixed maximum
//! frame size so that a misbehaving worker cannot make the supervisor
//! allocate unbounded memory for a single message.
//!
//! Each frame is a 4-byte big-endian length prefix followed by that many
//! payload bytes. Payloads are opaque; the channel never inspects them
//! beyond comparing the first frame against the readiness token.

use bytes::{Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec, LengthDelimitedCodecError};

use crate::{AppError, Result};

/// Maximum frame payload accepted in either direction: 1 MiB.
pub const MAX_FRAME_BYTES: usize = 1_048_576;

/// Frame codec shared by the supervisor endpoint and the worker client.
#[derive(Debug)]
pub struct FrameCodec(LengthDelimitedCodec);

impl FrameCodec {
    /// Create a new `FrameCodec` with the [`MAX_FRAME_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self(
            LengthDelimitedCodec::builder()
                .max_frame_length(MAX_FRAME_BYTES)
                .new_codec(),
        )
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for FrameCodec {
    type Item = BytesMut;
    type Error = AppError;

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` while the frame is still incomplete and
    /// `Err(AppError::Recv("frame too long: …"))` when the announced length
    /// exceeds [`MAX_FRAME_BYTES`].
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        self.0
            .decode(src)
            .map_err(|err| map_codec_error(&err, AppError::Recv))
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = AppError;

    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<()> {
        self.0
            .encode(item, dst)
            .map_err(|err| map_codec_error(&err, AppError::Send))
    }
}

/// Map a codec `io::Error` to an [`AppError`], singling out oversize frames.
fn map_codec_error(err: &std::io::Error, wrap: fn(String) -> AppError) -> AppError {
    let oversize = err
        .get_ref()
        .is_some_and(|inner| inner.is::<LengthDelimitedCodecError>());
    if oversize {
        wrap(format!("frame too long: exceeded {MAX_FRAME_BYTES} bytes"))
    } else {
        wrap(err.to_string())
    }
}
