use bytes::{Buf, BytesMut};

use crate::codec::try_decode_frame;
use crate::error::ProtoError;
use crate::messages::ControlRequest;

/// Receive-side framing helper:
/// - keeps an internal buffer (`BytesMut`) the socket reads into
/// - decodes as many complete requests as possible
/// - keeps the remaining partial bytes for the next read
///
/// Frames decode one at a time, so a malformed JSON body surfaces as an
/// in-stream error without losing the well-formed requests around it; its
/// frame is still consumed and the connection can carry on.
pub struct ControlFramer {
    buf: BytesMut,
}

impl ControlFramer {
    pub fn new(initial_capacity: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(initial_capacity),
        }
    }

    /// Mutable access to the internal buffer for socket reads
    /// (`socket.read_buf(framer.buf_mut()).await`).
    pub fn buf_mut(&mut self) -> &mut BytesMut {
        &mut self.buf
    }

    /// Decode every complete frame currently buffered, in arrival order. A
    /// frame with a malformed JSON body becomes an `Err` entry; the frames
    /// before and after it still come through.
    pub fn drain_requests(&mut self) -> Vec<Result<ControlRequest, ProtoError>> {
        let mut out = Vec::new();
        loop {
            let (parsed, consumed) = match try_decode_frame(&self.buf) {
                Ok(None) => break,
                Ok(Some((body, consumed))) => {
                    (serde_json::from_slice(body).map_err(ProtoError::Json), consumed)
                }
                Err(err) => {
                    // A corrupt prefix poisons everything buffered so far.
                    self.buf.clear();
                    out.push(Err(err));
                    break;
                }
            };
            self.buf.advance(consumed);
            out.push(parsed);
        }
        out
    }
}
