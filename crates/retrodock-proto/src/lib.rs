//! Control-channel wire protocol.
//!
//! Every message on the socket is `[u32 little-endian length][UTF-8 JSON]`.
//! Requests carry a `"request"` discriminator, replies a `"reply"`
//! discriminator. The codec never assumes a frame arrives in one read; the
//! [`framing::ControlFramer`] buffers partial reads and surfaces complete
//! messages only.

pub mod codec;
pub mod error;
pub mod framing;
pub mod messages;

pub use codec::{LEN_PREFIX, MAX_FRAME, encode_frame, try_decode_frame, try_decode_frames};
pub use error::ProtoError;
pub use framing::ControlFramer;
pub use messages::{ControlReply, ControlRequest, VideoInfo};
