use serde::Serialize;

use crate::error::ProtoError;

/// Size of the little-endian length prefix.
pub const LEN_PREFIX: usize = 4;
/// Upper bound on a single JSON body. Control traffic is tiny; anything this
/// large is a corrupt prefix.
pub const MAX_FRAME: usize = 1024 * 1024;

/// Encode one message as `[u32-le length][JSON]`.
pub fn encode_frame<T: Serialize>(msg: &T) -> Result<Vec<u8>, ProtoError> {
    let body = serde_json::to_vec(msg)?;
    if body.len() > MAX_FRAME {
        return Err(ProtoError::FrameTooLarge(body.len()));
    }

    let mut out = Vec::with_capacity(LEN_PREFIX + body.len());
    out.extend_from_slice(&(body.len() as u32).to_le_bytes());
    out.extend_from_slice(&body);
    Ok(out)
}

/// Decode the first complete frame in the buffer.
///
/// Returns the raw JSON body plus the number of bytes it occupies, or `None`
/// when the buffer still ends inside a length prefix or body.
pub fn try_decode_frame(in_buf: &[u8]) -> Result<Option<(&[u8], usize)>, ProtoError> {
    if in_buf.len() < LEN_PREFIX {
        return Ok(None);
    }
    let len_bytes = &in_buf[..LEN_PREFIX];
    let body_len = u32::from_le_bytes(len_bytes.try_into().expect("slice length is 4")) as usize;

    if body_len == 0 {
        return Err(ProtoError::EmptyFrame);
    }
    if body_len > MAX_FRAME {
        return Err(ProtoError::FrameTooLarge(body_len));
    }

    let total = LEN_PREFIX + body_len;
    if in_buf.len() < total {
        return Ok(None);
    }
    Ok(Some((&in_buf[LEN_PREFIX..total], total)))
}

/// Decode as many complete frames as the buffer holds.
///
/// Returns the raw JSON bodies plus the number of bytes consumed; the caller
/// drops the consumed prefix and retries after the next read. A partial
/// length prefix or partial body simply stops the loop.
pub fn try_decode_frames(in_buf: &[u8]) -> Result<(Vec<&[u8]>, usize), ProtoError> {
    let mut bodies = Vec::new();
    let mut offset = 0usize;

    while let Some((body, consumed)) = try_decode_frame(&in_buf[offset..])? {
        bodies.push(body);
        offset += consumed;
    }

    Ok((bodies, offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messages::ControlRequest;

    #[test]
    fn encode_prefixes_body_length() {
        let frame = encode_frame(&ControlRequest::PlayEmu).unwrap();
        let len = u32::from_le_bytes(frame[..4].try_into().unwrap()) as usize;
        assert_eq!(len, frame.len() - 4);
        let body: ControlRequest = serde_json::from_slice(&frame[4..]).unwrap();
        assert_eq!(body, ControlRequest::PlayEmu);
    }

    #[test]
    fn decode_stops_at_partial_frames() {
        let frame = encode_frame(&ControlRequest::PauseEmu).unwrap();

        // Split mid-prefix: nothing decodable, nothing consumed.
        let (bodies, consumed) = try_decode_frames(&frame[..2]).unwrap();
        assert!(bodies.is_empty());
        assert_eq!(consumed, 0);

        // Split mid-body: still nothing.
        let (bodies, consumed) = try_decode_frames(&frame[..frame.len() - 3]).unwrap();
        assert!(bodies.is_empty());
        assert_eq!(consumed, 0);
    }

    #[test]
    fn decode_drains_back_to_back_frames() {
        let mut buf = encode_frame(&ControlRequest::PlayEmu).unwrap();
        buf.extend(encode_frame(&ControlRequest::KillEmu).unwrap());

        let (bodies, consumed) = try_decode_frames(&buf).unwrap();
        assert_eq!(bodies.len(), 2);
        assert_eq!(consumed, buf.len());
    }

    #[test]
    fn oversized_prefix_is_rejected() {
        let mut buf = Vec::new();
        buf.extend_from_slice(&(MAX_FRAME as u32 + 1).to_le_bytes());
        buf.extend_from_slice(b"{}");
        assert!(matches!(
            try_decode_frames(&buf),
            Err(ProtoError::FrameTooLarge(_))
        ));
    }
}
