//! Frame-ingress transports. Each adapter is a thin loop that decodes one
//! transport's framing into a `PixelFrame` and hands it to the Mailbox —
//! none of them touch the Arbiter, the Pattern Runner, or the hardware.

pub mod ble;
pub mod datagram;
pub mod pipe;

use crate::frame::{PixelFrame, Rgb};

/// 4-byte magic every ingress transport's frame header starts with:
/// `L E D F`.
pub const MAGIC: [u8; 4] = *b"LEDF";

#[derive(Debug)]
pub struct IngressError(pub String);

impl std::fmt::Display for IngressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ingress error: {}", self.0)
    }
}

impl std::error::Error for IngressError {}

/// Decode `width`/`height` (big-endian u16 each) followed by `width*height*3`
/// raw RGB bytes into a `PixelFrame`. Shared by every transport since they
/// all carry the same payload shape after their own envelope is stripped.
pub fn decode_frame(width: usize, height: usize, body: &[u8]) -> Result<PixelFrame, IngressError> {
    let expected = width
        .checked_mul(height)
        .and_then(|n| n.checked_mul(3))
        .ok_or_else(|| IngressError("frame dimensions overflow".into()))?;
    if body.len() != expected {
        return Err(IngressError(format!(
            "expected {} payload bytes for {}x{}, got {}",
            expected,
            width,
            height,
            body.len()
        )));
    }

    let mut pixels: Vec<Rgb> = Vec::with_capacity(width * height);
    for chunk in body.chunks_exact(3) {
        pixels.push((chunk[0], chunk[1], chunk[2]));
    }
    Ok(PixelFrame::new(width, height, pixels))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_matching_payload() {
        let body = vec![1, 2, 3, 4, 5, 6];
        let frame = decode_frame(2, 1, &body).unwrap();
        assert_eq!(frame.dimensions(), (2, 1));
        assert_eq!(frame.pixel(0), (1, 2, 3));
        assert_eq!(frame.pixel(1), (4, 5, 6));
    }

    #[test]
    fn rejects_short_payload() {
        let body = vec![1, 2, 3];
        assert!(decode_frame(2, 1, &body).is_err());
    }
}
