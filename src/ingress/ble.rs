//! BLE chunk reassembly. The Bluetooth stack itself is out of scope here;
//! this reassembles sequence-numbered chunks delivered over anything
//! implementing `AsyncRead` into one frame, so it can be driven by a real
//! BLE characteristic stream or, in tests, an in-memory buffer.
//!
//! Chunk wire format: `flags: u8` (bit 0 = last chunk), `seq: u8`,
//! `len: u16` big-endian, then `len` payload bytes. The first chunk's
//! payload begins with the usual `L E D F` + dimensions header; later
//! chunks are pure continuation bytes.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{decode_frame, IngressError, MAGIC};
use crate::arbiter::Arbiter;
use crate::mailbox::Mailbox;

const HEADER_LEN: usize = MAGIC.len() + 4;

/// Pure reassembly state machine, independent of how chunks arrive.
#[derive(Default)]
struct ChunkReassembler {
    expected_seq: u8,
    buf: Vec<u8>,
}

impl ChunkReassembler {
    /// Feed one chunk. Returns `Some(complete_frame_bytes)` once the
    /// `last` flag is seen. A sequence gap resets the in-progress frame and
    /// reports an error; the caller should keep reading for the next start.
    fn feed(&mut self, seq: u8, last: bool, payload: &[u8]) -> Result<Option<Vec<u8>>, IngressError> {
        if seq != self.expected_seq {
            self.buf.clear();
            self.expected_seq = 0;
            return Err(IngressError(format!(
                "chunk sequence gap: expected {}, got {}",
                self.expected_seq, seq
            )));
        }

        self.buf.extend_from_slice(payload);
        self.expected_seq = self.expected_seq.wrapping_add(1);

        if last {
            let frame = std::mem::take(&mut self.buf);
            self.expected_seq = 0;
            Ok(Some(frame))
        } else {
            Ok(None)
        }
    }
}

fn decode_reassembled(frame_bytes: &[u8]) -> Result<crate::frame::PixelFrame, IngressError> {
    if frame_bytes.len() < HEADER_LEN {
        return Err(IngressError("reassembled frame shorter than header".into()));
    }
    if frame_bytes[..MAGIC.len()] != MAGIC {
        return Err(IngressError("bad magic in reassembled frame".into()));
    }
    let width = u16::from_be_bytes([frame_bytes[4], frame_bytes[5]]) as usize;
    let height = u16::from_be_bytes([frame_bytes[6], frame_bytes[7]]) as usize;
    decode_frame(width, height, &frame_bytes[HEADER_LEN..])
}

/// Drive the reassembler off any `AsyncRead` chunk source until `shutdown`
/// fires or the stream ends.
pub async fn run<R>(mut reader: R, mailbox: Arc<Mailbox>, arbiter: Arc<Arbiter>, shutdown: CancellationToken)
where
    R: AsyncRead + Unpin,
{
    let mut reassembler = ChunkReassembler::default();

    loop {
        let mut prefix = [0u8; 4];
        let read_prefix = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = reader.read_exact(&mut prefix) => result,
        };
        if read_prefix.is_err() {
            break; // stream closed
        }

        let flags = prefix[0];
        let seq = prefix[1];
        let len = u16::from_be_bytes([prefix[2], prefix[3]]) as usize;
        let mut payload = vec![0u8; len];
        if reader.read_exact(&mut payload).await.is_err() {
            break;
        }

        match reassembler.feed(seq, flags & 1 != 0, &payload) {
            Ok(Some(frame_bytes)) => match decode_reassembled(&frame_bytes) {
                Ok(frame) => {
                    let canvas = arbiter.snapshot().layout.canvas_size();
                    if let Err(e) = mailbox.submit(frame, canvas) {
                        debug!(?e, "BLE frame rejected by mailbox");
                    }
                }
                Err(e) => debug!(error = %e, "dropping malformed BLE frame"),
            },
            Ok(None) => {}
            Err(e) => warn!(error = %e, "BLE chunk reassembly error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reassembles_frame_across_three_chunks() {
        let mut full = Vec::new();
        full.extend_from_slice(&MAGIC);
        full.extend_from_slice(&1u16.to_be_bytes());
        full.extend_from_slice(&1u16.to_be_bytes());
        full.extend_from_slice(&[42, 43, 44]);

        let mut reassembler = ChunkReassembler::default();
        let (c1, c2, c3) = (&full[0..4], &full[4..8], &full[8..]);

        assert!(reassembler.feed(0, false, c1).unwrap().is_none());
        assert!(reassembler.feed(1, false, c2).unwrap().is_none());
        let result = reassembler.feed(2, true, c3).unwrap().unwrap();
        assert_eq!(result, full);
    }

    #[test]
    fn sequence_gap_resets_and_errors() {
        let mut reassembler = ChunkReassembler::default();
        reassembler.feed(0, false, &[1, 2, 3]).unwrap();
        let err = reassembler.feed(5, false, &[4, 5, 6]);
        assert!(err.is_err());
        // State reset: a fresh stream starting at 0 works again.
        assert!(reassembler.feed(0, true, &[9]).unwrap().is_some());
    }

    #[test]
    fn decode_reassembled_rejects_bad_magic() {
        let mut bytes = vec![0u8; HEADER_LEN];
        bytes[0] = b'X';
        assert!(decode_reassembled(&bytes).is_err());
    }
}
