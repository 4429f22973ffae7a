//! Named-pipe (FIFO) ingress. Same `L E D F` + dimensions + payload framing
//! as the datagram transport, but read off a byte stream where one `read`
//! call may return less than a full frame (or more than one) — frames are
//! reassembled across calls from an accumulating buffer.

use std::sync::Arc;

use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{decode_frame, IngressError, MAGIC};
use crate::arbiter::Arbiter;
use crate::mailbox::Mailbox;

const HEADER_LEN: usize = MAGIC.len() + 4;

/// Accumulates bytes from the stream and extracts complete frames as they
/// become available. Pure, IO-free — the async loop owns the actual reads.
#[derive(Default)]
struct FrameStreamReader {
    buf: Vec<u8>,
}

impl FrameStreamReader {
    fn feed(&mut self, chunk: &[u8]) {
        self.buf.extend_from_slice(chunk);
    }

    /// Pull one complete frame off the front of the buffer, if available.
    fn try_extract(&mut self) -> Result<Option<(usize, usize, Vec<u8>)>, IngressError> {
        if self.buf.len() < HEADER_LEN {
            return Ok(None);
        }
        if self.buf[..MAGIC.len()] != MAGIC {
            // Resynchronize by dropping one byte and retrying from the next
            // offset rather than discarding the whole buffer.
            self.buf.remove(0);
            return Err(IngressError("lost frame sync, resynchronizing".into()));
        }

        let width = u16::from_be_bytes([self.buf[4], self.buf[5]]) as usize;
        let height = u16::from_be_bytes([self.buf[6], self.buf[7]]) as usize;
        let payload_len = match width.checked_mul(height).and_then(|n| n.checked_mul(3)) {
            Some(n) => n,
            None => return Err(IngressError("frame dimensions overflow".into())),
        };
        let total = HEADER_LEN + payload_len;
        if self.buf.len() < total {
            return Ok(None);
        }

        let frame_bytes: Vec<u8> = self.buf.drain(..total).collect();
        Ok(Some((width, height, frame_bytes[HEADER_LEN..].to_vec())))
    }
}

/// Open `path` as a byte stream and forward decoded frames to `mailbox`
/// until `shutdown` fires.
pub async fn run(path: String, mailbox: Arc<Mailbox>, arbiter: Arc<Arbiter>, shutdown: CancellationToken) {
    let mut file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) => {
            warn!(error = %e, path = %path, "failed to open pipe ingress");
            return;
        }
    };

    let mut reader = FrameStreamReader::default();
    let mut chunk = [0u8; 8192];

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = file.read(&mut chunk) => {
                let n = match result {
                    Ok(0) => break, // writer closed its end
                    Ok(n) => n,
                    Err(e) => {
                        warn!(error = %e, "pipe read failed");
                        break;
                    }
                };
                reader.feed(&chunk[..n]);

                loop {
                    match reader.try_extract() {
                        Ok(Some((width, height, body))) => match decode_frame(width, height, &body) {
                            Ok(frame) => {
                                let canvas = arbiter.snapshot().layout.canvas_size();
                                if let Err(e) = mailbox.submit(frame, canvas) {
                                    debug!(?e, "pipe frame rejected by mailbox");
                                }
                            }
                            Err(e) => debug!(error = %e, "dropping malformed pipe frame"),
                        },
                        Ok(None) => break,
                        Err(e) => {
                            debug!(error = %e, "pipe resync");
                            continue;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn framed(width: u16, height: u16, body: &[u8]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&MAGIC);
        p.extend_from_slice(&width.to_be_bytes());
        p.extend_from_slice(&height.to_be_bytes());
        p.extend_from_slice(body);
        p
    }

    #[test]
    fn extracts_frame_split_across_feeds() {
        let mut reader = FrameStreamReader::default();
        let body = vec![9u8; 1 * 1 * 3];
        let packet = framed(1, 1, &body);

        reader.feed(&packet[..5]);
        assert!(matches!(reader.try_extract(), Ok(None)));

        reader.feed(&packet[5..]);
        let (w, h, payload) = reader.try_extract().unwrap().unwrap();
        assert_eq!((w, h), (1, 1));
        assert_eq!(payload, body);
    }

    #[test]
    fn extracts_two_back_to_back_frames_from_one_feed() {
        let mut reader = FrameStreamReader::default();
        let a = framed(1, 1, &[1, 1, 1]);
        let b = framed(1, 1, &[2, 2, 2]);
        reader.feed(&[a, b].concat());

        let (_, _, p1) = reader.try_extract().unwrap().unwrap();
        assert_eq!(p1, vec![1, 1, 1]);
        let (_, _, p2) = reader.try_extract().unwrap().unwrap();
        assert_eq!(p2, vec![2, 2, 2]);
    }

    #[test]
    fn resyncs_after_garbage_prefix() {
        let mut reader = FrameStreamReader::default();
        let mut garbage = vec![0xAAu8; 3];
        garbage.extend_from_slice(&framed(1, 1, &[7, 7, 7]));
        reader.feed(&garbage);

        // Each bad byte triggers one resync error until MAGIC realigns.
        let mut resyncs = 0;
        loop {
            match reader.try_extract() {
                Ok(Some((_, _, payload))) => {
                    assert_eq!(payload, vec![7, 7, 7]);
                    break;
                }
                Err(_) => resyncs += 1,
                Ok(None) => panic!("ran out of buffered bytes before resyncing"),
            }
            assert!(resyncs < 10, "did not resynchronize");
        }
    }
}
