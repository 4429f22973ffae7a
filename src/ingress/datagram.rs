//! UDP ingress: one packet per frame. Each datagram is `L E D F` + two
//! big-endian u16 dimensions + `width*height*3` raw RGB bytes.

use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{decode_frame, IngressError, MAGIC};
use crate::arbiter::Arbiter;
use crate::mailbox::Mailbox;

const HEADER_LEN: usize = MAGIC.len() + 4;
/// Large enough for the header plus any layout this crate is likely to
/// address over UDP; oversized datagrams are simply rejected rather than
/// reassembled (datagram ingress carries no fragmentation protocol).
const MAX_DATAGRAM: usize = 65_507;

fn parse_packet(packet: &[u8]) -> Result<(usize, usize, &[u8]), IngressError> {
    if packet.len() < HEADER_LEN {
        return Err(IngressError("datagram shorter than header".into()));
    }
    if packet[..MAGIC.len()] != MAGIC {
        return Err(IngressError("bad magic".into()));
    }
    let width = u16::from_be_bytes([packet[4], packet[5]]) as usize;
    let height = u16::from_be_bytes([packet[6], packet[7]]) as usize;
    Ok((width, height, &packet[HEADER_LEN..]))
}

/// Bind `addr` and forward decoded frames to `mailbox` until `shutdown` fires.
pub async fn run(addr: String, mailbox: Arc<Mailbox>, arbiter: Arc<Arbiter>, shutdown: CancellationToken) {
    let socket = match UdpSocket::bind(&addr).await {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, addr = %addr, "failed to bind datagram ingress socket");
            return;
        }
    };

    let mut buf = vec![0u8; MAX_DATAGRAM];
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            result = socket.recv_from(&mut buf) => {
                let (len, _peer) = match result {
                    Ok(v) => v,
                    Err(e) => {
                        warn!(error = %e, "datagram recv failed");
                        continue;
                    }
                };
                let (width, height, body) = match parse_packet(&buf[..len]) {
                    Ok(v) => v,
                    Err(e) => {
                        debug!(error = %e, "dropping malformed datagram");
                        continue;
                    }
                };
                let frame = match decode_frame(width, height, body) {
                    Ok(f) => f,
                    Err(e) => {
                        debug!(error = %e, "dropping datagram with bad payload");
                        continue;
                    }
                };
                let canvas = arbiter.snapshot().layout.canvas_size();
                if let Err(e) = mailbox.submit(frame, canvas) {
                    debug!(?e, "datagram frame rejected by mailbox");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet(width: u16, height: u16, body: &[u8]) -> Vec<u8> {
        let mut p = Vec::new();
        p.extend_from_slice(&MAGIC);
        p.extend_from_slice(&width.to_be_bytes());
        p.extend_from_slice(&height.to_be_bytes());
        p.extend_from_slice(body);
        p
    }

    #[test]
    fn parses_well_formed_packet() {
        let body = vec![0u8; 2 * 1 * 3];
        let p = packet(2, 1, &body);
        let (w, h, rest) = parse_packet(&p).unwrap();
        assert_eq!((w, h), (2, 1));
        assert_eq!(rest.len(), body.len());
    }

    #[test]
    fn rejects_bad_magic() {
        let mut p = packet(1, 1, &[0, 0, 0]);
        p[0] = b'X';
        assert!(parse_packet(&p).is_err());
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(parse_packet(&[b'L', b'E', b'D']).is_err());
    }
}
