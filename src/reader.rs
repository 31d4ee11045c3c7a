// Reader task: owns the read half, frames and decodes responses, forwards them
// to the dispatcher in wire order.

use crate::ber::{self, Packet};
use crate::dispatcher::Command;
use crate::error::{LdapError, Result};
use crate::metrics::Metrics;
use crate::protocol;
use crate::transport::TransportStream;
use bytes::BytesMut;
use std::sync::Arc;
use tokio::io::ReadHalf;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Read half plus any bytes already pulled off the wire.
pub(crate) type Handoff = (ReadHalf<TransportStream>, BytesMut);

pub(crate) enum ReaderControl {
    /// Stop reading and give the transport back (StartTLS).
    Handoff(oneshot::Sender<Handoff>),
}

/// Runs until EOF, a read/decode failure, or the dispatcher drops `control`.
pub(crate) async fn run(
    mut read_half: ReadHalf<TransportStream>,
    mut buf: BytesMut,
    commands: mpsc::UnboundedSender<Command>,
    mut control: oneshot::Receiver<ReaderControl>,
    metrics: Arc<Metrics>,
) {
    loop {
        tokio::select! {
            biased;
            msg = &mut control => {
                match msg {
                    Ok(ReaderControl::Handoff(reply)) => {
                        debug!(buffered = buf.len(), "reader handing transport back");
                        let _ = reply.send((read_half, buf));
                    }
                    Err(_) => debug!("reader stopped by dispatcher"),
                }
                return;
            }
            frame = ber::read_frame(&mut read_half, &mut buf) => {
                let outcome = match frame {
                    Ok(Some(bytes)) => decode_frame(&bytes).map(Some),
                    Ok(None) => Ok(None),
                    Err(e) => Err(e),
                };
                match outcome {
                    Ok(Some((message_id, packet))) => {
                        trace!(message_id, "received frame");
                        if commands.send(Command::Route { message_id, packet }).is_err() {
                            return;
                        }
                    }
                    Ok(None) => {
                        let _ = commands.send(Command::ReaderStopped { error: None });
                        return;
                    }
                    Err(e) => {
                        if matches!(e, LdapError::Decoding(_)) {
                            metrics.inc_decode_error();
                        }
                        let _ = commands.send(Command::ReaderStopped { error: Some(e) });
                        return;
                    }
                }
            }
        }
    }
}

fn decode_frame(bytes: &[u8]) -> Result<(i64, Packet)> {
    let packet = ber::decode(bytes)?;
    let message_id = protocol::message_id(&packet)?;
    Ok((message_id, packet))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ber::Class;

    #[test]
    fn test_decode_frame() {
        let envelope = Packet::sequence()
            .with_child(Packet::integer(42))
            .with_child(Packet::constructed(Class::Application, protocol::APP_BIND_RESPONSE));
        let (id, packet) = decode_frame(&envelope.to_bytes()).unwrap();
        assert_eq!(id, 42);
        assert_eq!(packet, envelope);
    }

    #[test]
    fn test_decode_frame_without_op() {
        let envelope = Packet::sequence().with_child(Packet::integer(1));
        assert!(decode_frame(&envelope.to_bytes()).is_err());
    }
}
