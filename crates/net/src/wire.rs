//! Transport seam between the session and the network.
//!
//! The session talks to a [`Wire`], never to quinn directly. [`QuicWire`]
//! carries frames over QUIC streams, one message per unidirectional stream;
//! [`LoopbackWire`] carries the same frames over in-process channels so
//! tests and the offline demo run the full codec path with no sockets.

use crate::codec::{decode, encode, MAX_FRAME_LEN};
use crate::protocol::Envelope;
use anyhow::{Context, Result};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

/// A bidirectional message pipe carrying envelopes.
#[async_trait]
pub trait Wire: Send {
    /// Send one envelope. Errors are fatal for the connection.
    async fn send(&mut self, envelope: &Envelope) -> Result<()>;

    /// Receive the next envelope. `Ok(None)` means the peer closed cleanly.
    async fn recv(&mut self) -> Result<Option<Envelope>>;
}

/// [`Wire`] over a live QUIC connection. Each message rides its own
/// unidirectional stream, so message boundaries come for free and a lost
/// stream never corrupts its neighbors.
pub struct QuicWire {
    connection: quinn::Connection,
}

impl QuicWire {
    /// Wrap an established connection.
    pub fn new(connection: quinn::Connection) -> Self {
        Self { connection }
    }

    /// The underlying connection, for close codes and peer addresses.
    pub fn connection(&self) -> &quinn::Connection {
        &self.connection
    }
}

#[async_trait]
impl Wire for QuicWire {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let frame = encode(envelope)?;
        let mut stream = self
            .connection
            .open_uni()
            .await
            .context("Failed to open send stream")?;
        stream
            .write_all(&frame)
            .await
            .context("Failed to write frame")?;
        stream.finish().context("Failed to finish stream")?;
        debug!(id = %envelope.id, bytes = frame.len(), "sent envelope");
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Envelope>> {
        let mut stream = match self.connection.accept_uni().await {
            Ok(stream) => stream,
            Err(quinn::ConnectionError::ApplicationClosed(_))
            | Err(quinn::ConnectionError::LocallyClosed) => return Ok(None),
            Err(err) => return Err(err).context("Failed to accept stream"),
        };
        let frame = stream
            .read_to_end(MAX_FRAME_LEN + 8)
            .await
            .context("Failed to read frame")?;
        let envelope = decode(&frame)?;
        debug!(id = %envelope.id, bytes = frame.len(), "received envelope");
        Ok(Some(envelope))
    }
}

/// In-process [`Wire`] built on channels; frames still pass through the
/// codec so loopback traffic exercises the real wire format.
pub struct LoopbackWire {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: mpsc::UnboundedReceiver<Vec<u8>>,
}

/// Create two connected loopback wires; what one sends, the other receives.
pub fn loopback_pair() -> (LoopbackWire, LoopbackWire) {
    let (a_tx, a_rx) = mpsc::unbounded_channel();
    let (b_tx, b_rx) = mpsc::unbounded_channel();
    (
        LoopbackWire { tx: a_tx, rx: b_rx },
        LoopbackWire { tx: b_tx, rx: a_rx },
    )
}

#[async_trait]
impl Wire for LoopbackWire {
    async fn send(&mut self, envelope: &Envelope) -> Result<()> {
        let frame = encode(envelope)?;
        self.tx
            .send(frame)
            .map_err(|_| anyhow::anyhow!("Peer wire dropped"))?;
        Ok(())
    }

    async fn recv(&mut self) -> Result<Option<Envelope>> {
        match self.rx.recv().await {
            Some(frame) => Ok(Some(decode(&frame)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::MessageFactory;
    use gridtown_core::{Millis, PlayerId};

    #[tokio::test]
    async fn loopback_delivers_in_order() {
        let (mut a, mut b) = loopback_pair();
        let f = MessageFactory::new("wire-test");

        a.send(&f.ping(Millis(1))).await.unwrap();
        a.send(&f.chat(PlayerId::new("alice"), "hello")).await.unwrap();

        let first = b.recv().await.unwrap().unwrap();
        let second = b.recv().await.unwrap().unwrap();
        assert_eq!(first.message_type(), crate::MessageType::Ping);
        assert_eq!(second.message_type(), crate::MessageType::ChatMessage);
    }

    #[tokio::test]
    async fn loopback_is_bidirectional() {
        let (mut a, mut b) = loopback_pair();
        let f = MessageFactory::new("wire-test");

        b.send(&f.ping(Millis(7))).await.unwrap();
        let got = a.recv().await.unwrap().unwrap();
        assert_eq!(got.message_type(), crate::MessageType::Ping);
    }

    #[tokio::test]
    async fn closed_peer_reads_as_none() {
        let (a, mut b) = loopback_pair();
        drop(a);
        assert!(b.recv().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn send_to_dropped_peer_errors() {
        let (mut a, b) = loopback_pair();
        drop(b);
        let f = MessageFactory::new("wire-test");
        assert!(a.send(&f.ping(Millis(1))).await.is_err());
    }

    #[tokio::test]
    async fn quic_wire_round_trip() {
        use crate::transport::{ClientEndpoint, RelayEndpoint, TlsMode};

        let relay = RelayEndpoint::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = relay.local_addr();

        let accept = tokio::spawn(async move {
            relay.accept().await.unwrap().await.unwrap()
        });

        let client = ClientEndpoint::new(TlsMode::Insecure).unwrap();
        let conn = client.connect(addr, "localhost").await.unwrap();
        let mut client_wire = QuicWire::new(conn);
        let mut relay_wire = QuicWire::new(accept.await.unwrap());

        let f = MessageFactory::new("wire-test");
        let sent = f.chat(PlayerId::new("alice"), "over quic");
        client_wire.send(&sent).await.unwrap();

        let got = relay_wire.recv().await.unwrap().unwrap();
        assert_eq!(got, sent);
    }
}
