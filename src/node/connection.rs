//! A single viewer's attachment to the node (§3 ClientConnection, §5
//! per-connection contract): exactly one writer task drains the outbound
//! queue, the inbound loop is the only reader of the socket.

use tokio::sync::mpsc;
use tracing::warn;

use crate::protocol::ServerMessage;

/// Outbound queue capacity (§5): bounded, non-blocking enqueue; overflow
/// drops the newest message rather than blocking the broadcaster or closing
/// the connection.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 256;

pub type ConnectionId = u64;

/// Handle held by the session hub for one locally-attached viewer. The
/// actual socket and its write half live in the pump task spawned alongside
/// this handle; the handle itself is just the sending end of the queue plus
/// the bookkeeping the broadcaster needs (§5: snapshot taken under the
/// session lock, send happens outside it).
#[derive(Clone)]
pub struct ConnectionHandle {
    pub id: ConnectionId,
    pub is_host: bool,
    outbound: mpsc::Sender<ServerMessage>,
}

impl ConnectionHandle {
    pub fn new(id: ConnectionId, is_host: bool) -> (Self, mpsc::Receiver<ServerMessage>) {
        let (outbound, receiver) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        (
            Self {
                id,
                is_host,
                outbound,
            },
            receiver,
        )
    }

    /// Non-blocking enqueue (§5, §4.2 topic delivery): on overflow the
    /// message is dropped for this connection only, logged, and every other
    /// connection is unaffected.
    pub fn try_send(&self, message: ServerMessage) {
        if let Err(err) = self.outbound.try_send(message) {
            warn!(
                connection_id = self.id,
                "dropping message, outbound queue is full or closed: {err}"
            );
        }
    }
}
