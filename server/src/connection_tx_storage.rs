use crate::connection::ConnectionEvent;
use std::collections::HashMap;
use system::ConnectionId;

pub type ConnectionTx = tokio::sync::mpsc::Sender<ConnectionEvent>;

#[derive(Debug)]
pub enum SendFailure {
    /// The peer's bounded send queue is full; it cannot keep up and must be
    /// dropped rather than back-pressure the room.
    Lagged,
    Closed,
}

pub struct ConnectionTxStorage {
    connection_txs: HashMap<ConnectionId, ConnectionTx>,
}

impl ConnectionTxStorage {
    pub fn new() -> Self {
        Self {
            connection_txs: HashMap::new(),
        }
    }

    pub fn insert(&mut self, connection_id: ConnectionId, tx: ConnectionTx) {
        self.connection_txs.insert(connection_id, tx);
    }

    pub fn send(
        &mut self,
        to: ConnectionId,
        message: ConnectionEvent,
    ) -> Result<(), SendFailure> {
        use tokio::sync::mpsc::error::TrySendError;

        let tx = self
            .connection_txs
            .get_mut(&to)
            .ok_or(SendFailure::Closed)?;
        tx.try_send(message).map_err(|e| match e {
            TrySendError::Full(_) => SendFailure::Lagged,
            TrySendError::Closed(_) => SendFailure::Closed,
        })
    }

    pub fn remove(&mut self, connection_id: ConnectionId) -> Option<ConnectionTx> {
        self.connection_txs.remove(&connection_id)
    }
}
