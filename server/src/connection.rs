use actix::{Actor, ActorContext, AsyncContext, Handler, Message, Running, StreamHandler};
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;

use system::{bincode, ClientMessage, ConnectionId, ServerMessage};

use crate::connection_tx_storage::ConnectionTx;
use crate::server::ServerTx;

/// Frames a client may send before its id arrives from the relay loop.
const PENDING_FRAME_LIMIT: usize = 64;

#[derive(Debug)]
pub enum ConnectionCommand {
    Connect {
        tx: ConnectionTx,
    },
    Disconnect {
        from: ConnectionId,
    },
    Message {
        from: ConnectionId,
        message: ClientMessage,
    },
}

#[derive(Debug)]
pub enum ConnectionEvent {
    Connected { connection_id: ConnectionId },
    Message(ServerMessage),
    Disconnected,
}

#[derive(Message)]
#[rtype(result = "()")]
struct ConnectionActorMessage(ConnectionEvent);

enum ConnectionState {
    Idle,
    Connected(ConnectionId),
}

/// One WebSocket client. Binary frames carry bincode-encoded messages; an
/// undecodable frame is logged and dropped, the session goes on.
struct ConnectionActor {
    state: ConnectionState,
    srv_tx: ServerTx,
    /// Id allocation round-trips through the relay loop, so frames raced in
    /// between are held here and replayed once `Connected` arrives. A client
    /// sending its join right after the handshake must not lose it.
    pending: Vec<web::Bytes>,
}

impl ConnectionActor {
    fn handle_binary(&mut self, bin: web::Bytes) {
        match self.state {
            ConnectionState::Connected(from) => self.forward(from, &bin),
            ConnectionState::Idle => {
                if self.pending.len() < PENDING_FRAME_LIMIT {
                    self.pending.push(bin);
                } else {
                    log::warn!("Dropping frame from a connection with no id yet");
                }
            }
        }
    }

    fn handle_connected(&mut self, connection_id: ConnectionId) {
        self.state = ConnectionState::Connected(connection_id);
        for bin in std::mem::take(&mut self.pending) {
            self.forward(connection_id, &bin);
        }
    }

    fn forward(&mut self, from: ConnectionId, bin: &[u8]) {
        match bincode::deserialize::<ClientMessage>(bin) {
            Ok(message) => {
                log::debug!("Ingress {:?}", message);
                self.srv_tx
                    .try_send(ConnectionCommand::Message { from, message })
                    .expect("should have enough buffer");
            }
            // Malformed frames are dropped; the session goes on.
            Err(e) => log::warn!("Undecodable frame from connection {}: {}", from, e),
        }
    }
}

impl Actor for ConnectionActor {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        let (tx, mut rx) = tokio::sync::mpsc::channel::<ConnectionEvent>(32);

        self.srv_tx
            .try_send(ConnectionCommand::Connect { tx })
            .expect("server must not be closed yet");

        let addr = ctx.address().recipient();

        tokio::spawn(async move {
            let addr = addr;
            log::info!("connection green thread - started");
            while let Some(msg) = rx.recv().await {
                addr.try_send(ConnectionActorMessage(msg))
                    .expect("should have enough buffer")
            }
            log::info!("connection green thread - terminated");
        });
    }

    fn stopping(&mut self, _: &mut Self::Context) -> Running {
        if let ConnectionState::Connected(id) = self.state {
            self.srv_tx
                .try_send(ConnectionCommand::Disconnect { from: id })
                .expect("should have enough buffer");
        }

        Running::Stop
    }
}

/// Ingress
impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ConnectionActor {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => ctx.pong(&msg),
            Ok(ws::Message::Binary(bin)) => {
                log::debug!("Ingress size: {}", bin.len());
                self.handle_binary(bin);
            }
            Ok(ws::Message::Close(_)) => {
                if let ConnectionState::Connected(id) = self.state {
                    self.srv_tx
                        .try_send(ConnectionCommand::Disconnect { from: id })
                        .expect("should have enough buffer");
                    self.state = ConnectionState::Idle;
                }
                ctx.stop();
            }
            _ => (),
        }
    }
}

/// Egress
impl Handler<ConnectionActorMessage> for ConnectionActor {
    type Result = ();

    fn handle(
        &mut self,
        msg: ConnectionActorMessage,
        ctx: &mut ws::WebsocketContext<Self>,
    ) -> Self::Result {
        let connection_event = &msg.0;
        log::debug!("Egress {:?}", connection_event);
        match connection_event {
            ConnectionEvent::Connected { connection_id } => {
                self.handle_connected(*connection_id);
            }
            ConnectionEvent::Message(message) => {
                match bincode::serialize(message) {
                    Ok(serialized) => ctx.binary(serialized),
                    Err(e) => log::error!("Failed to encode egress message: {}", e),
                }
            }
            ConnectionEvent::Disconnected => {
                self.state = ConnectionState::Idle;
                ctx.close(None);
            }
        }
    }
}

pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    srv_tx: web::Data<ServerTx>,
) -> Result<HttpResponse, Error> {
    ws::start(
        ConnectionActor {
            srv_tx: srv_tx.get_ref().clone(),
            state: ConnectionState::Idle,
            pending: Vec::new(),
        },
        &req,
        stream,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::channel;

    fn actor_with(srv_tx: ServerTx) -> ConnectionActor {
        ConnectionActor {
            state: ConnectionState::Idle,
            srv_tx,
            pending: Vec::new(),
        }
    }

    fn join_frame(room: &str) -> web::Bytes {
        let message = ClientMessage::JoinRoom {
            room: room.to_string(),
        };
        web::Bytes::from(bincode::serialize(&message).unwrap())
    }

    #[test]
    fn frames_before_connected_are_buffered_and_replayed() {
        let (srv_tx, mut srv_rx) = channel::<ConnectionCommand>(16);
        let mut actor = actor_with(srv_tx);

        actor.handle_binary(join_frame("AB12CD"));
        assert!(srv_rx.try_recv().is_err());

        actor.handle_connected(7);

        match srv_rx.try_recv() {
            Ok(ConnectionCommand::Message {
                from,
                message: ClientMessage::JoinRoom { room },
            }) => {
                assert_eq!(from, 7);
                assert_eq!(room, "AB12CD");
            }
            other => panic!("expected the buffered join, got {:?}", other),
        }
    }

    #[test]
    fn the_pending_buffer_is_bounded() {
        let (srv_tx, mut srv_rx) = channel::<ConnectionCommand>(256);
        let mut actor = actor_with(srv_tx);

        for _ in 0..PENDING_FRAME_LIMIT + 10 {
            actor.handle_binary(join_frame("AB12CD"));
        }
        actor.handle_connected(7);

        let mut replayed = 0;
        while srv_rx.try_recv().is_ok() {
            replayed += 1;
        }
        assert_eq!(replayed, PENDING_FRAME_LIMIT);
    }
}
