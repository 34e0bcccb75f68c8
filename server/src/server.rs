use tokio::sync::mpsc::{channel, Sender};

use system::{ClientMessage, ConnectionId, DrawEvent, RoomId, ServerMessage};

use crate::connection::{ConnectionCommand, ConnectionEvent};
use crate::connection_tx_storage::{ConnectionTxStorage, SendFailure};
use crate::room_registry::RoomRegistry;

pub type ServerTx = Sender<ConnectionCommand>;

/// The relay. One instance per process, driven by a single command loop, so
/// membership mutation and delivery never race each other. Delivery to a peer
/// goes through that peer's own ordered channel, which preserves FIFO per
/// source-peer pair.
struct Server {
    registry: RoomRegistry,
    connections: ConnectionTxStorage,
}

impl Server {
    fn new() -> Self {
        Self {
            registry: RoomRegistry::new(),
            connections: ConnectionTxStorage::new(),
        }
    }

    fn handle_connection_command(&mut self, command: ConnectionCommand) {
        match command {
            ConnectionCommand::Connect { tx } => {
                let connection_id = self.registry.create_connection();
                self.connections.insert(connection_id, tx);
                if self
                    .connections
                    .send(connection_id, ConnectionEvent::Connected { connection_id })
                    .is_err()
                {
                    self.drop_connection(connection_id);
                }
            }
            ConnectionCommand::Disconnect { from } => {
                self.drop_connection(from);
            }
            ConnectionCommand::Message { from, message } => match message {
                ClientMessage::JoinRoom { room } => self.handle_join(from, room),
                ClientMessage::Draw(event) => self.relay(from, event),
            },
        }
    }

    fn handle_join(&mut self, from: ConnectionId, room: RoomId) {
        if room.is_empty() {
            log::warn!("Connection {} tried to join an unnamed room", from);
            return;
        }
        if self.registry.room_of(from) == Some(&room) {
            // A repeated join of the current room changes nothing; announcing
            // it again would fabricate an arrival.
            return;
        }
        if let Some(vacated) = self.registry.join(from, room.clone()) {
            self.broadcast(&vacated, from, ServerMessage::PeerLeft { room: vacated.clone() });
        }
        // The joiner itself gets nothing; only existing members learn of the
        // arrival.
        self.broadcast(&room, from, ServerMessage::PeerJoined { room: room.clone() });
    }

    /// Forwards `event` unchanged to every other member of its room. Events
    /// without a room tag are never delivered anywhere; a process-wide
    /// broadcast would leak drawings across rooms.
    fn relay(&mut self, from: ConnectionId, event: DrawEvent) {
        if event.room().is_empty() {
            log::warn!("Dropping room-less event from connection {}", from);
            return;
        }
        let room = event.room().clone();
        self.broadcast(&room, from, ServerMessage::Draw(event));
    }

    fn broadcast(&mut self, room: &RoomId, without: ConnectionId, message: ServerMessage) {
        let mut lagged = Vec::new();
        for member in self.registry.members_of(room, without) {
            if let Err(failure) = self
                .connections
                .send(member, ConnectionEvent::Message(message.clone()))
            {
                if let SendFailure::Lagged = failure {
                    log::warn!("Connection {} cannot keep up, dropping it", member);
                }
                lagged.push(member);
            }
        }
        for member in lagged {
            self.drop_connection(member);
        }
    }

    fn drop_connection(&mut self, connection_id: ConnectionId) {
        if let Some(room) = self.registry.leave(connection_id) {
            self.broadcast(
                &room,
                connection_id,
                ServerMessage::PeerLeft { room: room.clone() },
            );
        }
        // Best effort; the peer may already be gone or hopelessly behind.
        let _ = self
            .connections
            .send(connection_id, ConnectionEvent::Disconnected);
        if self.connections.remove(connection_id).is_some() {
            log::info!("Connection {} removed", connection_id);
        }
    }
}

pub fn spawn_server() -> ServerTx {
    let (srv_tx, mut srv_rx) = channel::<ConnectionCommand>(16);

    tokio::spawn(async move {
        let mut server = Box::new(Server::new());

        while let Some(command) = srv_rx.recv().await {
            server.handle_connection_command(command);
        }
    });

    srv_tx
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::Receiver;

    struct TestPeer {
        id: ConnectionId,
        rx: Receiver<ConnectionEvent>,
    }

    impl TestPeer {
        fn recv(&mut self) -> Option<ConnectionEvent> {
            self.rx.try_recv().ok()
        }

        fn drain_draws(&mut self) -> Vec<DrawEvent> {
            let mut events = Vec::new();
            while let Some(event) = self.recv() {
                if let ConnectionEvent::Message(ServerMessage::Draw(draw)) = event {
                    events.push(draw);
                }
            }
            events
        }
    }

    fn connect(server: &mut Server) -> TestPeer {
        let (tx, mut rx) = channel(32);
        server.handle_connection_command(ConnectionCommand::Connect { tx });
        let id = match rx.try_recv() {
            Ok(ConnectionEvent::Connected { connection_id }) => connection_id,
            other => panic!("expected Connected, got {:?}", other),
        };
        TestPeer { id, rx }
    }

    fn join(server: &mut Server, peer: &TestPeer, room: &str) {
        server.handle_connection_command(ConnectionCommand::Message {
            from: peer.id,
            message: ClientMessage::JoinRoom {
                room: room.to_string(),
            },
        });
    }

    fn send_line(server: &mut Server, peer: &TestPeer, room: &str) {
        server.handle_connection_command(ConnectionCommand::Message {
            from: peer.id,
            message: ClientMessage::Draw(DrawEvent::Line {
                room: room.to_string(),
                start_x: 10.0,
                start_y: 10.0,
                end_x: 50.0,
                end_y: 50.0,
                color: "#ff0000".to_string(),
                width: 3.0,
            }),
        });
    }

    #[test]
    fn a_peer_in_the_same_room_observes_the_exact_event() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");
        b.drain_draws();

        send_line(&mut server, &a, "AB12CD");

        let events = b.drain_draws();
        assert_eq!(events.len(), 1);
        match &events[0] {
            DrawEvent::Line {
                room,
                start_x,
                start_y,
                end_x,
                end_y,
                color,
                width,
            } => {
                assert_eq!(room, "AB12CD");
                assert_eq!((*start_x, *start_y), (10.0, 10.0));
                assert_eq!((*end_x, *end_y), (50.0, 50.0));
                assert_eq!(color, "#ff0000");
                assert_eq!(*width, 3.0);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn a_peer_in_another_room_observes_nothing() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "ZZ99");

        send_line(&mut server, &a, "AB12CD");

        assert!(b.drain_draws().is_empty());
    }

    #[test]
    fn the_sender_never_hears_its_own_event() {
        let mut server = Server::new();
        let mut a = connect(&mut server);
        let b = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");

        send_line(&mut server, &a, "AB12CD");

        assert!(a.drain_draws().is_empty());
        let _ = b;
    }

    #[test]
    fn events_from_one_source_arrive_in_order() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");
        b.drain_draws();

        server.handle_connection_command(ConnectionCommand::Message {
            from: a.id,
            message: ClientMessage::Draw(DrawEvent::StrokeStart {
                room: "AB12CD".to_string(),
                x: 1.0,
                y: 1.0,
                color: "#000000".to_string(),
                width: 2.0,
            }),
        });
        server.handle_connection_command(ConnectionCommand::Message {
            from: a.id,
            message: ClientMessage::Draw(DrawEvent::StrokeEnd {
                room: "AB12CD".to_string(),
            }),
        });

        let events = b.drain_draws();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], DrawEvent::StrokeStart { .. }));
        assert!(matches!(events[1], DrawEvent::StrokeEnd { .. }));
    }

    #[test]
    fn clear_canvas_reaches_every_other_member_exactly_once() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        let mut c = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");
        join(&mut server, &c, "AB12CD");
        b.drain_draws();
        c.drain_draws();

        server.handle_connection_command(ConnectionCommand::Message {
            from: a.id,
            message: ClientMessage::Draw(DrawEvent::ClearCanvas {
                room: "AB12CD".to_string(),
            }),
        });

        for peer in [&mut b, &mut c].iter_mut() {
            let events = peer.drain_draws();
            assert_eq!(events.len(), 1);
            assert!(matches!(events[0], DrawEvent::ClearCanvas { .. }));
        }
    }

    #[test]
    fn room_less_events_are_dropped() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");
        b.drain_draws();

        send_line(&mut server, &a, "");

        assert!(b.drain_draws().is_empty());
    }

    #[test]
    fn existing_members_learn_of_a_join_but_the_joiner_does_not() {
        let mut server = Server::new();
        let mut a = connect(&mut server);
        let mut b = connect(&mut server);
        join(&mut server, &a, "AB12CD");

        join(&mut server, &b, "AB12CD");

        assert!(matches!(
            a.recv(),
            Some(ConnectionEvent::Message(ServerMessage::PeerJoined { .. }))
        ));
        assert!(b.recv().is_none());
    }

    #[test]
    fn rejoining_the_current_room_announces_nothing() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");
        while b.recv().is_some() {}

        join(&mut server, &a, "AB12CD");

        assert!(b.recv().is_none());
    }

    #[test]
    fn a_disconnect_notifies_the_vacated_room() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");
        while b.recv().is_some() {}

        server.handle_connection_command(ConnectionCommand::Disconnect { from: a.id });

        assert!(matches!(
            b.recv(),
            Some(ConnectionEvent::Message(ServerMessage::PeerLeft { .. }))
        ));
    }

    #[test]
    fn a_lagged_peer_is_dropped_instead_of_stalling_the_room() {
        let mut server = Server::new();
        let a = connect(&mut server);
        let mut b = connect(&mut server);
        let (tx, laggard_rx) = channel(1);
        server.handle_connection_command(ConnectionCommand::Connect { tx });
        // Capacity 1 was consumed by the Connected event; the laggard's queue
        // is already full.
        let laggard_id = b.id + 1;
        join(&mut server, &a, "AB12CD");
        join(&mut server, &b, "AB12CD");
        server.handle_connection_command(ConnectionCommand::Message {
            from: laggard_id,
            message: ClientMessage::JoinRoom {
                room: "AB12CD".to_string(),
            },
        });
        b.drain_draws();

        send_line(&mut server, &a, "AB12CD");

        // The healthy peer still got the event.
        assert_eq!(b.drain_draws().len(), 1);
        // The laggard was evicted from the room.
        assert_eq!(
            server.registry.members_of(&"AB12CD".to_string(), a.id),
            vec![b.id]
        );
        drop(laggard_rx);
    }
}
