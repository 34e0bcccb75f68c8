use std::collections::VecDeque;

use crate::draw_command::DrawCommand;
use crate::history::{EventOrigin, HistoryLedger};
use crate::message::{ClientMessage, DrawEvent, RoomId, ServerMessage, TextObject};
use crate::snapshot::{SnapshotStore, StoreError};
use crate::surface::DrawingSurface;

/// Room membership changes surfaced to the embedding's UI layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionNotification {
    PeerJoined { room: RoomId },
    PeerLeft { room: RoomId },
}

/// Per-view client context: one drawing surface, its history ledger and
/// snapshot store, and the current room membership. All collaborative state
/// lives here instead of in ambient globals; embeddings create one session
/// per open view.
///
/// The session never talks to the network itself. Outbound messages queue in
/// an outbox the transport drains, and inbound server messages are fed to
/// `handle_server_message`. Remote primitive draw events the renderer must
/// rasterize queue separately.
pub struct ClientSession<S: DrawingSurface> {
    surface: S,
    room: Option<RoomId>,
    ledger: HistoryLedger,
    store: SnapshotStore,
    outbox: VecDeque<ClientMessage>,
    remote_events: VecDeque<DrawEvent>,
    notifications: VecDeque<SessionNotification>,
}

impl<S: DrawingSurface> ClientSession<S> {
    pub fn new(surface: S) -> Self {
        let ledger = HistoryLedger::new(&surface);
        Self {
            surface,
            room: None,
            ledger,
            store: SnapshotStore::new(),
            outbox: VecDeque::new(),
            remote_events: VecDeque::new(),
            notifications: VecDeque::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    pub fn room(&self) -> Option<&RoomId> {
        self.room.as_ref()
    }

    pub fn can_undo(&self) -> bool {
        self.ledger.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.ledger.can_redo()
    }

    /// 6-character uppercase room code, the shape users exchange out of band.
    pub fn generate_room_code() -> RoomId {
        const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";
        uuid::Uuid::new_v4()
            .as_bytes()
            .iter()
            .take(6)
            .map(|b| ALPHABET[*b as usize % ALPHABET.len()] as char)
            .collect()
    }

    /// Switches rooms. Membership cardinality is at most one: the previous
    /// room is dropped here, synchronously, so no later event can carry a
    /// stale room tag.
    pub fn join_room(&mut self, room: RoomId) {
        self.room = Some(room.clone());
        self.outbox.push_back(ClientMessage::JoinRoom { room });
    }

    pub fn leave_room(&mut self) {
        self.room = None;
    }

    /// Applies a local drawing intent: forwards it to room peers (when in a
    /// room) and records history for the actions that complete a visible
    /// change.
    pub fn apply_command(&mut self, command: DrawCommand) {
        let label = history_label(&command);

        match &command {
            DrawCommand::AddText(text) => {
                let mut texts = self.surface.text_objects().to_vec();
                texts.push(text.clone());
                self.surface.set_text_objects(texts);
            }
            DrawCommand::MoveText {
                text,
                to,
                color,
                size,
            } => {
                move_text_object(&mut self.surface, text, to.x, to.y, color, *size);
            }
            DrawCommand::Clear => {
                self.surface.clear();
            }
            _ => {}
        }

        if let Some(room) = self.room.clone() {
            self.emit(command_to_event(command, room));
        }

        if let Some(label) = label {
            self.record_local(label);
        }
    }

    pub fn undo(&mut self) -> bool {
        let applied = self.ledger.can_undo();
        if self.ledger.undo(&mut self.surface, EventOrigin::Local) {
            if let Some(room) = self.room.clone() {
                self.emit(DrawEvent::Undo { room });
            }
        }
        applied
    }

    pub fn redo(&mut self) -> bool {
        let applied = self.ledger.can_redo();
        if self.ledger.redo(&mut self.surface, EventOrigin::Local) {
            if let Some(room) = self.room.clone() {
                self.emit(DrawEvent::Redo { room });
            }
        }
        applied
    }

    /// Saves the current raster under a fresh room-scoped key and replicates
    /// it to room peers. Quota exhaustion surfaces to the caller; nothing is
    /// stored or emitted in that case.
    pub fn save_snapshot(&mut self) -> Result<String, StoreError> {
        let blob = self.surface.capture_raster();
        let namespace = self.namespace();
        let key = self.store.save(&namespace, blob.clone())?;
        if let Some(room) = self.room.clone() {
            self.emit(DrawEvent::SnapshotSaved {
                room,
                key: key.clone(),
                blob,
            });
        }
        Ok(key)
    }

    pub fn list_snapshots(&self) -> Vec<(String, u64)> {
        self.store.list(&self.namespace())
    }

    /// Restores a saved snapshot to the surface. Peers receive the blob
    /// itself; they may never have stored this key. Unknown keys are a no-op.
    pub fn load_snapshot(&mut self, key: &str) -> bool {
        let blob = match self.store.load(key) {
            Some(blob) => blob.clone(),
            None => return false,
        };
        self.surface.apply_raster(&blob);
        self.record_local("load");
        if let Some(room) = self.room.clone() {
            self.emit(DrawEvent::SnapshotLoaded { room, blob });
        }
        true
    }

    pub fn delete_snapshot(&mut self, key: &str) -> bool {
        if !self.store.delete(key) {
            return false;
        }
        if let Some(room) = self.room.clone() {
            self.emit(DrawEvent::SnapshotDeleted {
                room,
                key: key.to_owned(),
            });
        }
        true
    }

    pub fn handle_server_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::PeerJoined { room } => {
                self.notifications
                    .push_back(SessionNotification::PeerJoined { room });
            }
            ServerMessage::PeerLeft { room } => {
                self.notifications
                    .push_back(SessionNotification::PeerLeft { room });
            }
            ServerMessage::Draw(event) => self.handle_remote_event(event),
        }
    }

    fn handle_remote_event(&mut self, event: DrawEvent) {
        if self.room.as_ref() != Some(event.room()) {
            // Covers undo/redo arriving for a room this client has left.
            log::debug!("ignoring event for room {:?}", event.room());
            return;
        }

        match event {
            DrawEvent::StateSync { entry, .. } => {
                self.ledger.record_remote(entry);
            }
            DrawEvent::Undo { .. } => {
                self.ledger.undo(&mut self.surface, EventOrigin::RemoteFromPeer);
            }
            DrawEvent::Redo { .. } => {
                self.ledger.redo(&mut self.surface, EventOrigin::RemoteFromPeer);
            }
            DrawEvent::ClearCanvas { .. } => {
                // The stack is mirrored by the sender's accompanying
                // state-sync; recording here too would grow this stack by two
                // per clear and break undo lockstep across the room.
                self.surface.clear();
            }
            DrawEvent::AddText {
                ref text,
                x,
                y,
                ref color,
                size,
                ..
            } => {
                let mut texts = self.surface.text_objects().to_vec();
                texts.push(TextObject {
                    text: text.clone(),
                    x,
                    y,
                    color: color.clone(),
                    size,
                });
                self.surface.set_text_objects(texts);
                self.remote_events.push_back(event);
            }
            DrawEvent::MoveText {
                ref text,
                x,
                y,
                ref color,
                size,
                ..
            } => {
                move_text_object(&mut self.surface, text, x, y, color, size);
                self.remote_events.push_back(event);
            }
            DrawEvent::SnapshotSaved { room, key, blob } => {
                self.store.apply_remote_saved(&room, key, blob);
            }
            DrawEvent::SnapshotLoaded { blob, .. } => {
                // Canvas only; the loader's state-sync mirrors the stack.
                self.surface.apply_raster(&blob);
            }
            DrawEvent::SnapshotDeleted { key, .. } => {
                self.store.apply_remote_deleted(&key);
            }
            // Primitive stroke and shape geometry is rasterized by the
            // renderer outside this crate.
            event => self.remote_events.push_back(event),
        }
    }

    pub fn consume_outbound(&mut self) -> Vec<ClientMessage> {
        self.outbox.drain(..).collect()
    }

    pub fn consume_remote_events(&mut self) -> Vec<DrawEvent> {
        self.remote_events.drain(..).collect()
    }

    pub fn consume_notifications(&mut self) -> Vec<SessionNotification> {
        self.notifications.drain(..).collect()
    }

    fn record_local(&mut self, label: &str) {
        if let Some(entry) = self.ledger.record(&self.surface, label, EventOrigin::Local) {
            if let Some(room) = self.room.clone() {
                self.emit(DrawEvent::StateSync { room, entry });
            }
        }
    }

    fn emit(&mut self, event: DrawEvent) {
        self.outbox.push_back(ClientMessage::Draw(event));
    }

    fn namespace(&self) -> RoomId {
        self.room.clone().unwrap_or_default()
    }
}

fn history_label(command: &DrawCommand) -> Option<&'static str> {
    match command {
        DrawCommand::StrokeEnd => Some("draw"),
        DrawCommand::EraseEnd => Some("erase"),
        DrawCommand::Line { .. } => Some("line"),
        DrawCommand::Circle { .. } => Some("circle"),
        DrawCommand::Rectangle { .. } => Some("rectangle"),
        DrawCommand::Triangle { .. } => Some("triangle"),
        DrawCommand::AddText(_) => Some("text"),
        DrawCommand::MoveText { .. } => Some("move-text"),
        DrawCommand::Clear => Some("clear"),
        _ => None,
    }
}

fn move_text_object<S: DrawingSurface>(
    surface: &mut S,
    text: &str,
    x: f32,
    y: f32,
    color: &str,
    size: f32,
) {
    let mut texts = surface.text_objects().to_vec();
    if let Some(found) = texts.iter_mut().find(|t| t.text == text) {
        found.x = x;
        found.y = y;
        found.color = color.to_owned();
        found.size = size;
        surface.set_text_objects(texts);
    }
}

fn command_to_event(command: DrawCommand, room: RoomId) -> DrawEvent {
    match command {
        DrawCommand::StrokeStart {
            point,
            color,
            width,
        } => DrawEvent::StrokeStart {
            room,
            x: point.x,
            y: point.y,
            color,
            width,
        },
        DrawCommand::StrokeMove {
            point,
            color,
            width,
        } => DrawEvent::StrokeMove {
            room,
            x: point.x,
            y: point.y,
            color,
            width,
        },
        DrawCommand::StrokeEnd => DrawEvent::StrokeEnd { room },
        DrawCommand::EraseStart { point, width } => DrawEvent::EraseStart {
            room,
            x: point.x,
            y: point.y,
            width,
        },
        DrawCommand::EraseMove { point, width } => DrawEvent::EraseMove {
            room,
            x: point.x,
            y: point.y,
            width,
        },
        DrawCommand::EraseEnd => DrawEvent::EraseEnd { room },
        DrawCommand::Line {
            start,
            end,
            color,
            width,
        } => DrawEvent::Line {
            room,
            start_x: start.x,
            start_y: start.y,
            end_x: end.x,
            end_y: end.y,
            color,
            width,
        },
        DrawCommand::Circle {
            center,
            radius,
            color,
            width,
        } => DrawEvent::Circle {
            room,
            center_x: center.x,
            center_y: center.y,
            radius,
            color,
            width,
        },
        DrawCommand::Rectangle {
            origin,
            width,
            height,
            color,
            stroke_width,
        } => DrawEvent::Rectangle {
            room,
            start_x: origin.x,
            start_y: origin.y,
            width,
            height,
            color,
            stroke_width,
        },
        DrawCommand::Triangle {
            start,
            end,
            color,
            width,
        } => DrawEvent::Triangle {
            room,
            start_x: start.x,
            start_y: start.y,
            end_x: end.x,
            end_y: end.y,
            color,
            width,
        },
        DrawCommand::AddText(text) => DrawEvent::AddText {
            room,
            text: text.text,
            x: text.x,
            y: text.y,
            color: text.color,
            size: text.size,
        },
        DrawCommand::MoveText {
            text,
            to,
            color,
            size,
        } => DrawEvent::MoveText {
            room,
            text,
            x: to.x,
            y: to.y,
            color,
            size,
        },
        DrawCommand::Clear => DrawEvent::ClearCanvas { room },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::surface::MemorySurface;
    use euclid::default::Point2D;

    fn session_in(room: &str) -> ClientSession<MemorySurface> {
        let mut session = ClientSession::new(MemorySurface::new());
        session.join_room(room.to_string());
        session.consume_outbound();
        session
    }

    #[test]
    fn join_room_enqueues_the_control_message() {
        let mut session = ClientSession::new(MemorySurface::new());
        session.join_room("AB12CD".to_string());
        assert_eq!(
            session.consume_outbound(),
            vec![ClientMessage::JoinRoom {
                room: "AB12CD".to_string()
            }]
        );
    }

    #[test]
    fn local_commands_carry_the_current_room_tag() {
        let mut session = session_in("AB12CD");
        session.apply_command(DrawCommand::StrokeStart {
            point: Point2D::new(10.0, 10.0),
            color: "#ff0000".into(),
            width: 3.0,
        });

        let out = session.consume_outbound();
        match &out[0] {
            ClientMessage::Draw(event) => assert_eq!(event.room(), "AB12CD"),
            other => panic!("unexpected message: {:?}", other),
        }
    }

    #[test]
    fn nothing_is_emitted_outside_a_room() {
        let mut session = ClientSession::new(MemorySurface::new());
        session.surface_mut().paint(b"stroke");
        session.apply_command(DrawCommand::StrokeEnd);
        assert!(session.consume_outbound().is_empty());
        // History is still recorded for offline undo.
        assert!(session.can_undo());
    }

    #[test]
    fn applying_a_remote_state_sync_emits_nothing() {
        let mut sender = session_in("AB12CD");
        sender.surface_mut().paint(b"stroke");
        sender.apply_command(DrawCommand::StrokeEnd);
        let sync = sender
            .consume_outbound()
            .into_iter()
            .find_map(|m| match m {
                ClientMessage::Draw(event @ DrawEvent::StateSync { .. }) => Some(event),
                _ => None,
            })
            .expect("stroke end must sync state");

        let mut receiver = session_in("AB12CD");
        receiver.handle_server_message(ServerMessage::Draw(sync));
        assert!(receiver.consume_outbound().is_empty());
        assert!(receiver.can_undo());
    }

    #[test]
    fn events_for_another_room_are_ignored() {
        let mut session = session_in("ZZ99");
        session.handle_server_message(ServerMessage::Draw(DrawEvent::ClearCanvas {
            room: "AB12CD".to_string(),
        }));
        assert!(!session.can_undo());
        assert!(session.consume_remote_events().is_empty());
    }

    #[test]
    fn remote_undo_for_a_left_room_is_ignored() {
        let mut session = session_in("AB12CD");
        session.surface_mut().paint(b"stroke");
        session.apply_command(DrawCommand::StrokeEnd);
        session.leave_room();

        session.handle_server_message(ServerMessage::Draw(DrawEvent::Undo {
            room: "AB12CD".to_string(),
        }));
        assert!(session.can_undo());
    }

    #[test]
    fn remote_undo_applies_without_re_emission() {
        let mut session = session_in("AB12CD");
        session.surface_mut().paint(b"stroke");
        session.apply_command(DrawCommand::StrokeEnd);
        session.consume_outbound();

        session.handle_server_message(ServerMessage::Draw(DrawEvent::Undo {
            room: "AB12CD".to_string(),
        }));
        assert!(!session.can_undo());
        assert!(session.consume_outbound().is_empty());
    }

    #[test]
    fn remote_add_text_lands_in_the_surface_text_set() {
        let mut session = session_in("AB12CD");
        session.handle_server_message(ServerMessage::Draw(DrawEvent::AddText {
            room: "AB12CD".to_string(),
            text: "hi".into(),
            x: 5.0,
            y: 6.0,
            color: "#000000".into(),
            size: 10.0,
        }));

        assert_eq!(session.surface().text_objects().len(), 1);
        assert_eq!(session.consume_remote_events().len(), 1);
    }

    #[test]
    fn move_text_updates_the_matching_object() {
        let mut session = session_in("AB12CD");
        session.apply_command(DrawCommand::AddText(TextObject {
            text: "hi".into(),
            x: 1.0,
            y: 1.0,
            color: "#000000".into(),
            size: 10.0,
        }));

        session.apply_command(DrawCommand::MoveText {
            text: "hi".into(),
            to: Point2D::new(7.0, 8.0),
            color: "#000000".into(),
            size: 10.0,
        });

        let texts = session.surface().text_objects();
        assert_eq!((texts[0].x, texts[0].y), (7.0, 8.0));
    }

    #[test]
    fn peer_arrivals_surface_as_notifications() {
        let mut session = session_in("AB12CD");
        session.handle_server_message(ServerMessage::PeerJoined {
            room: "AB12CD".to_string(),
        });
        session.handle_server_message(ServerMessage::PeerLeft {
            room: "AB12CD".to_string(),
        });

        assert_eq!(
            session.consume_notifications(),
            vec![
                SessionNotification::PeerJoined {
                    room: "AB12CD".to_string()
                },
                SessionNotification::PeerLeft {
                    room: "AB12CD".to_string()
                },
            ]
        );
    }

    #[test]
    fn generated_room_codes_are_six_uppercase_chars() {
        let code = ClientSession::<MemorySurface>::generate_room_code();
        assert_eq!(code.len(), 6);
        assert!(code
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
    }
}
