use serde::{Deserialize, Serialize};

pub type ConnectionId = u16;
pub type RoomId = String;
pub type SequenceId = u64;

/// Opaque encoded bitmap. The collaborative core transports and stores these
/// blobs but never inspects their contents.
pub type RasterBlob = Vec<u8>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextObject {
    pub text: String,
    pub x: f32,
    pub y: f32,
    /// CSS hex color, e.g. "#ff0000".
    pub color: String,
    /// Font size in px.
    pub size: f32,
}

/// One captured drawing-surface state. Entries are immutable after creation;
/// undo/redo move them between stacks, never edit them in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub raster: RasterBlob,
    pub text_objects: Vec<TextObject>,
    pub label: String,
    /// Surface revision at capture time. Monotonic per client.
    pub seq: SequenceId,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub key: String,
    pub room: RoomId,
    pub blob: RasterBlob,
    pub timestamp_ms: u64,
}

/// Every synchronized drawing operation. Every variant carries the room it is
/// scoped to; the relay refuses to deliver an event with an empty room id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DrawEvent {
    StrokeStart {
        room: RoomId,
        x: f32,
        y: f32,
        color: String,
        width: f32,
    },
    StrokeMove {
        room: RoomId,
        x: f32,
        y: f32,
        color: String,
        width: f32,
    },
    StrokeEnd {
        room: RoomId,
    },
    EraseStart {
        room: RoomId,
        x: f32,
        y: f32,
        width: f32,
    },
    EraseMove {
        room: RoomId,
        x: f32,
        y: f32,
        width: f32,
    },
    EraseEnd {
        room: RoomId,
    },
    Line {
        room: RoomId,
        start_x: f32,
        start_y: f32,
        end_x: f32,
        end_y: f32,
        color: String,
        width: f32,
    },
    Circle {
        room: RoomId,
        center_x: f32,
        center_y: f32,
        radius: f32,
        color: String,
        width: f32,
    },
    Rectangle {
        room: RoomId,
        start_x: f32,
        start_y: f32,
        width: f32,
        height: f32,
        color: String,
        stroke_width: f32,
    },
    Triangle {
        room: RoomId,
        start_x: f32,
        start_y: f32,
        end_x: f32,
        end_y: f32,
        color: String,
        width: f32,
    },
    AddText {
        room: RoomId,
        text: String,
        x: f32,
        y: f32,
        color: String,
        size: f32,
    },
    /// Moves the text object matching `text`. Objects are identified by
    /// content, the same way the surface hit-tests them.
    MoveText {
        room: RoomId,
        text: String,
        x: f32,
        y: f32,
        color: String,
        size: f32,
    },
    ClearCanvas {
        room: RoomId,
    },
    StateSync {
        room: RoomId,
        entry: HistoryEntry,
    },
    Undo {
        room: RoomId,
    },
    Redo {
        room: RoomId,
    },
    SnapshotSaved {
        room: RoomId,
        key: String,
        blob: RasterBlob,
    },
    SnapshotLoaded {
        room: RoomId,
        blob: RasterBlob,
    },
    SnapshotDeleted {
        room: RoomId,
        key: String,
    },
}

impl DrawEvent {
    pub fn room(&self) -> &RoomId {
        match self {
            DrawEvent::StrokeStart { room, .. }
            | DrawEvent::StrokeMove { room, .. }
            | DrawEvent::StrokeEnd { room }
            | DrawEvent::EraseStart { room, .. }
            | DrawEvent::EraseMove { room, .. }
            | DrawEvent::EraseEnd { room }
            | DrawEvent::Line { room, .. }
            | DrawEvent::Circle { room, .. }
            | DrawEvent::Rectangle { room, .. }
            | DrawEvent::Triangle { room, .. }
            | DrawEvent::AddText { room, .. }
            | DrawEvent::MoveText { room, .. }
            | DrawEvent::ClearCanvas { room }
            | DrawEvent::StateSync { room, .. }
            | DrawEvent::Undo { room }
            | DrawEvent::Redo { room }
            | DrawEvent::SnapshotSaved { room, .. }
            | DrawEvent::SnapshotLoaded { room, .. }
            | DrawEvent::SnapshotDeleted { room, .. } => room,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ClientMessage {
    JoinRoom { room: RoomId },
    Draw(DrawEvent),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ServerMessage {
    PeerJoined { room: RoomId },
    PeerLeft { room: RoomId },
    Draw(DrawEvent),
}
