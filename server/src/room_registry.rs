use std::collections::HashMap;
use std::num::Wrapping;
use system::{ConnectionId, RoomId};

/// Room membership for every live connection. A connection is in at most one
/// room; rooms come into existence on first join and are discarded when their
/// last member leaves. Join and leave are idempotent and never fail.
pub struct RoomRegistry {
    connection_id_source: Wrapping<ConnectionId>,
    connection_rooms: HashMap<ConnectionId, RoomId>,
    rooms: HashMap<RoomId, Vec<ConnectionId>>,
}

impl RoomRegistry {
    pub fn new() -> Self {
        Self {
            connection_id_source: Wrapping(0),
            connection_rooms: HashMap::new(),
            rooms: HashMap::new(),
        }
    }

    pub fn create_connection(&mut self) -> ConnectionId {
        self.connection_id_source += Wrapping(1);
        self.connection_id_source.0
    }

    /// Moves `connection_id` into `room`, leaving its current room first.
    /// Returns the vacated room so the relay can notify its remaining
    /// members. Joining the room the connection is already in is a no-op.
    pub fn join(&mut self, connection_id: ConnectionId, room: RoomId) -> Option<RoomId> {
        if self.connection_rooms.get(&connection_id) == Some(&room) {
            return None;
        }
        let previous = self.leave(connection_id);
        self.rooms
            .entry(room.clone())
            .or_insert_with(Vec::new)
            .push(connection_id);
        self.connection_rooms.insert(connection_id, room.clone());
        log::info!("Connection {} joined room {}", connection_id, room);
        previous
    }

    /// Removes the connection from its room, discarding the room when it
    /// empties. `None` when the connection wasn't in a room.
    pub fn leave(&mut self, connection_id: ConnectionId) -> Option<RoomId> {
        let room = self.connection_rooms.remove(&connection_id)?;
        if let Some(members) = self.rooms.get_mut(&room) {
            members.retain(|m| *m != connection_id);
            if members.is_empty() {
                self.rooms.remove(&room);
            }
        }
        Some(room)
    }

    pub fn room_of(&self, connection_id: ConnectionId) -> Option<&RoomId> {
        self.connection_rooms.get(&connection_id)
    }

    /// Members of `room` minus `excluding` (the sender, for multicast).
    pub fn members_of(&self, room: &RoomId, excluding: ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(room)
            .map(|members| {
                members
                    .iter()
                    .copied()
                    .filter(|m| *m != excluding)
                    .collect()
            })
            .unwrap_or_default()
    }

    #[cfg(test)]
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
