use crate::message::HistoryEntry;
use crate::surface::DrawingSurface;

/// Where a synchronized operation originated. Remote-origin operations are
/// applied without re-emission, which is what breaks the relay echo loop
/// (A edits -> B applies -> B must not broadcast back to A).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventOrigin {
    Local,
    RemoteFromPeer,
}

/// Two-stack undo/redo history over captured surface states.
///
/// The undo stack always holds at least one entry: the blank initial state
/// captured at construction, which is never popped.
pub struct HistoryLedger {
    undo_stack: Vec<HistoryEntry>,
    redo_stack: Vec<HistoryEntry>,
    /// Revision of the last locally captured entry. Deduplication compares
    /// against this, never against the top of the stack: mirrored remote
    /// entries carry the *sender's* per-client counter, and colliding
    /// counters must not mask a distinct local edit.
    last_local_seq: u64,
}

impl HistoryLedger {
    pub fn new<S: DrawingSurface>(surface: &S) -> Self {
        let initial = capture(surface, "initial");
        Self {
            last_local_seq: initial.seq,
            undo_stack: vec![initial],
            redo_stack: Vec::new(),
        }
    }

    /// Captures the current surface state under `label`. Nothing happens when
    /// the surface revision matches the last local capture (the state is
    /// unchanged). Returns a copy of the pushed entry only for local-origin
    /// recordings, so the caller can forward it as a state-sync event;
    /// remote-origin recordings never produce outbound traffic.
    pub fn record<S: DrawingSurface>(
        &mut self,
        surface: &S,
        label: &str,
        origin: EventOrigin,
    ) -> Option<HistoryEntry> {
        let entry = capture(surface, label);
        if self.last_local_seq == entry.seq {
            return None;
        }
        self.last_local_seq = entry.seq;
        self.undo_stack.push(entry.clone());
        self.redo_stack.clear();
        match origin {
            EventOrigin::Local => Some(entry),
            EventOrigin::RemoteFromPeer => None,
        }
    }

    /// Mirrors a state-sync entry received from a peer. The surface is not
    /// touched: its raster was already brought up to date by the primitive
    /// events that produced this entry on the peer.
    pub fn record_remote(&mut self, entry: HistoryEntry) {
        self.undo_stack.push(entry);
        self.redo_stack.clear();
    }

    /// Steps back one entry and restores the exposed state to the surface.
    /// No-op while only the initial state remains. Returns true when the
    /// caller should emit a remote undo event (applied, local origin).
    pub fn undo<S: DrawingSurface>(&mut self, surface: &mut S, origin: EventOrigin) -> bool {
        if self.undo_stack.len() <= 1 {
            return false;
        }
        let current = self.undo_stack.pop().expect("checked non-empty");
        self.redo_stack.push(current);
        restore(surface, self.top());
        origin == EventOrigin::Local
    }

    /// Symmetric to `undo`; no-op when there is nothing to redo.
    pub fn redo<S: DrawingSurface>(&mut self, surface: &mut S, origin: EventOrigin) -> bool {
        match self.redo_stack.pop() {
            Some(entry) => {
                restore(surface, &entry);
                self.undo_stack.push(entry);
                origin == EventOrigin::Local
            }
            None => false,
        }
    }

    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn can_undo(&self) -> bool {
        self.undo_stack.len() > 1
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    /// The entry currently exposed on the surface.
    pub fn top(&self) -> &HistoryEntry {
        self.undo_stack.last().expect("initial state never popped")
    }
}

fn capture<S: DrawingSurface>(surface: &S, label: &str) -> HistoryEntry {
    HistoryEntry {
        raster: surface.capture_raster(),
        // Copied by value; mutating a live text object must never change a
        // previously captured entry.
        text_objects: surface.text_objects().to_vec(),
        label: label.to_owned(),
        seq: surface.revision(),
    }
}

fn restore<S: DrawingSurface>(surface: &mut S, entry: &HistoryEntry) {
    surface.apply_raster(&entry.raster);
    surface.set_text_objects(entry.text_objects.clone());
}
