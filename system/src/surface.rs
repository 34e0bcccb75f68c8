use crate::message::{RasterBlob, SequenceId, TextObject};

/// The raster/vector canvas the collaborative core reads state from and
/// writes state to. Rasterization itself lives outside this crate; embeddings
/// wrap their actual canvas (e.g. an HTML canvas element) in this trait.
pub trait DrawingSurface {
    fn capture_raster(&self) -> RasterBlob;
    fn apply_raster(&mut self, blob: &RasterBlob);
    fn text_objects(&self) -> &[TextObject];
    fn set_text_objects(&mut self, texts: Vec<TextObject>);
    fn clear(&mut self);

    /// Mutation counter, bumped by the surface on every raster or text-set
    /// change. History deduplication compares these markers instead of
    /// pixels, which would be too expensive at collaborative event rates.
    fn revision(&self) -> SequenceId;
}

/// In-memory surface for headless embeddings and tests. The "raster" is just
/// a byte vector; `paint` stands in for whatever the renderer draws.
#[derive(Debug, Default)]
pub struct MemorySurface {
    raster: RasterBlob,
    texts: Vec<TextObject>,
    revision: SequenceId,
}

impl MemorySurface {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn paint(&mut self, bytes: &[u8]) {
        self.raster.extend_from_slice(bytes);
        self.revision += 1;
    }
}

impl DrawingSurface for MemorySurface {
    fn capture_raster(&self) -> RasterBlob {
        self.raster.clone()
    }

    fn apply_raster(&mut self, blob: &RasterBlob) {
        self.raster = blob.clone();
        self.revision += 1;
    }

    fn text_objects(&self) -> &[TextObject] {
        &self.texts
    }

    fn set_text_objects(&mut self, texts: Vec<TextObject>) {
        self.texts = texts;
        self.revision += 1;
    }

    fn clear(&mut self) {
        self.raster.clear();
        self.texts.clear();
        self.revision += 1;
    }

    fn revision(&self) -> SequenceId {
        self.revision
    }
}
