use std::collections::BTreeSet;

use crate::Pixel;

/// Set of pixels already visited for the feature currently being
/// processed.
///
/// Iteration is column major, then row, following the ordering of
/// [Pixel].
#[derive(Clone, Debug, Default)]
pub struct PixelSet {
    pixels: BTreeSet<Pixel>,
}

impl PixelSet {
    pub fn new() -> Self {
        PixelSet::default()
    }

    /// Record `pixel`. Returns `false` if it was already present.
    pub fn insert(&mut self, pixel: Pixel) -> bool {
        self.pixels.insert(pixel)
    }

    pub fn contains(&self, pixel: Pixel) -> bool {
        self.pixels.contains(&pixel)
    }

    pub fn clear(&mut self) {
        self.pixels.clear();
    }

    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = Pixel> + '_ {
        self.pixels.iter().copied()
    }
}
