//! Player colour assignment
//!
//! Colours come from a fixed palette in join order. Once every palette entry
//! is held by a live player, new players get a random bright colour instead.
//! Ownership is tracked per player so that a colour shared by coincidence is
//! only considered free once nobody holds it any more.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{Color, PlayerId};
use std::collections::{HashMap, HashSet};

/// Ordered palette handed out before falling back to random colours
pub const PALETTE: [Color; 8] = [
    Color(255, 0, 0),
    Color(0, 100, 255),
    Color(0, 255, 0),
    Color(255, 255, 0),
    Color(255, 0, 255),
    Color(0, 255, 255),
    Color(255, 128, 0),
    Color(128, 0, 255),
];

/// Lowest channel value for random colours, keeps cars visible on a dark track
const MIN_RANDOM_CHANNEL: u8 = 100;

pub struct ColorAllocator {
    owners: HashMap<PlayerId, Color>,
    rng: StdRng,
}

impl ColorAllocator {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Allocator whose random fallback is reproducible
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            owners: HashMap::new(),
            rng,
        }
    }

    /// Assigns a colour to `owner`, replacing any colour it already held.
    pub fn allocate(&mut self, owner: PlayerId) -> Color {
        self.owners.remove(&owner);

        let color = match PALETTE.iter().find(|c| !self.is_in_use(c)) {
            Some(color) => *color,
            None => {
                let color = self.random_color();
                debug!("Palette exhausted, player {} gets {:?}", owner, color);
                color
            }
        };

        self.owners.insert(owner, color);
        color
    }

    /// Frees the colour held by `owner`. Returns it, or None if the player
    /// held nothing.
    pub fn release(&mut self, owner: PlayerId) -> Option<Color> {
        self.owners.remove(&owner)
    }

    pub fn is_in_use(&self, color: &Color) -> bool {
        self.owners.values().any(|held| held == color)
    }

    /// Set of colours currently held by at least one player
    pub fn in_use(&self) -> HashSet<Color> {
        self.owners.values().copied().collect()
    }

    pub fn color_of(&self, owner: PlayerId) -> Option<Color> {
        self.owners.get(&owner).copied()
    }

    pub fn clear(&mut self) {
        self.owners.clear();
    }

    fn random_color(&mut self) -> Color {
        Color(
            self.rng.gen_range(MIN_RANDOM_CHANNEL..=u8::MAX),
            self.rng.gen_range(MIN_RANDOM_CHANNEL..=u8::MAX),
            self.rng.gen_range(MIN_RANDOM_CHANNEL..=u8::MAX),
        )
    }
}

impl Default for ColorAllocator {
    fn default() -> Self {
        Self::new()
    }
}
