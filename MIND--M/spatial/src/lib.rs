#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Creature mind spatial layer – exploration grid and the map of known things.

/// Exploration grid, unknown-area queries and known-things registry.
pub mod world_map;

pub use world_map::{ExplorationGrid, WorldMap};
