//! Spatial search and placement helpers shared by the tasks.

use crate::world::{Block, Position, World};

/// The four axis-aligned neighbours at the same height.
pub const HORIZONTAL_NEIGHBORS: [(i32, i32, i32); 4] = [(1, 0, 0), (-1, 0, 0), (0, 0, 1), (0, 0, -1)];

/// Solid, and not a resting surface.
pub fn is_support(block: Option<&Block>) -> bool {
    matches!(block, Some(b) if b.solid && !b.is_resting_surface())
}

/// Block to place a bed against, for an agent standing in `feet`.
///
/// The block beneath the agent is preferred. When it is missing, a resting
/// surface, or not solid, the first supporting block in the ring around it is
/// used. If none qualifies the block beneath is returned anyway and the
/// placement is left to fail downstream.
pub fn choose_placement_site(world: &dyn World, feet: Position) -> Position {
    let below = feet.offset(0, -1, 0);
    if is_support(world.block_at(below).as_ref()) {
        return below;
    }

    HORIZONTAL_NEIGHBORS
        .iter()
        .map(|&(dx, dy, dz)| below.offset(dx, dy, dz))
        .find(|candidate| is_support(world.block_at(*candidate).as_ref()))
        .unwrap_or(below)
}

/// First supporting block next to `surface`.
pub fn find_standing_support(world: &dyn World, surface: Position) -> Option<Position> {
    HORIZONTAL_NEIGHBORS
        .iter()
        .map(|&(dx, dy, dz)| surface.offset(dx, dy, dz))
        .find(|candidate| is_support(world.block_at(*candidate).as_ref()))
}

/// Cells of the container search region around `center`, in scan order:
/// x ascending, then z ascending, then y ascending.
pub fn storage_scan_region(
    center: Position,
    radius: i32,
    height: i32,
) -> impl Iterator<Item = Position> {
    (-radius..=radius).flat_map(move |dx| {
        (-radius..=radius)
            .flat_map(move |dz| (-height..=height).map(move |dy| center.offset(dx, dy, dz)))
    })
}

/// Storage blocks in the search region, in discovery order.
pub fn find_storage(world: &dyn World, center: Position, radius: i32, height: i32) -> Vec<Position> {
    storage_scan_region(center, radius, height)
        .filter(|p| world.block_at(*p).is_some_and(|b| b.is_storage()))
        .collect()
}
