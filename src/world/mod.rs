//! World interface consumed by the task pipeline.
//!
//! The protocol client, pathfinder and block/entity lookups live behind the
//! [`World`] trait. Queries are synchronous snapshots; actions that take game
//! time are async and may fail with a [`WorldError`] carrying the server's
//! message verbatim.

pub mod console;
pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

pub use console::ConsoleConnector;
pub use memory::{MemoryWorld, Scenario};

/// Storage block names the collection task searches.
pub const STORAGE_BLOCKS: &[&str] = &["chest", "trapped_chest", "barrel"];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WorldError {
    /// An action was refused or failed; the text is the collaborator's own.
    #[error("{0}")]
    Action(String),
}

impl WorldError {
    pub fn action(s: impl Into<String>) -> Self {
        WorldError::Action(s.into())
    }
}

/// Integer block position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub const fn offset(self, dx: i32, dy: i32, dz: i32) -> Self {
        Self {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
        }
    }

    /// Center of the block.
    pub fn center(self) -> Vec3 {
        Vec3::new(
            f64::from(self.x) + 0.5,
            f64::from(self.y) + 0.5,
            f64::from(self.z) + 0.5,
        )
    }

    /// Where an entity standing in this cell has its feet.
    pub fn feet(self) -> Vec3 {
        Vec3::new(f64::from(self.x) + 0.5, f64::from(self.y), f64::from(self.z) + 0.5)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Fractional entity position.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn floored(self) -> Position {
        Position::new(
            self.x.floor() as i32,
            self.y.floor() as i32,
            self.z.floor() as i32,
        )
    }

    pub fn distance_to(self, other: Vec3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// Block snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub position: Position,
    pub name: String,
    /// Full collision box (something you can stand on or place against).
    pub solid: bool,
}

impl Block {
    pub fn is_resting_surface(&self) -> bool {
        is_bed_name(&self.name)
    }

    pub fn is_storage(&self) -> bool {
        STORAGE_BLOCKS.contains(&self.name.as_str())
    }
}

fn is_bed_name(name: &str) -> bool {
    name == "bed" || name.ends_with("_bed")
}

/// Item name known to the world's registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ItemKind(String);

impl ItemKind {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Items that can be placed to create a resting surface.
    pub fn is_restable_furniture(&self) -> bool {
        is_bed_name(&self.0)
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemStack {
    pub kind: ItemKind,
    pub count: u32,
}

impl ItemStack {
    pub fn new(kind: impl Into<String>, count: u32) -> Self {
        Self {
            kind: ItemKind::new(kind),
            count,
        }
    }
}

/// Sum of the counts of `kind` across `stacks`.
pub fn total_of(stacks: &[ItemStack], kind: &ItemKind) -> u32 {
    stacks
        .iter()
        .filter(|s| &s.kind == kind)
        .map(|s| s.count)
        .sum()
}

/// Face of the reference block a placement is made against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Face {
    Up,
    Down,
    North,
    South,
    East,
    West,
}

impl Face {
    pub const fn offset(self) -> (i32, i32, i32) {
        match self {
            Face::Up => (0, 1, 0),
            Face::Down => (0, -1, 0),
            Face::North => (0, 0, -1),
            Face::South => (0, 0, 1),
            Face::East => (1, 0, 0),
            Face::West => (-1, 0, 0),
        }
    }
}

/// An open storage window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerWindow {
    pub id: u64,
    pub position: Position,
    pub stacks: Vec<ItemStack>,
}

impl ContainerWindow {
    pub fn available(&self, kind: &ItemKind) -> u32 {
        total_of(&self.stacks, kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Recipe {
    pub result: ItemKind,
    /// Items produced by one craft.
    #[serde(default = "default_result_count")]
    pub result_count: u32,
    #[serde(default)]
    pub ingredients: Vec<ItemStack>,
}

fn default_result_count() -> u32 {
    1
}

/// Everything the task pipeline reads from or does to the world.
#[async_trait]
pub trait World: Send + Sync {
    /// Agent position.
    fn position(&self) -> Vec3;

    fn block_at(&self, position: Position) -> Option<Block>;

    /// First block in the world's scan order that satisfies `matching` and is
    /// within `max_distance` of the agent. Not ranked by distance.
    fn find_block(&self, matching: &dyn Fn(&Block) -> bool, max_distance: f64) -> Option<Block>;

    fn inventory(&self) -> Vec<ItemStack>;

    fn count(&self, kind: &ItemKind) -> u32 {
        total_of(&self.inventory(), kind)
    }

    /// Resolve a user-supplied item name against the registry.
    fn item_kind(&self, name: &str) -> Option<ItemKind>;

    async fn equip(&self, stack: &ItemStack) -> Result<(), WorldError>;

    /// Place the held item against `reference` on `face`.
    async fn place(&self, reference: Position, face: Face) -> Result<(), WorldError>;

    /// Replace the pathfinder goal. Last write wins.
    fn set_goal(&self, goal: Position);

    async fn wait_ticks(&self, ticks: u32);

    async fn look_at(&self, target: Vec3) -> Result<(), WorldError>;

    /// Blocks until the agent is in bed or the server refuses.
    async fn rest(&self, surface: Position) -> Result<(), WorldError>;

    async fn open_container(&self, position: Position) -> Result<ContainerWindow, WorldError>;

    async fn withdraw(
        &self,
        window: &ContainerWindow,
        kind: &ItemKind,
        count: u32,
    ) -> Result<(), WorldError>;

    fn close_container(&self, window: &ContainerWindow);

    fn resolve_recipe(&self, kind: &ItemKind) -> Option<Recipe>;

    /// Run `recipe` `times` times.
    async fn craft(&self, recipe: &Recipe, times: u32) -> Result<(), WorldError>;

    fn chat(&self, message: &str);
}

/// Events the world delivers to a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    Chat { sender: String, message: String },
    /// The agent got out of bed.
    Wake,
    Kicked(String),
    Error(String),
    /// Connection ended.
    End,
    /// Closed locally; do not reconnect.
    Shutdown,
}

/// A live connection: the world handle plus its event stream.
pub struct Connection {
    pub world: Arc<dyn World>,
    pub events: mpsc::UnboundedReceiver<WorldEvent>,
}
