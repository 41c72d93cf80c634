//! In-memory world.
//!
//! Deterministic stand-in for a live server: blocks in a sorted map, an agent
//! inventory, chests with contents, and a recipe book. Every action is
//! recorded so callers can check what the agent did, and individual actions
//! can be made to fail the way a server would refuse them.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::{
    total_of, Block, ContainerWindow, Face, ItemKind, ItemStack, Position, Recipe, Vec3, World,
    WorldError,
};
use crate::error;

/// How close the agent must be to a bed for the server to accept it.
const REST_REACH: f64 = 3.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioBlock {
    pub at: Position,
    pub name: String,
    #[serde(default = "default_solid")]
    pub solid: bool,
}

fn default_solid() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ScenarioContainer {
    pub at: Position,
    #[serde(default = "default_container_name")]
    pub name: String,
    #[serde(default)]
    pub stacks: Vec<ItemStack>,
}

fn default_container_name() -> String {
    "chest".to_string()
}

/// Initial world state.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "kebab-case", default)]
pub struct Scenario {
    pub position: Vec3,
    pub blocks: Vec<ScenarioBlock>,
    pub inventory: Vec<ItemStack>,
    pub containers: Vec<ScenarioContainer>,
    pub recipes: Vec<Recipe>,
    /// Extra registry names beyond those mentioned elsewhere.
    pub known_items: Vec<String>,
    pub daytime: bool,
    /// Real time per game tick. Zero makes waits instant.
    pub tick_ms: u64,
}

impl Scenario {
    pub fn load(path: &Path) -> error::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn standing_at(x: f64, y: f64, z: f64) -> Self {
        Self {
            position: Vec3::new(x, y, z),
            ..Self::default()
        }
    }

    /// Square of solid blocks at height `y`.
    pub fn with_floor(mut self, y: i32, radius: i32, name: &str) -> Self {
        for x in -radius..=radius {
            for z in -radius..=radius {
                self = self.with_block(Position::new(x, y, z), name, true);
            }
        }
        self
    }

    /// Set a block, replacing whatever was there.
    pub fn with_block(mut self, at: Position, name: &str, solid: bool) -> Self {
        self.blocks.retain(|b| b.at != at);
        self.blocks.push(ScenarioBlock {
            at,
            name: name.to_string(),
            solid,
        });
        self
    }

    pub fn with_item(mut self, name: &str, count: u32) -> Self {
        self.inventory.push(ItemStack::new(name, count));
        self
    }

    pub fn with_container(mut self, at: Position, stacks: Vec<ItemStack>) -> Self {
        self.containers.push(ScenarioContainer {
            at,
            name: default_container_name(),
            stacks,
        });
        self
    }

    pub fn with_recipe(mut self, recipe: Recipe) -> Self {
        self.recipes.push(recipe);
        self
    }

    pub fn with_known_item(mut self, name: &str) -> Self {
        self.known_items.push(name.to_string());
        self
    }

    /// Built-in demo: a stone platform, a bed in the pack, a chest of logs and
    /// a planks recipe.
    pub fn demo() -> Self {
        Self::standing_at(0.5, 64.0, 0.5)
            .with_floor(63, 6, "stone")
            .with_item("red_bed", 1)
            .with_item("oak_planks", 2)
            .with_container(Position::new(3, 64, 0), vec![ItemStack::new("oak_log", 6)])
            .with_recipe(Recipe {
                result: ItemKind::new("oak_planks"),
                result_count: 4,
                ingredients: vec![ItemStack::new("oak_log", 1)],
            })
            .with_recipe(Recipe {
                result: ItemKind::new("stick"),
                result_count: 4,
                ingredients: vec![ItemStack::new("oak_planks", 2)],
            })
            .with_known_item("torch")
    }
}

/// One recorded world action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Equip(ItemKind),
    Place { reference: Position, face: Face },
    SetGoal(Position),
    Rest(Position),
    OpenContainer(Position),
    Withdraw { at: Position, kind: ItemKind, count: u32 },
    CloseContainer(Position),
    Craft { result: ItemKind, times: u32 },
}

impl Action {
    /// Whether the action changes inventory or blocks.
    pub fn is_mutation(&self) -> bool {
        matches!(
            self,
            Action::Equip(_) | Action::Place { .. } | Action::Withdraw { .. } | Action::Craft { .. }
        )
    }
}

#[derive(Debug, Default)]
struct Failures {
    equip: Option<String>,
    place: Option<String>,
    rest: Option<String>,
    craft: Option<String>,
    open: BTreeSet<Position>,
    withdraw: BTreeSet<Position>,
    craft_output_cap: Option<u32>,
}

#[derive(Debug)]
struct State {
    position: Vec3,
    blocks: BTreeMap<Position, Block>,
    inventory: Vec<ItemStack>,
    containers: BTreeMap<Position, Vec<ItemStack>>,
    recipes: Vec<Recipe>,
    known: BTreeSet<String>,
    daytime: bool,
    goal: Option<Position>,
    held: Option<ItemKind>,
    open_windows: HashMap<u64, Position>,
    next_window: u64,
    chat: Vec<String>,
    actions: Vec<Action>,
    failures: Failures,
}

impl State {
    /// Refuses, leaving the inventory untouched, when the held total would
    /// overflow.
    fn add_item(&mut self, kind: &ItemKind, count: u32) -> Result<(), WorldError> {
        if count == 0 {
            return Ok(());
        }
        if total_of(&self.inventory, kind).checked_add(count).is_none() {
            return Err(WorldError::action(format!("no room for {} more {}", count, kind)));
        }
        match self.inventory.iter_mut().find(|s| &s.kind == kind) {
            Some(stack) => stack.count += count,
            None => self.inventory.push(ItemStack {
                kind: kind.clone(),
                count,
            }),
        }
        Ok(())
    }
}

/// Take `count` of `kind` out of `stacks`; caller checks availability first.
fn take_from(stacks: &mut Vec<ItemStack>, kind: &ItemKind, mut count: u32) {
    for stack in stacks.iter_mut().filter(|s| &s.kind == kind) {
        let taken = stack.count.min(count);
        stack.count -= taken;
        count -= taken;
        if count == 0 {
            break;
        }
    }
    stacks.retain(|s| s.count > 0);
}

pub struct MemoryWorld {
    state: Mutex<State>,
    tick: Duration,
    outbox: Option<mpsc::UnboundedSender<String>>,
}

impl MemoryWorld {
    pub fn new(scenario: Scenario) -> Self {
        let mut known: BTreeSet<String> = scenario.known_items.iter().cloned().collect();
        let mut blocks = BTreeMap::new();
        let mut containers = BTreeMap::new();

        for block in scenario.blocks {
            known.insert(block.name.clone());
            blocks.insert(
                block.at,
                Block {
                    position: block.at,
                    name: block.name,
                    solid: block.solid,
                },
            );
        }
        for container in scenario.containers {
            known.insert(container.name.clone());
            for stack in &container.stacks {
                known.insert(stack.kind.as_str().to_string());
            }
            blocks.insert(
                container.at,
                Block {
                    position: container.at,
                    name: container.name,
                    solid: true,
                },
            );
            containers.insert(container.at, container.stacks);
        }
        for stack in &scenario.inventory {
            known.insert(stack.kind.as_str().to_string());
        }
        for recipe in &scenario.recipes {
            known.insert(recipe.result.as_str().to_string());
            for stack in &recipe.ingredients {
                known.insert(stack.kind.as_str().to_string());
            }
        }

        Self {
            state: Mutex::new(State {
                position: scenario.position,
                blocks,
                inventory: scenario.inventory,
                containers,
                recipes: scenario.recipes,
                known,
                daytime: scenario.daytime,
                goal: None,
                held: None,
                open_windows: HashMap::new(),
                next_window: 1,
                chat: Vec::new(),
                actions: Vec::new(),
                failures: Failures::default(),
            }),
            tick: Duration::from_millis(scenario.tick_ms),
            outbox: None,
        }
    }

    /// Forward every chat line the agent sends to `outbox`.
    pub fn with_outbox(mut self, outbox: mpsc::UnboundedSender<String>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn set_daytime(&self, daytime: bool) {
        self.state().daytime = daytime;
    }

    pub fn fail_equip(&self, message: &str) {
        self.state().failures.equip = Some(message.to_string());
    }

    pub fn fail_place(&self, message: &str) {
        self.state().failures.place = Some(message.to_string());
    }

    pub fn fail_rest(&self, message: &str) {
        self.state().failures.rest = Some(message.to_string());
    }

    pub fn fail_craft(&self, message: &str) {
        self.state().failures.craft = Some(message.to_string());
    }

    /// Room for at most `items` crafted items; the rest of a craft is lost.
    pub fn cap_craft_output(&self, items: u32) {
        self.state().failures.craft_output_cap = Some(items);
    }

    pub fn fail_open_at(&self, at: Position) {
        self.state().failures.open.insert(at);
    }

    pub fn fail_withdraw_at(&self, at: Position) {
        self.state().failures.withdraw.insert(at);
    }

    pub fn chat_log(&self) -> Vec<String> {
        self.state().chat.clone()
    }

    pub fn actions(&self) -> Vec<Action> {
        self.state().actions.clone()
    }

    pub fn mutations(&self) -> Vec<Action> {
        self.state()
            .actions
            .iter()
            .filter(|a| a.is_mutation())
            .cloned()
            .collect()
    }

    pub fn open_window_count(&self) -> usize {
        self.state().open_windows.len()
    }

    pub fn container_contents(&self, at: Position) -> Vec<ItemStack> {
        self.state().containers.get(&at).cloned().unwrap_or_default()
    }

    pub fn goal(&self) -> Option<Position> {
        self.state().goal
    }
}

#[async_trait]
impl World for MemoryWorld {
    fn position(&self) -> Vec3 {
        self.state().position
    }

    fn block_at(&self, position: Position) -> Option<Block> {
        self.state().blocks.get(&position).cloned()
    }

    fn find_block(&self, matching: &dyn Fn(&Block) -> bool, max_distance: f64) -> Option<Block> {
        let state = self.state();
        let origin = state.position;
        state
            .blocks
            .values()
            .filter(|b| b.position.center().distance_to(origin) <= max_distance)
            .find(|b| matching(b))
            .cloned()
    }

    fn inventory(&self) -> Vec<ItemStack> {
        self.state().inventory.clone()
    }

    fn item_kind(&self, name: &str) -> Option<ItemKind> {
        let name = name.trim().to_lowercase();
        let name = name.strip_prefix("minecraft:").unwrap_or(&name);
        self.state()
            .known
            .contains(name)
            .then(|| ItemKind::new(name))
    }

    async fn equip(&self, stack: &ItemStack) -> Result<(), WorldError> {
        let mut state = self.state();
        state.actions.push(Action::Equip(stack.kind.clone()));
        if let Some(message) = state.failures.equip.clone() {
            return Err(WorldError::Action(message));
        }
        if total_of(&state.inventory, &stack.kind) == 0 {
            return Err(WorldError::action(format!("no {} in inventory", stack.kind)));
        }
        state.held = Some(stack.kind.clone());
        Ok(())
    }

    async fn place(&self, reference: Position, face: Face) -> Result<(), WorldError> {
        let mut state = self.state();
        state.actions.push(Action::Place { reference, face });
        if let Some(message) = state.failures.place.clone() {
            return Err(WorldError::Action(message));
        }

        let held = state
            .held
            .clone()
            .ok_or_else(|| WorldError::action("must be holding an item to place"))?;
        if total_of(&state.inventory, &held) == 0 {
            return Err(WorldError::action(format!("no {} left to place", held)));
        }
        match state.blocks.get(&reference) {
            Some(block) if block.solid => {}
            _ => {
                return Err(WorldError::action(format!(
                    "no solid block to place against at {}",
                    reference
                )))
            }
        }

        let (dx, dy, dz) = face.offset();
        let target = reference.offset(dx, dy, dz);
        if state.blocks.contains_key(&target) {
            return Err(WorldError::action(format!("placement blocked at {}", target)));
        }

        take_from(&mut state.inventory, &held, 1);
        state.blocks.insert(
            target,
            Block {
                position: target,
                name: held.as_str().to_string(),
                solid: !held.is_restable_furniture(),
            },
        );
        Ok(())
    }

    fn set_goal(&self, goal: Position) {
        let mut state = self.state();
        state.actions.push(Action::SetGoal(goal));
        state.goal = Some(goal);
    }

    async fn wait_ticks(&self, ticks: u32) {
        if !self.tick.is_zero() {
            tokio::time::sleep(self.tick * ticks).await;
        }
        // The pathfinder gets there while we wait.
        let mut state = self.state();
        if let Some(goal) = state.goal.take() {
            state.position = goal.feet();
        }
    }

    async fn look_at(&self, _target: Vec3) -> Result<(), WorldError> {
        Ok(())
    }

    async fn rest(&self, surface: Position) -> Result<(), WorldError> {
        let mut state = self.state();
        state.actions.push(Action::Rest(surface));
        if let Some(message) = state.failures.rest.clone() {
            return Err(WorldError::Action(message));
        }
        if state.daytime {
            return Err(WorldError::action(
                "it's not night and it's not a thunderstorm",
            ));
        }
        match state.blocks.get(&surface) {
            Some(block) if block.is_resting_surface() => {}
            _ => return Err(WorldError::action("wrong block : not a bed block")),
        }
        if surface.center().distance_to(state.position) > REST_REACH {
            return Err(WorldError::action("the bed is too far"));
        }
        Ok(())
    }

    async fn open_container(&self, position: Position) -> Result<ContainerWindow, WorldError> {
        let mut state = self.state();
        state.actions.push(Action::OpenContainer(position));
        if state.failures.open.contains(&position) {
            return Err(WorldError::action(format!(
                "could not open the container at {}",
                position
            )));
        }
        let stacks = state
            .containers
            .get(&position)
            .cloned()
            .ok_or_else(|| WorldError::action(format!("no container at {}", position)))?;

        let id = state.next_window;
        state.next_window += 1;
        state.open_windows.insert(id, position);
        Ok(ContainerWindow {
            id,
            position,
            stacks,
        })
    }

    async fn withdraw(
        &self,
        window: &ContainerWindow,
        kind: &ItemKind,
        count: u32,
    ) -> Result<(), WorldError> {
        let mut state = self.state();
        state.actions.push(Action::Withdraw {
            at: window.position,
            kind: kind.clone(),
            count,
        });
        if !state.open_windows.contains_key(&window.id) {
            return Err(WorldError::action("window is not open"));
        }
        if state.failures.withdraw.contains(&window.position) {
            return Err(WorldError::action(format!(
                "withdraw from {} was rejected",
                window.position
            )));
        }

        let available = state
            .containers
            .get(&window.position)
            .map(|stacks| total_of(stacks, kind))
            .ok_or_else(|| WorldError::action(format!("no container at {}", window.position)))?;
        if available < count {
            return Err(WorldError::action(format!(
                "only {} {} available, asked for {}",
                available, kind, count
            )));
        }
        state.add_item(kind, count)?;
        if let Some(stacks) = state.containers.get_mut(&window.position) {
            take_from(stacks, kind, count);
        }
        Ok(())
    }

    fn close_container(&self, window: &ContainerWindow) {
        let mut state = self.state();
        state.actions.push(Action::CloseContainer(window.position));
        state.open_windows.remove(&window.id);
    }

    fn resolve_recipe(&self, kind: &ItemKind) -> Option<Recipe> {
        self.state()
            .recipes
            .iter()
            .find(|r| &r.result == kind)
            .cloned()
    }

    async fn craft(&self, recipe: &Recipe, times: u32) -> Result<(), WorldError> {
        let mut state = self.state();
        state.actions.push(Action::Craft {
            result: recipe.result.clone(),
            times,
        });
        if let Some(message) = state.failures.craft.clone() {
            return Err(WorldError::Action(message));
        }

        let too_many = || {
            WorldError::action(format!("cannot craft {} x {}: too many", times, recipe.result))
        };

        let mut needs = Vec::with_capacity(recipe.ingredients.len());
        for ingredient in &recipe.ingredients {
            let needed = ingredient.count.checked_mul(times).ok_or_else(too_many)?;
            let held = total_of(&state.inventory, &ingredient.kind);
            if held < needed {
                return Err(WorldError::action(format!(
                    "missing ingredient {}: have {}, need {}",
                    ingredient.kind, held, needed
                )));
            }
            needs.push((&ingredient.kind, needed));
        }

        let produced = recipe.result_count.checked_mul(times).ok_or_else(too_many)?;
        let kept = state
            .failures
            .craft_output_cap
            .map_or(produced, |cap| produced.min(cap));
        if total_of(&state.inventory, &recipe.result)
            .checked_add(kept)
            .is_none()
        {
            return Err(too_many());
        }

        for (kind, needed) in needs {
            take_from(&mut state.inventory, kind, needed);
        }
        state.add_item(&recipe.result, kept)
    }

    fn chat(&self, message: &str) {
        tracing::info!(target: "bunkbot::chat", "{}", message);
        self.state().chat.push(message.to_string());
        if let Some(outbox) = &self.outbox {
            let _ = outbox.send(message.to_string());
        }
    }
}
