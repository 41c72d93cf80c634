//! Resource collection task.
//!
//! Inventory first, then nearby containers, then crafting. The held count is
//! re-read after every phase and the task stops as soon as the goal is met.

use crate::agent::AgentContext;
use crate::world::{ItemKind, Position, World, WorldError};

use super::container::OpenContainer;
use super::spatial::find_storage;
use super::{sentence, TaskError, TaskOutcome};

pub const USAGE: &str = "collect <count> <item>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectionGoal {
    pub kind: ItemKind,
    pub target: u32,
}

impl CollectionGoal {
    pub fn deficit(&self, current: u32) -> u32 {
        self.target.saturating_sub(current)
    }
}

pub fn parse_goal(world: &dyn World, args: &[String]) -> Result<CollectionGoal, TaskError> {
    let [count, item] = args else {
        return Err(TaskError::UsageError(USAGE.to_string()));
    };

    let target = match count.parse::<u32>() {
        Ok(n) if n > 0 => n,
        _ => {
            return Err(TaskError::UsageError(format!(
                "{} ('{}' is not a positive count)",
                USAGE, count
            )))
        }
    };
    let kind = world.item_kind(item).ok_or_else(|| {
        TaskError::UsageError(format!("{} (unknown item '{}')", USAGE, item))
    })?;

    Ok(CollectionGoal { kind, target })
}

pub async fn run(ctx: &AgentContext, args: &[String]) -> TaskOutcome {
    match parse_goal(&*ctx.world, args) {
        Ok(goal) => collect(ctx, &goal).await,
        Err(e) => {
            ctx.say(sentence(&e));
            TaskOutcome::Failed(e)
        }
    }
}

async fn collect(ctx: &AgentContext, goal: &CollectionGoal) -> TaskOutcome {
    let world = &*ctx.world;
    let kind = &goal.kind;

    let start = world.count(kind);
    tracing::debug!(%kind, held = start, deficit = goal.deficit(start), "collect: start");
    if goal.deficit(start) == 0 {
        ctx.say(format!("Already holding {}/{} {}.", start, goal.target, kind));
        return TaskOutcome::Satisfied;
    }

    search_containers(ctx, goal, goal.deficit(start)).await;

    let current = world.count(kind);
    tracing::debug!(%kind, held = current, deficit = goal.deficit(current), "collect: after containers");
    if goal.deficit(current) == 0 {
        return satisfied(ctx, goal, start, current);
    }

    let Some(recipe) = world.resolve_recipe(kind) else {
        let e = TaskError::PreconditionUnmet("no recipe, insufficient stock".to_string());
        ctx.say(format!(
            "Cannot collect {}: {} (holding {}/{}).",
            kind, e, current, goal.target
        ));
        return TaskOutcome::Failed(e);
    };

    let deficit = goal.deficit(current);
    let times = deficit.div_ceil(recipe.result_count.max(1));
    ctx.say(format!("Crafting {} {}...", deficit, kind));
    if let Err(e) = world.craft(&recipe, times).await {
        let e = TaskError::ActionFailed(format!("crafting failed: {}", e));
        ctx.say(sentence(&e));
        return TaskOutcome::Failed(e);
    }

    let current = world.count(kind);
    tracing::debug!(%kind, held = current, deficit = goal.deficit(current), "collect: after crafting");
    if goal.deficit(current) == 0 {
        return satisfied(ctx, goal, start, current);
    }

    let shortfall = TaskError::PartialSuccess {
        kind: kind.clone(),
        have: current,
        target: goal.target,
    };
    ctx.say(sentence(&shortfall));
    TaskOutcome::PartiallySatisfied(current)
}

fn satisfied(ctx: &AgentContext, goal: &CollectionGoal, start: u32, current: u32) -> TaskOutcome {
    ctx.say(format!(
        "Collected {} {}, now holding {}/{}.",
        current.saturating_sub(start),
        goal.kind,
        current,
        goal.target
    ));
    TaskOutcome::Satisfied
}

/// Withdraw from nearby containers until `deficit` is covered or the
/// containers run out. Returns the amount taken.
async fn search_containers(ctx: &AgentContext, goal: &CollectionGoal, mut deficit: u32) -> u32 {
    let world = &*ctx.world;
    let centre = world.position().floored();
    let containers = find_storage(
        world,
        centre,
        ctx.tasks.container_search_radius,
        ctx.tasks.container_search_height,
    );
    tracing::debug!("Found {} containers around {}", containers.len(), centre);

    let mut taken_total = 0;
    for position in containers {
        if deficit == 0 {
            break;
        }
        match take_from_container(world, position, &goal.kind, deficit).await {
            Ok(0) => {}
            Ok(taken) => {
                deficit -= taken;
                taken_total += taken;
                tracing::debug!(%position, taken, deficit, "collect: withdrew");
                ctx.say(format!(
                    "Took {} {} from the container at {}.",
                    taken, goal.kind, position
                ));
            }
            Err(e) => tracing::warn!("Skipping container at {}: {}", position, e),
        }
    }
    taken_total
}

async fn take_from_container(
    world: &dyn World,
    position: Position,
    kind: &ItemKind,
    deficit: u32,
) -> Result<u32, WorldError> {
    let container = OpenContainer::open(world, position).await?;
    let amount = deficit.min(container.available(kind));
    if amount > 0 {
        container.withdraw(kind, amount).await?;
    }
    Ok(amount)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::config::TaskSettings;
    use crate::world::memory::Action;
    use crate::world::{ItemStack, MemoryWorld, Recipe, Scenario};

    fn context(world: &Arc<MemoryWorld>) -> AgentContext {
        AgentContext::new(world.clone(), "Sleepy", TaskSettings::default())
    }

    fn args(count: &str, item: &str) -> Vec<String> {
        vec![count.to_string(), item.to_string()]
    }

    fn log() -> ItemKind {
        ItemKind::new("oak_log")
    }

    fn withdrawals(world: &MemoryWorld) -> Vec<(Position, u32)> {
        world
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Withdraw { at, count, .. } => Some((at, count)),
                _ => None,
            })
            .collect()
    }

    fn crafts(world: &MemoryWorld) -> Vec<u32> {
        world
            .actions()
            .into_iter()
            .filter_map(|a| match a {
                Action::Craft { times, .. } => Some(times),
                _ => None,
            })
            .collect()
    }

    fn base() -> Scenario {
        Scenario::standing_at(0.5, 64.0, 0.5).with_floor(63, 4, "stone")
    }

    #[tokio::test]
    async fn test_tops_up_from_one_container() {
        let chest = Position::new(2, 64, 0);
        let world = Arc::new(MemoryWorld::new(
            base()
                .with_item("oak_log", 2)
                .with_container(chest, vec![ItemStack::new("oak_log", 4)])
                .with_recipe(Recipe {
                    result: log(),
                    result_count: 1,
                    ingredients: vec![],
                }),
        ));

        let outcome = run(&context(&world), &args("5", "oak_log")).await;

        assert_eq!(outcome, TaskOutcome::Satisfied);
        assert_eq!(withdrawals(&world), vec![(chest, 3)]);
        assert!(crafts(&world).is_empty());
        assert_eq!(world.count(&log()), 5);
        assert_eq!(world.container_contents(chest), vec![ItemStack::new("oak_log", 1)]);
        assert_eq!(
            world.chat_log(),
            vec![
                "Took 3 oak_log from the container at (2, 64, 0).",
                "Collected 3 oak_log, now holding 5/5."
            ]
        );
    }

    #[tokio::test]
    async fn test_crafts_when_nothing_is_stored() {
        let world = Arc::new(MemoryWorld::new(
            base().with_item("cobblestone", 8).with_recipe(Recipe {
                result: ItemKind::new("stone_button"),
                result_count: 1,
                ingredients: vec![ItemStack::new("cobblestone", 1)],
            }),
        ));

        let outcome = run(&context(&world), &args("5", "stone_button")).await;

        assert_eq!(outcome, TaskOutcome::Satisfied);
        assert_eq!(crafts(&world), vec![5]);
        assert_eq!(world.count(&ItemKind::new("stone_button")), 5);
        assert_eq!(
            world.chat_log().last().map(String::as_str),
            Some("Collected 5 stone_button, now holding 5/5.")
        );
    }

    #[tokio::test]
    async fn test_craft_rounds_up_to_whole_batches() {
        let world = Arc::new(MemoryWorld::new(
            base().with_item("oak_log", 1).with_recipe(Recipe {
                result: ItemKind::new("oak_planks"),
                result_count: 4,
                ingredients: vec![ItemStack::new("oak_log", 1)],
            }),
        ));

        let outcome = run(&context(&world), &args("3", "oak_planks")).await;

        assert_eq!(outcome, TaskOutcome::Satisfied);
        assert_eq!(crafts(&world), vec![1]);
        assert_eq!(world.count(&ItemKind::new("oak_planks")), 4);
    }

    #[tokio::test]
    async fn test_satisfied_at_entry_touches_nothing() {
        let world = Arc::new(MemoryWorld::new(
            base()
                .with_item("oak_log", 7)
                .with_container(Position::new(1, 64, 1), vec![ItemStack::new("oak_log", 9)]),
        ));

        let outcome = run(&context(&world), &args("5", "oak_log")).await;

        assert_eq!(outcome, TaskOutcome::Satisfied);
        assert!(world.actions().is_empty());
        assert_eq!(world.chat_log(), vec!["Already holding 7/5 oak_log."]);
    }

    #[tokio::test]
    async fn test_second_identical_call_is_a_no_op() {
        let world = Arc::new(MemoryWorld::new(
            base()
                .with_item("oak_log", 1)
                .with_container(Position::new(-1, 64, 2), vec![ItemStack::new("oak_log", 10)]),
        ));
        let ctx = context(&world);

        assert_eq!(run(&ctx, &args("4", "oak_log")).await, TaskOutcome::Satisfied);
        let after_first = world.mutations();
        assert_eq!(
            after_first,
            vec![Action::Withdraw {
                at: Position::new(-1, 64, 2),
                kind: log(),
                count: 3
            }]
        );

        assert_eq!(run(&ctx, &args("4", "oak_log")).await, TaskOutcome::Satisfied);
        assert_eq!(world.mutations(), after_first);
        assert_eq!(world.count(&log()), 4);
    }

    #[tokio::test]
    async fn test_failed_withdraw_closes_and_moves_on() {
        let bad = Position::new(-2, 64, 0);
        let good = Position::new(2, 64, 0);
        let world = Arc::new(MemoryWorld::new(
            base()
                .with_container(bad, vec![ItemStack::new("oak_log", 5)])
                .with_container(good, vec![ItemStack::new("oak_log", 5)]),
        ));
        world.fail_withdraw_at(bad);

        let outcome = run(&context(&world), &args("5", "oak_log")).await;

        assert_eq!(outcome, TaskOutcome::Satisfied);
        assert_eq!(world.open_window_count(), 0);
        assert_eq!(
            world.actions(),
            vec![
                Action::OpenContainer(bad),
                Action::Withdraw { at: bad, kind: log(), count: 5 },
                Action::CloseContainer(bad),
                Action::OpenContainer(good),
                Action::Withdraw { at: good, kind: log(), count: 5 },
                Action::CloseContainer(good),
            ]
        );
    }

    #[tokio::test]
    async fn test_unopenable_container_is_skipped() {
        let locked = Position::new(-1, 64, 0);
        let open = Position::new(1, 64, 0);
        let world = Arc::new(MemoryWorld::new(
            base()
                .with_container(locked, vec![ItemStack::new("oak_log", 5)])
                .with_container(open, vec![ItemStack::new("oak_log", 2)]),
        ));
        world.fail_open_at(locked);

        let outcome = run(&context(&world), &args("2", "oak_log")).await;

        assert_eq!(outcome, TaskOutcome::Satisfied);
        assert_eq!(withdrawals(&world), vec![(open, 2)]);
    }

    #[tokio::test]
    async fn test_never_takes_more_than_the_deficit() {
        let first = Position::new(-3, 64, 0);
        let second = Position::new(0, 64, 3);
        let third = Position::new(3, 64, 0);
        let world = Arc::new(MemoryWorld::new(
            base()
                .with_container(first, vec![ItemStack::new("oak_log", 4)])
                .with_container(second, vec![ItemStack::new("oak_log", 2), ItemStack::new("oak_log", 2)])
                .with_container(third, vec![ItemStack::new("oak_log", 4)]),
        ));

        let outcome = run(&context(&world), &args("6", "oak_log")).await;

        assert_eq!(outcome, TaskOutcome::Satisfied);
        let taken = withdrawals(&world);
        assert_eq!(taken, vec![(first, 4), (second, 2)]);

        // Running deficit: 6 -> 2 -> 0.
        let mut deficit = 6u32;
        for (_, count) in taken {
            assert!(count <= deficit);
            deficit -= count;
        }
        assert_eq!(deficit, 0);
        assert!(!world.actions().contains(&Action::OpenContainer(third)));
    }

    #[tokio::test]
    async fn test_no_recipe_fails_with_precondition() {
        let world = Arc::new(MemoryWorld::new(
            base()
                .with_item("diamond", 1)
                .with_container(Position::new(1, 64, 0), vec![ItemStack::new("diamond", 1)]),
        ));

        let outcome = run(&context(&world), &args("5", "diamond")).await;

        assert_eq!(
            outcome,
            TaskOutcome::Failed(TaskError::PreconditionUnmet(
                "no recipe, insufficient stock".to_string()
            ))
        );
        assert_eq!(
            world.chat_log().last().map(String::as_str),
            Some("Cannot collect diamond: no recipe, insufficient stock (holding 2/5).")
        );
    }

    #[tokio::test]
    async fn test_refused_craft_stops_the_task() {
        let world = Arc::new(MemoryWorld::new(
            base().with_item("oak_log", 4).with_recipe(Recipe {
                result: ItemKind::new("oak_planks"),
                result_count: 4,
                ingredients: vec![ItemStack::new("oak_log", 1)],
            }),
        ));
        world.fail_craft("no crafting table within reach");

        let outcome = run(&context(&world), &args("8", "oak_planks")).await;

        assert_eq!(
            outcome,
            TaskOutcome::Failed(TaskError::ActionFailed(
                "crafting failed: no crafting table within reach".to_string()
            ))
        );
        assert_eq!(crafts(&world), vec![2]);
        assert_eq!(world.count(&log()), 4);
        assert_eq!(
            world.chat_log(),
            vec![
                "Crafting 8 oak_planks...",
                "Crafting failed: no crafting table within reach"
            ]
        );
    }

    #[tokio::test]
    async fn test_huge_count_fails_cleanly() {
        let world = Arc::new(MemoryWorld::new(
            base().with_item("stone", 4).with_recipe(Recipe {
                result: ItemKind::new("stone_bricks"),
                result_count: 1,
                ingredients: vec![ItemStack::new("stone", 2)],
            }),
        ));

        let outcome = run(&context(&world), &args("4294967295", "stone_bricks")).await;

        assert_eq!(
            outcome,
            TaskOutcome::Failed(TaskError::ActionFailed(
                "crafting failed: cannot craft 4294967295 x stone_bricks: too many".to_string()
            ))
        );
        assert_eq!(world.count(&ItemKind::new("stone")), 4);
    }

    #[tokio::test]
    async fn test_craft_error_is_reported_verbatim() {
        let world = Arc::new(MemoryWorld::new(base().with_recipe(Recipe {
            result: ItemKind::new("torch"),
            result_count: 4,
            ingredients: vec![ItemStack::new("stick", 1), ItemStack::new("coal", 1)],
        })));

        let outcome = run(&context(&world), &args("8", "torch")).await;

        assert_eq!(
            outcome,
            TaskOutcome::Failed(TaskError::ActionFailed(
                "crafting failed: missing ingredient stick: have 0, need 2".to_string()
            ))
        );
        assert_eq!(
            world.chat_log().last().map(String::as_str),
            Some("Crafting failed: missing ingredient stick: have 0, need 2")
        );
    }

    #[tokio::test]
    async fn test_short_craft_is_partial() {
        let world = Arc::new(MemoryWorld::new(
            base().with_item("oak_log", 10).with_recipe(Recipe {
                result: ItemKind::new("oak_planks"),
                result_count: 4,
                ingredients: vec![ItemStack::new("oak_log", 1)],
            }),
        ));
        world.cap_craft_output(6);

        let outcome = run(&context(&world), &args("12", "oak_planks")).await;

        assert_eq!(outcome, TaskOutcome::PartiallySatisfied(6));
        assert_eq!(
            world.chat_log().last().map(String::as_str),
            Some("Only have 6/12 oak_planks, 6 short")
        );
    }

    #[tokio::test]
    async fn test_usage_errors() {
        let world = Arc::new(MemoryWorld::new(base().with_item("oak_log", 1)));
        let ctx = context(&world);

        for bad in [
            vec![],
            vec!["5".to_string()],
            args("five", "oak_log"),
            args("0", "oak_log"),
            args("-2", "oak_log"),
            args("3", "unobtainium"),
        ] {
            let outcome = run(&ctx, &bad).await;
            assert!(
                matches!(outcome, TaskOutcome::Failed(TaskError::UsageError(_))),
                "{bad:?}"
            );
        }
        assert!(world.actions().is_empty());
        assert!(world.chat_log().iter().all(|line| line.starts_with("Usage: collect")));
    }

    #[test]
    fn test_deficit_floors_at_zero() {
        let goal = CollectionGoal {
            kind: log(),
            target: 5,
        };
        assert_eq!(goal.deficit(2), 3);
        assert_eq!(goal.deficit(5), 0);
        assert_eq!(goal.deficit(9), 0);
    }
}
