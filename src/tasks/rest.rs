//! Rest task: find or place a bed, walk next to it, and sleep.

use crate::agent::AgentContext;
use crate::world::{Block, Face, Position};

use super::spatial::{choose_placement_site, find_standing_support};
use super::{sentence, TaskError, TaskOutcome};

pub async fn run(ctx: &AgentContext) -> TaskOutcome {
    match rest(ctx).await {
        Ok(()) => {
            ctx.say("Sleeping...");
            TaskOutcome::Satisfied
        }
        Err(e) => {
            ctx.say(sentence(&e));
            TaskOutcome::Failed(e)
        }
    }
}

async fn rest(ctx: &AgentContext) -> Result<(), TaskError> {
    let bed = match locate_bed(ctx, ctx.tasks.rest_search_radius) {
        Some(bed) => {
            tracing::debug!("Found bed at {}", bed);
            bed
        }
        None => place_bed(ctx).await?,
    };

    ctx.say("Going to bed...");
    approach(ctx, bed).await;

    let world = &*ctx.world;
    world
        .look_at(bed.center())
        .await
        .map_err(|e| TaskError::ActionFailed(format!("could not sleep: {}", e)))?;
    world
        .rest(bed)
        .await
        .map_err(|e| TaskError::ActionFailed(format!("could not sleep: {}", e)))
}

fn locate_bed(ctx: &AgentContext, radius: f64) -> Option<Position> {
    ctx.world
        .find_block(&Block::is_resting_surface, radius)
        .map(|b| b.position)
}

async fn place_bed(ctx: &AgentContext) -> Result<Position, TaskError> {
    let world = &*ctx.world;

    let material = world
        .inventory()
        .into_iter()
        .find(|s| s.kind.is_restable_furniture())
        .ok_or_else(|| TaskError::PreconditionUnmet("no bed nearby or in inventory".to_string()))?;

    let feet = world.position().floored();
    let site = choose_placement_site(world, feet);
    tracing::debug!("Placing {} against {}", material.kind, site);

    let placement_failed =
        |detail: String| TaskError::ActionFailed(format!("placement failed: {}", detail));

    world
        .equip(&material)
        .await
        .map_err(|e| placement_failed(e.to_string()))?;
    world
        .place(site, Face::Up)
        .await
        .map_err(|e| placement_failed(e.to_string()))?;
    ctx.say("Placed a bed.");

    locate_bed(ctx, ctx.tasks.placement_confirm_radius)
        .ok_or_else(|| placement_failed("placed bed not detected".to_string()))
}

/// Walk next to the bed. Best effort: the wait is a fixed grace period and
/// the agent sleeps from wherever it ends up.
async fn approach(ctx: &AgentContext, bed: Position) {
    let world = &*ctx.world;
    match find_standing_support(world, bed) {
        Some(support) => {
            // Goal is the open cell on top of the support, not the support
            // block itself.
            let stand = support.offset(0, 1, 0);
            tracing::debug!("Heading to {} beside the bed", stand);
            world.set_goal(stand);
            world.wait_ticks(ctx.tasks.navigation_wait_ticks).await;
        }
        None => tracing::debug!("No standing spot beside {}, trying from here", bed),
    }
}
