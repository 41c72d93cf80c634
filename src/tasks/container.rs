//! Scoped container access.

use crate::world::{ContainerWindow, ItemKind, Position, World, WorldError};

/// An open container. Closed when dropped, on every exit path.
pub struct OpenContainer<'a> {
    world: &'a dyn World,
    window: ContainerWindow,
}

impl<'a> OpenContainer<'a> {
    pub async fn open(world: &'a dyn World, position: Position) -> Result<Self, WorldError> {
        let window = world.open_container(position).await?;
        tracing::debug!("Opened container at {}", position);
        Ok(Self { world, window })
    }

    pub fn position(&self) -> Position {
        self.window.position
    }

    pub fn available(&self, kind: &ItemKind) -> u32 {
        self.window.available(kind)
    }

    pub async fn withdraw(&self, kind: &ItemKind, count: u32) -> Result<(), WorldError> {
        self.world.withdraw(&self.window, kind, count).await
    }
}

impl Drop for OpenContainer<'_> {
    fn drop(&mut self) {
        self.world.close_container(&self.window);
        tracing::debug!("Closed container at {}", self.window.position);
    }
}
