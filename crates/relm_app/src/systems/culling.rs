//! Distance culling around the camera.
//!
//! Props carry a `cullable` component. Each tick, before simulation, every
//! prop within `radius` of the camera is stamped with the current world
//! version and activated. A prop that has not been in range for more than
//! `grace_ticks` versions is deactivated: it keeps its data but drops out of
//! every query, so later systems skip it for free.

use relm_ecs::{Services, System, SystemContext, SystemDescriptor, TypedComponent};
use relm_schema::Schema;
use tracing::debug;

use crate::components::{Cullable, Transform};
use crate::systems::declared;

#[derive(Debug, Clone, Copy)]
pub struct CullingSettings {
    pub radius: f32,
    pub grace_ticks: u64,
}

impl Default for CullingSettings {
    fn default() -> Self {
        Self {
            radius: 25.0,
            grace_ticks: 30,
        }
    }
}

pub struct CameraCullingSystem {
    descriptor: SystemDescriptor,
    settings: CullingSettings,
}

impl CameraCullingSystem {
    pub const NAME: &'static str = "camera_culling";

    pub fn from_schema(schema: &Schema) -> anyhow::Result<Self> {
        Ok(Self {
            descriptor: declared(schema, Self::NAME)?,
            settings: CullingSettings::default(),
        })
    }
}

impl System for CameraCullingSystem {
    fn descriptor(&self) -> SystemDescriptor {
        self.descriptor.clone()
    }

    fn init(&mut self, services: &mut Services) -> anyhow::Result<()> {
        if let Some(settings) = services.get::<CullingSettings>() {
            self.settings = *settings;
        }
        Ok(())
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
        let Some(camera) = ctx.query("cameras")?.first().copied() else {
            return Ok(());
        };
        let Some(eye) = ctx.entities.read::<Transform>(camera)? else {
            return Ok(());
        };

        let version = ctx.version;
        let radius_sq = self.settings.radius * self.settings.radius;
        let mut shown = 0usize;
        let mut hidden = 0usize;

        // Inactive props are invisible to queries, so scan by kind instead.
        for entity in ctx.entities.get_all_by_component(Cullable::kind_id()) {
            let Some(transform) = ctx.entities.read::<Transform>(entity)? else {
                continue;
            };
            let in_range = transform.position.distance_squared(eye.position) <= radius_sq;
            let active = ctx.entities.is_active(entity);

            if in_range {
                ctx.entities
                    .write::<Cullable, _>(entity, |c| c.last_seen = version)?;
                if !active {
                    ctx.entities.activate(entity)?;
                    shown += 1;
                }
            } else if active {
                let last_seen = ctx
                    .entities
                    .read::<Cullable>(entity)?
                    .map_or(0, |c| c.last_seen);
                if version.saturating_sub(last_seen) > self.settings.grace_ticks {
                    ctx.entities.deactivate(entity)?;
                    hidden += 1;
                }
            }
        }

        if shown > 0 || hidden > 0 {
            debug!(version, shown, hidden, "culling changed visibility");
        }
        Ok(())
    }
}
