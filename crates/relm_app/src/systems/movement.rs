//! Integrates velocity into position.

use relm_ecs::{System, SystemContext, SystemDescriptor};
use relm_schema::Schema;

use crate::components::{Transform, Velocity};
use crate::systems::declared;

pub struct MovementSystem {
    descriptor: SystemDescriptor,
}

impl MovementSystem {
    pub const NAME: &'static str = "movement";

    pub fn from_schema(schema: &Schema) -> anyhow::Result<Self> {
        Ok(Self {
            descriptor: declared(schema, Self::NAME)?,
        })
    }
}

impl System for MovementSystem {
    fn descriptor(&self) -> SystemDescriptor {
        self.descriptor.clone()
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
        let dt = ctx.delta as f32;
        for entity in ctx.query("moving")? {
            let Some(velocity) = ctx.entities.read::<Velocity>(entity)? else {
                continue;
            };
            if velocity.linear == glam::Vec3::ZERO {
                continue;
            }
            ctx.entities
                .write::<Transform, _>(entity, |t| t.position += velocity.linear * dt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_bundled_schema;
    use crate::systems::test_support;
    use glam::Vec3;
    use relm_ecs::{QuerySpec, Services};

    #[test]
    fn test_moves_and_marks_transform() {
        let schema = load_bundled_schema().unwrap();
        let mut world = test_support::world();
        world
            .add_system(MovementSystem::from_schema(&schema).unwrap())
            .unwrap();
        let moved = world
            .entities_mut()
            .register_query(&QuerySpec::new().modified("transform"))
            .unwrap();

        let entities = world.entities_mut();
        let runner = entities
            .spawn()
            .with_typed(&Transform::default())
            .unwrap()
            .with_typed(&Velocity {
                linear: Vec3::new(2.0, 0.0, -1.0),
            })
            .unwrap()
            .activate()
            .unwrap();
        let still = entities
            .spawn()
            .with_typed(&Transform::default())
            .unwrap()
            .with_typed(&Velocity { linear: Vec3::ZERO })
            .unwrap()
            .activate()
            .unwrap();

        let mut world = test_support::started(world, Services::new());
        // Spawning stamped both transforms; let that window pass.
        world.update(0.0).unwrap();
        world.update(0.5).unwrap();

        let t = world.entities().read::<Transform>(runner).unwrap().unwrap();
        assert_eq!(t.position, Vec3::new(1.0, 0.0, -0.5));
        let t = world.entities().read::<Transform>(still).unwrap().unwrap();
        assert_eq!(t.position, Vec3::ZERO);
        // The window closed at the end of the update.
        assert!(world.entities().members(moved).unwrap().is_empty());
    }

    #[test]
    fn test_inactive_entities_do_not_move() {
        let schema = load_bundled_schema().unwrap();
        let mut world = test_support::world();
        world
            .add_system(MovementSystem::from_schema(&schema).unwrap())
            .unwrap();
        let e = world
            .entities_mut()
            .spawn()
            .with_typed(&Transform::default())
            .unwrap()
            .with_typed(&Velocity { linear: Vec3::X })
            .unwrap()
            .build();

        let mut world = test_support::started(world, Services::new());
        world.update(1.0).unwrap();
        let t = world.entities().read::<Transform>(e).unwrap().unwrap();
        assert_eq!(t.position, Vec3::ZERO);
    }

    #[test]
    fn test_missing_declaration() {
        let schema = Schema::new();
        assert!(MovementSystem::from_schema(&schema).is_err());
    }
}
