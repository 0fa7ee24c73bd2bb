//! The world: one entity store, query index, scheduler and service set.

use relm_schema::{ComponentDef, EnumDef, Schema};
use tracing::{debug, info, warn};

use crate::entities::Entities;
use crate::error::EcsError;
use crate::kind::KindId;
use crate::scheduler::Scheduler;
use crate::services::Services;
use crate::system::System;

/// What `update` does when a system's `update` returns an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Stop the tick at the failing system and return `SystemFailed`.
    /// End-of-tick bookkeeping still runs.
    #[default]
    AbortTick,
    /// Log the failure, record it in the report and run the remaining
    /// systems.
    ContinueTick,
}

#[derive(Debug, Clone, Default)]
pub struct WorldConfig {
    pub failure_policy: FailurePolicy,
}

/// Outcome of one `update`.
#[derive(Debug, Clone, Default)]
pub struct TickReport {
    /// World version the tick ran at.
    pub version: u64,
    /// Systems that ran, in order.
    pub ran: Vec<String>,
    /// Systems that failed under [`FailurePolicy::ContinueTick`], with the
    /// error message.
    pub failed: Vec<(String, String)>,
}

impl TickReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct World {
    config: WorldConfig,
    entities: Entities,
    scheduler: Scheduler,
    services: Services,
    initialized: bool,
    version: u64,
}

impl World {
    pub fn new(config: WorldConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    // -- Kinds --

    pub fn register_kind(&mut self, def: ComponentDef) -> Result<KindId, EcsError> {
        self.entities.registry_mut().register_kind(def)
    }

    pub fn register_enum(&mut self, def: EnumDef) -> Result<(), EcsError> {
        self.entities.registry_mut().register_enum(def)
    }

    /// Register every enum and component kind a schema declares.
    pub fn load_schema(&mut self, schema: &Schema) -> Result<Vec<KindId>, EcsError> {
        self.entities.registry_mut().register_schema(schema)
    }

    pub fn kind_of(&self, name: &str) -> Result<KindId, EcsError> {
        self.entities.kind_of(name)
    }

    // -- Systems --

    /// Add a system. On a running world its `init` runs immediately.
    pub fn add_system(&mut self, system: impl System + 'static) -> Result<(), EcsError> {
        self.add_boxed_system(Box::new(system))
    }

    /// A system whose `init` fails on a running world is removed again,
    /// queries included, before the error is returned.
    pub fn add_boxed_system(&mut self, system: Box<dyn System>) -> Result<(), EcsError> {
        let name = system.descriptor().name;
        self.scheduler.add(system, &mut self.entities)?;
        if self.initialized {
            if let Err(err) = self.scheduler.init_pending(&mut self.services) {
                self.scheduler.remove(&name, &mut self.entities)?;
                return Err(err);
            }
        }
        Ok(())
    }

    pub fn remove_system(&mut self, name: &str) -> Result<Box<dyn System>, EcsError> {
        self.scheduler.remove(name, &mut self.entities)
    }

    /// System names in run order.
    pub fn system_names(&mut self) -> Vec<String> {
        self.scheduler.ordered_names()
    }

    // -- Lifecycle --

    /// Hand the world its services and initialize every system.
    pub fn init(&mut self, services: Services) -> Result<(), EcsError> {
        self.services = services;
        self.scheduler.init_pending(&mut self.services)?;
        self.initialized = true;
        info!(
            systems = self.scheduler.len(),
            services = self.services.len(),
            "world initialized"
        );
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Run one tick: every system in order, then close the tick window.
    pub fn update(&mut self, delta: f64) -> Result<TickReport, EcsError> {
        if !self.initialized {
            return Err(EcsError::NotInitialized);
        }
        debug!(version = self.version, delta, "tick start");

        let result = self.scheduler.run(
            &mut self.entities,
            &mut self.services,
            self.version,
            delta,
            self.config.failure_policy,
        );

        self.entities.end_tick();
        self.version += 1;

        if let Ok(report) = &result {
            if !report.is_clean() {
                warn!(version = report.version, failed = report.failed.len(), "tick finished with failures");
            }
        }
        result
    }

    /// Destroy every entity, empty every query and drop every service.
    /// Kinds and systems stay registered; call `init` again before the next
    /// `update`.
    pub fn reset(&mut self) {
        self.entities.clear();
        self.services.clear();
        self.scheduler.reset_initialized();
        self.initialized = false;
        info!(version = self.version, "world reset");
    }

    /// Number of completed updates.
    pub fn version(&self) -> u64 {
        self.version
    }

    // -- Access --

    pub fn entities(&self) -> &Entities {
        &self.entities
    }

    pub fn entities_mut(&mut self) -> &mut Entities {
        &mut self.entities
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    pub fn services_mut(&mut self) -> &mut Services {
        &mut self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::EntityId;
    use crate::query::QuerySpec;
    use crate::system::{Group, SystemContext, SystemDescriptor};
    use relm_schema::TypeExpr;
    use serde_json::{Value, json};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Seen = Rc<RefCell<Vec<(u64, Vec<EntityId>)>>>;

    /// Moves every entity with position + velocity.
    struct Mover {
        offset: i32,
    }

    impl System for Mover {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("mover", Group::Simulation, self.offset)
                .query("moving", QuerySpec::new().with("position").with("velocity"))
        }

        fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
            let pos = ctx.entities.kind_of("position")?;
            let vel = ctx.entities.kind_of("velocity")?;
            let delta = ctx.delta;
            for e in ctx.query("moving")? {
                let dx = ctx
                    .entities
                    .get_component(e, vel)
                    .and_then(|c| c.get_f64("dx"))
                    .unwrap_or(0.0);
                ctx.entities.try_modify(e, pos, |c| {
                    let x = c.get_f64("x").unwrap_or(0.0);
                    c.set("x", json!(x + dx * delta))
                })?;
            }
            Ok(())
        }
    }

    /// Records the members of a Modified(position) query each tick.
    struct Watcher {
        name: &'static str,
        offset: i32,
        seen: Seen,
    }

    impl System for Watcher {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new(self.name, Group::Simulation, self.offset)
                .query("moved", QuerySpec::new().modified("position"))
        }

        fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
            let moved = ctx.query("moved")?;
            self.seen.borrow_mut().push((ctx.version, moved));
            Ok(())
        }
    }

    struct Failing;

    impl System for Failing {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new("failing", Group::Initialization, 0)
        }

        fn update(&mut self, _ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
    }

    fn world(config: WorldConfig) -> World {
        let mut world = World::new(config);
        world
            .register_kind(
                ComponentDef::new("position")
                    .field("x", TypeExpr::prim("f32"))
                    .field("y", TypeExpr::prim("f32")),
            )
            .unwrap();
        world
            .register_kind(
                ComponentDef::new("velocity")
                    .field("dx", TypeExpr::prim("f32"))
                    .field("dy", TypeExpr::prim("f32")),
            )
            .unwrap();
        world
    }

    fn moving_entity(world: &mut World) -> EntityId {
        let entities = world.entities_mut();
        entities
            .spawn()
            .with("position", Value::Null)
            .unwrap()
            .with("velocity", json!({"dx": 2.0}))
            .unwrap()
            .activate()
            .unwrap()
    }

    #[test]
    fn test_update_before_init() {
        let mut world = world(WorldConfig::default());
        assert!(matches!(world.update(0.1), Err(EcsError::NotInitialized)));
    }

    #[test]
    fn test_modified_seen_only_by_later_systems() {
        let mut world = world(WorldConfig::default());
        let before: Seen = Rc::default();
        let after: Seen = Rc::default();
        world.add_system(Mover { offset: 0 }).unwrap();
        world
            .add_system(Watcher {
                name: "before",
                offset: -1,
                seen: before.clone(),
            })
            .unwrap();
        world
            .add_system(Watcher {
                name: "after",
                offset: 1,
                seen: after.clone(),
            })
            .unwrap();
        world.init(Services::new()).unwrap();
        let e1 = moving_entity(&mut world);
        world.update(0.0).unwrap();

        // Version 0 also carries the add's stamp; only version 1 isolates
        // the mover's mark.
        before.borrow_mut().clear();
        after.borrow_mut().clear();
        world.update(0.5).unwrap();

        assert_eq!(*before.borrow(), vec![(1, vec![])]);
        assert_eq!(*after.borrow(), vec![(1, vec![e1])]);

        let pos = world.kind_of("position").unwrap();
        let x = world
            .entities()
            .get_component(e1, pos)
            .and_then(|c| c.get_f64("x"))
            .unwrap();
        assert_eq!(x, 1.0);
    }

    #[test]
    fn test_modified_clears_between_ticks() {
        let mut world = world(WorldConfig::default());
        let seen: Seen = Rc::default();
        world
            .add_system(Watcher {
                name: "watch",
                offset: 0,
                seen: seen.clone(),
            })
            .unwrap();
        world.init(Services::new()).unwrap();
        let e = moving_entity(&mut world);

        world.update(0.1).unwrap();
        world.update(0.1).unwrap();
        let pos = world.kind_of("position").unwrap();
        world.entities_mut().mark_modified(e, pos).unwrap();
        world.update(0.1).unwrap();

        assert_eq!(
            *seen.borrow(),
            vec![(0, vec![e]), (1, vec![]), (2, vec![e])]
        );
    }

    #[test]
    fn test_mid_tick_deactivation_visible_to_later_systems() {
        struct Hider;
        impl System for Hider {
            fn descriptor(&self) -> SystemDescriptor {
                SystemDescriptor::new("hider", Group::Initialization, 0)
                    .query("moving", QuerySpec::new().with("velocity"))
            }
            fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
                for e in ctx.query("moving")? {
                    ctx.entities.deactivate(e)?;
                }
                Ok(())
            }
        }

        struct Counter(Rc<RefCell<Vec<usize>>>);
        impl System for Counter {
            fn descriptor(&self) -> SystemDescriptor {
                SystemDescriptor::new("counter", Group::Presentation, 0)
                    .query("moving", QuerySpec::new().with("velocity"))
            }
            fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
                self.0.borrow_mut().push(ctx.query_len("moving")?);
                Ok(())
            }
        }

        let mut world = world(WorldConfig::default());
        let counts = Rc::new(RefCell::new(Vec::new()));
        world.add_system(Counter(counts.clone())).unwrap();
        world.add_system(Hider).unwrap();
        world.init(Services::new()).unwrap();
        let e = moving_entity(&mut world);

        world.update(0.1).unwrap();
        assert_eq!(*counts.borrow(), vec![0]);
        assert!(!world.entities().is_active(e));
        assert!(world.entities().get_by_id(e).is_some());
    }

    #[test]
    fn test_abort_policy_still_closes_tick() {
        let mut world = world(WorldConfig::default());
        let seen: Seen = Rc::default();
        world.add_system(Failing).unwrap();
        world
            .add_system(Watcher {
                name: "watch",
                offset: 0,
                seen: seen.clone(),
            })
            .unwrap();
        world.init(Services::new()).unwrap();

        let err = world.update(0.1).unwrap_err();
        assert!(matches!(err, EcsError::SystemFailed { ref system, .. } if system == "failing"));
        assert!(err.to_string().contains("boom"));
        assert!(seen.borrow().is_empty());
        assert_eq!(world.version(), 1);
    }

    #[test]
    fn test_continue_policy_reports_failures() {
        let mut world = world(WorldConfig {
            failure_policy: FailurePolicy::ContinueTick,
        });
        let seen: Seen = Rc::default();
        world.add_system(Failing).unwrap();
        world
            .add_system(Watcher {
                name: "watch",
                offset: 0,
                seen: seen.clone(),
            })
            .unwrap();
        world.init(Services::new()).unwrap();

        let report = world.update(0.1).unwrap();
        assert_eq!(report.ran, vec!["failing", "watch"]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "failing");
        assert!(!report.is_clean());
        assert_eq!(seen.borrow().len(), 1);
    }

    #[test]
    fn test_add_system_to_running_world_inits_it() {
        struct NeedsGravity(Rc<RefCell<Option<f32>>>);
        struct Gravity(f32);
        impl System for NeedsGravity {
            fn descriptor(&self) -> SystemDescriptor {
                SystemDescriptor::new("gravity", Group::Simulation, 0)
            }
            fn init(&mut self, services: &mut Services) -> anyhow::Result<()> {
                *self.0.borrow_mut() = Some(services.require::<Gravity>()?.0);
                Ok(())
            }
            fn update(&mut self, _ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let mut world = world(WorldConfig::default());
        world.init(Services::new().with(Gravity(9.8))).unwrap();
        let slot = Rc::new(RefCell::new(None));
        world.add_system(NeedsGravity(slot.clone())).unwrap();
        assert_eq!(*slot.borrow(), Some(9.8));

        world.reset();
        assert!(matches!(
            world.init(Services::new()),
            Err(EcsError::SystemFailed { ref system, .. }) if system == "gravity"
        ));
    }

    #[test]
    fn test_failed_init_on_running_world_unregisters_system() {
        struct BadInit(Rc<RefCell<u32>>);
        impl System for BadInit {
            fn descriptor(&self) -> SystemDescriptor {
                SystemDescriptor::new("bad_init", Group::Simulation, 0)
                    .query("moving", QuerySpec::new().with("velocity"))
            }
            fn init(&mut self, _services: &mut Services) -> anyhow::Result<()> {
                anyhow::bail!("init failed")
            }
            fn update(&mut self, _ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
                *self.0.borrow_mut() += 1;
                Ok(())
            }
        }

        let mut world = world(WorldConfig::default());
        world.init(Services::new()).unwrap();
        let updates = Rc::new(RefCell::new(0));
        assert!(matches!(
            world.add_system(BadInit(updates.clone())),
            Err(EcsError::SystemFailed { ref system, .. }) if system == "bad_init"
        ));
        assert!(world.system_names().is_empty());
        assert_eq!(world.entities.index.len(), 0);

        world.update(0.1).unwrap();
        assert_eq!(*updates.borrow(), 0);
    }

    #[test]
    fn test_reset_keeps_kinds_and_systems() {
        let mut world = world(WorldConfig::default());
        let seen: Seen = Rc::default();
        world
            .add_system(Watcher {
                name: "watch",
                offset: 0,
                seen: seen.clone(),
            })
            .unwrap();
        world.init(Services::new().with(5u32)).unwrap();
        let old = moving_entity(&mut world);
        world.update(0.1).unwrap();

        world.reset();
        assert!(world.entities().is_empty());
        assert!(world.services().is_empty());
        assert!(!world.entities().contains(old));
        assert!(matches!(world.update(0.1), Err(EcsError::NotInitialized)));

        world.init(Services::new()).unwrap();
        assert!(world.kind_of("position").is_ok());
        let fresh = moving_entity(&mut world);
        world.update(0.1).unwrap();
        assert_eq!(seen.borrow().last(), Some(&(1, vec![fresh])));
    }

    #[test]
    fn test_remove_system_at_runtime() {
        let mut world = world(WorldConfig::default());
        world.add_system(Mover { offset: 0 }).unwrap();
        world.add_system(Failing).unwrap();
        world.init(Services::new()).unwrap();
        world.remove_system("failing").unwrap();
        assert_eq!(world.system_names(), vec!["mover"]);
        assert!(world.update(0.1).unwrap().is_clean());
    }

    #[test]
    fn test_load_schema_and_declared_system() {
        let mut schema = Schema::new();
        schema
            .load_source(
                r#"
            package test:world
            component transform { x: f32 }
            component collider {}
            component collider_ref {}
            system collider {
                group: presentation,
                offset: 301,
                query added { require: [collider], exclude: [collider_ref] }
            }
        "#,
            )
            .unwrap();
        let mut world = World::default();
        let kinds = world.load_schema(&schema).unwrap();
        assert_eq!(kinds.len(), 3);

        let desc = crate::system::SystemDescriptor::from_def(
            schema.get_system("collider").unwrap(),
        )
        .unwrap();
        assert_eq!(desc.order.group, Group::Presentation);
        let id = world.entities_mut().register_query(&desc.queries[0].1).unwrap();
        let e = world.entities_mut().create();
        world.entities_mut().add(e, "collider", Value::Null).unwrap();
        assert!(world.entities().members(id).unwrap().contains(&e));
    }
}
