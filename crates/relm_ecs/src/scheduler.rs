//! System scheduler: run order and per-tick execution.
//!
//! Systems run strictly one after another, sorted by (group, offset) with
//! ties broken by registration sequence. The sorted order is cached and
//! recomputed whenever the system set changes.

use std::collections::HashMap;
use tracing::{debug, error, info};

use crate::entities::Entities;
use crate::error::EcsError;
use crate::index::QueryId;
use crate::services::Services;
use crate::system::{System, SystemContext, SystemOrder};
use crate::world::{FailurePolicy, TickReport};

struct SystemEntry {
    name: String,
    order: SystemOrder,
    seq: u64,
    system: Box<dyn System>,
    queries: HashMap<String, QueryId>,
    initialized: bool,
}

#[derive(Default)]
pub struct Scheduler {
    entries: Vec<SystemEntry>,
    /// Indices into `entries`, in run order.
    order: Vec<usize>,
    order_dirty: bool,
    next_seq: u64,
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("systems", &self.entries.iter().map(|e| &e.name).collect::<Vec<_>>())
            .finish()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a system and its queries.
    pub fn add(&mut self, system: Box<dyn System>, entities: &mut Entities) -> Result<(), EcsError> {
        let desc = system.descriptor();
        if self.entries.iter().any(|e| e.name == desc.name) {
            return Err(EcsError::DuplicateSystem(desc.name));
        }

        // Compile everything before registering anything.
        let mut compiled = Vec::with_capacity(desc.queries.len());
        for (name, spec) in &desc.queries {
            if compiled.iter().any(|(n, _)| n == name) {
                return Err(EcsError::InvalidQuerySpec(format!(
                    "system '{}' declares query '{name}' twice",
                    desc.name
                )));
            }
            compiled.push((name.clone(), spec.compile(entities.registry())?));
        }
        let queries = compiled
            .into_iter()
            .map(|(name, q)| (name, entities.index.insert(q, &entities.store)))
            .collect();

        info!(system = %desc.name, order = %desc.order, queries = desc.queries.len(), "registered system");
        self.entries.push(SystemEntry {
            name: desc.name,
            order: desc.order,
            seq: self.next_seq,
            system,
            queries,
            initialized: false,
        });
        self.next_seq += 1;
        self.order_dirty = true;
        Ok(())
    }

    /// Unregister a system and release its queries.
    pub fn remove(&mut self, name: &str, entities: &mut Entities) -> Result<Box<dyn System>, EcsError> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.name == name)
            .ok_or_else(|| EcsError::UnknownSystem(name.to_string()))?;
        let entry = self.entries.remove(pos);
        for id in entry.queries.values() {
            entities.unregister_query(*id);
        }
        self.order_dirty = true;
        info!(system = %name, "removed system");
        Ok(entry.system)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn recompute_order(&mut self) {
        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&i| (self.entries[i].order, self.entries[i].seq));
        self.order = order;
        self.order_dirty = false;
        debug!(
            order = ?self.order.iter().map(|&i| self.entries[i].name.as_str()).collect::<Vec<_>>(),
            "recomputed system order"
        );
    }

    /// System names in run order.
    pub fn ordered_names(&mut self) -> Vec<String> {
        if self.order_dirty {
            self.recompute_order();
        }
        self.order.iter().map(|&i| self.entries[i].name.clone()).collect()
    }

    /// Run `init` on every system that has not been initialized yet.
    pub fn init_pending(&mut self, services: &mut Services) -> Result<(), EcsError> {
        if self.order_dirty {
            self.recompute_order();
        }
        for &i in &self.order {
            let entry = &mut self.entries[i];
            if entry.initialized {
                continue;
            }
            entry
                .system
                .init(services)
                .map_err(|err| EcsError::system_failed(&entry.name, err))?;
            entry.initialized = true;
            debug!(system = %entry.name, "initialized system");
        }
        Ok(())
    }

    /// Forget that systems were initialized; the next `init_pending` runs
    /// every `init` again.
    pub fn reset_initialized(&mut self) {
        for entry in &mut self.entries {
            entry.initialized = false;
        }
    }

    /// Run every system once, in order.
    pub(crate) fn run(
        &mut self,
        entities: &mut Entities,
        services: &mut Services,
        version: u64,
        delta: f64,
        policy: FailurePolicy,
    ) -> Result<TickReport, EcsError> {
        if self.order_dirty {
            self.recompute_order();
        }

        let mut report = TickReport {
            version,
            ..TickReport::default()
        };
        for &i in &self.order {
            let entry = &mut self.entries[i];
            let mut ctx = SystemContext {
                version,
                delta,
                entities: &mut *entities,
                services: &mut *services,
                system: &entry.name,
                queries: &entry.queries,
            };
            let result = entry.system.update(&mut ctx);
            report.ran.push(entry.name.clone());

            if let Err(err) = result {
                error!(system = %entry.name, version, error = %format!("{err:#}"), "system update failed");
                match policy {
                    FailurePolicy::AbortTick => {
                        return Err(EcsError::system_failed(&entry.name, err));
                    }
                    FailurePolicy::ContinueTick => {
                        report.failed.push((entry.name.clone(), format!("{err:#}")));
                    }
                }
            }
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QuerySpec;
    use crate::system::{Group, SystemDescriptor};
    use relm_schema::ComponentDef;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct Logged {
        name: &'static str,
        group: Group,
        offset: i32,
        log: Rc<RefCell<Vec<&'static str>>>,
    }

    impl System for Logged {
        fn descriptor(&self) -> SystemDescriptor {
            SystemDescriptor::new(self.name, self.group, self.offset)
                .query("all", QuerySpec::new().with("a"))
        }

        fn init(&mut self, _services: &mut Services) -> anyhow::Result<()> {
            self.log.borrow_mut().push("init");
            Ok(())
        }

        fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
            ctx.query("all")?;
            self.log.borrow_mut().push(self.name);
            Ok(())
        }
    }

    fn entities() -> Entities {
        let mut entities = Entities::new();
        entities
            .registry_mut()
            .register_kind(ComponentDef::new("a"))
            .unwrap();
        entities
    }

    fn logged(
        name: &'static str,
        group: Group,
        offset: i32,
        log: &Rc<RefCell<Vec<&'static str>>>,
    ) -> Box<dyn System> {
        Box::new(Logged {
            name,
            group,
            offset,
            log: log.clone(),
        })
    }

    #[test]
    fn test_order_by_group_offset_then_registration() {
        let mut entities = entities();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add(logged("render", Group::Presentation, 0, &log), &mut entities).unwrap();
        scheduler.add(logged("late", Group::Simulation, 10, &log), &mut entities).unwrap();
        scheduler.add(logged("first_tie", Group::Simulation, 0, &log), &mut entities).unwrap();
        scheduler.add(logged("second_tie", Group::Simulation, 0, &log), &mut entities).unwrap();
        scheduler.add(logged("setup", Group::Initialization, 999, &log), &mut entities).unwrap();

        assert_eq!(
            scheduler.ordered_names(),
            vec!["setup", "first_tie", "second_tie", "late", "render"]
        );

        let mut services = Services::new();
        scheduler
            .run(&mut entities, &mut services, 0, 0.016, FailurePolicy::AbortTick)
            .unwrap();
        assert_eq!(
            *log.borrow(),
            vec!["setup", "first_tie", "second_tie", "late", "render"]
        );
    }

    #[test]
    fn test_identical_queries_share_slots() {
        let mut entities = entities();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add(logged("one", Group::Simulation, 0, &log), &mut entities).unwrap();
        scheduler.add(logged("two", Group::Simulation, 1, &log), &mut entities).unwrap();
        assert_eq!(entities.index.len(), 1);

        scheduler.remove("one", &mut entities).unwrap();
        assert_eq!(entities.index.len(), 1);
        scheduler.remove("two", &mut entities).unwrap();
        assert_eq!(entities.index.len(), 0);
    }

    #[test]
    fn test_duplicate_and_unknown_system() {
        let mut entities = entities();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        scheduler.add(logged("one", Group::Simulation, 0, &log), &mut entities).unwrap();
        assert!(matches!(
            scheduler.add(logged("one", Group::Presentation, 0, &log), &mut entities),
            Err(EcsError::DuplicateSystem(_))
        ));
        assert!(matches!(
            scheduler.remove("nope", &mut entities),
            Err(EcsError::UnknownSystem(_))
        ));
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_init_runs_once() {
        let mut entities = entities();
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut scheduler = Scheduler::new();
        let mut services = Services::new();
        scheduler.add(logged("one", Group::Simulation, 0, &log), &mut entities).unwrap();
        scheduler.init_pending(&mut services).unwrap();
        scheduler.init_pending(&mut services).unwrap();
        assert_eq!(*log.borrow(), vec!["init"]);

        scheduler.reset_initialized();
        scheduler.init_pending(&mut services).unwrap();
        assert_eq!(*log.borrow(), vec!["init", "init"]);
    }

    #[test]
    fn test_bad_query_registers_nothing() {
        struct Broken;
        impl System for Broken {
            fn descriptor(&self) -> SystemDescriptor {
                SystemDescriptor::new("broken", Group::Simulation, 0)
                    .query("ok", QuerySpec::new().with("a"))
                    .query("bad", QuerySpec::new().with("missing"))
            }
            fn update(&mut self, _ctx: &mut SystemContext<'_>) -> anyhow::Result<()> {
                Ok(())
            }
        }

        let mut entities = entities();
        let mut scheduler = Scheduler::new();
        assert!(matches!(
            scheduler.add(Box::new(Broken), &mut entities),
            Err(EcsError::UnknownKind(_))
        ));
        assert!(scheduler.is_empty());
        assert_eq!(entities.index.len(), 0);
    }
}
