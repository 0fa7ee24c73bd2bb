//! Systems: per-tick behaviour with declared queries and a fixed order.

use relm_schema::{GROUP_NAMES, SchemaError, SystemDef};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::entities::Entities;
use crate::entity::EntityId;
use crate::error::EcsError;
use crate::index::QueryId;
use crate::query::QuerySpec;
use crate::services::Services;

/// Coarse ordering band. Every Initialization system runs before every
/// Simulation system, which run before every Presentation system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub enum Group {
    Initialization,
    #[default]
    Simulation,
    Presentation,
}

impl FromStr for Group {
    type Err = EcsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "initialization" => Ok(Group::Initialization),
            "simulation" => Ok(Group::Simulation),
            "presentation" => Ok(Group::Presentation),
            other => Err(EcsError::Schema(SchemaError::UnknownGroup {
                system: String::new(),
                group: other.to_string(),
            })),
        }
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(GROUP_NAMES[*self as usize])
    }
}

/// Position in the run order: group first, then offset ascending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct SystemOrder {
    pub group: Group,
    pub offset: i32,
}

impl SystemOrder {
    pub const fn new(group: Group, offset: i32) -> Self {
        Self { group, offset }
    }
}

impl fmt::Display for SystemOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{:+}", self.group, self.offset)
    }
}

/// Everything the scheduler needs to know about a system.
#[derive(Debug, Clone)]
pub struct SystemDescriptor {
    pub name: String,
    pub order: SystemOrder,
    pub queries: Vec<(String, QuerySpec)>,
}

impl SystemDescriptor {
    pub fn new(name: impl Into<String>, group: Group, offset: i32) -> Self {
        Self {
            name: name.into(),
            order: SystemOrder::new(group, offset),
            queries: Vec::new(),
        }
    }

    #[must_use]
    pub fn query(mut self, name: impl Into<String>, spec: QuerySpec) -> Self {
        self.queries.push((name.into(), spec));
        self
    }

    /// Build from a declaration. A missing group means Simulation.
    pub fn from_def(def: &SystemDef) -> Result<Self, EcsError> {
        let group = match &def.group {
            Some(g) => g.parse().map_err(|_| {
                EcsError::Schema(SchemaError::UnknownGroup {
                    system: def.name.clone(),
                    group: g.clone(),
                })
            })?,
            None => Group::default(),
        };
        let mut desc = Self::new(def.name.clone(), group, def.offset);
        for q in &def.queries {
            desc = desc.query(q.name.clone(), QuerySpec::from_def(q));
        }
        Ok(desc)
    }
}

/// Per-tick behaviour.
///
/// `init` runs once when the system is attached to a running world (or when
/// the world starts). `update` runs once per tick, in order.
pub trait System {
    fn descriptor(&self) -> SystemDescriptor;

    fn init(&mut self, _services: &mut Services) -> anyhow::Result<()> {
        Ok(())
    }

    fn update(&mut self, ctx: &mut SystemContext<'_>) -> anyhow::Result<()>;
}

/// What a system sees during `update`.
pub struct SystemContext<'w> {
    /// World version: the number of completed updates before this one.
    pub version: u64,
    /// Seconds since the previous update.
    pub delta: f64,
    pub entities: &'w mut Entities,
    pub services: &'w mut Services,
    pub(crate) system: &'w str,
    pub(crate) queries: &'w HashMap<String, QueryId>,
}

impl SystemContext<'_> {
    pub fn system_name(&self) -> &str {
        self.system
    }

    /// Snapshot of a declared query's current members, in id order. The
    /// snapshot is safe to hold while mutating entities.
    pub fn query(&self, name: &str) -> Result<Vec<EntityId>, EcsError> {
        let id = self.query_id(name)?;
        Ok(self
            .entities
            .members(id)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default())
    }

    pub fn query_len(&self, name: &str) -> Result<usize, EcsError> {
        let id = self.query_id(name)?;
        Ok(self.entities.members(id).map_or(0, |m| m.len()))
    }

    fn query_id(&self, name: &str) -> Result<QueryId, EcsError> {
        self.queries
            .get(name)
            .copied()
            .ok_or_else(|| EcsError::UnknownQuery {
                system: self.system.to_string(),
                query: name.to_string(),
            })
    }
}
