//! # relm_ecs
//!
//! A reactive entity-component runtime. Entities carry schema-typed
//! components, queries are kept current incrementally as components change,
//! and systems run once per tick in a fixed group/offset order.
//!
//! This crate provides:
//!
//! - [`Registry`] and [`KindId`]: declared component kinds with stable ids.
//! - [`Entities`]: entity storage, hierarchy, activation and the query index.
//! - [`QuerySpec`]: required, excluded and modified-this-tick terms.
//! - [`System`] and [`Scheduler`]: ordered per-tick behaviour.
//! - [`World`]: the composition root with `init`, `update` and `reset`.

pub mod activation;
pub mod component;
pub mod entities;
pub mod entity;
pub mod error;
pub mod index;
pub mod kind;
pub mod query;
pub mod scheduler;
pub mod services;
pub mod store;
pub mod system;
pub mod world;

pub use activation::EntityState;
pub use component::{Component, TypedComponent};
pub use entities::{DestroyPolicy, Entities, EntityBuilder};
pub use entity::EntityId;
pub use error::EcsError;
pub use index::QueryId;
pub use kind::{ComponentKind, KindId, Registry};
pub use query::{CompiledQuery, QuerySpec, QueryTerm};
pub use scheduler::Scheduler;
pub use services::Services;
pub use store::EntityRecord;
pub use system::{Group, System, SystemContext, SystemDescriptor, SystemOrder};
pub use world::{FailurePolicy, TickReport, World, WorldConfig};
