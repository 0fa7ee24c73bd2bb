//! Query specifications and their compiled predicates.
//!
//! A [`QuerySpec`] is written against kind names and compiled once, at
//! registration, into a [`CompiledQuery`] over [`KindId`]s:
//!
//! ```text
//! E matches Q  iff  E.active
//!               ∧ required ⊆ kinds(E)
//!               ∧ excluded ∩ kinds(E) = ∅
//!               ∧ every modified kind was stamped in the open tick
//! ```

use relm_schema::QueryDef;
use std::collections::BTreeSet;

use crate::component::TypedComponent;
use crate::error::EcsError;
use crate::kind::{KindId, Registry};
use crate::store::EntityRecord;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryTerm {
    /// The entity must have this kind.
    Required(String),
    /// The entity must not have this kind.
    Excluded(String),
    /// The kind must have been added or marked modified this tick. Implies
    /// `Required`.
    Modified(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuerySpec {
    terms: Vec<QueryTerm>,
}

impl QuerySpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with(mut self, kind: impl Into<String>) -> Self {
        self.terms.push(QueryTerm::Required(kind.into()));
        self
    }

    #[must_use]
    pub fn without(mut self, kind: impl Into<String>) -> Self {
        self.terms.push(QueryTerm::Excluded(kind.into()));
        self
    }

    #[must_use]
    pub fn modified(mut self, kind: impl Into<String>) -> Self {
        self.terms.push(QueryTerm::Modified(kind.into()));
        self
    }

    #[must_use]
    pub fn with_typed<T: TypedComponent>(self) -> Self {
        self.with(T::kind_name())
    }

    #[must_use]
    pub fn without_typed<T: TypedComponent>(self) -> Self {
        self.without(T::kind_name())
    }

    #[must_use]
    pub fn modified_typed<T: TypedComponent>(self) -> Self {
        self.modified(T::kind_name())
    }

    pub fn terms(&self) -> &[QueryTerm] {
        &self.terms
    }

    pub fn from_def(def: &QueryDef) -> Self {
        let mut spec = Self::new();
        for k in &def.require {
            spec = spec.with(k.clone());
        }
        for k in &def.exclude {
            spec = spec.without(k.clone());
        }
        for k in &def.modified {
            spec = spec.modified(k.clone());
        }
        spec
    }

    /// Resolve names against `registry` and check the terms are satisfiable.
    pub fn compile(&self, registry: &Registry) -> Result<CompiledQuery, EcsError> {
        let mut compiled = CompiledQuery::default();
        for term in &self.terms {
            match term {
                QueryTerm::Required(name) => {
                    compiled.required.insert(registry.kind_of(name)?);
                }
                QueryTerm::Excluded(name) => {
                    compiled.excluded.insert(registry.kind_of(name)?);
                }
                QueryTerm::Modified(name) => {
                    let id = registry.kind_of(name)?;
                    compiled.required.insert(id);
                    compiled.modified.insert(id);
                }
            }
        }
        if let Some(both) = compiled.required.intersection(&compiled.excluded).next() {
            return Err(EcsError::InvalidQuerySpec(format!(
                "'{}' is both required and excluded",
                registry.name_of(*both)
            )));
        }
        Ok(compiled)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct CompiledQuery {
    pub(crate) required: BTreeSet<KindId>,
    pub(crate) excluded: BTreeSet<KindId>,
    pub(crate) modified: BTreeSet<KindId>,
}

impl CompiledQuery {
    pub fn required(&self) -> &BTreeSet<KindId> {
        &self.required
    }

    pub fn excluded(&self) -> &BTreeSet<KindId> {
        &self.excluded
    }

    pub fn modified(&self) -> &BTreeSet<KindId> {
        &self.modified
    }

    pub fn has_modified_terms(&self) -> bool {
        !self.modified.is_empty()
    }

    /// Every kind whose edges can change this query's result.
    pub fn kinds(&self) -> impl Iterator<Item = KindId> + '_ {
        // `modified` is a subset of `required`.
        self.required.iter().chain(&self.excluded).copied()
    }

    pub fn matches(&self, record: &EntityRecord, tick: u64) -> bool {
        record.active
            && self.required.iter().all(|k| record.has(*k))
            && !self.excluded.iter().any(|k| record.has(*k))
            && self.modified.iter().all(|k| record.modified_in(*k, tick))
    }
}
