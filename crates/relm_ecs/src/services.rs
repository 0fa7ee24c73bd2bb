//! Collaborator services handed to systems.
//!
//! A type map: at most one value per Rust type. The world owns it, passes it
//! to every system's `init`, exposes it through the update context, and
//! drops every service on reset.

use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;

use crate::error::EcsError;

#[derive(Default)]
pub struct Services {
    map: HashMap<TypeId, Box<dyn Any>>,
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services").field("len", &self.map.len()).finish()
    }
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a service, returning the one it replaced.
    pub fn insert<T: 'static>(&mut self, service: T) -> Option<T> {
        self.map
            .insert(TypeId::of::<T>(), Box::new(service))
            .and_then(|old| old.downcast::<T>().ok())
            .map(|b| *b)
    }

    #[must_use]
    pub fn with<T: 'static>(mut self, service: T) -> Self {
        self.insert(service);
        self
    }

    pub fn get<T: 'static>(&self) -> Option<&T> {
        self.map.get(&TypeId::of::<T>())?.downcast_ref()
    }

    pub fn get_mut<T: 'static>(&mut self) -> Option<&mut T> {
        self.map.get_mut(&TypeId::of::<T>())?.downcast_mut()
    }

    pub fn require<T: 'static>(&self) -> Result<&T, EcsError> {
        self.get().ok_or(EcsError::MissingService(type_name::<T>()))
    }

    pub fn require_mut<T: 'static>(&mut self) -> Result<&mut T, EcsError> {
        self.get_mut().ok_or(EcsError::MissingService(type_name::<T>()))
    }

    pub fn remove<T: 'static>(&mut self) -> Option<T> {
        self.map
            .remove(&TypeId::of::<T>())
            .and_then(|b| b.downcast::<T>().ok())
            .map(|b| *b)
    }

    pub fn contains<T: 'static>(&self) -> bool {
        self.map.contains_key(&TypeId::of::<T>())
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Drop every service.
    pub fn clear(&mut self) {
        self.map.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Gravity(f32);

    #[derive(Debug)]
    struct Counter(u32);

    #[test]
    fn test_insert_get_replace() {
        let mut services = Services::new();
        assert!(services.insert(Gravity(9.8)).is_none());
        assert_eq!(services.get::<Gravity>(), Some(&Gravity(9.8)));
        assert_eq!(services.insert(Gravity(1.6)), Some(Gravity(9.8)));
        assert_eq!(services.len(), 1);
    }

    #[test]
    fn test_require_missing() {
        let services = Services::new().with(Gravity(9.8));
        assert!(services.require::<Gravity>().is_ok());
        let err = services.require::<Counter>().unwrap_err();
        assert!(matches!(err, EcsError::MissingService(name) if name.ends_with("Counter")));
    }

    #[test]
    fn test_get_mut_and_remove() {
        let mut services = Services::new().with(Counter(0));
        services.get_mut::<Counter>().unwrap().0 += 1;
        assert_eq!(services.remove::<Counter>().map(|c| c.0), Some(1));
        assert!(!services.contains::<Counter>());
    }

    #[test]
    fn test_clear_drops_everything() {
        let mut services = Services::new().with(Counter(0)).with(Gravity(1.0));
        services.clear();
        assert!(services.is_empty());
    }
}
