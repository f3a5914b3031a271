use rustc_hash::FxHashMap;
use std::any::{type_name, TypeId};
use std::cell::RefCell;

use crate::errors::ResolutionError;
use crate::service::Service;
use crate::service_id::ServiceId;

/// One declared dependency of a constructible type: which capability fills
/// which trailing constructor slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceDependency {
    pub id: ServiceId,
    pub slot: usize,
}

/// Declarative side table mapping each constructible type to its ordered
/// `(identifier, slot)` dependency list.
///
/// Populated by explicit [`declare`](DependencyTable::declare) calls; the
/// engine only ever reads it. Slot indices come after any static-argument
/// slots and must be unique per type.
#[derive(Default)]
pub struct DependencyTable {
    entries: RefCell<FxHashMap<TypeId, Vec<ServiceDependency>>>,
}

impl DependencyTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare the dependency slots of `T`. Re-declaring a type replaces
    /// its previous list. Duplicate slot indices are rejected.
    pub fn declare<T: Service>(
        &self,
        deps: impl IntoIterator<Item = (ServiceId, usize)>,
    ) -> Result<(), ResolutionError> {
        let mut list: Vec<ServiceDependency> = deps
            .into_iter()
            .map(|(id, slot)| ServiceDependency { id, slot })
            .collect();
        list.sort_by_key(|dep| dep.slot);
        for pair in list.windows(2) {
            if pair[0].slot == pair[1].slot {
                return Err(ResolutionError::InvalidDeclaration {
                    type_name: type_name::<T>().to_string(),
                    reason: format!(
                        "slot {} declared for both '{}' and '{}'",
                        pair[0].slot, pair[0].id, pair[1].id
                    ),
                });
            }
        }
        self.entries.borrow_mut().insert(TypeId::of::<T>(), list);
        Ok(())
    }

    /// The declared dependencies of a type, sorted by slot. Empty for
    /// types that never declared any.
    pub fn dependencies_of(&self, type_id: TypeId) -> Vec<ServiceDependency> {
        self.entries
            .borrow()
            .get(&type_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn has(&self, type_id: TypeId) -> bool {
        self.entries.borrow().contains_key(&type_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Alpha;
    impl Service for Alpha {}

    #[test]
    fn undeclared_type_has_no_dependencies() {
        let table = DependencyTable::new();
        assert!(table.dependencies_of(TypeId::of::<Alpha>()).is_empty());
        assert!(!table.has(TypeId::of::<Alpha>()));
    }

    #[test]
    fn dependencies_come_back_sorted_by_slot() {
        let table = DependencyTable::new();
        let log = ServiceId::new("deps-test-log");
        let store = ServiceId::new("deps-test-store");
        table
            .declare::<Alpha>([(store, 2), (log, 1)])
            .expect("valid declaration");

        let deps = table.dependencies_of(TypeId::of::<Alpha>());
        assert_eq!(deps.len(), 2);
        assert_eq!(deps[0], ServiceDependency { id: log, slot: 1 });
        assert_eq!(deps[1], ServiceDependency { id: store, slot: 2 });
    }

    #[test]
    fn duplicate_slots_are_rejected() {
        let table = DependencyTable::new();
        let a = ServiceId::new("deps-test-a");
        let b = ServiceId::new("deps-test-b");
        let err = table.declare::<Alpha>([(a, 0), (b, 0)]).unwrap_err();
        assert!(matches!(err, ResolutionError::InvalidDeclaration { .. }));
    }

    #[test]
    fn redeclaring_replaces_the_list() {
        let table = DependencyTable::new();
        let a = ServiceId::new("deps-test-c");
        let b = ServiceId::new("deps-test-d");
        table.declare::<Alpha>([(a, 0)]).expect("first declaration");
        table.declare::<Alpha>([(b, 0)]).expect("second declaration");

        let deps = table.dependencies_of(TypeId::of::<Alpha>());
        assert_eq!(deps.len(), 1);
        assert_eq!(deps[0].id, b);
    }
}
