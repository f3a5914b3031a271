use rustc_hash::FxHashMap;
use std::fmt;
use std::rc::Rc;

use crate::descriptor::ServiceDescriptor;
use crate::service::{ServiceHandle, ServiceRef};
use crate::service_id::ServiceId;

/// What a registry slot holds: a live instance (possibly a lazy stand-in)
/// or the recipe for building one.
#[derive(Clone)]
pub enum ServiceEntry {
    Instance(ServiceHandle),
    Descriptor(Rc<ServiceDescriptor>),
}

impl ServiceEntry {
    pub fn is_instance(&self) -> bool {
        matches!(self, ServiceEntry::Instance(_))
    }

    pub fn is_descriptor(&self) -> bool {
        matches!(self, ServiceEntry::Descriptor(_))
    }
}

impl fmt::Debug for ServiceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceEntry::Instance(handle) => write!(f, "Instance({handle:?})"),
            ServiceEntry::Descriptor(desc) => write!(f, "Descriptor({desc:?})"),
        }
    }
}

/// Flat mapping from identifier to instance-or-descriptor.
///
/// Pure key/value store: hierarchy, ownership and cycle logic live in the
/// container. Last `set` wins and returns the previous entry so callers
/// can detect accidental overwrites.
#[derive(Default)]
pub struct ServiceRegistry {
    entries: FxHashMap<ServiceId, ServiceEntry>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(entries: impl IntoIterator<Item = (ServiceId, ServiceEntry)>) -> Self {
        let mut registry = Self::new();
        for (id, entry) in entries {
            registry.set(id, entry);
        }
        registry
    }

    pub fn set(&mut self, id: ServiceId, entry: ServiceEntry) -> Option<ServiceEntry> {
        self.entries.insert(id, entry)
    }

    pub fn set_instance(&mut self, id: ServiceId, instance: ServiceRef) -> Option<ServiceEntry> {
        self.set(id, ServiceEntry::Instance(ServiceHandle::ready(instance)))
    }

    pub fn set_descriptor(
        &mut self,
        id: ServiceId,
        descriptor: ServiceDescriptor,
    ) -> Option<ServiceEntry> {
        self.set(id, ServiceEntry::Descriptor(Rc::new(descriptor)))
    }

    pub fn get(&self, id: ServiceId) -> Option<&ServiceEntry> {
        self.entries.get(&id)
    }

    pub fn has(&self, id: ServiceId) -> bool {
        self.entries.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for ServiceRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceRegistry")
            .field("len", &self.entries.len())
            .finish_non_exhaustive()
    }
}
