use std::rc::Rc;

use crate::descriptor::ServiceDescriptor;
use crate::registry::{ServiceEntry, ServiceRegistry};
use crate::service_id::ServiceId;

/// Startup-time staging list for singleton registrations.
///
/// Program composition stages `(identifier, descriptor)` pairs as modules
/// wire themselves up, then the host applies the whole batch to a registry
/// in one pass. An explicit object rather than a process-wide list, so
/// registration has no hidden global side effect.
#[derive(Default)]
pub struct SingletonStaging {
    staged: Vec<(ServiceId, Rc<ServiceDescriptor>)>,
}

impl SingletonStaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stage(&mut self, id: ServiceId, descriptor: ServiceDescriptor) {
        self.stage_shared(id, Rc::new(descriptor));
    }

    pub fn stage_shared(&mut self, id: ServiceId, descriptor: Rc<ServiceDescriptor>) {
        self.staged.push((id, descriptor));
    }

    pub fn iter(&self) -> impl Iterator<Item = (ServiceId, &Rc<ServiceDescriptor>)> {
        self.staged.iter().map(|(id, desc)| (*id, desc))
    }

    pub fn len(&self) -> usize {
        self.staged.len()
    }

    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Register every staged descriptor. Staging order is preserved, so a
    /// later staging of the same identifier wins, consistent with registry
    /// `set` semantics.
    pub fn apply_to(&self, registry: &mut ServiceRegistry) {
        for (id, descriptor) in &self.staged {
            registry.set(*id, ServiceEntry::Descriptor(Rc::clone(descriptor)));
        }
    }
}
