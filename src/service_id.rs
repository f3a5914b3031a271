use once_cell::sync::Lazy;
use rustc_hash::FxHashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Process-wide intern table for service identifiers.
///
/// This is the one process-scoped table in the crate: initialized on first
/// use, never torn down. Interned names are leaked once so tokens can hand
/// out `&'static str` debug names. The mutex guards token creation only;
/// resolution never holds it while running user code.
static INTERNER: Lazy<Mutex<Interner>> = Lazy::new(|| Mutex::new(Interner::default()));

#[derive(Default)]
struct Interner {
    by_name: FxHashMap<&'static str, u32>,
    names: Vec<&'static str>,
}

/// An opaque token naming one capability a container can resolve.
///
/// Identifiers are interned: `ServiceId::new("log")` returns the same token
/// everywhere in the process, so equality is identity, not structure.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceId(u32);

impl ServiceId {
    pub fn new(name: &str) -> Self {
        let mut table = INTERNER.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&index) = table.by_name.get(name) {
            return Self(index);
        }
        let name: &'static str = Box::leak(name.to_owned().into_boxed_str());
        let index = table.names.len() as u32;
        table.names.push(name);
        table.by_name.insert(name, index);
        Self(index)
    }

    /// The stable debug name this token was interned under.
    pub fn name(self) -> &'static str {
        let table = INTERNER.lock().unwrap_or_else(PoisonError::into_inner);
        table.names.get(self.0 as usize).copied().unwrap_or("<unknown>")
    }
}

impl fmt::Display for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Debug for ServiceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServiceId({})", self.name())
    }
}
