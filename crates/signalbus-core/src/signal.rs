//! Signal payloads and their type keys.

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};

const DYNAMIC_NAME: &str = "<dynamic>";

/// A value that can be sent on the bus.
///
/// Implemented for every `'static` type that is `Send + Sync`; there is
/// nothing to implement by hand.
pub trait Signal: Any + Send + Sync {}

impl<T: Any + Send + Sync> Signal for T {}

/// Identifier of a signal type, used as the key for all per-type state.
///
/// Equality and hashing only look at the [`TypeId`]; the type name rides
/// along for notices and error messages.
#[derive(Debug, Clone, Copy)]
pub struct SignalKey {
    id: TypeId,
    name: &'static str,
}

impl SignalKey {
    /// Key of the statically known signal type `T`
    pub fn of<T: Signal>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: std::any::type_name::<T>(),
        }
    }

    /// Key for a payload whose type is only known at runtime. The name is
    /// a placeholder until the registry supplies the registered key; until
    /// then the key displays as its type id.
    pub(crate) fn dynamic(id: TypeId) -> Self {
        Self {
            id,
            name: DYNAMIC_NAME,
        }
    }

    fn is_dynamic(&self) -> bool {
        self.name == DYNAMIC_NAME
    }

    /// The underlying type id
    pub fn id(&self) -> TypeId {
        self.id
    }

    /// Fully qualified type name
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Type name without its module path (`app::events::Ping` -> `Ping`)
    pub fn short_name(&self) -> &'static str {
        short_type_name(self.name)
    }
}

impl PartialEq for SignalKey {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for SignalKey {}

impl Hash for SignalKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for SignalKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dynamic() {
            write!(f, "{:?}", self.id)
        } else {
            f.write_str(self.short_name())
        }
    }
}

/// Runtime type id of a type-erased payload.
///
/// Goes through `Any::type_id` on the trait object so the id is the
/// concrete payload type, never `&dyn Any` or a smart pointer around it.
pub(crate) fn payload_type_id(signal: &dyn Any) -> TypeId {
    signal.type_id()
}

pub(crate) fn short_type_name(name: &'static str) -> &'static str {
    // Keep generic arguments intact: only strip the path before the first '<'.
    let head = name.split('<').next().unwrap_or(name);
    match head.rfind("::") {
        Some(pos) => &name[pos + 2..],
        None => name,
    }
}
