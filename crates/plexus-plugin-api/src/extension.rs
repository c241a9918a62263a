//! Extension point contracts and extension handles
//!
//! The host declares an [`ExtensionPoint`] bound to a contract type (usually a
//! trait object type such as `dyn Formatter`). Plugins contribute instances
//! wrapped in an [`ExtensionHandle`], which carries the contract it was built
//! for. The registry compares the two [`ContractId`]s once at registration,
//! so lookups never need to inspect types again.

use crate::error::ExtensionError;
use std::any::{Any, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Stable identifier of a contract type
#[derive(Clone, Copy)]
pub struct ContractId {
    type_id: TypeId,
    type_name: &'static str,
}

impl ContractId {
    /// Contract id of `T`
    pub fn of<T: ?Sized + 'static>() -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
        }
    }

    /// Human readable type name
    pub fn name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for ContractId {
    fn eq(&self, other: &Self) -> bool {
        self.type_id == other.type_id
    }
}

impl Eq for ContractId {}

impl std::hash::Hash for ContractId {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.type_id.hash(state);
    }
}

impl fmt::Debug for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ContractId").field(&self.type_name).finish()
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.type_name)
    }
}

/// Extension point declared by the host
#[derive(Debug, Clone)]
pub struct ExtensionPoint {
    /// Unique id among active points
    pub id: String,

    /// Description
    pub description: String,

    /// Whether several enabled extensions may coexist
    pub allow_multiple: bool,

    /// Contract every extension must implement
    pub contract: ContractId,
}

impl ExtensionPoint {
    /// Declare a point whose extensions implement `T`
    ///
    /// Points accept multiple implementations unless [`single`](Self::single)
    /// is called.
    pub fn new<T: ?Sized + 'static>(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            description: String::new(),
            allow_multiple: true,
            contract: ContractId::of::<T>(),
        }
    }

    /// Set description
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Allow only one enabled extension at a time
    pub fn single(mut self) -> Self {
        self.allow_multiple = false;
        self
    }
}

/// Opaque, cheaply clonable reference to an extension instance
///
/// Clones share identity: unregistering with any clone removes the extension
/// registered with the original.
#[derive(Clone)]
pub struct ExtensionHandle {
    id: u64,
    contract: ContractId,
    instance: Arc<dyn Any + Send + Sync>,
}

impl ExtensionHandle {
    /// Wrap an instance implementing contract `T`
    ///
    /// ```
    /// use plexus_plugin_api::extension::ExtensionHandle;
    /// use std::sync::Arc;
    ///
    /// trait Codec: Send + Sync {
    ///     fn name(&self) -> &str;
    /// }
    /// struct Gzip;
    /// impl Codec for Gzip {
    ///     fn name(&self) -> &str { "gzip" }
    /// }
    ///
    /// let codec: Arc<dyn Codec> = Arc::new(Gzip);
    /// let handle = ExtensionHandle::new(codec);
    /// assert_eq!(handle.downcast::<dyn Codec>().unwrap().name(), "gzip");
    /// ```
    pub fn new<T: ?Sized + Send + Sync + 'static>(instance: Arc<T>) -> Self {
        Self {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            contract: ContractId::of::<T>(),
            instance: Arc::new(instance),
        }
    }

    /// Identity shared by all clones
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Contract the instance was wrapped for
    pub fn contract(&self) -> ContractId {
        self.contract
    }

    /// Recover the instance as `Arc<T>` if `T` is its contract
    pub fn downcast<T: ?Sized + 'static>(&self) -> Option<Arc<T>> {
        self.instance.downcast_ref::<Arc<T>>().cloned()
    }
}

impl PartialEq for ExtensionHandle {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ExtensionHandle {}

impl fmt::Debug for ExtensionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtensionHandle")
            .field("id", &self.id)
            .field("contract", &self.contract)
            .finish()
    }
}

/// Registration surface handed to plugins through their context
pub trait ExtensionRegistrar: Send + Sync {
    /// Contribute `handle` to `point_id` on behalf of `owner`
    fn register_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: ExtensionHandle,
        priority: i32,
    ) -> Result<(), ExtensionError>;

    /// Withdraw a previously contributed extension
    fn unregister_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: &ExtensionHandle,
    ) -> Result<(), ExtensionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Greeter: Send + Sync {
        fn greet(&self) -> String;
    }

    struct English;

    impl Greeter for English {
        fn greet(&self) -> String {
            "hello".to_string()
        }
    }

    #[test]
    fn test_contract_id_equality() {
        assert_eq!(ContractId::of::<dyn Greeter>(), ContractId::of::<dyn Greeter>());
        assert_ne!(ContractId::of::<dyn Greeter>(), ContractId::of::<English>());
        assert!(ContractId::of::<dyn Greeter>().name().contains("Greeter"));
    }

    #[test]
    fn test_handle_downcast() {
        let greeter: Arc<dyn Greeter> = Arc::new(English);
        let handle = ExtensionHandle::new(greeter);

        assert_eq!(handle.contract(), ContractId::of::<dyn Greeter>());
        assert_eq!(handle.downcast::<dyn Greeter>().unwrap().greet(), "hello");
        assert!(handle.downcast::<English>().is_none());
    }

    #[test]
    fn test_handle_identity() {
        let a = ExtensionHandle::new(Arc::new(English));
        let b = ExtensionHandle::new(Arc::new(English));
        assert_eq!(a.clone(), a);
        assert_ne!(a, b);
    }

    #[test]
    fn test_point_builder() {
        let point = ExtensionPoint::new::<dyn Greeter>("greeter")
            .description("Greets people")
            .single();
        assert!(!point.allow_multiple);
        assert_eq!(point.contract, ContractId::of::<dyn Greeter>());
    }
}
