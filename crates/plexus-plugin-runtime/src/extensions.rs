//! Extension registry
//!
//! Maps extension points declared by the host to the extensions contributed
//! by running plugins. Each point owns its records behind its own lock, so
//! registrations on different points never contend and a query always sees
//! a complete list.
//!
//! Only *admitted* plugins may register. The lifecycle manager admits a
//! plugin right before its start hook runs and revokes the admission (which
//! also purges the plugin's records) before the plugin leaves `Started`.
//! Every admission gets a fresh epoch, and hooks register through a
//! [`ScopedRegistrar`] bound to the epoch and cancellation token of their
//! own invocation. A hook the runtime gave up on can therefore never
//! register into a later run of the same plugin.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use plexus_plugin_api::{
    ContractId, ExtensionError, ExtensionHandle, ExtensionPoint, ExtensionRegistrar,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

type Result<T> = std::result::Result<T, ExtensionError>;

/// A contributed extension
#[derive(Debug, Clone)]
pub struct ExtensionRecord {
    /// Extension point id
    pub point_id: String,

    /// Plugin that contributed the extension
    pub owner: String,

    /// Instance handle
    pub handle: ExtensionHandle,

    /// Higher values are preferred
    pub priority: i32,

    /// Disabled records are skipped by queries
    pub enabled: bool,

    /// Registry-wide registration counter, breaks priority ties
    pub sequence: u64,

    /// When the extension was registered
    pub registered_at: DateTime<Utc>,
}

#[derive(Debug)]
struct PointSlot {
    point: ExtensionPoint,
    state: RwLock<PointState>,
}

#[derive(Debug, Default)]
struct PointState {
    // Sorted by descending priority, then ascending sequence
    records: Vec<ExtensionRecord>,
    retired: bool,
}

#[derive(Debug, Default)]
struct Inner {
    points: DashMap<String, Arc<PointSlot>>,
    // Plugin id to the epoch of its current admission
    admitted: DashMap<String, u64>,
    epochs: AtomicU64,
    sequence: AtomicU64,
}

/// Registry of extension points and their extensions
///
/// Cheap to clone; clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct ExtensionRegistry {
    inner: Arc<Inner>,
}

impl ExtensionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an extension point
    pub fn register_extension_point(&self, point: ExtensionPoint) -> Result<()> {
        use dashmap::mapref::entry::Entry;

        match self.inner.points.entry(point.id.clone()) {
            Entry::Occupied(_) => Err(ExtensionError::DuplicatePoint(point.id)),
            Entry::Vacant(vacant) => {
                debug!(point = %point.id, contract = %point.contract, "Extension point registered");
                vacant.insert(Arc::new(PointSlot {
                    point,
                    state: RwLock::new(PointState::default()),
                }));
                Ok(())
            }
        }
    }

    /// Remove a point together with every extension contributed to it
    ///
    /// Returns the records that were dropped.
    pub fn unregister_extension_point(&self, point_id: &str) -> Result<Vec<ExtensionRecord>> {
        let (_, slot) = self
            .inner
            .points
            .remove(point_id)
            .ok_or_else(|| ExtensionError::PointNotFound(point_id.to_string()))?;

        let mut state = slot.state.write();
        state.retired = true;
        let dropped = std::mem::take(&mut state.records);

        debug!(point = %point_id, dropped = dropped.len(), "Extension point unregistered");
        Ok(dropped)
    }

    /// Contribute an extension to `point_id` on behalf of `owner`
    ///
    /// # Errors
    ///
    /// - [`ExtensionError::PointNotFound`] if the point is not registered
    /// - [`ExtensionError::ContractMismatch`] if the handle was built for
    ///   another contract
    /// - [`ExtensionError::RegistrationRejected`] if `owner` is not started
    /// - [`ExtensionError::SingleImplementationViolation`] if the point takes
    ///   a single implementation and already has an enabled one
    pub fn register_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: ExtensionHandle,
        priority: i32,
    ) -> Result<()> {
        self.register_as(point_id, owner, handle, priority, None)
    }

    fn register_as(
        &self,
        point_id: &str,
        owner: &str,
        handle: ExtensionHandle,
        priority: i32,
        invocation: Option<&Invocation>,
    ) -> Result<()> {
        let slot = self.slot(point_id)?;

        if handle.contract() != slot.point.contract {
            return Err(ExtensionError::ContractMismatch {
                point: point_id.to_string(),
                expected: slot.point.contract.name().to_string(),
                actual: handle.contract().name().to_string(),
            });
        }

        let mut state = slot.state.write();

        if state.retired {
            return Err(ExtensionError::PointNotFound(point_id.to_string()));
        }

        // Checked under the point lock so a concurrent revoke cannot miss the
        // record we are about to insert.
        let current = self.inner.admitted.get(owner).map(|epoch| *epoch);
        let permitted = match (current, invocation) {
            (None, _) => false,
            (Some(_), None) => true,
            (Some(current), Some(invocation)) => {
                invocation.epoch == Some(current) && !invocation.token.is_cancelled()
            }
        };
        if !permitted {
            return Err(ExtensionError::RegistrationRejected {
                point: point_id.to_string(),
                owner: owner.to_string(),
            });
        }

        if !slot.point.allow_multiple {
            if let Some(existing) = state.records.iter().find(|r| r.enabled) {
                return Err(ExtensionError::SingleImplementationViolation {
                    point: point_id.to_string(),
                    existing_owner: existing.owner.clone(),
                });
            }
        }

        let sequence = self.inner.sequence.fetch_add(1, Ordering::Relaxed);
        let at = state.records.partition_point(|r| r.priority >= priority);
        state.records.insert(
            at,
            ExtensionRecord {
                point_id: point_id.to_string(),
                owner: owner.to_string(),
                handle,
                priority,
                enabled: true,
                sequence,
                registered_at: Utc::now(),
            },
        );

        debug!(point = %point_id, plugin = %owner, priority, sequence, "Extension registered");
        Ok(())
    }

    /// Withdraw an extension contributed by `owner`
    pub fn unregister_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: &ExtensionHandle,
    ) -> Result<()> {
        let slot = self.slot(point_id)?;
        let mut state = slot.state.write();

        let before = state.records.len();
        state
            .records
            .retain(|r| !(r.owner == owner && r.handle == *handle));

        if state.records.len() == before {
            return Err(ExtensionError::ExtensionNotFound {
                point: point_id.to_string(),
                owner: owner.to_string(),
            });
        }

        debug!(point = %point_id, plugin = %owner, "Extension unregistered");
        Ok(())
    }

    /// Drop every extension contributed by `plugin_id`
    ///
    /// Returns the number of records removed.
    pub fn unregister_all_for_plugin(&self, plugin_id: &str) -> usize {
        let mut removed = 0;
        for slot in self.slots() {
            let mut state = slot.state.write();
            let before = state.records.len();
            state.records.retain(|r| r.owner != plugin_id);
            removed += before - state.records.len();
        }

        if removed > 0 {
            debug!(plugin = %plugin_id, removed, "Extensions purged");
        }
        removed
    }

    /// Enabled extensions of a point, best first
    pub fn query_extensions(&self, point_id: &str) -> Result<Vec<ExtensionRecord>> {
        let slot = self.slot(point_id)?;
        let state = slot.state.read();
        Ok(state.records.iter().filter(|r| r.enabled).cloned().collect())
    }

    /// Best enabled extension of a point, if any
    pub fn highest_priority(&self, point_id: &str) -> Result<Option<ExtensionRecord>> {
        let slot = self.slot(point_id)?;
        let state = slot.state.read();
        Ok(state.records.iter().find(|r| r.enabled).cloned())
    }

    /// Enabled instances of a point as their contract type, best first
    pub fn query<T: ?Sized + 'static>(&self, point_id: &str) -> Result<Vec<Arc<T>>> {
        let slot = self.typed_slot::<T>(point_id)?;
        let state = slot.state.read();
        Ok(state
            .records
            .iter()
            .filter(|r| r.enabled)
            .filter_map(|r| r.handle.downcast::<T>())
            .collect())
    }

    /// Best enabled instance of a point as its contract type
    pub fn highest<T: ?Sized + 'static>(&self, point_id: &str) -> Result<Option<Arc<T>>> {
        let slot = self.typed_slot::<T>(point_id)?;
        let state = slot.state.read();
        Ok(state
            .records
            .iter()
            .find(|r| r.enabled)
            .and_then(|r| r.handle.downcast::<T>()))
    }

    /// Enable or disable an extension
    ///
    /// Enabling a record on a single-implementation point that already has
    /// another enabled record fails and leaves both untouched.
    pub fn set_enabled(
        &self,
        point_id: &str,
        owner: &str,
        handle: &ExtensionHandle,
        enabled: bool,
    ) -> Result<()> {
        let slot = self.slot(point_id)?;
        let mut state = slot.state.write();

        let Some(index) = state
            .records
            .iter()
            .position(|r| r.owner == owner && r.handle == *handle)
        else {
            return Err(ExtensionError::ExtensionNotFound {
                point: point_id.to_string(),
                owner: owner.to_string(),
            });
        };

        if enabled && !slot.point.allow_multiple {
            if let Some(existing) = state
                .records
                .iter()
                .enumerate()
                .find(|(i, r)| *i != index && r.enabled)
                .map(|(_, r)| r)
            {
                return Err(ExtensionError::SingleImplementationViolation {
                    point: point_id.to_string(),
                    existing_owner: existing.owner.clone(),
                });
            }
        }

        state.records[index].enabled = enabled;
        debug!(point = %point_id, plugin = %owner, enabled, "Extension toggled");
        Ok(())
    }

    /// Declared extension points, sorted by id
    pub fn points(&self) -> Vec<ExtensionPoint> {
        let mut points: Vec<ExtensionPoint> = self
            .inner
            .points
            .iter()
            .map(|slot| slot.point.clone())
            .collect();
        points.sort_by(|a, b| a.id.cmp(&b.id));
        points
    }

    /// Look up a point declaration
    pub fn point(&self, point_id: &str) -> Option<ExtensionPoint> {
        self.inner.points.get(point_id).map(|slot| slot.point.clone())
    }

    /// Every extension contributed by `owner`, enabled or not
    pub fn extensions_by_owner(&self, owner: &str) -> Vec<ExtensionRecord> {
        let mut records: Vec<ExtensionRecord> = self
            .slots()
            .iter()
            .flat_map(|slot| {
                slot.state
                    .read()
                    .records
                    .iter()
                    .filter(|r| r.owner == owner)
                    .cloned()
                    .collect::<Vec<_>>()
            })
            .collect();
        records.sort_by_key(|r| r.sequence);
        records
    }

    /// Allow `plugin_id` to register extensions, returning the new epoch
    pub(crate) fn admit(&self, plugin_id: &str) -> u64 {
        let epoch = self.inner.epochs.fetch_add(1, Ordering::Relaxed) + 1;
        self.inner.admitted.insert(plugin_id.to_string(), epoch);
        epoch
    }

    /// Registrar for one hook invocation of `plugin_id`
    ///
    /// It carries the plugin's admission as of now. Registrations fail once
    /// `token` is cancelled or the plugin has been admitted again.
    pub(crate) fn scoped(&self, plugin_id: &str, token: CancellationToken) -> ScopedRegistrar {
        ScopedRegistrar {
            registry: self.clone(),
            invocation: Invocation {
                epoch: self.inner.admitted.get(plugin_id).map(|epoch| *epoch),
                token,
            },
        }
    }

    /// Withdraw the admission of `plugin_id` and purge its extensions
    pub(crate) fn revoke(&self, plugin_id: &str) -> usize {
        self.inner.admitted.remove(plugin_id);
        self.unregister_all_for_plugin(plugin_id)
    }

    fn slot(&self, point_id: &str) -> Result<Arc<PointSlot>> {
        self.inner
            .points
            .get(point_id)
            .map(|slot| Arc::clone(slot.value()))
            .ok_or_else(|| ExtensionError::PointNotFound(point_id.to_string()))
    }

    fn typed_slot<T: ?Sized + 'static>(&self, point_id: &str) -> Result<Arc<PointSlot>> {
        let slot = self.slot(point_id)?;
        let requested = ContractId::of::<T>();
        if slot.point.contract != requested {
            return Err(ExtensionError::ContractMismatch {
                point: point_id.to_string(),
                expected: slot.point.contract.name().to_string(),
                actual: requested.name().to_string(),
            });
        }
        Ok(slot)
    }

    fn slots(&self) -> Vec<Arc<PointSlot>> {
        self.inner
            .points
            .iter()
            .map(|slot| Arc::clone(slot.value()))
            .collect()
    }
}

#[derive(Debug)]
struct Invocation {
    epoch: Option<u64>,
    token: CancellationToken,
}

/// Registrar handed to a single hook invocation
#[derive(Debug)]
pub(crate) struct ScopedRegistrar {
    registry: ExtensionRegistry,
    invocation: Invocation,
}

impl ExtensionRegistrar for ScopedRegistrar {
    fn register_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: ExtensionHandle,
        priority: i32,
    ) -> Result<()> {
        self.registry
            .register_as(point_id, owner, handle, priority, Some(&self.invocation))
    }

    fn unregister_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: &ExtensionHandle,
    ) -> Result<()> {
        self.registry.unregister_extension(point_id, owner, handle)
    }
}

impl ExtensionRegistrar for ExtensionRegistry {
    fn register_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: ExtensionHandle,
        priority: i32,
    ) -> Result<()> {
        ExtensionRegistry::register_extension(self, point_id, owner, handle, priority)
    }

    fn unregister_extension(
        &self,
        point_id: &str,
        owner: &str,
        handle: &ExtensionHandle,
    ) -> Result<()> {
        ExtensionRegistry::unregister_extension(self, point_id, owner, handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    trait Formatter: Send + Sync {
        fn format(&self, input: &str) -> String;
    }

    trait Storage: Send + Sync {}

    struct Prefix(&'static str);

    impl Formatter for Prefix {
        fn format(&self, input: &str) -> String {
            format!("{}{input}", self.0)
        }
    }

    struct Sqlite;
    impl Storage for Sqlite {}

    fn formatter(prefix: &'static str) -> ExtensionHandle {
        let instance: Arc<dyn Formatter> = Arc::new(Prefix(prefix));
        ExtensionHandle::new(instance)
    }

    fn storage() -> ExtensionHandle {
        let instance: Arc<dyn Storage> = Arc::new(Sqlite);
        ExtensionHandle::new(instance)
    }

    fn registry_with_points() -> ExtensionRegistry {
        let registry = ExtensionRegistry::new();
        registry
            .register_extension_point(ExtensionPoint::new::<dyn Formatter>("formatter"))
            .unwrap();
        registry
            .register_extension_point(ExtensionPoint::new::<dyn Storage>("storage").single())
            .unwrap();
        registry.admit("p1");
        registry.admit("p2");
        registry
    }

    #[test]
    fn test_duplicate_point() {
        let registry = registry_with_points();
        let err = registry
            .register_extension_point(ExtensionPoint::new::<dyn Formatter>("formatter"))
            .unwrap_err();
        assert_eq!(err, ExtensionError::DuplicatePoint("formatter".into()));
    }

    #[test]
    fn test_priority_then_sequence_order() {
        let registry = registry_with_points();
        let low = formatter("low:");
        let first_high = formatter("high1:");
        let second_high = formatter("high2:");

        registry.register_extension("formatter", "p1", low.clone(), 1).unwrap();
        registry.register_extension("formatter", "p2", first_high.clone(), 10).unwrap();
        registry.register_extension("formatter", "p1", second_high.clone(), 10).unwrap();

        let records = registry.query_extensions("formatter").unwrap();
        let handles: Vec<_> = records.iter().map(|r| r.handle.clone()).collect();
        assert_eq!(handles, vec![first_high.clone(), second_high, low]);

        let best = registry.highest_priority("formatter").unwrap().unwrap();
        assert_eq!(best.handle, first_high);
        assert_eq!(best.owner, "p2");
    }

    #[test]
    fn test_typed_query() {
        let registry = registry_with_points();
        registry.register_extension("formatter", "p1", formatter("a:"), 1).unwrap();
        registry.register_extension("formatter", "p2", formatter("b:"), 5).unwrap();

        let formatters = registry.query::<dyn Formatter>("formatter").unwrap();
        let output: Vec<String> = formatters.iter().map(|f| f.format("x")).collect();
        assert_eq!(output, vec!["b:x", "a:x"]);

        let best = registry.highest::<dyn Formatter>("formatter").unwrap().unwrap();
        assert_eq!(best.format("y"), "b:y");

        assert!(matches!(
            registry.query::<dyn Storage>("formatter"),
            Err(ExtensionError::ContractMismatch { .. })
        ));
    }

    #[test]
    fn test_contract_mismatch() {
        let registry = registry_with_points();
        let err = registry
            .register_extension("formatter", "p1", storage(), 0)
            .unwrap_err();
        assert!(matches!(err, ExtensionError::ContractMismatch { ref point, .. } if point == "formatter"));
        assert!(registry.query_extensions("formatter").unwrap().is_empty());
    }

    #[test]
    fn test_single_implementation() {
        let registry = registry_with_points();
        let first = storage();
        registry.register_extension("storage", "p1", first.clone(), 0).unwrap();

        let err = registry
            .register_extension("storage", "p2", storage(), 100)
            .unwrap_err();
        assert_eq!(
            err,
            ExtensionError::SingleImplementationViolation {
                point: "storage".into(),
                existing_owner: "p1".into(),
            }
        );

        let records = registry.query_extensions("storage").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].handle, first);
    }

    #[test]
    fn test_disabled_extension_frees_single_slot() {
        let registry = registry_with_points();
        let first = storage();
        let second = storage();
        registry.register_extension("storage", "p1", first.clone(), 0).unwrap();
        registry.set_enabled("storage", "p1", &first, false).unwrap();
        registry.register_extension("storage", "p2", second.clone(), 0).unwrap();

        assert_eq!(registry.highest_priority("storage").unwrap().unwrap().handle, second);
        assert!(matches!(
            registry.set_enabled("storage", "p1", &first, true),
            Err(ExtensionError::SingleImplementationViolation { .. })
        ));
        assert_eq!(registry.extensions_by_owner("p1").len(), 1);
    }

    #[test]
    fn test_rejects_unadmitted_owner() {
        let registry = registry_with_points();
        let err = registry
            .register_extension("formatter", "stranger", formatter(""), 0)
            .unwrap_err();
        assert_eq!(
            err,
            ExtensionError::RegistrationRejected {
                point: "formatter".into(),
                owner: "stranger".into(),
            }
        );
    }

    #[test]
    fn test_unknown_point() {
        let registry = registry_with_points();
        assert_eq!(
            registry.register_extension("menu", "p1", formatter(""), 0).unwrap_err(),
            ExtensionError::PointNotFound("menu".into())
        );
        assert!(registry.query_extensions("menu").is_err());
    }

    #[test]
    fn test_unregister_extension() {
        let registry = registry_with_points();
        let handle = formatter("a");
        registry.register_extension("formatter", "p1", handle.clone(), 0).unwrap();

        assert!(matches!(
            registry.unregister_extension("formatter", "p2", &handle),
            Err(ExtensionError::ExtensionNotFound { .. })
        ));
        registry.unregister_extension("formatter", "p1", &handle).unwrap();
        assert!(registry.query_extensions("formatter").unwrap().is_empty());
    }

    #[test]
    fn test_scoped_registrar_is_bound_to_its_admission() {
        let registry = registry_with_points();
        let stale = registry.scoped("p1", CancellationToken::new());

        registry.revoke("p1");
        registry.admit("p1");
        let current = registry.scoped("p1", CancellationToken::new());

        assert!(matches!(
            stale.register_extension("storage", "p1", storage(), 9),
            Err(ExtensionError::RegistrationRejected { .. })
        ));
        current.register_extension("storage", "p1", storage(), 1).unwrap();

        let records = registry.query_extensions("storage").unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].priority, 1);
    }

    #[test]
    fn test_scoped_registrar_rejects_after_cancellation() {
        let registry = registry_with_points();
        let token = CancellationToken::new();
        let scoped = registry.scoped("p1", token.clone());

        scoped.register_extension("formatter", "p1", formatter("a"), 0).unwrap();
        token.cancel();
        assert!(scoped
            .register_extension("formatter", "p1", formatter("b"), 0)
            .is_err());

        let unadmitted = registry.scoped("ghost", CancellationToken::new());
        assert!(unadmitted
            .register_extension("formatter", "ghost", formatter("c"), 0)
            .is_err());
    }

    #[test]
    fn test_revoke_purges_and_blocks() {
        let registry = registry_with_points();
        registry.register_extension("formatter", "p1", formatter("a"), 0).unwrap();
        registry.register_extension("storage", "p1", storage(), 0).unwrap();
        registry.register_extension("formatter", "p2", formatter("b"), 0).unwrap();

        assert_eq!(registry.revoke("p1"), 2);
        assert!(registry.extensions_by_owner("p1").is_empty());
        assert_eq!(registry.query_extensions("formatter").unwrap().len(), 1);
        assert!(registry
            .register_extension("formatter", "p1", formatter("c"), 0)
            .is_err());
    }

    #[test]
    fn test_unregister_point_drops_extensions() {
        let registry = registry_with_points();
        registry.register_extension("formatter", "p1", formatter("a"), 0).unwrap();

        let dropped = registry.unregister_extension_point("formatter").unwrap();
        assert_eq!(dropped.len(), 1);
        assert!(registry.point("formatter").is_none());
        assert_eq!(registry.points().len(), 1);

        // The id can be declared again afterwards
        registry
            .register_extension_point(ExtensionPoint::new::<dyn Formatter>("formatter"))
            .unwrap();
        assert!(registry.query_extensions("formatter").unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_registration_keeps_order() {
        let registry = registry_with_points();
        std::thread::scope(|scope| {
            for worker in 0..8 {
                let registry = registry.clone();
                scope.spawn(move || {
                    for i in 0..50 {
                        let owner = if worker % 2 == 0 { "p1" } else { "p2" };
                        registry
                            .register_extension("formatter", owner, formatter("x"), (i % 7) as i32)
                            .unwrap();
                    }
                });
            }
        });

        let records = registry.query_extensions("formatter").unwrap();
        assert_eq!(records.len(), 400);
        for pair in records.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            assert!(a.priority > b.priority || (a.priority == b.priority && a.sequence < b.sequence));
        }
    }
}
