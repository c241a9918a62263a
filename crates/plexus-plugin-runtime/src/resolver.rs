//! Dependency resolution
//!
//! Turns a set of plugin descriptors into an activation order in which every
//! required dependency comes before the plugins that need it. Only required
//! edges whose target is part of the input constrain the order; an optional
//! dependency that is absent is ignored. Plugins without a path between them
//! may come out in any relative order.
//!
//! Resolution is a depth-first walk with an "on current path" set, so it runs
//! in O(plugins + edges) and keeps no state between calls.

use crate::error::{PluginRuntimeError, Result};
use plexus_plugin_api::PluginDescriptor;
use std::collections::{HashMap, HashSet};

/// Compute an activation order for `plugins`
///
/// # Errors
///
/// - [`PluginRuntimeError::CircularDependency`] naming the cycle
/// - [`PluginRuntimeError::DependencyNotFound`] for a missing required target
/// - [`PluginRuntimeError::IncompatibleDependency`] for a version mismatch
pub fn resolve_order<'a, I>(plugins: I) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a PluginDescriptor>,
{
    let mut resolver = Resolver::new(plugins);
    let ids: Vec<&str> = resolver.input_order.clone();
    for id in ids {
        resolver.visit(id)?;
    }
    Ok(resolver.order)
}

/// Activation order for `roots` and their transitive required dependencies
///
/// Plugins in `plugins` that no root reaches are left out of the order and
/// are not validated.
pub fn resolve_from<'a, I>(plugins: I, roots: &[&str]) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a PluginDescriptor>,
{
    let mut resolver = Resolver::new(plugins);
    for root in roots {
        let Some((&id, _)) = resolver.plugins.get_key_value(root) else {
            return Err(PluginRuntimeError::not_found(root));
        };
        resolver.visit(id)?;
    }
    Ok(resolver.order)
}

/// Activation order for a single plugin, ending with `id`
pub fn resolve_for<'a, I>(plugins: I, id: &str) -> Result<Vec<String>>
where
    I: IntoIterator<Item = &'a PluginDescriptor>,
{
    resolve_from(plugins, &[id])
}

/// Ids of plugins in `plugins` that declare a required dependency on `id`
pub fn direct_dependents<'a, I>(plugins: I, id: &str) -> Vec<String>
where
    I: IntoIterator<Item = &'a PluginDescriptor>,
{
    plugins
        .into_iter()
        .filter(|p| p.required_dependencies().any(|d| d.target == id))
        .map(|p| p.id.clone())
        .collect()
}

struct Resolver<'a> {
    plugins: HashMap<&'a str, &'a PluginDescriptor>,
    input_order: Vec<&'a str>,
    done: HashSet<&'a str>,
    on_path: HashSet<&'a str>,
    path: Vec<&'a str>,
    order: Vec<String>,
}

impl<'a> Resolver<'a> {
    fn new<I>(plugins: I) -> Self
    where
        I: IntoIterator<Item = &'a PluginDescriptor>,
    {
        let mut map = HashMap::new();
        let mut input_order = Vec::new();
        for descriptor in plugins {
            if map.insert(descriptor.id.as_str(), descriptor).is_none() {
                input_order.push(descriptor.id.as_str());
            }
        }

        Self {
            plugins: map,
            input_order,
            done: HashSet::new(),
            on_path: HashSet::new(),
            path: Vec::new(),
            order: Vec::new(),
        }
    }

    fn visit(&mut self, id: &'a str) -> Result<()> {
        if self.done.contains(id) {
            return Ok(());
        }

        if self.on_path.contains(id) {
            let start = self.path.iter().position(|p| *p == id).unwrap_or(0);
            let mut cycle: Vec<String> = self.path[start..].iter().map(|p| p.to_string()).collect();
            cycle.push(id.to_string());
            return Err(PluginRuntimeError::CircularDependency { cycle });
        }

        let Some(descriptor) = self.plugins.get(id).copied() else {
            return Err(PluginRuntimeError::not_found(id));
        };

        self.on_path.insert(id);
        self.path.push(id);

        for dep in &descriptor.dependencies {
            let Some(target) = self.plugins.get(dep.target.as_str()).copied() else {
                if dep.optional {
                    continue;
                }
                return Err(PluginRuntimeError::DependencyNotFound {
                    plugin: id.to_string(),
                    dependency: dep.target.clone(),
                });
            };

            if let Some(constraint) = &dep.constraint {
                if !constraint.is_satisfied_by(&target.version) {
                    return Err(PluginRuntimeError::IncompatibleDependency {
                        plugin: id.to_string(),
                        dependency: dep.target.clone(),
                        required: constraint.clone(),
                        actual: target.version.clone(),
                    });
                }
            }

            if !dep.optional {
                self.visit(target.id.as_str())?;
            }
        }

        self.path.pop();
        self.on_path.remove(id);
        self.done.insert(id);
        self.order.push(id.to_string());

        Ok(())
    }
}
