//! Dependency validation, traversal, and load-order computation.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;

use crate::error::{PluginError, PluginResult};
use crate::plugin::{PluginDescriptor, PluginState};
use crate::registry::PluginRegistry;

/// One partially-explored node on the traversal stack.
struct VisitFrame {
    deps: Vec<String>,
    next: usize,
}

/// Resolves plugin dependencies against the registry.
///
/// Lifecycle state is passed in per call; the resolver holds no reference
/// back to the manager.
#[derive(Debug, Clone)]
pub struct DependencyResolver {
    registry: Arc<PluginRegistry>,
}

impl DependencyResolver {
    /// Create a resolver over the given registry.
    #[must_use]
    pub fn new(registry: Arc<PluginRegistry>) -> Self {
        Self { registry }
    }

    /// Check that every declared dependency is registered and currently
    /// usable (`Loaded` or `Started`) in the supplied state view.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::MissingDependency`] listing every
    /// unregistered dependency, or [`PluginError::IncompatibleDependency`]
    /// listing every dependency in an unusable state. Missing dependencies
    /// take precedence when both occur.
    pub fn validate(
        &self,
        descriptor: &PluginDescriptor,
        states: &HashMap<String, PluginState>,
    ) -> PluginResult<()> {
        if descriptor.dependencies.is_empty() {
            return Ok(());
        }

        let mut missing = Vec::new();
        let mut incompatible = Vec::new();

        for dep_id in &descriptor.dependencies {
            if self.registry.descriptor(dep_id).is_none() {
                missing.push(dep_id.clone());
                continue;
            }

            match states.get(dep_id) {
                Some(PluginState::Loaded | PluginState::Started) => {},
                Some(state) => incompatible.push(format!("{dep_id} (state: {state})")),
                None => incompatible.push(format!("{dep_id} (not loaded)")),
            }
        }

        if !missing.is_empty() {
            return Err(PluginError::MissingDependency {
                plugin_id: descriptor.id.clone(),
                missing,
            });
        }

        if !incompatible.is_empty() {
            return Err(PluginError::IncompatibleDependency {
                plugin_id: descriptor.id.clone(),
                incompatible,
            });
        }

        Ok(())
    }

    /// Build the full dependency adjacency map reachable from one plugin.
    ///
    /// Depth-first, with an explicit stack. A node is marked only while it
    /// sits on the active path and the mark clears when the traversal
    /// returns, so shared dependencies are revisited through every path
    /// rather than cached.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::CircularDependency`] carrying the offending
    /// chain if a node is reached again while still on the active path, and
    /// [`PluginError::UnknownPlugin`] if any reached plugin is not
    /// registered.
    pub fn dependency_tree(&self, plugin_id: &str) -> PluginResult<HashMap<String, Vec<String>>> {
        let mut tree: HashMap<String, Vec<String>> = HashMap::new();
        let mut path: Vec<String> = Vec::new();
        let mut on_path: HashSet<String> = HashSet::new();

        let root = self.enter(plugin_id, &mut tree, &mut path, &mut on_path)?;
        let mut stack: Vec<VisitFrame> = vec![root];

        loop {
            let next_dep = match stack.last_mut() {
                Some(frame) => {
                    let dep = frame.deps.get(frame.next).cloned();
                    if dep.is_some() {
                        frame.next = frame.next.saturating_add(1);
                    }
                    dep
                },
                None => break,
            };

            match next_dep {
                Some(dep) => {
                    let child = self.enter(&dep, &mut tree, &mut path, &mut on_path)?;
                    stack.push(child);
                },
                None => {
                    stack.pop();
                    if let Some(done) = path.pop() {
                        on_path.remove(&done);
                    }
                },
            }
        }

        Ok(tree)
    }

    /// Visit one node: detect cycles, record its dependency list, and put
    /// it on the active path.
    fn enter(
        &self,
        id: &str,
        tree: &mut HashMap<String, Vec<String>>,
        path: &mut Vec<String>,
        on_path: &mut HashSet<String>,
    ) -> PluginResult<VisitFrame> {
        if on_path.contains(id) {
            let mut cycle: Vec<String> = path
                .iter()
                .skip_while(|node| node.as_str() != id)
                .cloned()
                .collect();
            cycle.push(id.to_string());
            return Err(PluginError::CircularDependency { path: cycle });
        }

        let Some(descriptor) = self.registry.descriptor(id) else {
            return Err(PluginError::UnknownPlugin(id.to_string()));
        };

        tree.insert(id.to_string(), descriptor.dependencies.clone());
        path.push(id.to_string());
        on_path.insert(id.to_string());

        Ok(VisitFrame {
            deps: descriptor.dependencies,
            next: 0,
        })
    }

    /// Compute a load order in which every dependency precedes its
    /// dependents, using Kahn's algorithm.
    ///
    /// Each plugin's in-degree starts as the count of its own declared
    /// dependencies. Ties among simultaneously-ready plugins break in input
    /// order. The sort only sees the supplied set: a dependency outside it
    /// never resolves, so the declaring plugin is reported as part of a
    /// cycle.
    ///
    /// # Errors
    ///
    /// Returns [`PluginError::UnknownPlugin`] if an input ID is not
    /// registered and [`PluginError::CircularDependency`] naming the
    /// unresolved plugins if the order comes up short.
    pub fn load_order(&self, ids: &[String]) -> PluginResult<Vec<String>> {
        let mut graph: HashMap<&str, Vec<String>> = HashMap::with_capacity(ids.len());
        let mut in_degree: HashMap<&str, usize> = HashMap::with_capacity(ids.len());

        for id in ids {
            let Some(descriptor) = self.registry.descriptor(id) else {
                return Err(PluginError::UnknownPlugin(id.clone()));
            };
            in_degree.insert(id, descriptor.dependencies.len());
            graph.insert(id, descriptor.dependencies);
        }

        let mut queue: VecDeque<&str> = ids
            .iter()
            .map(String::as_str)
            .filter(|id| in_degree.get(id) == Some(&0))
            .collect();

        let mut order: Vec<String> = Vec::with_capacity(ids.len());
        while let Some(current) = queue.pop_front() {
            order.push(current.to_string());

            for id in ids {
                let Some(deps) = graph.get(id.as_str()) else {
                    continue;
                };
                let occurrences = deps.iter().filter(|dep| *dep == current).count();
                if occurrences == 0 {
                    continue;
                }

                if let Some(degree) = in_degree.get_mut(id.as_str()) {
                    if *degree > 0 {
                        *degree = degree.saturating_sub(occurrences);
                        if *degree == 0 {
                            queue.push_back(id.as_str());
                        }
                    }
                }
            }
        }

        if order.len() != ids.len() {
            let resolved: HashSet<&str> = order.iter().map(String::as_str).collect();
            let remainder: Vec<String> = ids
                .iter()
                .filter(|id| !resolved.contains(id.as_str()))
                .cloned()
                .collect();
            return Err(PluginError::CircularDependency { path: remainder });
        }

        Ok(order)
    }
}
