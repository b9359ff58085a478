//! # Method Registry
//!
//! Owns every registered method, grouped by the plugin that provided it.
//!
//! - A method name is owned by exactly one method (`NameConflict`)
//! - A plugin name is active at most once (`MethodConflict`)
//! - A plugin registers all of its methods or none of them
//! - Cycles among `requires` are rejected at registration

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::method::{MethodDescriptor, MethodKind};
use crate::collections::Metadata;
use crate::config::HorizonConfig;
use crate::errors::{HorizonError, HorizonResult};
use crate::observability::{log_event_with_fields, Event};

/// What a plugin may use while activating
#[derive(Clone)]
pub struct PluginContext {
    pub config: Arc<HorizonConfig>,
    pub metadata: Arc<Metadata>,
}

/// A named group of methods
pub trait Plugin: Send + Sync {
    fn name(&self) -> &str;

    /// The methods this plugin provides
    fn activate(&self, ctx: &PluginContext) -> HorizonResult<Vec<MethodDescriptor>>;

    /// Called after the plugin's methods were removed
    fn deactivate(&self, _ctx: &PluginContext) {}
}

struct ActivePlugin {
    plugin: Arc<dyn Plugin>,
    methods: Vec<String>,
}

#[derive(Default)]
struct RegistryState {
    methods: HashMap<String, Arc<MethodDescriptor>>,
    plugins: HashMap<String, ActivePlugin>,
}

/// Registry of methods, passed to the executor at construction
#[derive(Default)]
pub struct MethodRegistry {
    state: RwLock<RegistryState>,
}

impl MethodRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> HorizonResult<RwLockReadGuard<'_, RegistryState>> {
        self.state
            .read()
            .map_err(|_| HorizonError::internal("Registry lock poisoned"))
    }

    fn write(&self) -> HorizonResult<RwLockWriteGuard<'_, RegistryState>> {
        self.state
            .write()
            .map_err(|_| HorizonError::internal("Registry lock poisoned"))
    }

    /// Register a single method outside any plugin
    pub fn register(&self, descriptor: MethodDescriptor) -> HorizonResult<()> {
        let name = descriptor.name.clone();
        self.insert_all(vec![descriptor])
            .map_err(|e| rejected(&name, e))
    }

    /// Remove a method; returns it if it was registered
    pub fn unregister(&self, name: &str) -> HorizonResult<Option<Arc<MethodDescriptor>>> {
        Ok(self.write()?.methods.remove(name))
    }

    /// Activate a plugin and register its methods atomically
    pub fn add_plugin(&self, plugin: Arc<dyn Plugin>, ctx: &PluginContext) -> HorizonResult<()> {
        let plugin_name = plugin.name().to_string();
        if self.read()?.plugins.contains_key(&plugin_name) {
            return Err(rejected(
                &plugin_name,
                HorizonError::MethodConflict(format!(
                    "Plugin \"{}\" is already active",
                    plugin_name
                )),
            ));
        }

        let descriptors = plugin.activate(ctx)?;
        let names: Vec<String> = descriptors.iter().map(|d| d.name.clone()).collect();

        {
            let mut state = self.write()?;
            // Re-check under the write lock; another activation may have won
            if state.plugins.contains_key(&plugin_name) {
                return Err(HorizonError::MethodConflict(format!(
                    "Plugin \"{}\" is already active",
                    plugin_name
                )));
            }
            insert_checked(&mut state, descriptors).map_err(|e| rejected(&plugin_name, e))?;
            state.plugins.insert(
                plugin_name.clone(),
                ActivePlugin {
                    plugin,
                    methods: names.clone(),
                },
            );
        }

        log_event_with_fields(
            Event::PluginActivated,
            &[("plugin", &plugin_name), ("methods", &names.join(","))],
        );
        Ok(())
    }

    /// Unregister a plugin's methods and deactivate it
    pub fn remove_plugin(&self, name: &str, ctx: &PluginContext) -> HorizonResult<()> {
        let active = {
            let mut state = self.write()?;
            let active = state.plugins.remove(name).ok_or_else(|| {
                HorizonError::configuration(format!("Plugin \"{}\" is not active", name))
            })?;
            for method in &active.methods {
                state.methods.remove(method);
            }
            active
        };
        active.plugin.deactivate(ctx);
        log_event_with_fields(Event::PluginDeactivated, &[("plugin", name)]);
        Ok(())
    }

    fn insert_all(&self, descriptors: Vec<MethodDescriptor>) -> HorizonResult<()> {
        let mut state = self.write()?;
        insert_checked(&mut state, descriptors)
    }

    pub fn get(&self, name: &str) -> HorizonResult<Option<Arc<MethodDescriptor>>> {
        Ok(self.read()?.methods.get(name).cloned())
    }

    /// Registered method names, sorted
    pub fn names(&self) -> HorizonResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.methods.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Active plugin names, sorted
    pub fn plugins(&self) -> HorizonResult<Vec<String>> {
        let mut names: Vec<String> = self.read()?.plugins.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Prereqs needed by `roots`, dependencies first
    pub fn prereq_order(&self, roots: &[Arc<MethodDescriptor>]) -> HorizonResult<Vec<Arc<MethodDescriptor>>> {
        let state = self.read()?;
        let mut order = Vec::new();
        let mut visited = HashSet::new();
        for root in roots {
            for name in &root.requires {
                visit_prereq(&state.methods, name, &root.name, &mut visited, &mut order)?;
            }
        }
        Ok(order)
    }
}

fn rejected(name: &str, err: HorizonError) -> HorizonError {
    log_event_with_fields(
        Event::RegistrationRejected,
        &[("name", name), ("reason", &err.to_string())],
    );
    err
}

/// Insert descriptors if none of them conflicts and no cycle results
fn insert_checked(state: &mut RegistryState, descriptors: Vec<MethodDescriptor>) -> HorizonResult<()> {
    let mut batch = HashSet::new();
    for d in &descriptors {
        if state.methods.contains_key(&d.name) || !batch.insert(d.name.as_str()) {
            return Err(HorizonError::NameConflict(format!(
                "A method named \"{}\" is already registered",
                d.name
            )));
        }
    }

    let mut candidate = state.methods.clone();
    for d in descriptors {
        candidate.insert(d.name.clone(), Arc::new(d));
    }
    if let Some(cycle) = find_cycle(&candidate) {
        return Err(HorizonError::configuration(format!(
            "Cycle in method requirements: {}",
            cycle.join(" -> ")
        )));
    }

    state.methods = candidate;
    Ok(())
}

fn visit_prereq(
    methods: &HashMap<String, Arc<MethodDescriptor>>,
    name: &str,
    required_by: &str,
    visited: &mut HashSet<String>,
    order: &mut Vec<Arc<MethodDescriptor>>,
) -> HorizonResult<()> {
    if visited.contains(name) {
        return Ok(());
    }
    let descriptor = match methods.get(name) {
        Some(d) if d.kind() == MethodKind::Prereq => Arc::clone(d),
        _ => {
            return Err(HorizonError::configuration(format!(
                "\"{}\" requires \"{}\", which is not a registered prereq",
                required_by, name
            )))
        }
    };
    visited.insert(name.to_string());
    for dep in &descriptor.requires {
        visit_prereq(methods, dep, name, visited, order)?;
    }
    order.push(descriptor);
    Ok(())
}

/// A cycle among `requires` edges, as a path of names
fn find_cycle(methods: &HashMap<String, Arc<MethodDescriptor>>) -> Option<Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Visiting,
        Done,
    }

    fn dfs(
        methods: &HashMap<String, Arc<MethodDescriptor>>,
        name: &str,
        marks: &mut HashMap<String, Mark>,
        path: &mut Vec<String>,
    ) -> Option<Vec<String>> {
        match marks.get(name) {
            Some(Mark::Done) => return None,
            Some(Mark::Visiting) => {
                let start = path.iter().position(|n| n == name).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(name.to_string());
                return Some(cycle);
            }
            None => {}
        }
        // Unregistered requirements are reported at request time
        let descriptor = methods.get(name)?;
        marks.insert(name.to_string(), Mark::Visiting);
        path.push(name.to_string());
        for dep in &descriptor.requires {
            if let Some(cycle) = dfs(methods, dep, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks.insert(name.to_string(), Mark::Done);
        None
    }

    let mut marks = HashMap::new();
    let mut names: Vec<&String> = methods.keys().collect();
    names.sort();
    for name in names {
        let mut path = Vec::new();
        if let Some(cycle) = dfs(methods, name, &mut marks, &mut path) {
            return Some(cycle);
        }
    }
    None
}
