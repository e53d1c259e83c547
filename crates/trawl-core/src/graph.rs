//! The in-memory module graph.
//!
//! Modules live in an arena and refer to each other by `ModuleId`, so the
//! graph can hold cycles without leaking and replacing a module is an id
//! swap in the parent's dependency vector. Dependency order is insertion
//! order and is preserved across rewrites.
//!
//! A module is *unidentified* while `identifier` is `None`; it then carries
//! only its specification. Supplicants are the reverse edges (modules that
//! depend on this one) and are deduplicated by identifier.

use std::collections::HashSet;
use std::fmt;

use crate::id::ModuleIdentifier;
use crate::spec::ModuleSpec;

/// Stable arena index of a module
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ModuleId(usize);

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A module in the graph
#[derive(Debug, Clone)]
pub struct ModuleNode {
    /// True when the module was listed at the root by the user
    pub explicit: bool,
    /// None until the module has been identified
    pub identifier: Option<ModuleIdentifier>,
    /// The specification that requested this module
    pub spec: ModuleSpec,
    dependencies: Vec<ModuleId>,
    supplicants: Vec<ModuleId>,
    removed: bool,
}

impl ModuleNode {
    pub fn dependencies(&self) -> &[ModuleId] {
        &self.dependencies
    }

    pub fn supplicants(&self) -> &[ModuleId] {
        &self.supplicants
    }

    /// Short or long display form; the long form prefixes `*`/`+` for
    /// explicit/implicit and `!`/`?` for identified/unidentified.
    pub fn describe(&self, long_form: bool) -> String {
        let mut text = String::new();
        if let Some(identifier) = &self.identifier {
            text.push_str(&format!("id={}", identifier));
        }
        if long_form || self.identifier.is_some() {
            if !text.is_empty() {
                text.push_str(", ");
            }
            text.push_str(&format!("spec={}", self.spec));
        }
        if long_form {
            if !self.dependencies.is_empty() {
                text.push_str(&format!(", dependencies={}", self.dependencies.len()));
            }
            if !self.supplicants.is_empty() {
                text.push_str(&format!(", supplicants={}", self.supplicants.len()));
            }
            let explicit = if self.explicit { '*' } else { '+' };
            let identified = if self.identifier.is_some() { '!' } else { '?' };
            text = format!("{}{} {}", explicit, identified, text);
        }
        text
    }
}

/// Arena of modules reachable from an explicit root set
#[derive(Debug, Default)]
pub struct ModuleGraph {
    nodes: Vec<ModuleNode>,
    roots: Vec<ModuleId>,
}

impl ModuleGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a module to the arena
    pub fn add_module(
        &mut self,
        spec: ModuleSpec,
        explicit: bool,
        identifier: Option<ModuleIdentifier>,
    ) -> ModuleId {
        let id = ModuleId(self.nodes.len());
        self.nodes.push(ModuleNode {
            explicit,
            identifier,
            spec,
            dependencies: Vec::new(),
            supplicants: Vec::new(),
            removed: false,
        });
        if explicit {
            self.roots.push(id);
        }
        id
    }

    pub fn node(&self, id: ModuleId) -> &ModuleNode {
        &self.nodes[id.0]
    }

    pub fn node_mut(&mut self, id: ModuleId) -> &mut ModuleNode {
        &mut self.nodes[id.0]
    }

    pub fn roots(&self) -> &[ModuleId] {
        &self.roots
    }

    pub fn is_live(&self, id: ModuleId) -> bool {
        !self.nodes[id.0].removed
    }

    /// All modules that have not been removed
    pub fn live_modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleNode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| !node.removed)
            .map(|(index, node)| (ModuleId(index), node))
    }

    /// Live modules that carry an identifier
    pub fn identified_modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleNode)> {
        self.live_modules()
            .filter(|(_, node)| node.identifier.is_some())
    }

    /// Live modules still waiting for identification
    pub fn unidentified_modules(&self) -> impl Iterator<Item = (ModuleId, &ModuleNode)> {
        self.live_modules()
            .filter(|(_, node)| node.identifier.is_none())
    }

    /// Append a forward edge; back edges are the engine's decision
    pub fn add_dependency(&mut self, parent: ModuleId, child: ModuleId) {
        self.nodes[parent.0].dependencies.push(child);
    }

    /// Add a reverse edge, idempotent under identifier equality
    pub fn add_supplicant(&mut self, module: ModuleId, supplicant: ModuleId) {
        let already_present = self.nodes[module.0].supplicants.iter().any(|&existing| {
            existing == supplicant
                || match (
                    &self.nodes[existing.0].identifier,
                    &self.nodes[supplicant.0].identifier,
                ) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
        });
        if !already_present {
            self.nodes[module.0].supplicants.push(supplicant);
        }
    }

    /// Drop the supplicant whose identifier matches, if present
    pub fn remove_supplicant(&mut self, module: ModuleId, identifier: &ModuleIdentifier) {
        let position = self.nodes[module.0].supplicants.iter().position(|&sup| {
            self.nodes[sup.0]
                .identifier
                .as_ref()
                .is_some_and(|existing| existing == identifier)
        });
        if let Some(position) = position {
            self.nodes[module.0].supplicants.remove(position);
        }
    }

    /// Union `from`'s supplicants into `into`; `into` becomes explicit when
    /// `from` was
    pub fn merge_supplicants(&mut self, into: ModuleId, from: ModuleId) {
        if self.nodes[from.0].explicit {
            self.nodes[into.0].explicit = true;
        }
        let supplicants = self.nodes[from.0].supplicants.clone();
        for supplicant in supplicants {
            if supplicant != into {
                self.add_supplicant(into, supplicant);
            }
        }
    }

    /// Overwrite `target`'s identifier and dependency list from `source`
    pub fn copy_identification_from(&mut self, target: ModuleId, source: ModuleId) {
        self.nodes[target.0].identifier = self.nodes[source.0].identifier.clone();
        self.nodes[target.0].dependencies = self.nodes[source.0].dependencies.clone();
    }

    /// Substitute `new` for every dependency whose identifier matches `old`,
    /// walking from the roots. The owning module becomes a supplicant of
    /// `new` and forgets `old` as a supplicant. The walk carries a visited
    /// set because the graph may be cyclic.
    pub fn replace_module(&mut self, old: ModuleId, new: ModuleId, recursive: bool) {
        let Some(old_identifier) = self.nodes[old.0].identifier.clone() else {
            return;
        };
        let mut visited = HashSet::new();
        let roots = self.roots.clone();
        for root in roots {
            self.replace_in(root, &old_identifier, new, recursive, &mut visited);
        }
    }

    fn replace_in(
        &mut self,
        owner: ModuleId,
        old_identifier: &ModuleIdentifier,
        new: ModuleId,
        recursive: bool,
        visited: &mut HashSet<ModuleId>,
    ) {
        if !visited.insert(owner) || !self.is_live(owner) {
            return;
        }
        self.remove_supplicant(owner, old_identifier);
        for position in 0..self.nodes[owner.0].dependencies.len() {
            let dependency = self.nodes[owner.0].dependencies[position];
            let matches_old = self.nodes[dependency.0]
                .identifier
                .as_ref()
                .is_some_and(|identifier| identifier == old_identifier);
            let dependency = if matches_old && dependency != new {
                self.nodes[owner.0].dependencies[position] = new;
                self.add_supplicant(new, owner);
                new
            } else {
                dependency
            };
            if recursive {
                self.replace_in(dependency, old_identifier, new, true, visited);
            }
        }
    }

    /// Redirect every reference to `old` (by arena id) to `target`, merge
    /// its supplicants and tombstone it. Used when a repository hands back a
    /// module that was already identified under the same identifier.
    pub fn redirect_module(&mut self, old: ModuleId, target: ModuleId) {
        if old == target {
            return;
        }
        for index in 0..self.nodes.len() {
            if self.nodes[index].removed {
                continue;
            }
            let owner = ModuleId(index);
            let mut pointed = false;
            let dependencies = &mut self.nodes[index].dependencies;
            if dependencies.contains(&target) {
                dependencies.retain(|&dependency| dependency != old);
                pointed = dependencies.contains(&target);
            } else {
                for dependency in dependencies.iter_mut() {
                    if *dependency == old {
                        *dependency = target;
                        pointed = true;
                    }
                }
            }
            if pointed && owner != target {
                self.add_supplicant(target, owner);
            }
        }
        self.merge_supplicants(target, old);
        self.remove_module(old);
    }

    /// Tombstone a module, detach it from its parents, and cascade into
    /// dependencies left without any live parent (unless explicit).
    pub fn remove_module(&mut self, id: ModuleId) {
        let mut pending = vec![id];
        while let Some(current) = pending.pop() {
            if self.nodes[current.0].removed {
                continue;
            }
            self.nodes[current.0].removed = true;
            self.roots.retain(|&root| root != current);
            for index in 0..self.nodes.len() {
                self.nodes[index]
                    .dependencies
                    .retain(|&dependency| dependency != current);
                self.nodes[index]
                    .supplicants
                    .retain(|&supplicant| supplicant != current);
            }
            let dependencies = self.nodes[current.0].dependencies.clone();
            for dependency in dependencies {
                let node = &self.nodes[dependency.0];
                if node.removed || node.explicit {
                    continue;
                }
                let orphaned = !self
                    .nodes
                    .iter()
                    .enumerate()
                    .any(|(index, other)| {
                        !other.removed
                            && index != dependency.0
                            && other.dependencies.contains(&dependency)
                    });
                if orphaned {
                    pending.push(dependency);
                }
            }
        }
    }

    /// Check that forward and reverse edges mirror each other for every
    /// identified module. Returns the first violation found.
    pub fn check_integrity(&self) -> Result<(), String> {
        for (id, node) in self.identified_modules() {
            for &dependency in &node.dependencies {
                if !self.is_live(dependency) {
                    return Err(format!("{} depends on removed {}", id, dependency));
                }
                if self.nodes[dependency.0].identifier.is_some()
                    && !self.nodes[dependency.0].supplicants.contains(&id)
                {
                    return Err(format!(
                        "dependency edge {} -> {} has no supplicant back edge",
                        id, dependency
                    ));
                }
            }
            for &supplicant in &node.supplicants {
                if !self.is_live(supplicant) {
                    return Err(format!("{} lists removed supplicant {}", id, supplicant));
                }
                if !self.nodes[supplicant.0].dependencies.contains(&id) {
                    return Err(format!(
                        "supplicant edge {} -> {} has no dependency forward edge",
                        supplicant, id
                    ));
                }
            }
        }
        Ok(())
    }
}
