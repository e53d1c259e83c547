//! Conflict detection and resolution.
//!
//! Identified modules are partitioned by logical identity; any class with
//! more than one member is a conflict. One member wins under the configured
//! policy and the graph is rewritten so every dependency edge lands on the
//! winner. Rejected members leave the graph along with any of their
//! dependencies nothing else needs.

use std::collections::BTreeMap;

use trawl_core::{ModuleGraph, ModuleId, ModuleIdentifier, Notifier};

/// How a conflict picks its winner
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Highest version wins
    #[default]
    Newest,
    /// Lowest version wins
    Oldest,
    /// Members requested (transitively) by an explicit module win;
    /// ties fall back to newest
    ExplicitWins,
}

impl std::str::FromStr for ConflictPolicy {
    type Err = trawl_core::TrawlError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "-").as_str() {
            "newest" => Ok(ConflictPolicy::Newest),
            "oldest" => Ok(ConflictPolicy::Oldest),
            "explicit-wins" => Ok(ConflictPolicy::ExplicitWins),
            _ => Err(trawl_core::TrawlError::ConfigValidation {
                field: "policy".to_string(),
                reason: format!("unknown conflict policy '{}'", s),
            }),
        }
    }
}

/// A resolved conflict, for reporting
#[derive(Debug, Clone)]
pub struct ResolvedConflict {
    pub chosen: ModuleIdentifier,
    pub rejected: Vec<ModuleIdentifier>,
}

/// Find all conflicts among identified modules. Members of each class are
/// sorted descending by version; class order follows logical identity so
/// output is deterministic.
pub fn find_conflicts(graph: &ModuleGraph) -> Vec<Vec<ModuleId>> {
    let mut classes: BTreeMap<(String, String), Vec<ModuleId>> = BTreeMap::new();
    for (id, node) in graph.identified_modules() {
        let Some(identifier) = &node.identifier else {
            continue;
        };
        classes
            .entry((identifier.group.clone(), identifier.name.clone()))
            .or_default()
            .push(id);
    }
    classes
        .into_values()
        .filter(|members| members.len() > 1)
        .map(|mut members| {
            members.sort_by(|&a, &b| {
                let a = graph.node(a).identifier.as_ref().map(|i| &i.version);
                let b = graph.node(b).identifier.as_ref().map(|i| &i.version);
                b.cmp(&a)
            });
            members
        })
        .collect()
}

/// Resolve every conflict under `policy`, rewriting the graph in place.
/// After this, no two live modules share a logical identity.
pub fn resolve_conflicts(
    graph: &mut ModuleGraph,
    policy: ConflictPolicy,
    notifier: &dyn Notifier,
) -> Vec<ResolvedConflict> {
    let mut resolved = Vec::new();
    for members in find_conflicts(graph) {
        let chosen = choose(graph, &members, policy);
        let Some(chosen_identifier) = graph.node(chosen).identifier.clone() else {
            continue;
        };
        let total = members.len();
        let mut rejected_identifiers = Vec::new();
        for &rejected in members.iter().filter(|&&member| member != chosen) {
            let Some(old_identifier) = graph.node(rejected).identifier.clone() else {
                continue;
            };
            graph.replace_module(rejected, chosen, true);
            graph.merge_supplicants(chosen, rejected);
            // Specifications that asked for the loser now pin the winner
            let live: Vec<ModuleId> = graph.live_modules().map(|(id, _)| id).collect();
            for id in live {
                graph
                    .node_mut(id)
                    .spec
                    .rewrite(&old_identifier, &chosen_identifier);
            }
            graph.remove_module(rejected);
            rejected_identifiers.push(old_identifier);
        }
        notifier.info(&format!(
            "Resolved {}-way conflict to {} in {} repository",
            total, chosen_identifier, chosen_identifier.repository
        ));
        resolved.push(ResolvedConflict {
            chosen: chosen_identifier,
            rejected: rejected_identifiers,
        });
    }
    resolved
}

/// Pick the winner of one conflict class (members sorted descending)
fn choose(graph: &ModuleGraph, members: &[ModuleId], policy: ConflictPolicy) -> ModuleId {
    match policy {
        ConflictPolicy::Newest => members[0],
        ConflictPolicy::Oldest => members[members.len() - 1],
        ConflictPolicy::ExplicitWins => members
            .iter()
            .copied()
            .find(|&member| requested_by_explicit(graph, member))
            .unwrap_or(members[0]),
    }
}

/// Whether this exact version was asked for by the user: the member is
/// itself explicit, or an explicit module depends on it directly. Walking
/// whole supplicant chains would qualify every member, since every chain
/// ends at an explicit root.
fn requested_by_explicit(graph: &ModuleGraph, member: ModuleId) -> bool {
    let node = graph.node(member);
    node.explicit
        || node
            .supplicants()
            .iter()
            .any(|&supplicant| graph.node(supplicant).explicit)
}
