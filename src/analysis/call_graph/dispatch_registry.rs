//! Dispatch Registry for virtual call resolution
//!
//! Tracks which types derive from (or implement) which interfaces and which
//! concrete types are instantiated, and resolves a virtual method call to the
//! method definitions it may reach.

use crate::analysis::aggregation::Program;
use crate::config::AnalysisSettings;
use crate::core::{QualifiedName, SymbolId, SymbolTable};
use im::{HashMap, HashSet};
use std::collections::{BTreeSet, VecDeque};

/// Outcome of resolving one virtual call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualResolution {
    /// Reachable method definitions, sorted by id
    pub candidates: Vec<SymbolId>,
    /// The dynamic type was proven; `candidates` holds exactly one method
    pub monomorphic: bool,
}

/// Registry of type relations and instantiated types
#[derive(Debug, Clone, Default)]
pub struct DispatchRegistry {
    /// type -> direct bases
    bases: HashMap<QualifiedName, BTreeSet<QualifiedName>>,
    /// base -> direct derived types
    derived: HashMap<QualifiedName, BTreeSet<QualifiedName>>,
    instantiated: HashSet<QualifiedName>,
}

impl DispatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn build(program: &Program) -> Self {
        let mut registry = Self::new();
        for relation in &program.implements {
            registry.register_implementation(relation.type_name.clone(), relation.base.clone());
        }
        for instantiation in &program.instantiations {
            registry.register_instantiation(instantiation.type_name.clone());
        }
        log::debug!(
            "Registered {} derived types, {} instantiated types",
            registry.bases.len(),
            registry.instantiated.len()
        );
        registry
    }

    pub fn register_implementation(&mut self, type_name: QualifiedName, base: QualifiedName) {
        self.bases
            .entry(type_name.clone())
            .or_default()
            .insert(base.clone());
        self.derived.entry(base).or_default().insert(type_name);
    }

    pub fn register_instantiation(&mut self, type_name: QualifiedName) {
        self.instantiated.insert(type_name);
    }

    pub fn is_instantiated(&self, type_name: &QualifiedName) -> bool {
        self.instantiated.contains(type_name)
    }

    /// `interface` itself plus every type deriving from it, transitively
    pub fn implementors_of(&self, interface: &QualifiedName) -> BTreeSet<QualifiedName> {
        let mut seen = BTreeSet::new();
        let mut queue = VecDeque::from([interface.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            if let Some(children) = self.derived.get(&current) {
                queue.extend(children.iter().cloned());
            }
        }
        seen
    }

    /// Definition of `method` on `type_name` or its nearest base.
    ///
    /// Bases are searched breadth first, each level in name order.
    pub fn find_method(
        &self,
        type_name: &QualifiedName,
        method: &str,
        symbols: &SymbolTable,
    ) -> Option<SymbolId> {
        let mut seen = std::collections::HashSet::new();
        let mut queue = VecDeque::from([type_name.clone()]);
        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let qualified = QualifiedName::join(current.as_str(), method);
            if let Some(id) = symbols.lookup_function(qualified.as_str()) {
                return Some(id);
            }
            if let Some(bases) = self.bases.get(&current) {
                queue.extend(bases.iter().cloned());
            }
        }
        None
    }

    /// Resolve a call of `method` through a pointer typed `interface`
    pub fn resolve(
        &self,
        interface: &QualifiedName,
        method: &str,
        exact_type: Option<&QualifiedName>,
        settings: &AnalysisSettings,
        symbols: &SymbolTable,
    ) -> VirtualResolution {
        if let Some(exact) = exact_type.filter(|_| settings.narrow_monomorphic) {
            if let Some(id) = self.find_method(exact, method, symbols) {
                return VirtualResolution {
                    candidates: vec![id],
                    monomorphic: true,
                };
            }
            log::debug!(
                "Exact type {} has no `{}`; resolving through {}",
                exact,
                method,
                interface
            );
        }

        let implementors = self.implementors_of(interface);
        let mut reachable: Vec<&QualifiedName> = implementors
            .iter()
            .filter(|t| !settings.require_instantiation || self.is_instantiated(t))
            .collect();
        if reachable.is_empty() && settings.require_instantiation {
            log::debug!(
                "No instantiated implementor of {}; using all {} implementors",
                interface,
                implementors.len()
            );
            reachable = implementors.iter().collect();
        }

        let candidates: BTreeSet<SymbolId> = reachable
            .into_iter()
            .filter_map(|t| self.find_method(t, method, symbols))
            .collect();
        VirtualResolution {
            candidates: candidates.into_iter().collect(),
            monomorphic: false,
        }
    }
}
