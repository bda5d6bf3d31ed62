//! Function Pointer Tracking
//!
//! Lightweight points-to pass over slot bindings. A slot is a parameter or
//! variable that can hold a function address; bindings say which function
//! (or which other slot, or something unknown) flows into it. Calls through a
//! slot resolve to the functions that can reach it, each attributed to the
//! call site that performed the binding.

use super::name_resolver::NameResolver;
use crate::analysis::aggregation::Program;
use crate::core::{BoundValue, CallSiteId, Signature, Slot, SymbolId, SymbolTable};
use im::{HashMap, HashSet, Vector};
use std::collections::BTreeSet;

/// What one binding stores into a slot
#[derive(Debug, Clone, PartialEq, Eq)]
enum BoundSource {
    Function {
        function: SymbolId,
        site: Option<CallSiteId>,
    },
    Forward(Slot),
    Opaque,
}

/// A function a pointer call may reach
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PointerTarget {
    pub function: SymbolId,
    /// Binding that made this target reachable; `None` for the
    /// same-signature fallback set
    pub binding_site: Option<CallSiteId>,
}

/// Outcome of resolving one pointer call
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerResolution {
    /// Targets observed through specific bindings
    pub bound: Vec<PointerTarget>,
    /// Same-signature fallback set, present when an opaque value reaches the
    /// slot. Never repeats a function listed in `bound`.
    pub fallback: Vec<SymbolId>,
    /// Bound functions skipped because their signature does not match
    pub rejected: Vec<SymbolId>,
}

impl PointerResolution {
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty() && self.fallback.is_empty()
    }
}

/// Tracker for function-pointer slots and address-taken functions
#[derive(Debug, Clone, Default)]
pub struct FunctionPointerTracker {
    /// Bindings per slot, in fact order
    slot_bindings: HashMap<Slot, Vector<BoundSource>>,
    /// Functions whose address is observed taken anywhere
    address_taken: HashSet<SymbolId>,
    opaque_bindings: usize,
}

impl FunctionPointerTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every binding of the program
    pub fn build(program: &Program, resolver: &NameResolver<'_>) -> Self {
        let mut tracker = Self::new();

        for entry in &program.bindings {
            let binding = &entry.binding;
            let source = match &binding.value {
                BoundValue::Function { name } => {
                    let scope = binding
                        .in_function
                        .as_ref()
                        .map(|f| f.scope())
                        .unwrap_or("");
                    match resolver.resolve_function(name, scope) {
                        Some(function) => {
                            tracker.address_taken.insert(function);
                            BoundSource::Function {
                                function,
                                site: entry.site,
                            }
                        }
                        None => {
                            log::warn!(
                                "Address of unknown function `{}` stored into {} ({}); treating as opaque",
                                name,
                                binding.slot,
                                entry.module
                            );
                            BoundSource::Opaque
                        }
                    }
                }
                BoundValue::Slot { from } => BoundSource::Forward(from.clone()),
                BoundValue::Opaque => BoundSource::Opaque,
            };
            tracker.add_binding(binding.slot.clone(), source);
        }

        log::debug!(
            "Tracked {} pointer slots, {} address-taken functions, {} opaque bindings",
            tracker.slot_bindings.len(),
            tracker.address_taken.len(),
            tracker.opaque_bindings
        );
        tracker
    }

    fn add_binding(&mut self, slot: Slot, source: BoundSource) {
        if source == BoundSource::Opaque {
            self.opaque_bindings += 1;
        }
        self.slot_bindings.entry(slot).or_default().push_back(source);
    }

    /// Resolve a call through `slot` expecting `signature`.
    ///
    /// Slot-to-slot forwarding is followed transitively; each slot is
    /// visited once, so binding cycles terminate.
    pub fn resolve(
        &self,
        slot: &Slot,
        signature: &Signature,
        symbols: &SymbolTable,
    ) -> PointerResolution {
        let mut resolution = PointerResolution::default();
        let mut bound = BTreeSet::new();
        let mut rejected = BTreeSet::new();
        let mut saw_opaque = false;

        let mut visited = std::collections::HashSet::new();
        let mut stack = vec![slot.clone()];
        while let Some(current) = stack.pop() {
            if !visited.insert(current.clone()) {
                continue;
            }
            let Some(sources) = self.slot_bindings.get(&current) else {
                continue;
            };
            for source in sources {
                match source {
                    BoundSource::Function { function, site } => {
                        if signature_matches(symbols, *function, signature) {
                            bound.insert(PointerTarget {
                                function: *function,
                                binding_site: *site,
                            });
                        } else {
                            rejected.insert(*function);
                        }
                    }
                    BoundSource::Forward(from) => stack.push(from.clone()),
                    BoundSource::Opaque => saw_opaque = true,
                }
            }
        }

        if saw_opaque {
            // a bound function already has its own edge at this site
            resolution.fallback = self
                .same_signature_candidates(signature, symbols)
                .into_iter()
                .filter(|&f| !bound.iter().any(|target| target.function == f))
                .collect();
        }
        resolution.bound = bound.into_iter().collect();
        resolution.rejected = rejected.into_iter().collect();
        resolution
    }

    /// Address-taken functions compatible with `signature`, sorted by id
    pub fn same_signature_candidates(
        &self,
        signature: &Signature,
        symbols: &SymbolTable,
    ) -> Vec<SymbolId> {
        let mut candidates: Vec<_> = self
            .address_taken
            .iter()
            .copied()
            .filter(|&f| signature_matches(symbols, f, signature))
            .collect();
        candidates.sort_unstable();
        candidates
    }

    pub fn get_statistics(&self) -> FunctionPointerStatistics {
        FunctionPointerStatistics {
            slots: self.slot_bindings.len(),
            bindings: self.slot_bindings.values().map(|b| b.len()).sum(),
            address_taken: self.address_taken.len(),
            opaque_bindings: self.opaque_bindings,
        }
    }
}

/// A function without signature metadata is assumed compatible
fn signature_matches(symbols: &SymbolTable, function: SymbolId, expected: &Signature) -> bool {
    symbols
        .get(function)
        .signature
        .as_ref()
        .is_none_or(|actual| actual == expected)
}

/// Statistics about function pointer usage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionPointerStatistics {
    pub slots: usize,
    pub bindings: usize,
    pub address_taken: usize,
    pub opaque_bindings: usize,
}
