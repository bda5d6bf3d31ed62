//! Input fact stream produced by the (external) front end
//!
//! One [`ModuleFacts`] batch is produced per module, possibly by parallel
//! front-end tasks. Names inside a batch are written the way they appear in
//! source: declarations are fully qualified, references (call targets,
//! accessed globals, bound functions) may be partly qualified and are
//! resolved against the enclosing scope during aggregation.

use super::direction::AccessMode;
use super::symbols::{QualifiedName, Signature, SymbolKind};
use crate::config::ParallelConfig;
use crate::errors::{AnalysisError, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Program-wide call site identity, assigned at aggregation time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CallSiteId(pub u32);

impl fmt::Display for CallSiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Declaration of a function or global
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SymbolDecl {
    pub name: QualifiedName,
    pub kind: SymbolKind,
    #[serde(default)]
    pub signature: Option<Signature>,
    #[serde(default)]
    pub type_name: Option<String>,
}

/// A location a function address can be stored into
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "slot", rename_all = "snake_case")]
pub enum Slot {
    /// The `index`-th parameter of `function`
    Param { function: QualifiedName, index: usize },
    /// A global or local pointer variable
    Variable { name: QualifiedName },
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Param { function, index } => write!(f, "{}#{}", function, index),
            Slot::Variable { name } => write!(f, "{}", name),
        }
    }
}

/// Syntactic target of a call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CallTarget {
    /// Named call, e.g. `a::testB()` or `baz()`
    Direct { name: String },
    /// Call through a function pointer held in `slot`
    FunctionPointer { signature: Signature, slot: Slot },
    /// Call of `method` through a pointer/reference typed as `interface`.
    /// `exact_type` is set when the front end can prove the dynamic type.
    Virtual {
        interface: QualifiedName,
        method: String,
        #[serde(default)]
        exact_type: Option<QualifiedName>,
    },
}

impl CallTarget {
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Direct { .. } => "direct",
            Self::FunctionPointer { .. } => "function-pointer",
            Self::Virtual { .. } => "virtual",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallSiteFact {
    /// Identity local to the module batch
    pub id: u32,
    pub caller: QualifiedName,
    pub target: CallTarget,
}

/// How a global was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessPath {
    #[default]
    Direct,
    /// Through a pointer parameter that was proven to point at the global
    Pointer { is_const: bool },
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccessFact {
    pub function: QualifiedName,
    /// Global as written; resolved against the function's scope
    pub global: String,
    pub mode: AccessMode,
    #[serde(default)]
    pub via: AccessPath,
}

/// Value stored into a function-pointer slot
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(tag = "value", rename_all = "snake_case")]
pub enum BoundValue {
    /// Address of a named function, e.g. `&add`
    Function { name: String },
    /// Forwarded from another slot
    Slot { from: Slot },
    /// Anything the front end could not determine
    Opaque,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotBinding {
    pub slot: Slot,
    #[serde(flatten)]
    pub value: BoundValue,
    /// Module-local id of the call site performing the binding
    #[serde(default)]
    pub site: Option<u32>,
    /// Function in which the binding happens, used to resolve `value` names
    #[serde(default)]
    pub in_function: Option<QualifiedName>,
}

/// `type_name` derives from or implements `base`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Implements {
    pub type_name: QualifiedName,
    pub base: QualifiedName,
}

/// A concrete type observed to be constructed somewhere in the program
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Instantiation {
    pub type_name: QualifiedName,
    #[serde(default)]
    pub site: Option<u32>,
}

/// Facts extracted from one module
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleFacts {
    pub module: String,
    #[serde(default)]
    pub symbols: Vec<SymbolDecl>,
    #[serde(default)]
    pub call_sites: Vec<CallSiteFact>,
    #[serde(default)]
    pub accesses: Vec<AccessFact>,
    #[serde(default)]
    pub bindings: Vec<SlotBinding>,
    #[serde(default)]
    pub implements: Vec<Implements>,
    #[serde(default)]
    pub instantiations: Vec<Instantiation>,
}

impl ModuleFacts {
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn absorb(&mut self, other: ModuleFacts) {
        self.symbols.extend(other.symbols);
        self.call_sites.extend(other.call_sites);
        self.accesses.extend(other.accesses);
        self.bindings.extend(other.bindings);
        self.implements.extend(other.implements);
        self.instantiations.extend(other.instantiations);
    }

    /// Deduplicate and order the batch so aggregation is input-order independent
    pub fn normalize(mut self) -> Result<Self> {
        if self.module.trim().is_empty() {
            return Err(AnalysisError::invalid_fact("", "module name is empty"));
        }
        if let Some(decl) = self.symbols.iter().find(|d| d.name.as_str().is_empty()) {
            return Err(AnalysisError::invalid_fact(
                &self.module,
                format!("symbol declaration with empty name ({:?})", decl.kind),
            ));
        }

        self.symbols
            .sort_by(|a, b| a.name.cmp(&b.name).then(a.kind.as_str().cmp(b.kind.as_str())));
        self.symbols.dedup();

        self.call_sites.sort_by_key(|site| site.id);
        let before = self.call_sites.len();
        self.call_sites.dedup();
        if let Some(pair) = self.call_sites.windows(2).find(|w| w[0].id == w[1].id) {
            return Err(AnalysisError::invalid_fact(
                &self.module,
                format!("call site id {} used twice", pair[0].id),
            ));
        }
        if before != self.call_sites.len() {
            log::debug!(
                "Dropped {} duplicate call sites in {}",
                before - self.call_sites.len(),
                self.module
            );
        }

        self.accesses.sort();
        self.accesses.dedup();
        self.bindings.sort();
        self.bindings.dedup();
        self.implements.sort();
        self.implements.dedup();
        self.instantiations.sort();
        self.instantiations.dedup();
        Ok(self)
    }
}

/// Batches closed for aggregation, ordered by module name
#[derive(Debug, Clone, Default)]
pub struct ClosedFacts {
    pub modules: Vec<ModuleFacts>,
}

/// Collects module batches until the stream is closed
#[derive(Debug, Default)]
pub struct FactStream {
    batches: Vec<ModuleFacts>,
    closed: bool,
}

impl FactStream {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode a JSON array of module batches
    pub fn from_json(json: &str) -> Result<Self> {
        let batches: Vec<ModuleFacts> = serde_json::from_str(json)?;
        Ok(Self {
            batches,
            closed: false,
        })
    }

    pub fn push(&mut self, batch: ModuleFacts) -> Result<()> {
        if self.closed {
            return Err(AnalysisError::finalized(format!(
                "ingest module `{}` into a closed fact stream",
                batch.module
            )));
        }
        self.batches.push(batch);
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    /// Normalize a copy of every module, one task per module. The stream
    /// stays open, so a failed analysis can be retried.
    pub fn snapshot(&self, parallel: &ParallelConfig) -> Result<ClosedFacts> {
        if self.closed {
            return Err(AnalysisError::finalized("normalize a closed fact stream"));
        }

        let mut by_module: BTreeMap<String, ModuleFacts> = BTreeMap::new();
        for batch in self.batches.iter().cloned() {
            match by_module.get_mut(&batch.module) {
                Some(existing) => existing.absorb(batch),
                None => {
                    by_module.insert(batch.module.clone(), batch);
                }
            }
        }
        let merged: Vec<ModuleFacts> = by_module.into_values().collect();

        let modules = if parallel.enabled {
            parallel.install(|| {
                merged
                    .into_par_iter()
                    .map(ModuleFacts::normalize)
                    .collect::<Result<Vec<_>>>()
            })?
        } else {
            merged
                .into_iter()
                .map(ModuleFacts::normalize)
                .collect::<Result<Vec<_>>>()?
        };

        Ok(ClosedFacts { modules })
    }

    /// Reject further batches and drop the collected ones
    pub fn seal(&mut self) {
        self.closed = true;
        self.batches.clear();
    }

    /// Normalize every module and close the stream
    pub fn close(&mut self, parallel: &ParallelConfig) -> Result<ClosedFacts> {
        if self.closed {
            return Err(AnalysisError::finalized("close an already closed fact stream"));
        }
        let facts = self.snapshot(parallel)?;
        self.seal();
        Ok(facts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn test_decode_module_batch() {
        let json = indoc! {r#"
            {
              "module": "polymorphism_tests",
              "symbols": [
                { "name": "applyWithCallback", "kind": "Function", "signature": "int(int(*)(int,int),int,int)" },
                { "name": "g_polymorphismFactor", "kind": "Global", "type_name": "int" }
              ],
              "call_sites": [
                { "id": 1, "caller": "applyWithCallback",
                  "target": { "kind": "function_pointer", "signature": "int(int,int)",
                              "slot": { "slot": "param", "function": "applyWithCallback", "index": 0 } } },
                { "id": 2, "caller": "applyWithOperation",
                  "target": { "kind": "virtual", "interface": "Operation", "method": "apply" } }
              ],
              "accesses": [
                { "function": "multiply", "global": "g_polymorphismFactor", "mode": "Read" },
                { "function": "poke", "global": "g_polymorphismFactor", "mode": "Write",
                  "via": { "pointer": { "is_const": false } } }
              ],
              "bindings": [
                { "slot": { "slot": "param", "function": "applyWithCallback", "index": 0 },
                  "value": "function", "name": "multiply", "site": 7 }
              ]
            }
        "#};

        let facts = ModuleFacts::from_json(json).unwrap();
        assert_eq!(facts.symbols.len(), 2);
        assert!(matches!(
            facts.call_sites[0].target,
            CallTarget::FunctionPointer { .. }
        ));
        assert_eq!(facts.accesses[0].via, AccessPath::Direct);
        assert_eq!(facts.accesses[1].via, AccessPath::Pointer { is_const: false });
        assert_eq!(facts.bindings[0].site, Some(7));
    }

    #[test]
    fn test_normalize_rejects_duplicate_site_ids() {
        let mut facts = ModuleFacts::new("m");
        for name in ["a", "b"] {
            facts.call_sites.push(CallSiteFact {
                id: 1,
                caller: "main".into(),
                target: CallTarget::Direct { name: name.into() },
            });
        }
        assert!(matches!(
            facts.normalize(),
            Err(AnalysisError::InvalidFact { .. })
        ));
    }

    #[test]
    fn test_push_after_close_fails() {
        let mut stream = FactStream::new();
        stream.push(ModuleFacts::new("a")).unwrap();
        let closed = stream.close(&ParallelConfig::sequential()).unwrap();
        assert_eq!(closed.modules.len(), 1);
        assert!(matches!(
            stream.push(ModuleFacts::new("b")),
            Err(AnalysisError::AnalysisFinalized { .. })
        ));
    }

    #[test]
    fn test_failed_snapshot_leaves_stream_open() {
        let mut stream = FactStream::new();
        stream.push(ModuleFacts::new("")).unwrap();
        assert!(matches!(
            stream.snapshot(&ParallelConfig::sequential()),
            Err(AnalysisError::InvalidFact { .. })
        ));
        assert!(!stream.is_closed());
        assert_eq!(stream.len(), 1);
        stream.push(ModuleFacts::new("b")).unwrap();
    }

    #[test]
    fn test_close_merges_batches_of_same_module() {
        let mut stream = FactStream::new();
        let mut first = ModuleFacts::new("math");
        first.symbols.push(SymbolDecl {
            name: "add".into(),
            kind: SymbolKind::Function,
            signature: None,
            type_name: None,
        });
        let mut second = ModuleFacts::new("math");
        second.symbols.push(SymbolDecl {
            name: "subtract".into(),
            kind: SymbolKind::Function,
            signature: None,
            type_name: None,
        });
        stream.push(second).unwrap();
        stream.push(first).unwrap();
        let closed = stream.close(&ParallelConfig::default()).unwrap();
        assert_eq!(closed.modules.len(), 1);
        let names: Vec<_> = closed.modules[0]
            .symbols
            .iter()
            .map(|s| s.name.as_str())
            .collect();
        assert_eq!(names, vec!["add", "subtract"]);
    }
}
