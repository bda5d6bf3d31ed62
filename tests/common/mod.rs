// Test utility module for dirmap integration tests
#![allow(dead_code)]

use dirmap::core::{
    AccessFact, AccessMode, AccessPath, BoundValue, CallSiteFact, CallTarget, Implements,
    Instantiation, ModuleFacts, Signature, Slot, SlotBinding, SymbolDecl, SymbolKind,
};
use dirmap::{analyze, DirectionLabel, DirectionOracle, DirmapConfig, ParallelConfig};
use std::sync::Arc;

/// Fluent builder for one module's facts, mirroring what a front end would
/// extract from a C++ translation unit.
#[derive(Debug, Clone)]
pub struct ModuleBuilder {
    facts: ModuleFacts,
    next_site: u32,
}

impl ModuleBuilder {
    pub fn new(module: &str) -> Self {
        Self {
            facts: ModuleFacts::new(module),
            next_site: 1,
        }
    }

    fn declare(mut self, name: &str, kind: SymbolKind, signature: Option<&str>) -> Self {
        self.facts.symbols.push(SymbolDecl {
            name: name.into(),
            kind,
            signature: signature.map(|s| Signature::parse(s).expect("valid signature")),
            type_name: None,
        });
        self
    }

    pub fn function(self, name: &str) -> Self {
        self.declare(name, SymbolKind::Function, None)
    }

    pub fn function_with_signature(self, name: &str, signature: &str) -> Self {
        self.declare(name, SymbolKind::Function, Some(signature))
    }

    pub fn global(self, name: &str) -> Self {
        self.declare(name, SymbolKind::Global, None)
    }

    fn site(&mut self, caller: &str, target: CallTarget) -> u32 {
        let id = self.next_site;
        self.next_site += 1;
        self.facts.call_sites.push(CallSiteFact {
            id,
            caller: caller.into(),
            target,
        });
        id
    }

    /// `caller` calls `callee` by name as written in source
    pub fn calls(mut self, caller: &str, callee: &str) -> Self {
        self.site(
            caller,
            CallTarget::Direct {
                name: callee.to_string(),
            },
        );
        self
    }

    /// `caller` calls `callee`, passing `&target` as parameter `index`
    pub fn passes_callback(
        mut self,
        caller: &str,
        callee: &str,
        index: usize,
        target: &str,
    ) -> Self {
        let site = self.site(
            caller,
            CallTarget::Direct {
                name: callee.to_string(),
            },
        );
        self.facts.bindings.push(SlotBinding {
            slot: Slot::Param {
                function: callee.into(),
                index,
            },
            value: BoundValue::Function {
                name: target.to_string(),
            },
            site: Some(site),
            in_function: Some(caller.into()),
        });
        self
    }

    /// `caller` passes a pointer of unknown origin as parameter `index`
    pub fn passes_opaque(mut self, caller: &str, callee: &str, index: usize) -> Self {
        let site = self.site(
            caller,
            CallTarget::Direct {
                name: callee.to_string(),
            },
        );
        self.facts.bindings.push(SlotBinding {
            slot: Slot::Param {
                function: callee.into(),
                index,
            },
            value: BoundValue::Opaque,
            site: Some(site),
            in_function: Some(caller.into()),
        });
        self
    }

    /// Stores `&target` into a pointer variable outside any call
    pub fn stores_address(mut self, variable: &str, target: &str) -> Self {
        self.facts.bindings.push(SlotBinding {
            slot: Slot::Variable {
                name: variable.into(),
            },
            value: BoundValue::Function {
                name: target.to_string(),
            },
            site: None,
            in_function: None,
        });
        self
    }

    /// `function` calls through its own parameter `index`
    pub fn calls_parameter(mut self, function: &str, index: usize, signature: &str) -> Self {
        self.site(
            function,
            CallTarget::FunctionPointer {
                signature: Signature::parse(signature).expect("valid signature"),
                slot: Slot::Param {
                    function: function.into(),
                    index,
                },
            },
        );
        self
    }

    /// `caller` calls through the pointer variable `variable`
    pub fn calls_variable(mut self, caller: &str, variable: &str, signature: &str) -> Self {
        self.site(
            caller,
            CallTarget::FunctionPointer {
                signature: Signature::parse(signature).expect("valid signature"),
                slot: Slot::Variable {
                    name: variable.into(),
                },
            },
        );
        self
    }

    pub fn calls_virtual(mut self, caller: &str, interface: &str, method: &str) -> Self {
        self.site(
            caller,
            CallTarget::Virtual {
                interface: interface.into(),
                method: method.to_string(),
                exact_type: None,
            },
        );
        self
    }

    pub fn calls_virtual_on(
        mut self,
        caller: &str,
        interface: &str,
        method: &str,
        exact_type: &str,
    ) -> Self {
        self.site(
            caller,
            CallTarget::Virtual {
                interface: interface.into(),
                method: method.to_string(),
                exact_type: Some(exact_type.into()),
            },
        );
        self
    }

    fn access(mut self, function: &str, global: &str, mode: AccessMode, via: AccessPath) -> Self {
        self.facts.accesses.push(AccessFact {
            function: function.into(),
            global: global.to_string(),
            mode,
            via,
        });
        self
    }

    pub fn reads(self, function: &str, global: &str) -> Self {
        self.access(function, global, AccessMode::Read, AccessPath::Direct)
    }

    pub fn writes(self, function: &str, global: &str) -> Self {
        self.access(function, global, AccessMode::Write, AccessPath::Direct)
    }

    pub fn reads_via_pointer(self, function: &str, global: &str, is_const: bool) -> Self {
        self.access(function, global, AccessMode::Read, AccessPath::Pointer { is_const })
    }

    pub fn writes_via_pointer(self, function: &str, global: &str) -> Self {
        self.access(function, global, AccessMode::Write, AccessPath::Pointer { is_const: false })
    }

    pub fn implements(mut self, type_name: &str, base: &str) -> Self {
        self.facts.implements.push(Implements {
            type_name: type_name.into(),
            base: base.into(),
        });
        self
    }

    pub fn instantiates(mut self, type_name: &str) -> Self {
        self.facts.instantiations.push(Instantiation {
            type_name: type_name.into(),
            site: None,
        });
        self
    }

    pub fn build(self) -> ModuleFacts {
        self.facts
    }
}

pub fn run(modules: Vec<ModuleFacts>) -> Arc<DirectionOracle> {
    analyze(DirmapConfig::default(), modules).expect("analysis succeeds")
}

pub fn run_with(config: DirmapConfig, modules: Vec<ModuleFacts>) -> Arc<DirectionOracle> {
    analyze(config, modules).expect("analysis succeeds")
}

pub fn sequential_config() -> DirmapConfig {
    DirmapConfig {
        parallel: ParallelConfig::sequential(),
        ..DirmapConfig::default()
    }
}

pub fn label(oracle: &DirectionOracle, name: &str) -> DirectionLabel {
    oracle
        .classify(name)
        .unwrap_or_else(|e| panic!("{} should be classified: {}", name, e))
}

pub fn callee_names(oracle: &DirectionOracle, function: &str) -> Vec<String> {
    oracle
        .callees_of(function)
        .expect("known function")
        .iter()
        .map(|s| s.name.to_string())
        .collect()
}

pub fn caller_names(oracle: &DirectionOracle, function: &str) -> Vec<String> {
    oracle
        .callers_of(function)
        .expect("known function")
        .iter()
        .map(|s| s.name.to_string())
        .collect()
}

/// `math/utils`: the shared arithmetic module most fixtures call into
pub fn math_utils() -> ModuleBuilder {
    ModuleBuilder::new("math/utils")
        .function_with_signature("add", "int(int,int)")
        .function_with_signature("subtract", "int(int,int)")
        .function_with_signature("multiply", "int(int,int)")
        .global("g_polymorphismFactor")
        .reads("multiply", "g_polymorphismFactor")
}

/// `tests/direction/read_write.cpp`
pub fn read_write() -> ModuleBuilder {
    ModuleBuilder::new("tests/direction")
        .global("g_readOnly")
        .global("g_writeOnly")
        .global("g_readWrite")
        .global("g_untouched")
        .function("readGlobal")
        .function("writeGlobal")
        .function("readWriteGlobal")
        .function("indirectWrite")
        .function("directionAdd")
        .reads("readGlobal", "g_readOnly")
        .writes("writeGlobal", "g_writeOnly")
        .reads("readWriteGlobal", "g_readWrite")
        .writes("readWriteGlobal", "g_readWrite")
        .calls("indirectWrite", "writeGlobal")
        .calls("directionAdd", "add")
}
