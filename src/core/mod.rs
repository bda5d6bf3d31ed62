//! Data model shared by every analysis phase: symbols, input facts and the
//! direction lattice.

pub mod direction;
pub mod facts;
pub mod symbols;

pub use direction::{AccessMode, DirectionLabel};
pub use facts::{
    AccessFact, AccessPath, BoundValue, CallSiteFact, CallSiteId, CallTarget, ClosedFacts,
    FactStream, Implements, Instantiation, ModuleFacts, Slot, SlotBinding, SymbolDecl,
};
pub use symbols::{QualifiedName, Signature, Symbol, SymbolId, SymbolKind, SymbolTable};
