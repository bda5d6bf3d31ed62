//! Scoped resolution of names as written at a reference site
//!
//! A name `N` written inside scope `a::b` is tried as `a::b::N`, then `a::N`,
//! then `N`. A leading `::` pins the lookup to the global scope.

use crate::core::{QualifiedName, SymbolId, SymbolKind, SymbolTable, symbols::SCOPE_SEPARATOR};

#[derive(Debug, Clone, Copy)]
pub struct NameResolver<'a> {
    symbols: &'a SymbolTable,
    scoped: bool,
}

impl<'a> NameResolver<'a> {
    pub fn new(symbols: &'a SymbolTable, scoped: bool) -> Self {
        Self { symbols, scoped }
    }

    /// Resolve `written` from inside `scope` to a symbol of `kind`
    pub fn resolve(&self, written: &str, scope: &str, kind: SymbolKind) -> Option<SymbolId> {
        let written = written.trim();
        if written.is_empty() {
            return None;
        }

        if written.starts_with(SCOPE_SEPARATOR) || !self.scoped {
            return self.lookup_kind(written, kind);
        }

        candidate_names(scope, written).find_map(|name| self.lookup_kind(name.as_str(), kind))
    }

    pub fn resolve_function(&self, written: &str, scope: &str) -> Option<SymbolId> {
        self.resolve(written, scope, SymbolKind::Function)
    }

    pub fn resolve_global(&self, written: &str, scope: &str) -> Option<SymbolId> {
        self.resolve(written, scope, SymbolKind::Global)
    }

    fn lookup_kind(&self, name: &str, kind: SymbolKind) -> Option<SymbolId> {
        self.symbols
            .lookup(name)
            .filter(|&id| self.symbols.get(id).kind == kind)
    }
}

/// Qualified names to try for `written` inside `scope`, innermost first
fn candidate_names<'s>(
    scope: &'s str,
    written: &'s str,
) -> impl Iterator<Item = QualifiedName> + 's {
    let mut current = Some(scope);
    std::iter::from_fn(move || {
        let scope = current?;
        current = if scope.is_empty() {
            None
        } else {
            Some(
                scope
                    .rsplit_once(SCOPE_SEPARATOR)
                    .map(|(outer, _)| outer)
                    .unwrap_or(""),
            )
        };
        Some(QualifiedName::join(scope, written))
    })
}
