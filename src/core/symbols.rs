//! Symbol table: functions and globals keyed by qualified name

use crate::errors::{AnalysisError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

pub const SCOPE_SEPARATOR: &str = "::";

/// Dense index of a symbol inside one [`SymbolTable`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SymbolId(pub u32);

impl SymbolId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Namespace/class path plus identifier, e.g. `outer::inner::baz`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QualifiedName(String);

impl QualifiedName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim().trim_start_matches(SCOPE_SEPARATOR);
        Self(trimmed.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn segments(&self) -> impl Iterator<Item = &str> {
        self.0.split(SCOPE_SEPARATOR)
    }

    /// Last path segment
    pub fn identifier(&self) -> &str {
        self.0
            .rsplit_once(SCOPE_SEPARATOR)
            .map(|(_, ident)| ident)
            .unwrap_or(&self.0)
    }

    /// Enclosing scope, empty for global names
    pub fn scope(&self) -> &str {
        self.0
            .rsplit_once(SCOPE_SEPARATOR)
            .map(|(scope, _)| scope)
            .unwrap_or("")
    }

    pub fn join(scope: &str, name: &str) -> Self {
        if scope.is_empty() {
            Self::new(name)
        } else {
            Self::new(format!("{}{}{}", scope, SCOPE_SEPARATOR, name))
        }
    }
}

impl fmt::Display for QualifiedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for QualifiedName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Function,
    Global,
}

impl SymbolKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Function => "function",
            Self::Global => "global",
        }
    }
}

/// Parameter/return shape of a function or function pointer.
///
/// Written as `ret(param, param)`, e.g. `int(int,int)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Signature {
    pub ret: String,
    pub params: Vec<String>,
}

impl Signature {
    pub fn new(ret: impl Into<String>, params: Vec<String>) -> Self {
        Self {
            ret: normalize_type(&ret.into()),
            params: params.iter().map(|p| normalize_type(p)).collect(),
        }
    }

    pub fn parse(text: &str) -> std::result::Result<Self, String> {
        let open = text
            .find('(')
            .ok_or_else(|| format!("signature `{}` has no parameter list", text))?;
        let close = text
            .rfind(')')
            .filter(|&close| close > open)
            .ok_or_else(|| format!("signature `{}` has an unterminated parameter list", text))?;

        let ret = &text[..open];
        let inner = text[open + 1..close].trim();
        let params = if inner.is_empty() || inner == "void" {
            Vec::new()
        } else {
            split_top_level(inner)
        };
        Ok(Self::new(ret, params))
    }
}

impl TryFrom<String> for Signature {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Signature> for String {
    fn from(sig: Signature) -> Self {
        sig.to_string()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.ret, self.params.join(","))
    }
}

/// Collapse whitespace and drop it next to punctuation, so `int (*)(int, int)`
/// and `int(*)(int,int)` compare equal
fn normalize_type(ty: &str) -> String {
    let collapsed: Vec<char> = ty
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .chars()
        .collect();
    // after collapsing, every space has a neighbour on both sides
    collapsed
        .iter()
        .enumerate()
        .filter(|&(i, &ch)| {
            ch != ' ' || !(is_punctuation(collapsed[i - 1]) || is_punctuation(collapsed[i + 1]))
        })
        .map(|(_, &ch)| ch)
        .collect()
}

fn is_punctuation(ch: char) -> bool {
    matches!(ch, ',' | '(' | ')' | '*' | '&' | '<' | '>')
}

/// Split on commas that are not nested inside parentheses or angle brackets
fn split_top_level(text: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut current = String::new();
    for ch in text.chars() {
        match ch {
            '(' | '<' => depth += 1,
            ')' | '>' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(std::mem::take(&mut current));
                continue;
            }
            _ => {}
        }
        current.push(ch);
    }
    parts.push(current);
    parts
}

/// A function or global variable
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Symbol {
    pub id: SymbolId,
    pub name: QualifiedName,
    pub kind: SymbolKind,
    /// Module that first declared the symbol
    pub module: String,
    pub signature: Option<Signature>,
    /// Declared type, opaque to the analysis
    pub type_name: Option<String>,
}

impl Symbol {
    pub fn is_function(&self) -> bool {
        self.kind == SymbolKind::Function
    }

    pub fn is_global(&self) -> bool {
        self.kind == SymbolKind::Global
    }
}

/// All symbols of one program snapshot
#[derive(Debug, Clone, Default, Serialize)]
pub struct SymbolTable {
    symbols: Vec<Symbol>,
    #[serde(skip)]
    by_name: HashMap<QualifiedName, SymbolId>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a symbol, collapsing identical re-declarations.
    ///
    /// Returns the id of the existing entry when `name` was already declared
    /// with the same kind.
    pub fn declare(
        &mut self,
        name: QualifiedName,
        kind: SymbolKind,
        module: &str,
        signature: Option<Signature>,
        type_name: Option<String>,
    ) -> Result<SymbolId> {
        if let Some(&existing) = self.by_name.get(&name) {
            let symbol = &mut self.symbols[existing.index()];
            if symbol.kind != kind {
                return Err(AnalysisError::ConflictingSymbol {
                    name: name.to_string(),
                    first: symbol.kind.as_str(),
                    second: kind.as_str(),
                });
            }
            if symbol.signature.is_none() {
                symbol.signature = signature;
            }
            if symbol.type_name.is_none() {
                symbol.type_name = type_name;
            }
            log::trace!("Collapsed re-declaration of {} from {}", name, module);
            return Ok(existing);
        }

        let id = SymbolId(self.symbols.len() as u32);
        self.by_name.insert(name.clone(), id);
        self.symbols.push(Symbol {
            id,
            name,
            kind,
            module: module.to_string(),
            signature,
            type_name,
        });
        Ok(id)
    }

    pub fn lookup(&self, name: &str) -> Option<SymbolId> {
        self.by_name.get(&QualifiedName::new(name)).copied()
    }

    pub fn lookup_function(&self, name: &str) -> Option<SymbolId> {
        self.lookup(name).filter(|&id| self.get(id).is_function())
    }

    pub fn get(&self, id: SymbolId) -> &Symbol {
        &self.symbols[id.index()]
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn functions(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_function())
    }

    pub fn globals(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_global())
    }

    pub fn symbols_in_module<'a>(&'a self, module: &'a str) -> impl Iterator<Item = &'a Symbol> {
        self.symbols.iter().filter(move |s| s.module == module)
    }
}
