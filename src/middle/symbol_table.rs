use hashbrown::HashMap;

use super::ty::StaticType;
use crate::frontend::{Span, intern::InternedSymbol};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Symbol {
    pub name: InternedSymbol,
    pub ty: StaticType,
    /// Where the name was declared
    pub span: Span,
}

/// Flat (single scope) map from variable name to declared type. Built once by
/// the type checker and handed to the code generator unchanged.
#[derive(Debug, Clone, Default)]
pub struct SymbolTable {
    /// Declaration order
    symbols: Vec<Symbol>,
    index: HashMap<InternedSymbol, usize>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a declaration. If the name is already declared the table is
    /// left untouched and the earlier declaration is returned.
    pub fn declare(
        &mut self,
        name: InternedSymbol,
        ty: StaticType,
        span: Span,
    ) -> Result<(), Symbol> {
        if let Some(previous) = self.get(name) {
            return Err(*previous);
        }

        self.index.insert(name, self.symbols.len());
        self.symbols.push(Symbol { name, ty, span });

        Ok(())
    }

    pub fn get(&self, name: InternedSymbol) -> Option<&Symbol> {
        self.index.get(&name).map(|i| &self.symbols[*i])
    }

    pub fn type_of(&self, name: InternedSymbol) -> Option<StaticType> {
        self.get(name).map(|symbol| symbol.ty)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }
}
