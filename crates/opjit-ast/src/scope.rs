//! Variable declarations and the declared-type side table.
//!
//! Declarations live in a `Scope` arena owned by whoever owns the tree;
//! `Lexical` terms refer to them by `DeclId`. The arena is append-only, so
//! a declaration outlives every use that refers to it.

use rustc_hash::FxHashMap;

use opjit_common_core::PadIndex;

use crate::types::{Type, TypeParseError};

/// Index of a declaration in its `Scope`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub u32);

#[derive(Debug, Clone)]
pub struct VariableDeclaration {
    pub name: String,
    pub slot: PadIndex,
    pub declared: Type,
}

#[derive(Debug, Clone, Default)]
pub struct Scope {
    decls: Vec<VariableDeclaration>,
}

impl Scope {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, slot: PadIndex, declared: Type) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        self.decls.push(VariableDeclaration {
            name: name.into(),
            slot,
            declared,
        });
        id
    }

    /// Look up a declaration. Ids are only minted by `declare`, so an id
    /// from a different scope is the only way to miss.
    pub fn get(&self, id: DeclId) -> Option<&VariableDeclaration> {
        self.decls.get(id.0 as usize)
    }

    pub fn declared_type(&self, id: DeclId) -> Type {
        self.get(id).map_or(Type::Unspecified, |d| d.declared)
    }

    pub fn set_declared_type(&mut self, id: DeclId, ty: Type) {
        if let Some(decl) = self.decls.get_mut(id.0 as usize) {
            decl.declared = ty;
        }
    }

    /// Copy annotated types onto the declarations occupying the annotated
    /// slots. Declarations without an annotation keep their current type.
    pub fn apply_annotations(&mut self, annotations: &TypeAnnotations) {
        for decl in &mut self.decls {
            if let Some(ty) = annotations.get(decl.slot) {
                decl.declared = ty;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.decls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decls.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (DeclId, &VariableDeclaration)> {
        self.decls
            .iter()
            .enumerate()
            .map(|(i, d)| (DeclId(i as u32), d))
    }
}

/// Declared types keyed by storage slot, as produced by the typed
/// declaration syntax (`typed Int $x`). Absent entries mean unspecified.
#[derive(Debug, Clone, Default)]
pub struct TypeAnnotations {
    by_slot: FxHashMap<PadIndex, Type>,
}

impl TypeAnnotations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, slot: PadIndex, ty: Type) {
        self.by_slot.insert(slot, ty);
    }

    /// Record an annotation given by name.
    pub fn annotate(&mut self, slot: PadIndex, type_name: &str) -> Result<Type, TypeParseError> {
        let ty = Type::parse(type_name)?;
        self.insert(slot, ty);
        Ok(ty)
    }

    pub fn get(&self, slot: PadIndex) -> Option<Type> {
        self.by_slot.get(&slot).copied()
    }

    pub fn len(&self) -> usize {
        self.by_slot.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_slot.is_empty()
    }
}
