//! Self-describing type tags.
//!
//! An [`FbomType`] names what a binary payload represents without any
//! global type registry: it is a `(name, size)` pair with an optional
//! `extends` chain encoding "is-a" layering. Two descriptors are
//! compatible when their name chains match from the most-derived link
//! down; [`FbomType::is_or_extends`] walks the chain.

use std::fmt;

/// A possibly-chained type descriptor.
///
/// A descriptor with `extends == None` is a terminal ("leaf") type.
/// Chains are built with [`extend`](Self::extend): the descriptor the
/// method is called on becomes the base of the newly derived link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FbomType {
    pub name: String,
    pub size: u64,
    pub extends: Option<Box<FbomType>>,
}

impl FbomType {
    /// A terminal type with the given name and payload size.
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            extends: None,
        }
    }

    /// The "unset" descriptor used where no type information exists.
    pub fn unset() -> Self {
        Self::new("UNSET", 0)
    }

    pub fn is_unset(&self) -> bool {
        self.name == "UNSET" && self.extends.is_none()
    }

    /// Derive a new type from `self`: the result carries `name`/`size`
    /// and chains back to `self` as its base.
    pub fn extend(&self, name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
            extends: Some(Box::new(self.clone())),
        }
    }

    /// Whether this descriptor, or any base in its chain, has `name`.
    pub fn is_or_extends(&self, name: &str) -> bool {
        if self.name == name {
            return true;
        }
        match &self.extends {
            Some(base) => base.is_or_extends(name),
            None => false,
        }
    }

    /// Number of links in the chain, including this one.
    pub fn chain_len(&self) -> usize {
        1 + self.extends.as_ref().map_or(0, |base| base.chain_len())
    }

    /// The chain from the most-derived link down to the terminal base.
    pub fn chain(&self) -> Vec<&FbomType> {
        let mut links = Vec::with_capacity(self.chain_len());
        let mut current = Some(self);
        while let Some(ty) = current {
            links.push(ty);
            current = ty.extends.as_deref();
        }
        links
    }
}

impl Default for FbomType {
    fn default() -> Self {
        Self::unset()
    }
}

impl fmt::Display for FbomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(base) = &self.extends {
            write!(f, " : {base}")?;
        }
        Ok(())
    }
}
