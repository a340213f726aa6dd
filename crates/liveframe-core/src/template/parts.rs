//! Parts trees: the wire representation of a render.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::fmt;

use super::{Statics, TemplateError};

/// Dynamic values of one row of a [`Block`].
pub type Row = Vec<Slot>;

/// A rendered template split into statics and dynamic slots.
///
/// INVARIANT: `statics.len() == dynamics.len() + 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Parts {
    pub(crate) statics: Statics,
    pub(crate) dynamics: Vec<Slot>,
}

/// A dynamic slot value.
#[derive(Debug, Clone, PartialEq)]
pub enum Slot {
    /// Already-escaped (or trusted) text.
    Leaf(String),
    /// A nested tree.
    Nested(Parts),
    /// Sibling templates sharing one statics template.
    Block(Block),
}

/// A collapsed list of templates with identical statics.
///
/// INVARIANT: every row has `statics.len() - 1` slots.
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub(crate) statics: Statics,
    pub(crate) rows: Vec<Row>,
}

impl Parts {
    /// Create a tree from statics and slots.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Arity`] if the counts do not interleave.
    pub fn new(statics: impl Into<Statics>, dynamics: Vec<Slot>) -> Result<Self, TemplateError> {
        let statics = statics.into();
        if statics.len() != dynamics.len() + 1 {
            return Err(TemplateError::Arity {
                statics: statics.len(),
                dynamics: dynamics.len(),
            });
        }
        Ok(Self::from_checked(statics, dynamics))
    }

    pub(crate) fn from_checked(statics: Statics, dynamics: Vec<Slot>) -> Self {
        debug_assert_eq!(statics.len(), dynamics.len() + 1);
        Self { statics, dynamics }
    }

    /// The literal fragments.
    #[must_use]
    pub fn statics(&self) -> &[String] {
        &self.statics
    }

    /// The dynamic slots.
    #[must_use]
    pub fn dynamics(&self) -> &[Slot] {
        &self.dynamics
    }

    /// Check the interleaving invariant at every depth.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        self.statics.len() == self.dynamics.len() + 1 && self.dynamics.iter().all(Slot::is_well_formed)
    }
}

impl Slot {
    fn is_well_formed(&self) -> bool {
        match self {
            Slot::Leaf(_) => true,
            Slot::Nested(parts) => parts.is_well_formed(),
            Slot::Block(block) => block.rows.iter().all(|row| {
                row.len() + 1 == block.statics.len() && row.iter().all(Slot::is_well_formed)
            }),
        }
    }
}

impl Block {
    /// Create a block from shared statics and rows.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Arity`] if a row does not fit the statics.
    pub fn new(statics: impl Into<Statics>, rows: Vec<Row>) -> Result<Self, TemplateError> {
        let statics = statics.into();
        if let Some(row) = rows.iter().find(|row| row.len() + 1 != statics.len()) {
            return Err(TemplateError::Arity {
                statics: statics.len(),
                dynamics: row.len(),
            });
        }
        Ok(Self::from_checked(statics, rows))
    }

    pub(crate) fn from_checked(statics: Statics, rows: Vec<Row>) -> Self {
        Self { statics, rows }
    }

    /// The statics every row shares.
    #[must_use]
    pub fn statics(&self) -> &[String] {
        &self.statics
    }

    /// The rows, in render order.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }
}

impl Serialize for Parts {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.dynamics.len() + 1))?;
        for (index, slot) in self.dynamics.iter().enumerate() {
            map.serialize_entry(&index.to_string(), slot)?;
        }
        map.serialize_entry("s", &*self.statics)?;
        map.end()
    }
}

impl Serialize for Slot {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Slot::Leaf(text) => serializer.serialize_str(text),
            Slot::Nested(parts) => parts.serialize(serializer),
            Slot::Block(block) => block.serialize(serializer),
        }
    }
}

impl Serialize for Block {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("s", &*self.statics)?;
        map.serialize_entry("d", &self.rows)?;
        map.end()
    }
}

/// Renders the markup the tree stands for.
impl fmt::Display for Parts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        interleave(f, &self.statics, &self.dynamics)
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Slot::Leaf(text) => f.write_str(text),
            Slot::Nested(parts) => write!(f, "{parts}"),
            Slot::Block(block) => block
                .rows
                .iter()
                .try_for_each(|row| interleave(f, &block.statics, row)),
        }
    }
}

fn interleave(f: &mut fmt::Formatter<'_>, statics: &[String], slots: &[Slot]) -> fmt::Result {
    for (i, fragment) in statics.iter().enumerate() {
        if i > 0 {
            if let Some(slot) = slots.get(i - 1) {
                write!(f, "{slot}")?;
            }
        }
        f.write_str(fragment)?;
    }
    Ok(())
}
