//! Render-side template values.

use std::fmt;

use super::parts::{Block, Parts, Slot};
use super::{escape_html, Statics, TemplateError};

/// A rendered template: statics interleaved with dynamic values.
#[derive(Debug, Clone, PartialEq)]
pub struct Html {
    statics: Statics,
    dynamics: Vec<Dynamic>,
}

/// A dynamic value inside a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Dynamic {
    /// Text, escaped when rendered.
    Text(String),
    /// Trusted markup, rendered verbatim.
    Safe(String),
    /// A nested template.
    Template(Html),
    /// A sequence of sibling templates.
    List(Vec<Html>),
}

/// Markup that bypasses escaping.
///
/// Only for fragments assembled by rendering code itself, such as
/// attribute builders; never for user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Safe(String);

/// Mark a fragment as trusted markup.
#[must_use]
pub fn safe(markup: impl Into<String>) -> Safe {
    Safe(markup.into())
}

impl Html {
    /// Create a template from statics and dynamics.
    ///
    /// The counts are checked when the parts tree is built.
    #[must_use]
    pub fn new(statics: impl Into<Statics>, dynamics: Vec<Dynamic>) -> Self {
        Self {
            statics: statics.into(),
            dynamics,
        }
    }

    /// Create a template with no dynamics.
    #[must_use]
    pub fn literal(markup: impl Into<String>) -> Self {
        let statics: Vec<String> = vec![markup.into()];
        Self::new(statics, Vec::new())
    }

    /// The literal fragments.
    #[must_use]
    pub fn statics(&self) -> &Statics {
        &self.statics
    }

    /// The dynamic values.
    #[must_use]
    pub fn dynamics(&self) -> &[Dynamic] {
        &self.dynamics
    }

    /// Build the parts tree.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::Arity`] if any template in the tree does not
    /// have exactly one more static than it has dynamics.
    pub fn parts(&self) -> Result<Parts, TemplateError> {
        Ok(Parts::from_checked(
            self.statics.clone(),
            self.dynamic_slots()?,
        ))
    }

    fn dynamic_slots(&self) -> Result<Vec<Slot>, TemplateError> {
        if self.statics.len() != self.dynamics.len() + 1 {
            return Err(TemplateError::Arity {
                statics: self.statics.len(),
                dynamics: self.dynamics.len(),
            });
        }
        self.dynamics.iter().map(Dynamic::to_slot).collect()
    }
}

impl Dynamic {
    fn to_slot(&self) -> Result<Slot, TemplateError> {
        match self {
            Dynamic::Text(text) => Ok(Slot::Leaf(escape_html(text).into_owned())),
            Dynamic::Safe(markup) => Ok(Slot::Leaf(markup.clone())),
            Dynamic::Template(html) => html.parts().map(Slot::Nested),
            Dynamic::List(items) => list_slot(items),
        }
    }
}

/// Lists sharing one statics template collapse into a block; anything else
/// nests each item under empty separators.
fn list_slot(items: &[Html]) -> Result<Slot, TemplateError> {
    let Some(first) = items.first() else {
        return Ok(Slot::Leaf(String::new()));
    };

    if items.iter().all(|item| item.statics == first.statics) {
        let rows = items
            .iter()
            .map(Html::dynamic_slots)
            .collect::<Result<Vec<_>, _>>()?;
        return Ok(Slot::Block(Block::from_checked(first.statics.clone(), rows)));
    }

    let dynamics = items
        .iter()
        .map(|item| item.parts().map(Slot::Nested))
        .collect::<Result<Vec<_>, _>>()?;
    let separators: Vec<String> = vec![String::new(); items.len() + 1];
    Ok(Slot::Nested(Parts::from_checked(separators.into(), dynamics)))
}

impl fmt::Display for Html {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut dynamics = self.dynamics.iter();
        for (i, fragment) in self.statics.iter().enumerate() {
            if i > 0 {
                if let Some(dynamic) = dynamics.next() {
                    write!(f, "{dynamic}")?;
                }
            }
            f.write_str(fragment)?;
        }
        Ok(())
    }
}

impl fmt::Display for Dynamic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dynamic::Text(text) => f.write_str(&escape_html(text)),
            Dynamic::Safe(markup) => f.write_str(markup),
            Dynamic::Template(html) => write!(f, "{html}"),
            Dynamic::List(items) => items.iter().try_for_each(|item| write!(f, "{item}")),
        }
    }
}

impl From<&str> for Dynamic {
    fn from(text: &str) -> Self {
        Dynamic::Text(text.to_string())
    }
}

impl From<String> for Dynamic {
    fn from(text: String) -> Self {
        Dynamic::Text(text)
    }
}

impl From<&String> for Dynamic {
    fn from(text: &String) -> Self {
        Dynamic::Text(text.clone())
    }
}

impl From<char> for Dynamic {
    fn from(c: char) -> Self {
        Dynamic::Text(c.to_string())
    }
}

impl From<Safe> for Dynamic {
    fn from(markup: Safe) -> Self {
        Dynamic::Safe(markup.0)
    }
}

impl From<Html> for Dynamic {
    fn from(html: Html) -> Self {
        Dynamic::Template(html)
    }
}

impl From<Vec<Html>> for Dynamic {
    fn from(items: Vec<Html>) -> Self {
        Dynamic::List(items)
    }
}

/// Strings in a list are joined without separators.
impl From<Vec<String>> for Dynamic {
    fn from(items: Vec<String>) -> Self {
        Dynamic::Text(items.concat())
    }
}

/// `None` renders as an empty leaf.
impl<T: Into<Dynamic>> From<Option<T>> for Dynamic {
    fn from(value: Option<T>) -> Self {
        value.map_or_else(|| Dynamic::Text(String::new()), Into::into)
    }
}

macro_rules! display_dynamic {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Dynamic {
                fn from(value: $ty) -> Self {
                    Dynamic::Text(value.to_string())
                }
            }
        )*
    };
}

display_dynamic!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize, f32, f64);
