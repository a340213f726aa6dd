//! Structural templates.
//!
//! A render produces an [`Html`] value: literal fragments (statics)
//! interleaved with dynamic values. [`Html::parts`] turns it into a
//! [`Parts`] tree and [`diff`] compares two trees rendered at the same
//! call-site, producing the minimal [`Update`] to send to the client.
//!
//! ```rust
//! use liveframe_core::html;
//! use liveframe_core::template::{diff, Update};
//!
//! let render = |count: u32| html!("<p>Count: {}</p>", count);
//!
//! let before = render(1).parts().unwrap();
//! let after = render(2).parts().unwrap();
//!
//! let update = diff(&before, &after);
//! assert_eq!(serde_json::to_value(&update).unwrap(), serde_json::json!({"0": "2"}));
//! ```

mod diff;
mod helpers;
mod html;
mod parts;

pub use diff::{diff, Change, Diff, RowChange, RowsDiff, Update};
pub use helpers::{form_for, FormMethod, FormOptions};
pub use html::{safe, Dynamic, Html, Safe};
pub use parts::{Block, Parts, Row, Slot};

use std::borrow::Cow;
use std::sync::Arc;
use thiserror::Error;

/// Shared literal fragments of one template call-site.
pub type Statics = Arc<[String]>;

/// Template errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Statics and dynamics do not interleave.
    #[error("template has {statics} statics for {dynamics} dynamics")]
    Arity { statics: usize, dynamics: usize },

    /// An update does not fit the tree it is applied to.
    #[error("cannot apply update at slot {index}: {reason}")]
    ApplyMismatch { index: usize, reason: &'static str },
}

/// Build an [`Html`] value from a format literal and dynamic values.
///
/// Each `{}` in the literal is a dynamic slot; `{{` and `}}` produce
/// literal braces. Arguments convert through [`Dynamic::from`], so strings
/// are escaped unless wrapped with [`safe`].
///
/// The literal is split once per call-site and the resulting statics are
/// shared by every render of that call-site.
#[macro_export]
macro_rules! html {
    ($format:literal $(, $arg:expr)* $(,)?) => {{
        static STATICS: ::std::sync::OnceLock<$crate::template::Statics> =
            ::std::sync::OnceLock::new();
        $crate::template::Html::new(
            ::std::sync::Arc::clone(
                STATICS.get_or_init(|| $crate::template::split_statics($format)),
            ),
            ::std::vec![$($crate::template::Dynamic::from($arg)),*],
        )
    }};
}

/// Split a format literal into statics at each `{}` placeholder.
#[must_use]
pub fn split_statics(format: &str) -> Statics {
    let mut statics = Vec::new();
    let mut current = String::new();
    let mut chars = format.chars().peekable();

    while let Some(c) = chars.next() {
        match (c, chars.peek()) {
            ('{', Some(&'{')) => {
                chars.next();
                current.push('{');
            }
            ('}', Some(&'}')) => {
                chars.next();
                current.push('}');
            }
            ('{', Some(&'}')) => {
                chars.next();
                statics.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    statics.push(current);

    statics.into()
}

/// Escape the characters significant in markup: `& < > " '`.
#[must_use]
pub fn escape_html(input: &str) -> Cow<'_, str> {
    if !input.contains(|c| matches!(c, '&' | '<' | '>' | '"' | '\'')) {
        return Cow::Borrowed(input);
    }

    let mut escaped = String::with_capacity(input.len() + 16);
    for c in input.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    Cow::Owned(escaped)
}
