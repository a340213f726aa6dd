//! Structural diffs between two renders of the same template.
//!
//! A diff only names the slots that changed. Statics are never resent
//! unless the shape of a subtree changed, in which case the whole subtree
//! is replaced.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use std::collections::BTreeMap;

use super::parts::{Block, Parts, Row, Slot};
use super::TemplateError;

/// Sparse map from slot index to change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diff {
    changes: BTreeMap<usize, Change>,
}

/// The change to one slot.
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    /// The slot becomes this leaf.
    Leaf(String),
    /// The nested tree kept its statics; these slots changed.
    Nested(Diff),
    /// The slot changed shape and is replaced whole.
    Replace(Slot),
    /// The block kept its statics; these rows changed.
    Rows(RowsDiff),
}

/// Row-level changes to a [`Block`].
#[derive(Debug, Clone, PartialEq)]
pub struct RowsDiff {
    len: usize,
    rows: BTreeMap<usize, RowChange>,
}

/// The change to one row.
#[derive(Debug, Clone, PartialEq)]
pub enum RowChange {
    /// Changed slots of an existing row.
    Patch(Diff),
    /// A row past the end of the previous block.
    Full(Row),
}

/// What to send after a re-render.
#[derive(Debug, Clone, PartialEq)]
pub enum Update {
    /// Changes relative to the previous tree.
    Diff(Diff),
    /// The full tree, when the top-level statics changed.
    Full(Parts),
}

impl Diff {
    /// Check if nothing changed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Number of changed slots at this level.
    #[must_use]
    pub fn len(&self) -> usize {
        self.changes.len()
    }

    /// The change for a slot, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&Change> {
        self.changes.get(&index)
    }

    /// Iterate changes in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (usize, &Change)> {
        self.changes.iter().map(|(index, change)| (*index, change))
    }
}

impl RowsDiff {
    /// Row count of the new block.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Check if the new block has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The change for a row, if any.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&RowChange> {
        self.rows.get(&index)
    }
}

impl Update {
    /// Check if the update carries no change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        matches!(self, Update::Diff(diff) if diff.is_empty())
    }
}

/// Diff two trees rendered at the same call-site.
///
/// Falls back to [`Update::Full`] when the top-level statics differ.
#[must_use]
pub fn diff(previous: &Parts, next: &Parts) -> Update {
    if previous.statics != next.statics {
        return Update::Full(next.clone());
    }
    Update::Diff(diff_slots(&previous.dynamics, &next.dynamics))
}

fn diff_slots(previous: &[Slot], next: &[Slot]) -> Diff {
    let changes = previous
        .iter()
        .zip(next)
        .enumerate()
        .filter_map(|(index, (before, after))| diff_slot(before, after).map(|c| (index, c)))
        .collect();
    Diff { changes }
}

fn diff_slot(before: &Slot, after: &Slot) -> Option<Change> {
    match (before, after) {
        (Slot::Leaf(old), Slot::Leaf(new)) => (old != new).then(|| Change::Leaf(new.clone())),
        (Slot::Nested(old), Slot::Nested(new)) if old.statics == new.statics => {
            let nested = diff_slots(&old.dynamics, &new.dynamics);
            (!nested.is_empty()).then_some(Change::Nested(nested))
        }
        (Slot::Block(old), Slot::Block(new)) if old.statics == new.statics => {
            diff_rows(old, new).map(Change::Rows)
        }
        (_, Slot::Leaf(new)) => Some(Change::Leaf(new.clone())),
        (_, replacement) => Some(Change::Replace(replacement.clone())),
    }
}

fn diff_rows(old: &Block, new: &Block) -> Option<RowsDiff> {
    let mut rows = BTreeMap::new();
    for (index, row) in new.rows.iter().enumerate() {
        match old.rows.get(index) {
            Some(previous) => {
                let patch = diff_slots(previous, row);
                if !patch.is_empty() {
                    rows.insert(index, RowChange::Patch(patch));
                }
            }
            None => {
                rows.insert(index, RowChange::Full(row.clone()));
            }
        }
    }

    if rows.is_empty() && old.rows.len() == new.rows.len() {
        return None;
    }
    Some(RowsDiff {
        len: new.rows.len(),
        rows,
    })
}

impl Parts {
    /// Apply an update produced by [`diff`] against this tree.
    ///
    /// # Errors
    ///
    /// Returns [`TemplateError::ApplyMismatch`] if the update was not
    /// computed against a tree of this shape.
    pub fn apply(&mut self, update: &Update) -> Result<(), TemplateError> {
        match update {
            Update::Full(parts) => {
                *self = parts.clone();
                Ok(())
            }
            Update::Diff(diff) => apply_slots(&mut self.dynamics, diff),
        }
    }
}

fn apply_slots(slots: &mut [Slot], diff: &Diff) -> Result<(), TemplateError> {
    for (&index, change) in &diff.changes {
        let mismatch = |reason| TemplateError::ApplyMismatch { index, reason };
        let slot = slots.get_mut(index).ok_or(mismatch("slot out of range"))?;

        match (change, slot) {
            (Change::Leaf(text), slot) => *slot = Slot::Leaf(text.clone()),
            (Change::Replace(replacement), slot) => *slot = replacement.clone(),
            (Change::Nested(nested), Slot::Nested(parts)) => {
                apply_slots(&mut parts.dynamics, nested)?;
            }
            (Change::Rows(rows), Slot::Block(block)) => {
                apply_rows(&mut block.rows, rows)?;
            }
            (Change::Nested(_), _) => return Err(mismatch("nested diff on a non-nested slot")),
            (Change::Rows(_), _) => return Err(mismatch("row diff on a non-block slot")),
        }
    }
    Ok(())
}

fn apply_rows(rows: &mut Vec<Row>, diff: &RowsDiff) -> Result<(), TemplateError> {
    rows.truncate(diff.len);
    for (&index, change) in &diff.rows {
        match change {
            RowChange::Patch(patch) => {
                let row = rows.get_mut(index).ok_or(TemplateError::ApplyMismatch {
                    index,
                    reason: "patched row out of range",
                })?;
                apply_slots(row, patch)?;
            }
            RowChange::Full(row) if index == rows.len() => rows.push(row.clone()),
            RowChange::Full(row) if index < rows.len() => rows[index] = row.clone(),
            RowChange::Full(_) => {
                return Err(TemplateError::ApplyMismatch {
                    index,
                    reason: "appended row leaves a gap",
                })
            }
        }
    }
    Ok(())
}

impl Serialize for Diff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.changes.len()))?;
        for (index, change) in &self.changes {
            map.serialize_entry(&index.to_string(), change)?;
        }
        map.end()
    }
}

impl Serialize for Change {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Change::Leaf(text) => serializer.serialize_str(text),
            Change::Nested(diff) => diff.serialize(serializer),
            Change::Replace(slot) => slot.serialize(serializer),
            Change::Rows(rows) => rows.serialize(serializer),
        }
    }
}

impl Serialize for RowsDiff {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let rows: BTreeMap<String, &RowChange> = self
            .rows
            .iter()
            .map(|(index, change)| (index.to_string(), change))
            .collect();

        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("d", &rows)?;
        map.serialize_entry("n", &self.len)?;
        map.end()
    }
}

impl Serialize for RowChange {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            RowChange::Patch(diff) => diff.serialize(serializer),
            RowChange::Full(row) => row.serialize(serializer),
        }
    }
}

impl Serialize for Update {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Update::Diff(diff) => diff.serialize(serializer),
            Update::Full(parts) => parts.serialize(serializer),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::html;
    use crate::template::Html;
    use proptest::prelude::*;
    use serde_json::json;

    fn render_list(items: &[&str], title: &str) -> Html {
        let rows: Vec<Html> = items
            .iter()
            .map(|item| html!("<li>{}</li>", *item))
            .collect();
        html!("<h1>{}</h1><ul>{}</ul>", title, rows)
    }

    fn apply(previous: &Parts, update: &Update) -> Parts {
        let mut tree = previous.clone();
        tree.apply(update).unwrap();
        tree
    }

    #[test]
    fn test_identical_trees_have_empty_diff() {
        let parts = render_list(&["a", "b"], "t").parts().unwrap();
        let update = diff(&parts, &parts);
        assert!(update.is_empty());
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({}));
    }

    #[test]
    fn test_changed_leaf_only() {
        let before = render_list(&["a", "b"], "old").parts().unwrap();
        let after = render_list(&["a", "b"], "new").parts().unwrap();
        assert_eq!(serde_json::to_value(diff(&before, &after)).unwrap(), json!({"0": "new"}));
    }

    #[test]
    fn test_changed_rows_only() {
        let before = render_list(&["a", "b", "c"], "t").parts().unwrap();
        let after = render_list(&["a", "B", "c"], "t").parts().unwrap();
        let update = diff(&before, &after);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"1": {"d": {"1": {"0": "B"}}, "n": 3}})
        );
        assert_eq!(apply(&before, &update), after);
    }

    #[test]
    fn test_rows_appended_and_truncated() {
        let before = render_list(&["a"], "t").parts().unwrap();
        let longer = render_list(&["a", "b", "c"], "t").parts().unwrap();
        let update = diff(&before, &longer);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"1": {"d": {"1": ["b"], "2": ["c"]}, "n": 3}})
        );
        assert_eq!(apply(&before, &update), longer);

        let shorter = diff(&longer, &before);
        assert_eq!(
            serde_json::to_value(&shorter).unwrap(),
            json!({"1": {"d": {}, "n": 1}})
        );
        assert_eq!(apply(&longer, &shorter), before);
    }

    #[test]
    fn test_list_emptied_becomes_leaf() {
        let before = render_list(&["a"], "t").parts().unwrap();
        let after = render_list(&[], "t").parts().unwrap();
        let update = diff(&before, &after);
        assert_eq!(serde_json::to_value(&update).unwrap(), json!({"1": ""}));
        assert_eq!(apply(&before, &update), after);
    }

    #[test]
    fn test_nested_shape_change_replaces_subtree() {
        let render = |loading: bool| {
            let status = if loading {
                html!("<div class=\"loader\">{}</div>", "Loading...")
            } else {
                html!("<span>{}</span>", "done")
            };
            html!("<main>{}</main>", status)
        };
        let before = render(true).parts().unwrap();
        let after = render(false).parts().unwrap();
        let update = diff(&before, &after);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"0": {"0": "done", "s": ["<span>", "</span>"]}})
        );
        assert_eq!(apply(&before, &update), after);
    }

    #[test]
    fn test_leaf_to_nested_replaces() {
        let render = |loading: bool| {
            html!(
                "<div>{}</div>",
                loading.then(|| html!("<p>Loading...</p>"))
            )
        };
        let idle = render(false).parts().unwrap();
        let loading = render(true).parts().unwrap();

        let update = diff(&idle, &loading);
        assert_eq!(
            serde_json::to_value(&update).unwrap(),
            json!({"0": {"s": ["<p>Loading...</p>"]}})
        );
        assert_eq!(apply(&idle, &update), loading);
        assert_eq!(
            serde_json::to_value(diff(&loading, &idle)).unwrap(),
            json!({"0": ""})
        );
    }

    #[test]
    fn test_top_level_statics_change_sends_full_tree() {
        let before = html!("<p>{}</p>", 1).parts().unwrap();
        let after = html!("<p>{} of {}</p>", 1, 2).parts().unwrap();
        let update = diff(&before, &after);
        assert_eq!(update, Update::Full(after.clone()));
        assert_eq!(apply(&before, &update), after);
    }

    #[test]
    fn test_diff_values_are_escaped() {
        let render = |name: &str| html!("<b>{}</b>", name);
        let before = render("ok").parts().unwrap();
        let after = render("<script>").parts().unwrap();
        assert_eq!(
            serde_json::to_value(diff(&before, &after)).unwrap(),
            json!({"0": "&lt;script&gt;"})
        );
    }

    #[test]
    fn test_apply_mismatch() {
        let leaf_only = html!("<p>{}</p>", "x").parts().unwrap();
        let nested = html!("<p>{}</p>", html!("<i>{}</i>", "a")).parts().unwrap();
        let nested_changed = html!("<p>{}</p>", html!("<i>{}</i>", "b")).parts().unwrap();

        let update = diff(&nested, &nested_changed);
        let mut tree = leaf_only;
        assert!(matches!(
            tree.apply(&update),
            Err(TemplateError::ApplyMismatch { index: 0, .. })
        ));
    }

    #[derive(Debug, Clone)]
    struct Entry {
        name: String,
        open: bool,
    }

    fn arb_entry() -> impl Strategy<Value = Entry> {
        ("[a-z<&>]{0,6}", any::<bool>()).prop_map(|(name, open)| Entry { name, open })
    }

    fn arb_page() -> impl Strategy<Value = (String, Option<u8>, Vec<Entry>)> {
        (
            "[a-z\"']{0,5}",
            proptest::option::of(any::<u8>()),
            proptest::collection::vec(arb_entry(), 0..6),
        )
    }

    fn render_page((title, count, rows): &(String, Option<u8>, Vec<Entry>)) -> Parts {
        let rows: Vec<Html> = rows
            .iter()
            .map(|row| {
                let status = if row.open {
                    html!("<span class=\"open\">Open</span>")
                } else {
                    html!("<span class=\"closed\">{}</span>", "Closed")
                };
                html!("<li>{} {}</li>", &row.name, status)
            })
            .collect();
        let badge = count.map(|n| html!("<em>{}</em>", n));
        html!("<h1>{}</h1>{}<ul>{}</ul>", title, badge, rows)
            .parts()
            .unwrap()
    }

    proptest! {
        #[test]
        fn diff_of_self_is_empty(page in arb_page()) {
            let parts = render_page(&page);
            prop_assert!(diff(&parts, &parts).is_empty());
        }

        #[test]
        fn apply_diff_reconstructs_next(before in arb_page(), after in arb_page()) {
            let previous = render_page(&before);
            let next = render_page(&after);
            let mut tree = previous.clone();
            tree.apply(&diff(&previous, &next)).unwrap();
            prop_assert_eq!(tree, next);
        }

        #[test]
        fn trees_are_well_formed(page in arb_page()) {
            prop_assert!(render_page(&page).is_well_formed());
        }

        #[test]
        fn sibling_rows_collapse_into_one_block(rows in proptest::collection::vec("[a-z]{0,4}", 1..8)) {
            let items: Vec<Html> = rows.iter().map(|r| html!("<li>{}</li>", r)).collect();
            let parts = html!("<ul>{}</ul>", items).parts().unwrap();
            match &parts.dynamics()[0] {
                Slot::Block(block) => prop_assert_eq!(block.rows().len(), rows.len()),
                other => prop_assert!(false, "expected a block, got {:?}", other),
            }
        }
    }
}
