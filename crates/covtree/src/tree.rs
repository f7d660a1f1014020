//! Object tree control with keyed reconciliation
//!
//! Rows live in a map keyed by [`RowKey`], with parent and child links stored
//! as keys. Replacing a row's children either rebuilds them from scratch or
//! reconciles them by key, in which case rows whose key survives keep their
//! collapse state, selection and materialized subtree.
//!
//! Children handed to a collapsed row are kept as an unconsumed iterator until
//! the row is first expanded.

use eyre::{Result, bail, eyre};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::mem;

/// Identity of a row across updates
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum RowKey {
    /// A file or directory row, keyed by its URI
    File(String),
    /// A derived row (declaration or sentinel), keyed by its node id
    Node(u64),
}

/// Anything that can be displayed in an [`ObjectTree`]
pub trait TreeElement {
    fn key(&self) -> RowKey;

    /// Whether `self` is the very value `previous` already shows, so the row
    /// and its subtree can be kept as they are.
    fn unchanged(&self, _previous: &Self) -> bool {
        false
    }
}

/// Sibling order used by an [`ObjectTree`]
pub trait TreeSorter<E> {
    fn compare(&self, a: &E, b: &E) -> Ordering;
}

pub type ChildIter<E> = Box<dyn Iterator<Item = TreeChild<E>>>;

/// A row to insert, with its (possibly lazy) children
pub struct TreeChild<E> {
    pub element: E,
    /// Never merged into a compressed chain label
    pub incompressible: bool,
    /// Initial collapse state. Rows kept by reconciliation keep their own.
    pub collapsed: bool,
    /// Defaults to whether `children` is present
    pub collapsible: Option<bool>,
    pub children: Option<ChildIter<E>>,
}

impl<E> TreeChild<E> {
    pub fn leaf(element: E) -> Self {
        Self {
            element,
            incompressible: false,
            collapsed: false,
            collapsible: None,
            children: None,
        }
    }

    pub fn incompressible(mut self, incompressible: bool) -> Self {
        self.incompressible = incompressible;
        self
    }

    pub fn collapsed(mut self, collapsed: bool) -> Self {
        self.collapsed = collapsed;
        self
    }

    pub fn collapsible(mut self, collapsible: bool) -> Self {
        self.collapsible = Some(collapsible);
        self
    }

    pub fn with_children(mut self, children: ChildIter<E>) -> Self {
        self.children = Some(children);
        self
    }
}

/// How [`ObjectTree::set_children`] treats the previous children
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetChildrenMode {
    /// Drop every previous child and insert the new ones fresh
    Replace,
    /// Reconcile by key, keeping state of rows whose key survives
    Diff,
}

/// Row counts touched by one [`ObjectTree::set_children`] call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Splice {
    pub inserted: usize,
    pub removed: usize,
    pub kept: usize,
}

/// One displayed line. Compressed chains list every merged row, outermost first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisibleRow {
    pub keys: Vec<RowKey>,
    pub depth: usize,
    pub collapsed: bool,
    pub collapsible: bool,
}

impl VisibleRow {
    /// The row that owns this line's children
    pub fn key(&self) -> &RowKey {
        &self.keys[self.keys.len() - 1]
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Viewport {
    pub height: u32,
    pub width: u32,
}

struct Slot<E> {
    element: E,
    parent: Option<RowKey>,
    children: Vec<RowKey>,
    pending: Option<ChildIter<E>>,
    collapsible: bool,
    collapsed: bool,
    incompressible: bool,
}

pub struct ObjectTree<E> {
    slots: HashMap<RowKey, Slot<E>>,
    roots: Vec<RowKey>,
    sorter: Option<Box<dyn TreeSorter<E>>>,
    selection: Vec<RowKey>,
    focus: Option<RowKey>,
    viewport: Viewport,
}

impl<E: TreeElement> Default for ObjectTree<E> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: TreeElement> ObjectTree<E> {
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            roots: Vec::new(),
            sorter: None,
            selection: Vec::new(),
            focus: None,
            viewport: Viewport::default(),
        }
    }

    pub fn with_sorter(sorter: impl TreeSorter<E> + 'static) -> Self {
        let mut tree = Self::new();
        tree.sorter = Some(Box::new(sorter));
        tree
    }

    /// Swap the sorter. Call [`Self::resort`] to reorder existing rows.
    pub fn set_sorter(&mut self, sorter: impl TreeSorter<E> + 'static) {
        self.sorter = Some(Box::new(sorter));
    }

    // ------------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------------

    pub fn has_element(&self, key: &RowKey) -> bool {
        self.slots.contains_key(key)
    }

    pub fn element(&self, key: &RowKey) -> Option<&E> {
        self.slots.get(key).map(|s| &s.element)
    }

    /// Children of `parent`, or the roots when `parent` is `None`
    pub fn children(&self, parent: Option<&RowKey>) -> &[RowKey] {
        match parent {
            None => &self.roots,
            Some(key) => self.slots.get(key).map_or(&[], |s| s.children.as_slice()),
        }
    }

    pub fn parent(&self, key: &RowKey) -> Option<&RowKey> {
        self.slots.get(key)?.parent.as_ref()
    }

    pub fn is_collapsed(&self, key: &RowKey) -> Option<bool> {
        self.slots.get(key).map(|s| s.collapsed)
    }

    pub fn is_collapsible(&self, key: &RowKey) -> Option<bool> {
        self.slots.get(key).map(|s| s.collapsible)
    }

    pub fn is_incompressible(&self, key: &RowKey) -> Option<bool> {
        self.slots.get(key).map(|s| s.incompressible)
    }

    /// Whether the row still holds children it has not materialized yet
    pub fn has_pending_children(&self, key: &RowKey) -> bool {
        self.slots.get(key).is_some_and(|s| s.pending.is_some())
    }

    /// Number of materialized rows
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    // ------------------------------------------------------------------------
    // Mutation
    // ------------------------------------------------------------------------

    /// Replace the children of `parent` (the roots when `None`).
    ///
    /// Fails when `parent` names a row that does not exist.
    pub fn set_children(
        &mut self,
        parent: Option<&RowKey>,
        children: impl IntoIterator<Item = TreeChild<E>>,
        mode: SetChildrenMode,
    ) -> Result<Splice> {
        let Some(key) = parent else {
            return Ok(self.set_roots(children, mode));
        };
        let slot = self
            .slots
            .get_mut(key)
            .ok_or_else(|| eyre!("No row with key {key:?}"))?;
        slot.pending = None;

        let mut splice = Splice::default();
        self.reconcile(
            Some(key.clone()),
            children.into_iter().collect(),
            mode,
            &mut splice,
        );
        Ok(splice)
    }

    /// Replace the root rows.
    pub fn set_roots(
        &mut self,
        children: impl IntoIterator<Item = TreeChild<E>>,
        mode: SetChildrenMode,
    ) -> Splice {
        let mut splice = Splice::default();
        self.reconcile(None, children.into_iter().collect(), mode, &mut splice);
        splice
    }

    /// Swap the element shown by a row without touching its children.
    pub fn replace_element(&mut self, key: &RowKey, element: E) -> bool {
        match self.slots.get_mut(key) {
            Some(slot) => {
                slot.element = element;
                true
            }
            None => false,
        }
    }

    /// Update one row from a new description, the way a keyed diff of its
    /// parent would: element and flags are refreshed, and children follow
    /// `child.children`.
    pub fn refresh_row(&mut self, key: &RowKey, child: TreeChild<E>) -> Result<Splice> {
        if !self.slots.contains_key(key) {
            bail!("No row with key {key:?}");
        }
        let incoming = child.element.key();
        if incoming != *key {
            bail!("Row {key:?} cannot be refreshed with element keyed {incoming:?}");
        }

        let mut splice = Splice {
            kept: 1,
            ..Splice::default()
        };
        self.update_row(key, child, &mut splice);

        // The new element may order differently among its siblings.
        let parent = self.slots.get(key).and_then(|s| s.parent.clone());
        let mut siblings = match &parent {
            None => mem::take(&mut self.roots),
            Some(parent) => match self.slots.get_mut(parent) {
                Some(slot) => mem::take(&mut slot.children),
                None => Vec::new(),
            },
        };
        self.sort_keys(&mut siblings);
        match &parent {
            None => self.roots = siblings,
            Some(parent) => {
                if let Some(slot) = self.slots.get_mut(parent) {
                    slot.children = siblings;
                }
            }
        }
        Ok(splice)
    }

    /// Expand or collapse a row. Returns whether the state changed.
    ///
    /// Expanding materializes children that were deferred while collapsed.
    pub fn set_collapsed(&mut self, key: &RowKey, collapsed: bool) -> bool {
        let Some(slot) = self.slots.get_mut(key) else {
            return false;
        };
        if slot.collapsed == collapsed || (!collapsed && !slot.collapsible) {
            return false;
        }
        slot.collapsed = collapsed;

        if !collapsed && let Some(pending) = slot.pending.take() {
            let mut splice = Splice::default();
            self.reconcile(
                Some(key.clone()),
                pending.collect(),
                SetChildrenMode::Replace,
                &mut splice,
            );
        }
        true
    }

    pub fn collapse_all(&mut self) {
        for slot in self.slots.values_mut() {
            if slot.collapsible {
                slot.collapsed = true;
            }
        }
    }

    /// Reorder every sibling list with the current sorter.
    pub fn resort(&mut self) {
        let mut roots = mem::take(&mut self.roots);
        self.sort_keys(&mut roots);
        self.roots = roots;

        let parents: Vec<RowKey> = self
            .slots
            .iter()
            .filter(|(_, s)| s.children.len() > 1)
            .map(|(k, _)| k.clone())
            .collect();
        for parent in parents {
            let mut children = match self.slots.get_mut(&parent) {
                Some(slot) => mem::take(&mut slot.children),
                None => continue,
            };
            self.sort_keys(&mut children);
            if let Some(slot) = self.slots.get_mut(&parent) {
                slot.children = children;
            }
        }
    }

    pub fn layout(&mut self, height: u32, width: u32) {
        self.viewport = Viewport { height, width };
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    pub fn set_selection(&mut self, keys: impl IntoIterator<Item = RowKey>) {
        self.selection = keys
            .into_iter()
            .filter(|k| self.slots.contains_key(k))
            .collect();
    }

    pub fn selection(&self) -> &[RowKey] {
        &self.selection
    }

    pub fn set_focus(&mut self, key: Option<RowKey>) {
        self.focus = key.filter(|k| self.slots.contains_key(k));
    }

    pub fn focus(&self) -> Option<&RowKey> {
        self.focus.as_ref()
    }

    // ------------------------------------------------------------------------
    // Rendering
    // ------------------------------------------------------------------------

    /// Rows currently on screen, depth first, with single-child chains of
    /// compressible rows merged into one line.
    pub fn visible_rows(&self) -> Vec<VisibleRow> {
        let mut out = Vec::new();
        for key in &self.roots {
            self.collect_visible(key, 0, &mut out);
        }
        out
    }

    fn collect_visible(&self, key: &RowKey, depth: usize, out: &mut Vec<VisibleRow>) {
        let mut chain = vec![key.clone()];
        let mut current = &self.slots[key];
        while !current.incompressible && !current.collapsed && current.children.len() == 1 {
            let next_key = &current.children[0];
            let next = &self.slots[next_key];
            if next.incompressible {
                break;
            }
            chain.push(next_key.clone());
            current = next;
        }

        out.push(VisibleRow {
            keys: chain,
            depth,
            collapsed: current.collapsed,
            collapsible: current.collapsible,
        });
        if !current.collapsed {
            for child in &current.children {
                self.collect_visible(child, depth + 1, out);
            }
        }
    }

    // ------------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------------

    fn reconcile(
        &mut self,
        parent: Option<RowKey>,
        children: Vec<TreeChild<E>>,
        mode: SetChildrenMode,
        splice: &mut Splice,
    ) {
        let old = match &parent {
            None => mem::take(&mut self.roots),
            Some(key) => match self.slots.get_mut(key) {
                Some(slot) => mem::take(&mut slot.children),
                None => return,
            },
        };

        let incoming: HashSet<RowKey> = match mode {
            SetChildrenMode::Replace => HashSet::new(),
            SetChildrenMode::Diff => children.iter().map(|c| c.element.key()).collect(),
        };
        let mut survivors: HashSet<RowKey> = HashSet::new();
        for key in old {
            if incoming.contains(&key) {
                survivors.insert(key);
            } else {
                self.remove_subtree(&key, splice);
            }
        }

        let mut list: Vec<RowKey> = Vec::with_capacity(children.len());
        for child in children {
            let key = child.element.key();
            if survivors.remove(&key) {
                splice.kept += 1;
                self.update_row(&key, child, splice);
            } else {
                if self.slots.contains_key(&key) {
                    // Same key elsewhere in the tree: the row moves here.
                    self.detach(&key);
                    self.remove_subtree(&key, splice);
                }
                self.insert_row(key.clone(), parent.clone(), child, splice);
            }
            list.push(key);
        }

        self.sort_keys(&mut list);
        match &parent {
            None => self.roots = list,
            Some(key) => {
                if let Some(slot) = self.slots.get_mut(key) {
                    slot.children = list;
                }
            }
        }
    }

    fn insert_row(
        &mut self,
        key: RowKey,
        parent: Option<RowKey>,
        child: TreeChild<E>,
        splice: &mut Splice,
    ) {
        let TreeChild {
            element,
            incompressible,
            collapsed,
            collapsible,
            children,
        } = child;

        splice.inserted += 1;
        let collapsible = collapsible.unwrap_or(children.is_some());
        let (pending, eager) = match children {
            Some(children) if collapsed => (Some(children), None),
            other => (None, other),
        };
        self.slots.insert(
            key.clone(),
            Slot {
                element,
                parent,
                children: Vec::new(),
                pending,
                collapsible,
                collapsed,
                incompressible,
            },
        );

        if let Some(children) = eager {
            self.reconcile(
                Some(key),
                children.collect(),
                SetChildrenMode::Replace,
                splice,
            );
        }
    }

    fn update_row(&mut self, key: &RowKey, child: TreeChild<E>, splice: &mut Splice) {
        let TreeChild {
            element,
            incompressible,
            collapsible,
            children,
            ..
        } = child;

        let Some(slot) = self.slots.get_mut(key) else {
            return;
        };
        if element.unchanged(&slot.element) {
            return;
        }
        slot.element = element;
        slot.incompressible = incompressible;
        slot.collapsible = collapsible.unwrap_or(children.is_some());
        slot.pending = None;

        match children {
            Some(children) if slot.collapsed && slot.children.is_empty() => {
                slot.pending = Some(children);
            }
            Some(children) => {
                self.reconcile(
                    Some(key.clone()),
                    children.collect(),
                    SetChildrenMode::Diff,
                    splice,
                );
            }
            None => {
                let had_children = !slot.children.is_empty();
                let old = mem::take(&mut slot.children);
                if had_children {
                    // Rows left without children collapse so the next expand starts over.
                    slot.collapsed = true;
                }
                for child in old {
                    self.remove_subtree(&child, splice);
                }
            }
        }
    }

    /// Unlink a row from its parent's child list (or the roots).
    fn detach(&mut self, key: &RowKey) {
        let parent = self.slots.get(key).and_then(|s| s.parent.clone());
        match parent {
            None => self.roots.retain(|k| k != key),
            Some(parent) => {
                if let Some(slot) = self.slots.get_mut(&parent) {
                    slot.children.retain(|k| k != key);
                }
            }
        }
    }

    fn remove_subtree(&mut self, key: &RowKey, splice: &mut Splice) {
        let Some(slot) = self.slots.remove(key) else {
            return;
        };
        splice.removed += 1;
        self.selection.retain(|k| k != key);
        if self.focus.as_ref() == Some(key) {
            self.focus = None;
        }
        for child in &slot.children {
            self.remove_subtree(child, splice);
        }
    }

    fn sort_keys(&self, keys: &mut [RowKey]) {
        let Some(sorter) = &self.sorter else {
            return;
        };
        insertion_sort_by(keys, |a, b| {
            sorter.compare(&self.slots[a].element, &self.slots[b].element)
        });
    }
}

/// Stable in-place sort that accepts comparators which are not a total order
/// (such as one that reports rows of different kinds as equal).
fn insertion_sort_by<T>(items: &mut [T], mut compare: impl FnMut(&T, &T) -> Ordering) {
    for i in 1..items.len() {
        let mut j = i;
        while j > 0 && compare(&items[j - 1], &items[j]) == Ordering::Greater {
            items.swap(j - 1, j);
            j -= 1;
        }
    }
}
