//! The view tree and its dependency graph.
//!
//! Views live in an arena and are addressed by [`ViewId`] handles. Two
//! relations are kept apart:
//!
//! * ownership: every view but the root has one parent and named, ordered
//!   children. It is a tree.
//! * dependencies: "when this view changes, that view must be refreshed".
//!   Edges may point anywhere in the tree and may form cycles.
mod propagate;

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;

use crate::error::ViewError;

pub use crate::view::propagate::UpdateOptions;

/// Handle to a view of a [`ViewTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(NodeIndex);

impl ViewId {
    pub fn index(self) -> usize {
        self.0.index()
    }
}

/// Selected rows of a table or tree view, keyed by the path of the parent
/// row (empty for top-level rows).
pub type Selection = BTreeMap<Vec<usize>, Vec<usize>>;

/// The closed set of view kinds the refresh pass distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// Any view without special handling.
    Basic,
    /// Tables and trees: selection and pagination survive a refresh.
    Items,
    /// Form fields: visibility and enabled state follow the view's rules.
    Form,
}

/// Binding between a view and the data it shows.
///
/// Only [`update`](Refresh::update) is required, the other hooks are used
/// depending on the [`ViewKind`] of the view.
pub trait Refresh {
    fn update(&mut self, flags: &mut ViewFlags) -> anyhow::Result<()>;

    fn selection(&self) -> Selection {
        Selection::new()
    }

    fn set_selection(&mut self, _selection: Selection) {}

    fn move_to_last_page(&mut self) {}

    /// Visibility rule of a form field, `None` leaves it unchanged.
    fn visibility(&self) -> Option<bool> {
        None
    }

    /// Enabled rule of a form field, `None` leaves it unchanged.
    fn enablement(&self) -> Option<bool> {
        None
    }
}

/// A view which doesn't show any data on its own, e.g. a container.
pub struct Container;

impl Refresh for Container {
    fn update(&mut self, _: &mut ViewFlags) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ViewFlags {
    pub is_visible: bool,
    pub is_enabled: bool,
    block_signals: bool,
}

impl ViewFlags {
    /// Signals of a view are blocked while it refreshes, so that the refresh
    /// doesn't trigger another one.
    pub fn is_signals_blocked(&self) -> bool {
        self.block_signals
    }
}

/// Blocks the signals of a view for as long as it lives.
pub(crate) struct SignalBlocker<'a>(&'a mut ViewFlags);

impl<'a> SignalBlocker<'a> {
    pub(crate) fn new(flags: &'a mut ViewFlags) -> Self {
        flags.block_signals = true;
        Self(flags)
    }
}

impl Deref for SignalBlocker<'_> {
    type Target = ViewFlags;

    fn deref(&self) -> &Self::Target {
        self.0
    }
}

impl DerefMut for SignalBlocker<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0
    }
}

impl Drop for SignalBlocker<'_> {
    fn drop(&mut self) {
        self.0.block_signals = false;
    }
}

pub(crate) struct ViewNode {
    name: String,
    kind: ViewKind,
    parent: Option<ViewId>,
    children: Vec<ViewId>,
    flags: ViewFlags,
    defer_while_hidden: bool,
    is_update_pending: bool,
    refresh: Box<dyn Refresh>,
}

/// Arena of views, explicitly passed to whoever needs to refresh them.
pub struct ViewTree {
    /// Edges are dependencies, weighted by declaration order.
    graph: StableGraph<ViewNode, u64>,
    root: ViewId,
    sequence: u64,
}

impl ViewTree {
    pub fn new(root: impl Into<String>) -> Self {
        let mut graph = StableGraph::new();
        let index = graph.add_node(ViewNode {
            name: root.into(),
            kind: ViewKind::Basic,
            parent: None,
            children: Vec::new(),
            flags: ViewFlags {
                is_visible: true,
                is_enabled: true,
                block_signals: false,
            },
            defer_while_hidden: false,
            is_update_pending: false,
            refresh: Box::new(Container),
        });

        Self {
            graph,
            root: ViewId(index),
            sequence: 0,
        }
    }

    pub fn root(&self) -> ViewId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Adds a child view. New views start visible and enabled.
    pub fn add_view(
        &mut self,
        parent: ViewId,
        name: impl Into<String>,
        kind: ViewKind,
        refresh: impl Refresh + 'static,
    ) -> Result<ViewId, ViewError> {
        let name = name.into();

        let parent_node = self.node(parent)?;
        if parent_node
            .children
            .iter()
            .any(|&child| self.graph[child.0].name == name)
        {
            return Err(ViewError::DuplicateName(parent_node.name.clone(), name));
        }

        let index = self.graph.add_node(ViewNode {
            name,
            kind,
            parent: Some(parent),
            children: Vec::new(),
            flags: ViewFlags {
                is_visible: true,
                is_enabled: true,
                block_signals: false,
            },
            defer_while_hidden: false,
            is_update_pending: false,
            refresh: Box::new(refresh),
        });

        let id = ViewId(index);
        self.node_mut(parent)?.children.push(id);
        Ok(id)
    }

    pub(crate) fn node(&self, id: ViewId) -> Result<&ViewNode, ViewError> {
        self.graph
            .node_weight(id.0)
            .ok_or(ViewError::UnknownView(id.index()))
    }

    pub(crate) fn node_mut(&mut self, id: ViewId) -> Result<&mut ViewNode, ViewError> {
        self.graph
            .node_weight_mut(id.0)
            .ok_or(ViewError::UnknownView(id.index()))
    }

    pub fn name(&self, id: ViewId) -> Result<&str, ViewError> {
        Ok(&self.node(id)?.name)
    }

    pub fn kind(&self, id: ViewId) -> Result<ViewKind, ViewError> {
        Ok(self.node(id)?.kind)
    }

    pub fn parent(&self, id: ViewId) -> Result<Option<ViewId>, ViewError> {
        Ok(self.node(id)?.parent)
    }

    pub fn children(&self, id: ViewId) -> Result<&[ViewId], ViewError> {
        Ok(&self.node(id)?.children)
    }

    /// Names from the root down to the view, joined with `/`.
    pub fn path(&self, id: ViewId) -> Result<String, ViewError> {
        let mut names = Vec::new();
        let mut current = Some(id);
        while let Some(id) = current {
            let node = self.node(id)?;
            names.push(node.name.as_str());
            current = node.parent;
        }
        names.reverse();
        Ok(names.join("/"))
    }

    /// Resolves a `/` separated path of child names starting at `from`.
    pub fn find(&self, from: ViewId, path: &str) -> Result<ViewId, ViewError> {
        let mut current = from;
        for name in path.split('/').filter(|name| !name.is_empty()) {
            current = self
                .node(current)?
                .children
                .iter()
                .copied()
                .find(|&child| self.graph[child.0].name == name)
                .ok_or_else(|| ViewError::NotFound(path.to_string()))?;
        }
        Ok(current)
    }

    pub fn flags(&self, id: ViewId) -> Result<&ViewFlags, ViewError> {
        Ok(&self.node(id)?.flags)
    }

    pub fn is_visible(&self, id: ViewId) -> Result<bool, ViewError> {
        Ok(self.node(id)?.flags.is_visible)
    }

    pub fn is_enabled(&self, id: ViewId) -> Result<bool, ViewError> {
        Ok(self.node(id)?.flags.is_enabled)
    }

    pub fn set_enabled(&mut self, id: ViewId, is_enabled: bool) -> Result<(), ViewError> {
        self.node_mut(id)?.flags.is_enabled = is_enabled;
        Ok(())
    }

    /// Shows or hides a view. Showing a view with a deferred refresh applies
    /// it.
    pub fn set_visible(&mut self, id: ViewId, is_visible: bool) -> Result<(), ViewError> {
        let node = self.node_mut(id)?;
        node.flags.is_visible = is_visible;

        if is_visible && node.is_update_pending {
            tracing::debug!(view = %node.name, "applying deferred refresh");
            self.update_view(id, UpdateOptions::default())?;
        }

        Ok(())
    }

    /// Opt in to deferring refreshes while the view is hidden.
    pub fn set_defer_while_hidden(&mut self, id: ViewId, defer: bool) -> Result<(), ViewError> {
        self.node_mut(id)?.defer_while_hidden = defer;
        Ok(())
    }

    pub fn is_update_pending(&self, id: ViewId) -> Result<bool, ViewError> {
        Ok(self.node(id)?.is_update_pending)
    }

    /// Declares that `dependent` must be refreshed whenever `view` is.
    /// Declaring the same edge twice has no effect.
    pub fn add_dependency(&mut self, view: ViewId, dependent: ViewId) -> Result<(), ViewError> {
        self.node(view)?;
        self.node(dependent)?;

        if self.graph.find_edge(view.0, dependent.0).is_some() {
            return Ok(());
        }

        if petgraph::algo::has_path_connecting(&self.graph, dependent.0, view.0, None) {
            tracing::warn!(
                view = %self.graph[view.0].name,
                dependent = %self.graph[dependent.0].name,
                "dependency closes a cycle"
            );
        }

        self.sequence += 1;
        self.graph.add_edge(view.0, dependent.0, self.sequence);
        Ok(())
    }

    /// Views refreshed after `view`, in declaration order.
    pub fn dependencies(&self, view: ViewId) -> Result<Vec<ViewId>, ViewError> {
        self.node(view)?;

        let mut edges: Vec<_> = self
            .graph
            .edges_directed(view.0, Direction::Outgoing)
            .map(|edge| (*edge.weight(), ViewId(edge.target())))
            .collect();
        edges.sort_by_key(|&(sequence, _)| sequence);

        Ok(edges.into_iter().map(|(_, id)| id).collect())
    }

    /// Drops every dependency declared on `view`, e.g. before declaring them
    /// again on re-initialization.
    pub fn clear_dependencies(&mut self, view: ViewId) -> Result<(), ViewError> {
        self.node(view)?;

        let edges: Vec<_> = self
            .graph
            .edges_directed(view.0, Direction::Outgoing)
            .map(|edge| edge.id())
            .collect();
        for edge in edges {
            self.graph.remove_edge(edge);
        }

        Ok(())
    }

    pub fn has_dependency_cycle(&self) -> bool {
        petgraph::algo::is_cyclic_directed(&self.graph)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (ViewTree, ViewId, ViewId, ViewId) {
        let mut tree = ViewTree::new("main");
        let root = tree.root();
        let form = tree.add_view(root, "form", ViewKind::Basic, Container).unwrap();
        let name = tree.add_view(form, "name", ViewKind::Form, Container).unwrap();
        let table = tree.add_view(root, "table", ViewKind::Items, Container).unwrap();
        (tree, form, name, table)
    }

    #[test]
    fn test_paths() {
        let (tree, form, name, table) = tree();

        assert_eq!(tree.len(), 4);
        assert_eq!(tree.path(name).unwrap(), "main/form/name");
        assert_eq!(tree.find(tree.root(), "form/name").unwrap(), name);
        assert_eq!(tree.find(form, "name").unwrap(), name);
        assert_eq!(tree.find(tree.root(), "").unwrap(), tree.root());
        assert_eq!(tree.children(tree.root()).unwrap(), &[form, table]);
        assert_eq!(tree.parent(name).unwrap(), Some(form));
        assert_eq!(tree.kind(table).unwrap(), ViewKind::Items);
    }

    #[test]
    fn test_find_unknown_path() {
        let (tree, ..) = tree();
        assert!(matches!(
            tree.find(tree.root(), "form/age"),
            Err(ViewError::NotFound(path)) if path == "form/age"
        ));
    }

    #[test]
    fn test_duplicate_child_name() {
        let (mut tree, ..) = tree();
        let root = tree.root();
        assert!(matches!(
            tree.add_view(root, "form", ViewKind::Basic, Container),
            Err(ViewError::DuplicateName(parent, name)) if parent == "main" && name == "form"
        ));
    }

    #[test]
    fn test_dependencies_keep_declaration_order() {
        let (mut tree, form, name, table) = tree();
        let root = tree.root();

        tree.add_dependency(form, table).unwrap();
        tree.add_dependency(form, name).unwrap();
        tree.add_dependency(form, root).unwrap();
        tree.add_dependency(form, table).unwrap();

        assert_eq!(tree.dependencies(form).unwrap(), vec![table, name, root]);

        tree.clear_dependencies(form).unwrap();
        assert!(tree.dependencies(form).unwrap().is_empty());

        tree.add_dependency(form, name).unwrap();
        tree.add_dependency(form, table).unwrap();
        assert_eq!(tree.dependencies(form).unwrap(), vec![name, table]);
    }

    #[test]
    fn test_dependency_cycle_detection() {
        let (mut tree, form, _, table) = tree();

        tree.add_dependency(form, table).unwrap();
        assert!(!tree.has_dependency_cycle());

        tree.add_dependency(table, form).unwrap();
        assert!(tree.has_dependency_cycle());
    }

    #[test]
    fn test_signal_blocker_releases() {
        let mut flags = ViewFlags::default();
        {
            let blocker = SignalBlocker::new(&mut flags);
            assert!(blocker.is_signals_blocked());
        }
        assert!(!flags.is_signals_blocked());
    }
}
