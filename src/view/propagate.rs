use std::collections::{HashSet, VecDeque};

use crate::error::ViewError;
use crate::view::{SignalBlocker, ViewId, ViewKind, ViewNode, ViewTree};

/// How views are refreshed by a propagation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOptions {
    /// Items views get their selection back after the update.
    pub keep_selection: bool,
    /// Skip the data update of basic and form views, form rules are still
    /// evaluated. Used while a form waits for its apply button.
    pub before_validation: bool,
    /// Items views move to their last page before the update.
    pub reset_pagination: bool,
}

impl UpdateOptions {
    pub fn keep_selection(mut self, keep_selection: bool) -> Self {
        self.keep_selection = keep_selection;
        self
    }

    pub fn before_validation(mut self, before_validation: bool) -> Self {
        self.before_validation = before_validation;
        self
    }

    pub fn reset_pagination(mut self, reset_pagination: bool) -> Self {
        self.reset_pagination = reset_pagination;
        self
    }
}

impl ViewTree {
    /// Refreshes a single view.
    ///
    /// Signals of the view are blocked for the whole refresh and released
    /// even when the update fails. A hidden view which defers its refreshes
    /// is only marked as pending.
    pub fn update_view(&mut self, id: ViewId, options: UpdateOptions) -> Result<(), ViewError> {
        let node = self.node_mut(id)?;

        if node.defer_while_hidden && !node.flags.is_visible {
            tracing::trace!(view = %node.name, "refresh deferred until visible");
            node.is_update_pending = true;
            return Ok(());
        }

        let ViewNode {
            name,
            kind,
            flags,
            is_update_pending,
            refresh,
            ..
        } = node;

        let mut flags = SignalBlocker::new(flags);

        let result = match kind {
            ViewKind::Items => {
                let selection = options.keep_selection.then(|| refresh.selection());
                if options.reset_pagination {
                    refresh.move_to_last_page();
                }
                refresh.update(&mut flags).map(|()| {
                    if let Some(selection) = selection {
                        refresh.set_selection(selection);
                    }
                })
            }
            ViewKind::Form => {
                let result = match options.before_validation {
                    true => Ok(()),
                    false => refresh.update(&mut flags),
                };
                result.map(|()| {
                    if let Some(is_visible) = refresh.visibility() {
                        flags.is_visible = is_visible;
                    }
                    if let Some(is_enabled) = refresh.enablement() {
                        flags.is_enabled = is_enabled;
                    }
                })
            }
            ViewKind::Basic => match options.before_validation {
                true => Ok(()),
                false => refresh.update(&mut flags),
            },
        };

        drop(flags);

        match result {
            Ok(()) => {
                *is_update_pending = false;
                Ok(())
            }
            Err(source) => Err(ViewError::Update {
                view: name.clone(),
                source,
            }),
        }
    }

    /// Refreshes every view owned by `root`, parents before their children,
    /// children in declaration order. Returns the refreshed views in order.
    pub fn update_all_views(
        &mut self,
        root: ViewId,
        options: UpdateOptions,
    ) -> Result<Vec<ViewId>, ViewError> {
        let _span = tracing::debug_span!("update_all_views").entered();

        let mut order = Vec::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            self.update_view(id, options)?;
            order.push(id);
            stack.extend(self.node(id)?.children.iter().rev().copied());
        }

        tracing::debug!("refreshed {} views", order.len());
        Ok(order)
    }

    /// Refreshes `view` and, breadth first, every view which depends on it.
    ///
    /// Each view is refreshed at most once per call, so cycles and shared
    /// dependents terminate. Returns the refreshed views in order.
    pub fn update_view_with_dependencies(
        &mut self,
        view: ViewId,
        options: UpdateOptions,
    ) -> Result<Vec<ViewId>, ViewError> {
        let _span = tracing::debug_span!("update_view_with_dependencies").entered();

        let mut order = Vec::new();
        let mut queue = VecDeque::from([view]);
        let mut seen = HashSet::from([view]);

        while let Some(id) = queue.pop_front() {
            self.update_view(id, options)?;
            order.push(id);

            for dependent in self.dependencies(id)? {
                if seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        tracing::debug!("refreshed {} views", order.len());
        Ok(order)
    }
}
