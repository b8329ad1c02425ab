//! In-memory index over a flat tree listing.
//!
//! Entries live in an arena addressed by position; parent/child links are
//! indices. Traversals use an explicit stack so deep trees cannot overflow
//! the call stack.

use std::collections::HashMap;

use crate::store::path::{child_path, leaf_name};
use crate::types::{NodeKind, TreeEntry};

pub struct TreeIndex {
    entries: Vec<TreeEntry>,
    by_id: HashMap<String, usize>,
    children: Vec<Vec<usize>>,
    root: Option<usize>,
}

impl TreeIndex {
    pub fn build(entries: Vec<TreeEntry>) -> Self {
        let by_id: HashMap<String, usize> = entries
            .iter()
            .enumerate()
            .map(|(idx, e)| (e.header.id.clone(), idx))
            .collect();

        let mut children = vec![Vec::new(); entries.len()];
        let mut root = None;
        for (idx, entry) in entries.iter().enumerate() {
            match entry.header.parent_id.as_deref() {
                None => root = Some(idx),
                Some(parent) => {
                    if let Some(&p) = by_id.get(parent) {
                        children[p].push(idx);
                    }
                }
            }
        }

        Self {
            entries,
            by_id,
            children,
            root,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn root(&self) -> Option<&TreeEntry> {
        self.root.map(|idx| &self.entries[idx])
    }

    pub fn get(&self, id: &str) -> Option<&TreeEntry> {
        self.by_id.get(id).map(|&idx| &self.entries[idx])
    }

    pub fn children(&self, id: &str) -> impl Iterator<Item = &TreeEntry> {
        self.by_id
            .get(id)
            .into_iter()
            .flat_map(|&idx| self.children[idx].iter().map(|&c| &self.entries[c]))
    }

    /// Every entry below `id`, depth first, parents before their children.
    pub fn descendants(&self, id: &str) -> Vec<&TreeEntry> {
        let mut out = Vec::new();
        let Some(&start) = self.by_id.get(id) else {
            return out;
        };

        let mut stack: Vec<usize> = self.children[start].iter().rev().copied().collect();
        while let Some(idx) = stack.pop() {
            out.push(&self.entries[idx]);
            stack.extend(self.children[idx].iter().rev());
        }
        out
    }

    /// Resolves a slash-separated path by walking down from the root one
    /// segment at a time. A trailing slash only matches folders.
    pub fn find_by_path(&self, path: &str) -> Option<&TreeEntry> {
        let mut current = self.root?;
        let wants_folder = path.ends_with('/');

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            current = self.children[current]
                .iter()
                .copied()
                .find(|&c| self.entries[c].header.name == segment)?;
        }

        let entry = &self.entries[current];
        if wants_folder && entry.kind() != NodeKind::Folder {
            return None;
        }
        Some(entry)
    }

    /// Lists entries whose stored path disagrees with their position in the
    /// tree, or that are not reachable from the root.
    pub fn inconsistencies(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let Some(root) = self.root else {
            problems.push("tree has no root folder".to_string());
            return problems;
        };

        let mut reached = vec![false; self.entries.len()];
        reached[root] = true;
        let mut stack = vec![root];
        while let Some(idx) = stack.pop() {
            let parent = &self.entries[idx];
            for &c in &self.children[idx] {
                let child = &self.entries[c];
                let expected = child_path(
                    &parent.header.path,
                    leaf_name(&child.header.path),
                    child.kind() == NodeKind::Folder,
                );
                if child.header.path != expected {
                    problems.push(format!(
                        "{} has path {} but its parent implies {}",
                        child.header.id, child.header.path, expected
                    ));
                }
                if parent.kind() != NodeKind::Folder {
                    problems.push(format!("{} is the parent of {}", parent.header.id, child.header.id));
                }
                reached[c] = true;
                stack.push(c);
            }
        }

        problems.extend(
            reached
                .iter()
                .enumerate()
                .filter(|&(_, &seen)| !seen)
                .map(|(idx, _)| format!("{} is not reachable from the root", self.entries[idx].header.id)),
        );
        problems
    }
}
