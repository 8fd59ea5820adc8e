/*
 * Created on Mon Oct 16 2023
 *
 * This file is a part of Pharos
 * Pharos is a free and open-source real-time publish/subscribe server that
 * exposes a hierarchical namespace of binary resources to many concurrent
 * clients, with periodic on-disk snapshots of the full tree.
 *
 * Copyright (c) 2023, The Pharos authors
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU Affero General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful,
 * but WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
 * GNU Affero General Public License for more details.
 *
 * You should have received a copy of the GNU Affero General Public License
 * along with this program. If not, see <https://www.gnu.org/licenses/>.
 *
*/

//! # The namespace tree
//!
//! The hierarchical name structure: directories map names to child nodes,
//! leaves own one [`Broker`] each. One readers-writer lock guards the tree
//! shape; broker handles are cloned out under the lock and operated on
//! outside it, so a slow subscriber never stalls an unrelated lookup.
//! Deletion closes every leaf of the removed subtree while still holding the
//! exclusive lock, which guarantees no operation can obtain a handle to a
//! broker whose subtree is already unlinked.


use crate::protocol::Listing;
use crate::resource::{Broker, Value};
use crate::util::join_path;
use parking_lot::RwLock;
use std::{collections::HashMap, fmt, sync::Arc};

#[derive(Debug, PartialEq, Eq)]
pub enum TreeError {
    NotFound(String),
    AlreadyExists(String),
    NotADirectory(String),
    NotALeaf(String),
    InvalidPath(String),
}

impl fmt::Display for TreeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound(what) => write!(f, "{what} not found"),
            Self::AlreadyExists(what) => write!(f, "{what} already exists"),
            Self::NotADirectory(what) => write!(f, "{what} is not a directory"),
            Self::NotALeaf(what) => write!(f, "{what} is not a resource"),
            Self::InvalidPath(what) => write!(f, "invalid path: {what}"),
        }
    }
}

type TreeResult<T> = Result<T, TreeError>;
type DirMap = HashMap<String, Node>;

enum Node {
    Directory(DirMap),
    Leaf(Arc<Broker>),
}

/// The namespace. Cheap to share via `Arc`; all methods take `&self`
pub struct Namespace {
    root: RwLock<DirMap>,
}

impl Default for Namespace {
    fn default() -> Self {
        Self::new()
    }
}

impl Namespace {
    pub fn new() -> Self {
        Self {
            root: RwLock::new(HashMap::new()),
        }
    }
    /// Create a leaf, creating missing intermediate directories on the way
    pub fn create_leaf(&self, path: &[String], initial: Value) -> TreeResult<Arc<Broker>> {
        let Some((name, parents)) = path.split_last() else {
            return Err(TreeError::InvalidPath("the root cannot be a resource".into()));
        };
        let mut root = self.root.write();
        let parent = descend_mut(&mut root, parents, true)?;
        if parent.contains_key(name) {
            return Err(TreeError::AlreadyExists(format!(
                "'{}' in '{}'",
                name,
                join_path(path)
            )));
        }
        let broker = Broker::new(path.to_vec(), initial);
        parent.insert(name.clone(), Node::Leaf(broker.clone()));
        Ok(broker)
    }
    /// `mkdir -p`, failing only if the full path already names a directory
    /// (or a leaf occupies a name on the way)
    pub fn create_directory(&self, path: &[String]) -> TreeResult<()> {
        let Some((name, parents)) = path.split_last() else {
            return Err(TreeError::AlreadyExists("the root directory".into()));
        };
        let mut root = self.root.write();
        let parent = descend_mut(&mut root, parents, true)?;
        match parent.get(name) {
            Some(_) => Err(TreeError::AlreadyExists(format!(
                "'{}' in '{}'",
                name,
                join_path(path)
            ))),
            None => {
                parent.insert(name.clone(), Node::Directory(HashMap::new()));
                Ok(())
            }
        }
    }
    /// Remove a subtree, closing every leaf in it. Closing happens under the
    /// exclusive lock so no concurrent operation can see a dangling handle
    pub fn delete(&self, path: &[String]) -> TreeResult<()> {
        let Some((name, parents)) = path.split_last() else {
            return Err(TreeError::NotFound("the root cannot be deleted".into()));
        };
        let mut root = self.root.write();
        let parent = descend_mut(&mut root, parents, false)?;
        match parent.remove(name) {
            Some(node) => {
                close_subtree(&node);
                Ok(())
            }
            None => Err(TreeError::NotFound(format!(
                "'{}' in '{}'",
                name,
                join_path(path)
            ))),
        }
    }
    /// A handle to the broker at `path`
    pub fn get_leaf(&self, path: &[String]) -> TreeResult<Arc<Broker>> {
        let Some((name, parents)) = path.split_last() else {
            return Err(TreeError::NotALeaf("the root directory".into()));
        };
        let root = self.root.read();
        let parent = descend_ref(&root, parents)?;
        match parent.get(name) {
            Some(Node::Leaf(broker)) => Ok(broker.clone()),
            Some(Node::Directory(_)) => Err(TreeError::NotALeaf(format!(
                "'{}' in '{}'",
                name,
                join_path(path)
            ))),
            None => Err(TreeError::NotFound(format!(
                "'{}' in '{}'",
                name,
                join_path(path)
            ))),
        }
    }
    /// Immediate children of a directory: resources and subdirectory
    /// placeholders
    pub fn list(&self, path: &[String]) -> TreeResult<Listing> {
        let root = self.root.read();
        let dir = descend_ref(&root, path)?;
        let entries = dir
            .iter()
            .map(|(name, node)| {
                let entry = match node {
                    Node::Leaf(_) => Listing::Resource,
                    Node::Directory(_) => Listing::Directory(HashMap::new()),
                };
                (name.clone(), entry)
            })
            .collect();
        Ok(Listing::Directory(entries))
    }
    /// The full nested listing below a directory
    pub fn list_recursive(&self, path: &[String]) -> TreeResult<Listing> {
        let root = self.root.read();
        let dir = descend_ref(&root, path)?;
        Ok(listing_of(dir))
    }
    /// Depth-first traversal over every leaf below `path`. The visitor
    /// returns `Ok(false)` to stop without error; an `Err` aborts
    pub fn for_each<F>(&self, path: &[String], visitor: &mut F) -> crate::util::PharosResult<()>
    where
        F: FnMut(&[String], &Arc<Broker>) -> crate::util::PharosResult<bool>,
    {
        let root = self.root.read();
        let mut prefix = path.to_vec();
        match path.split_last() {
            None => {
                walk_dir(&root, &mut prefix, visitor)?;
            }
            Some((name, parents)) => {
                let parent = descend_ref(&root, parents)?;
                match parent.get(name) {
                    Some(node) => {
                        walk_node(node, &mut prefix, visitor)?;
                    }
                    None => {
                        return Err(TreeError::NotFound(format!(
                            "'{}' in '{}'",
                            name,
                            join_path(path)
                        ))
                        .into())
                    }
                }
            }
        }
        Ok(())
    }
    /// Human-readable rendering of the subtree at `path`
    pub fn pretty_print(&self, path: &[String]) -> TreeResult<String> {
        let root = self.root.read();
        let dir = descend_ref(&root, path)?;
        let mut out = match path.last() {
            None => "root\n".to_owned(),
            Some(name) => format!("{name}\n"),
        };
        render_dir(dir, &mut Vec::new(), &mut out);
        Ok(out)
    }
    /// Atomically replace this tree's children with another tree's children.
    /// The previous leaves are closed once the new root is in place
    pub fn chroot(&self, other: Namespace) {
        let incoming = other.root.into_inner();
        let outgoing = {
            let mut root = self.root.write();
            std::mem::replace(&mut *root, incoming)
        };
        // the old tree is unreachable from the namespace at this point
        for node in outgoing.values() {
            close_subtree(node);
        }
    }
}

/// Walk down to the directory at `path`, optionally creating missing
/// intermediates. A leaf on the way is a `NotADirectory` error
fn descend_mut<'t>(root: &'t mut DirMap, path: &[String], create: bool) -> TreeResult<&'t mut DirMap> {
    let mut current = root;
    for (idx, component) in path.iter().enumerate() {
        if create && !current.contains_key(component) {
            current.insert(component.clone(), Node::Directory(HashMap::new()));
        }
        current = match current.get_mut(component) {
            Some(Node::Directory(map)) => map,
            Some(Node::Leaf(_)) => {
                return Err(TreeError::NotADirectory(format!(
                    "'{}' in '{}'",
                    component,
                    join_path(&path[..=idx])
                )))
            }
            None => {
                return Err(TreeError::NotFound(format!(
                    "'{}' in '{}'",
                    component,
                    join_path(&path[..=idx])
                )))
            }
        };
    }
    Ok(current)
}

fn descend_ref<'t>(root: &'t DirMap, path: &[String]) -> TreeResult<&'t DirMap> {
    let mut current = root;
    for (idx, component) in path.iter().enumerate() {
        current = match current.get(component) {
            Some(Node::Directory(map)) => map,
            Some(Node::Leaf(_)) => {
                return Err(TreeError::NotADirectory(format!(
                    "'{}' in '{}'",
                    component,
                    join_path(&path[..=idx])
                )))
            }
            None => {
                return Err(TreeError::NotFound(format!(
                    "'{}' in '{}'",
                    component,
                    join_path(&path[..=idx])
                )))
            }
        };
    }
    Ok(current)
}

fn close_subtree(node: &Node) {
    match node {
        Node::Leaf(broker) => broker.close(),
        Node::Directory(entries) => {
            for child in entries.values() {
                close_subtree(child);
            }
        }
    }
}

fn listing_of(dir: &DirMap) -> Listing {
    let entries = dir
        .iter()
        .map(|(name, node)| {
            let entry = match node {
                Node::Leaf(_) => Listing::Resource,
                Node::Directory(map) => listing_of(map),
            };
            (name.clone(), entry)
        })
        .collect();
    Listing::Directory(entries)
}

fn sorted_names(dir: &DirMap) -> Vec<&String> {
    let mut names: Vec<&String> = dir.keys().collect();
    names.sort();
    names
}

fn walk_dir<F>(dir: &DirMap, prefix: &mut Vec<String>, visitor: &mut F) -> crate::util::PharosResult<bool>
where
    F: FnMut(&[String], &Arc<Broker>) -> crate::util::PharosResult<bool>,
{
    for name in sorted_names(dir) {
        prefix.push(name.clone());
        let keep_going = walk_node(&dir[name], prefix, visitor)?;
        prefix.pop();
        if !keep_going {
            return Ok(false);
        }
    }
    Ok(true)
}

fn walk_node<F>(node: &Node, prefix: &mut Vec<String>, visitor: &mut F) -> crate::util::PharosResult<bool>
where
    F: FnMut(&[String], &Arc<Broker>) -> crate::util::PharosResult<bool>,
{
    match node {
        Node::Leaf(broker) => visitor(prefix, broker),
        Node::Directory(entries) => walk_dir(entries, prefix, visitor),
    }
}

fn render_dir(dir: &DirMap, prefix_at_layer: &mut Vec<bool>, out: &mut String) {
    let names = sorted_names(dir);
    let last_idx = names.len().saturating_sub(1);
    for (idx, name) in names.iter().enumerate() {
        for more_siblings in prefix_at_layer.iter() {
            out.push_str(if *more_siblings { "│    " } else { "     " });
        }
        out.push_str(if idx == last_idx { "└── " } else { "├── " });
        match &dir[*name] {
            Node::Leaf(_) => {
                out.push_str(name);
                out.push_str("[r]\n");
            }
            Node::Directory(entries) => {
                out.push_str(name);
                out.push_str("[d]\n");
                prefix_at_layer.push(idx != last_idx);
                render_dir(entries, prefix_at_layer, out);
                prefix_at_layer.pop();
            }
        }
    }
}

impl From<TreeError> for crate::util::Error {
    fn from(terr: TreeError) -> Self {
        Self::OtherError(terr.to_string())
    }
}
