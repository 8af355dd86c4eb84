//! Copy-on-write B+-tree: search, insert, and delete over pages addressed
//! by the buffer pool. Every mutation rewrites the path from root to leaf
//! as freshly allocated pages and reports the set of pages the caller can
//! now reclaim; nothing here ever mutates a node already reachable from a
//! committed root in place.

use crate::alloc;
use crate::buf::Handle;
use crate::error::{Error, Result};
use crate::node::{BtNode, KeyPair, FANOUT, MAX_KEY};
use crate::page::BlockId;
use crate::pool::BufferPool;
use std::collections::HashSet;
use tracing::error;

fn load_node(pool: &BufferPool, id: BlockId) -> Result<BtNode> {
    let handle = pool.load(id)?;
    let node = BtNode::decode(&handle.data());
    node
}

pub fn search(pool: &BufferPool, root: BlockId, key: u64) -> Result<Option<BlockId>> {
    let node = load_node(pool, root)?;
    if node.is_leaf {
        Ok(node.pairs.iter().find(|p| p.key == key).map(|p| p.value))
    } else {
        match node.pairs.iter().find(|p| key < p.key) {
            Some(p) => search(pool, p.value, key),
            None => Ok(None),
        }
    }
}

fn find_min(pool: &BufferPool, root: BlockId) -> Result<u64> {
    let node = load_node(pool, root)?;
    if node.is_leaf {
        node.pairs.first().map(|p| p.key).ok_or_else(|| {
            error!(page = root, "leaf has no entries");
            Error::CorruptNode("leaf has no entries".into())
        })
    } else {
        let first = node.pairs.first().ok_or_else(|| {
            error!(page = root, "internal node has no children");
            Error::CorruptNode("internal node has no children".into())
        })?;
        find_min(pool, first.value)
    }
}

#[derive(Default, Debug)]
pub struct InsertResult {
    pub is_split: bool,
    // split case
    pub key: u64,
    pub left: BlockId,
    pub right: BlockId,
    // non-split case
    pub update: BlockId,
    // both cases
    pub did_replace: bool,
    pub replaced: BlockId,
}

/// Inserts `kp` into the subtree rooted at `root`. Adds `root` itself to
/// `freed`, since the caller's whole path down to the leaf is being
/// rewritten regardless of whether this call reports a split.
pub fn insert(
    pool: &BufferPool,
    sb: &Handle,
    freed: &mut HashSet<BlockId>,
    root: BlockId,
    kp: KeyPair,
) -> Result<InsertResult> {
    freed.insert(root);
    let node = load_node(pool, root)?;
    if node.is_leaf {
        insert_leaf(pool, sb, &node, kp)
    } else {
        insert_node(pool, sb, freed, &node, kp)
    }
}

fn insert_leaf(pool: &BufferPool, sb: &Handle, node: &BtNode, kp: KeyPair) -> Result<InsertResult> {
    let mut pairs = node.pairs.clone();
    let mut did_replace = false;
    let mut replaced = 0u64;

    if let Some(existing) = pairs.iter_mut().find(|p| p.key == kp.key) {
        did_replace = existing.value != kp.value;
        replaced = existing.value;
        existing.value = kp.value;
    } else {
        let pos = pairs
            .iter()
            .position(|p| kp.key < p.key)
            .unwrap_or(pairs.len());
        pairs.insert(pos, kp);
    }

    if pairs.len() <= FANOUT {
        let new_leaf = BtNode {
            is_leaf: true,
            pairs,
        };
        let handle = alloc::allocate(pool, sb)?;
        new_leaf.encode(&mut handle.data_mut())?;
        Ok(InsertResult {
            update: handle.id(),
            did_replace,
            replaced,
            ..Default::default()
        })
    } else {
        let m = pairs.len() / 2;
        let promoting = pairs[m].key;
        let left = BtNode {
            is_leaf: true,
            pairs: pairs[..m].to_vec(),
        };
        let right = BtNode {
            is_leaf: true,
            pairs: pairs[m..].to_vec(),
        };
        let lh = alloc::allocate(pool, sb)?;
        left.encode(&mut lh.data_mut())?;
        let rh = alloc::allocate(pool, sb)?;
        right.encode(&mut rh.data_mut())?;
        Ok(InsertResult {
            is_split: true,
            key: promoting,
            left: lh.id(),
            right: rh.id(),
            did_replace,
            replaced,
            ..Default::default()
        })
    }
}

fn insert_node(
    pool: &BufferPool,
    sb: &Handle,
    freed: &mut HashSet<BlockId>,
    node: &BtNode,
    kp: KeyPair,
) -> Result<InsertResult> {
    let i = node
        .pairs
        .iter()
        .position(|p| kp.key < p.key)
        .ok_or_else(|| {
            error!("internal node missing rightmost sentinel");
            Error::CorruptNode("internal node missing rightmost sentinel".into())
        })?;
    let child_id = node.pairs[i].value;
    let child = load_node(pool, child_id)?;

    let result = if child.is_leaf {
        insert_leaf(pool, sb, &child, kp)?
    } else {
        insert_node(pool, sb, freed, &child, kp)?
    };

    if !result.is_split {
        let mut pairs = node.pairs.clone();
        pairs[i].value = result.update;
        let updated = BtNode {
            is_leaf: false,
            pairs,
        };
        let handle = alloc::allocate(pool, sb)?;
        updated.encode(&mut handle.data_mut())?;
        return Ok(InsertResult {
            update: handle.id(),
            did_replace: result.did_replace,
            replaced: result.replaced,
            ..Default::default()
        });
    }

    let mut pairs = node.pairs.clone();
    let original_key = pairs[i].key;
    pairs.splice(
        i..=i,
        [
            KeyPair {
                key: result.key,
                value: result.left,
            },
            KeyPair {
                key: original_key,
                value: result.right,
            },
        ],
    );

    if pairs.len() < FANOUT {
        let updated = BtNode {
            is_leaf: false,
            pairs,
        };
        let handle = alloc::allocate(pool, sb)?;
        updated.encode(&mut handle.data_mut())?;
        Ok(InsertResult {
            update: handle.id(),
            did_replace: result.did_replace,
            replaced: result.replaced,
            ..Default::default()
        })
    } else {
        let m = pairs.len() / 2;
        let promoted = pairs[m].key;
        let mut left_pairs = pairs[..=m].to_vec();
        left_pairs[m].key = MAX_KEY;
        let right_pairs = pairs[m + 1..].to_vec();

        let left = BtNode {
            is_leaf: false,
            pairs: left_pairs,
        };
        let right = BtNode {
            is_leaf: false,
            pairs: right_pairs,
        };
        let lh = alloc::allocate(pool, sb)?;
        left.encode(&mut lh.data_mut())?;
        let rh = alloc::allocate(pool, sb)?;
        right.encode(&mut rh.data_mut())?;
        Ok(InsertResult {
            is_split: true,
            key: promoted,
            left: lh.id(),
            right: rh.id(),
            did_replace: result.did_replace,
            replaced: result.replaced,
            ..Default::default()
        })
    }
}

pub struct DeleteResult {
    pub did_modify: bool,
    pub deleted_value: u64,
    pub new_child: Option<Handle>,
}

impl DeleteResult {
    fn unmodified() -> Self {
        Self {
            did_modify: false,
            deleted_value: 0,
            new_child: None,
        }
    }
}

pub fn delete(
    pool: &BufferPool,
    sb: &Handle,
    freed: &mut HashSet<BlockId>,
    root: BlockId,
    key: u64,
) -> Result<DeleteResult> {
    let node = load_node(pool, root)?;
    let result = if node.is_leaf {
        delete_leaf(pool, sb, &node, key)?
    } else {
        delete_node(pool, sb, freed, &node, key)?
    };
    if result.did_modify {
        freed.insert(root);
    }
    Ok(result)
}

fn delete_leaf(pool: &BufferPool, sb: &Handle, node: &BtNode, key: u64) -> Result<DeleteResult> {
    match node.pairs.iter().position(|p| p.key == key) {
        None => Ok(DeleteResult::unmodified()),
        Some(pos) => {
            let deleted_value = node.pairs[pos].value;
            let mut pairs = node.pairs.clone();
            pairs.remove(pos);
            let new_leaf = BtNode {
                is_leaf: true,
                pairs,
            };
            let handle = alloc::allocate(pool, sb)?;
            new_leaf.encode(&mut handle.data_mut())?;
            Ok(DeleteResult {
                did_modify: true,
                deleted_value,
                new_child: Some(handle),
            })
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn delete_node(
    pool: &BufferPool,
    sb: &Handle,
    freed: &mut HashSet<BlockId>,
    node: &BtNode,
    key: u64,
) -> Result<DeleteResult> {
    let idx = node
        .pairs
        .iter()
        .position(|p| key < p.key)
        .ok_or_else(|| {
            error!("internal node missing rightmost sentinel");
            Error::CorruptNode("internal node missing rightmost sentinel".into())
        })?;
    let child_id = node.pairs[idx].value;
    let child = load_node(pool, child_id)?;

    let child_result = if child.is_leaf {
        delete_leaf(pool, sb, &child, key)?
    } else {
        delete_node(pool, sb, freed, &child, key)?
    };

    if !child_result.did_modify {
        return Ok(DeleteResult::unmodified());
    }
    freed.insert(child_id);

    let new_child_handle = child_result
        .new_child
        .expect("did_modify implies new_child is set");
    let new_child_node = BtNode::decode(&new_child_handle.data())?;

    if new_child_node.enough_entries() {
        let mut pairs = node.pairs.clone();
        pairs[idx].value = new_child_handle.id();
        let updated = BtNode {
            is_leaf: false,
            pairs,
        };
        let handle = alloc::allocate(pool, sb)?;
        updated.encode(&mut handle.data_mut())?;
        return Ok(DeleteResult {
            did_modify: true,
            deleted_value: child_result.deleted_value,
            new_child: Some(handle),
        });
    }

    let left_idx = if idx > 0 { Some(idx - 1) } else { None };
    let right_idx = if idx + 1 < node.pairs.len() {
        Some(idx + 1)
    } else {
        None
    };

    match (left_idx, right_idx) {
        (Some(li), None) => {
            let left_id = node.pairs[li].value;
            let left = load_node(pool, left_id)?;
            if left.can_share_entry() {
                borrow_from_left(
                    pool,
                    sb,
                    node,
                    &left,
                    &new_child_node,
                    li,
                    idx,
                    left_id,
                    new_child_handle.id(),
                    child_result.deleted_value,
                    freed,
                )
            } else {
                merge(
                    pool,
                    sb,
                    node,
                    &left,
                    &new_child_node,
                    li,
                    idx,
                    left_id,
                    new_child_handle.id(),
                    child_result.deleted_value,
                    freed,
                )
            }
        }
        (None, Some(ri)) => {
            let right_id = node.pairs[ri].value;
            let right = load_node(pool, right_id)?;
            if right.can_share_entry() {
                borrow_from_right(
                    pool,
                    sb,
                    node,
                    &new_child_node,
                    &right,
                    idx,
                    ri,
                    new_child_handle.id(),
                    right_id,
                    child_result.deleted_value,
                    freed,
                )
            } else {
                merge(
                    pool,
                    sb,
                    node,
                    &new_child_node,
                    &right,
                    idx,
                    ri,
                    new_child_handle.id(),
                    right_id,
                    child_result.deleted_value,
                    freed,
                )
            }
        }
        (Some(li), Some(ri)) => {
            let left_id = node.pairs[li].value;
            let left = load_node(pool, left_id)?;
            if left.can_share_entry() {
                borrow_from_left(
                    pool,
                    sb,
                    node,
                    &left,
                    &new_child_node,
                    li,
                    idx,
                    left_id,
                    new_child_handle.id(),
                    child_result.deleted_value,
                    freed,
                )
            } else {
                let right_id = node.pairs[ri].value;
                let right = load_node(pool, right_id)?;
                if right.can_share_entry() {
                    borrow_from_right(
                        pool,
                        sb,
                        node,
                        &new_child_node,
                        &right,
                        idx,
                        ri,
                        new_child_handle.id(),
                        right_id,
                        child_result.deleted_value,
                        freed,
                    )
                } else {
                    merge(
                        pool,
                        sb,
                        node,
                        &left,
                        &new_child_node,
                        li,
                        idx,
                        left_id,
                        new_child_handle.id(),
                        child_result.deleted_value,
                        freed,
                    )
                }
            }
        }
        (None, None) => {
            error!("internal node has a single child with no sibling to borrow from or merge with");
            Err(Error::CorruptNode(
                "internal node has a single child with no sibling to borrow from or merge with"
                    .into(),
            ))
        }
    }
}

/// Lends `left`'s last entry to `node` (borrow-from-left). `left_idx` and
/// `node_idx` are the two children's slots in `parent`.
#[allow(clippy::too_many_arguments)]
fn borrow_from_left(
    pool: &BufferPool,
    sb: &Handle,
    parent: &BtNode,
    left: &BtNode,
    node: &BtNode,
    left_idx: usize,
    node_idx: usize,
    left_id: BlockId,
    node_id: BlockId,
    deleted_value: u64,
    freed: &mut HashSet<BlockId>,
) -> Result<DeleteResult> {
    let node_key = parent.pairs[node_idx].key;
    let moved = *left.pairs.last().expect("left can share an entry");

    let mut new_node_pairs = Vec::with_capacity(node.pairs.len() + 1);
    if !node.is_leaf {
        new_node_pairs.push(KeyPair {
            key: node_key,
            value: moved.value,
        });
    } else {
        new_node_pairs.push(moved);
    }
    new_node_pairs.extend(node.pairs.iter().copied());
    let new_node = BtNode {
        is_leaf: node.is_leaf,
        pairs: new_node_pairs,
    };

    let mut new_left_pairs = left.pairs.clone();
    new_left_pairs.pop();
    if !left.is_leaf {
        if let Some(last) = new_left_pairs.last_mut() {
            last.key = MAX_KEY;
        }
    }
    let new_left = BtNode {
        is_leaf: left.is_leaf,
        pairs: new_left_pairs,
    };

    let new_node_handle = alloc::allocate(pool, sb)?;
    new_node.encode(&mut new_node_handle.data_mut())?;
    let new_left_handle = alloc::allocate(pool, sb)?;
    new_left.encode(&mut new_left_handle.data_mut())?;

    let new_separator = find_min(pool, new_node_handle.id())?;

    let mut parent_pairs = parent.pairs.clone();
    parent_pairs[left_idx] = KeyPair {
        key: new_separator,
        value: new_left_handle.id(),
    };
    parent_pairs[node_idx] = KeyPair {
        key: node_key,
        value: new_node_handle.id(),
    };
    let new_parent = BtNode {
        is_leaf: false,
        pairs: parent_pairs,
    };
    let parent_handle = alloc::allocate(pool, sb)?;
    new_parent.encode(&mut parent_handle.data_mut())?;

    freed.insert(left_id);
    freed.insert(node_id);

    Ok(DeleteResult {
        did_modify: true,
        deleted_value,
        new_child: Some(parent_handle),
    })
}

/// Lends `right`'s first entry to `node` (borrow-from-right). `node_idx`
/// and `right_idx` are the two children's slots in `parent`.
#[allow(clippy::too_many_arguments)]
fn borrow_from_right(
    pool: &BufferPool,
    sb: &Handle,
    parent: &BtNode,
    node: &BtNode,
    right: &BtNode,
    node_idx: usize,
    right_idx: usize,
    node_id: BlockId,
    right_id: BlockId,
    deleted_value: u64,
    freed: &mut HashSet<BlockId>,
) -> Result<DeleteResult> {
    let node_key = parent.pairs[node_idx].key;
    let moved = right.pairs[0];

    let mut new_node_pairs = node.pairs.clone();
    if !node.is_leaf {
        if let Some(last) = new_node_pairs.last_mut() {
            last.key = node_key;
        }
        new_node_pairs.push(KeyPair {
            key: MAX_KEY,
            value: moved.value,
        });
    } else {
        new_node_pairs.push(moved);
    }
    let new_node = BtNode {
        is_leaf: node.is_leaf,
        pairs: new_node_pairs,
    };

    let mut new_right_pairs = right.pairs.clone();
    new_right_pairs.remove(0);
    let new_right = BtNode {
        is_leaf: right.is_leaf,
        pairs: new_right_pairs,
    };

    let new_node_handle = alloc::allocate(pool, sb)?;
    new_node.encode(&mut new_node_handle.data_mut())?;
    let new_right_handle = alloc::allocate(pool, sb)?;
    new_right.encode(&mut new_right_handle.data_mut())?;

    let new_separator = find_min(pool, new_right_handle.id())?;

    let mut parent_pairs = parent.pairs.clone();
    parent_pairs[node_idx] = KeyPair {
        key: new_separator,
        value: new_node_handle.id(),
    };
    parent_pairs[right_idx] = KeyPair {
        key: parent.pairs[right_idx].key,
        value: new_right_handle.id(),
    };
    let new_parent = BtNode {
        is_leaf: false,
        pairs: parent_pairs,
    };
    let parent_handle = alloc::allocate(pool, sb)?;
    new_parent.encode(&mut parent_handle.data_mut())?;

    freed.insert(node_id);
    freed.insert(right_id);

    Ok(DeleteResult {
        did_modify: true,
        deleted_value,
        new_child: Some(parent_handle),
    })
}

/// Merges `left` and `right` into one node, dropping `right`'s slot from
/// `parent` and repointing `left`'s slot at the merged node.
#[allow(clippy::too_many_arguments)]
fn merge(
    pool: &BufferPool,
    sb: &Handle,
    parent: &BtNode,
    left: &BtNode,
    right: &BtNode,
    left_idx: usize,
    right_idx: usize,
    left_id: BlockId,
    right_id: BlockId,
    deleted_value: u64,
    freed: &mut HashSet<BlockId>,
) -> Result<DeleteResult> {
    let left_key = parent.pairs[left_idx].key;
    let right_key = parent.pairs[right_idx].key;

    let mut merged_pairs = left.pairs.clone();
    if !left.is_leaf {
        if let Some(last) = merged_pairs.last_mut() {
            last.key = left_key;
        }
    }
    merged_pairs.extend(right.pairs.iter().copied());
    let merged = BtNode {
        is_leaf: left.is_leaf,
        pairs: merged_pairs,
    };
    let merged_handle = alloc::allocate(pool, sb)?;
    merged.encode(&mut merged_handle.data_mut())?;

    let mut parent_pairs = Vec::with_capacity(parent.pairs.len() - 1);
    for (i, p) in parent.pairs.iter().enumerate() {
        if i == right_idx {
            continue;
        }
        if i == left_idx {
            parent_pairs.push(KeyPair {
                key: right_key,
                value: merged_handle.id(),
            });
        } else {
            parent_pairs.push(*p);
        }
    }
    let new_parent = BtNode {
        is_leaf: false,
        pairs: parent_pairs,
    };
    let parent_handle = alloc::allocate(pool, sb)?;
    new_parent.encode(&mut parent_handle.data_mut())?;

    freed.insert(left_id);
    freed.insert(right_id);

    Ok(DeleteResult {
        did_modify: true,
        deleted_value,
        new_child: Some(parent_handle),
    })
}
