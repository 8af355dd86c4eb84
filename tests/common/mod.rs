//! Shared helpers for the property-style integration tests: a small
//! deterministic PRNG (no external `rand`/`proptest` dependency) and the
//! tree-walking checks behind SPEC_FULL §8's universal invariants.

#![allow(dead_code)]

use dc::index::IndexFile;
use dc::node::{BtNode, FANOUT};
use dc::page::BlockId;
use std::collections::HashSet;

pub const FANOUT_U64: u64 = FANOUT as u64;

/// xorshift64* — deterministic and dependency-free, good enough to vary
/// key multisets across property-test trials.
pub struct Rng(u64);

impl Rng {
    pub fn new(seed: u64) -> Self {
        Rng(seed | 1)
    }

    pub fn next_u64(&mut self) -> u64 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 7;
        x ^= x << 17;
        self.0 = x;
        x.wrapping_mul(0x2545_F491_4F6C_DD1D)
    }

    pub fn below(&mut self, bound: u64) -> u64 {
        if bound == 0 {
            0
        } else {
            self.next_u64() % bound
        }
    }
}

/// A random multiset of keys drawn from `0..universe`, sized in
/// `0..10*FANOUT` per SPEC_FULL §8.
pub fn random_key_multiset(rng: &mut Rng, universe: u64) -> Vec<u64> {
    let len = rng.below(10 * FANOUT_U64);
    (0..len).map(|_| rng.below(universe)).collect()
}

/// Result of walking every page reachable from a tree root.
pub struct TreeShape {
    pub pages: HashSet<BlockId>,
    pub leaf_depths: Vec<usize>,
    pub keys_in_order: Vec<u64>,
}

/// Walks the tree from `root`, asserting invariant 4 (structural
/// invariants) along the way: bounded fanout, ascending keys within a
/// node, and every page visited exactly once (a cycle or shared child
/// would otherwise go unnoticed).
pub fn walk_tree(index: &IndexFile, root: BlockId) -> TreeShape {
    let mut shape = TreeShape {
        pages: HashSet::new(),
        leaf_depths: Vec::new(),
        keys_in_order: Vec::new(),
    };
    walk(index, root, 0, true, &mut shape);
    shape
}

fn walk(index: &IndexFile, id: BlockId, depth: usize, is_root: bool, shape: &mut TreeShape) {
    assert!(
        shape.pages.insert(id),
        "page {} reachable via more than one path",
        id
    );
    let handle = index.load_page(id).expect("reachable page must load");
    let node = BtNode::decode(&handle.data()).expect("reachable page must decode");

    assert!(
        node.count() <= FANOUT,
        "node {} has {} entries, exceeds FANOUT {}",
        id,
        node.count(),
        FANOUT
    );
    if !is_root {
        assert!(
            node.enough_entries(),
            "non-root node {} has only {} entries, below FANOUT/2",
            id,
            node.count()
        );
    }
    for w in node.pairs.windows(2) {
        assert!(
            w[0].key < w[1].key,
            "keys not strictly ascending in node {}: {} >= {}",
            id,
            w[0].key,
            w[1].key
        );
    }

    if node.is_leaf {
        shape.leaf_depths.push(depth);
        shape.keys_in_order.extend(node.pairs.iter().map(|p| p.key));
    } else {
        for p in &node.pairs {
            walk(index, p.value, depth + 1, false, shape);
        }
    }
}

/// Walks the on-disk free-list stack starting at `next_free` (0 means
/// empty, since page 0 is the superblock and never appears on the list).
pub fn walk_free_list(index: &IndexFile, mut next_free: BlockId) -> HashSet<BlockId> {
    let mut pages = HashSet::new();
    while next_free != 0 {
        assert!(
            pages.insert(next_free),
            "cycle in free list at page {}",
            next_free
        );
        let handle = index.load_page(next_free).expect("free-list page must load");
        let data = handle.data();
        next_free = u64::from_le_bytes(data.bytes()[0..8].try_into().unwrap());
    }
    pages
}

/// Invariant 4 (every leaf at the same depth) plus invariant 5 (no page
/// leaks): every page strictly between the superblock and
/// `highest_unallocated` is reachable from the tree root or on the free
/// list, never both, never neither.
pub fn assert_no_leaks_and_balanced(index: &IndexFile) {
    let sb = index.superblock_snapshot().unwrap();
    let shape = walk_tree(index, sb.tree_root);

    if let Some(&first) = shape.leaf_depths.first() {
        assert!(
            shape.leaf_depths.iter().all(|&d| d == first),
            "leaves at mismatched depths: {:?}",
            shape.leaf_depths
        );
    }

    let free = walk_free_list(index, sb.next_free);

    let overlap: Vec<_> = shape.pages.intersection(&free).collect();
    assert!(
        overlap.is_empty(),
        "pages both reachable and free-listed: {:?}",
        overlap
    );

    let mut expected = HashSet::new();
    let mut p = dc::page::PAGE_SIZE as BlockId;
    while p < sb.highest_unallocated {
        expected.insert(p);
        p += dc::page::PAGE_SIZE as BlockId;
    }

    let mut accounted: HashSet<BlockId> = shape.pages.clone();
    accounted.extend(&free);
    assert_eq!(
        accounted, expected,
        "page space below highest_unallocated is not exactly partitioned \
         into {{reachable}} ∪ {{free list}}"
    );
}

/// Invariant 4's "no duplicate keys" clause, plus an expected-multiset
/// comparison a caller assembles from its own insert/delete bookkeeping.
pub fn assert_distinct_and_matches(index: &IndexFile, mut expected: Vec<u64>) {
    let sb = index.superblock_snapshot().unwrap();
    let mut actual = walk_tree(index, sb.tree_root).keys_in_order;
    actual.sort_unstable();
    for w in actual.windows(2) {
        assert_ne!(w[0], w[1], "duplicate key {} reachable from tree root", w[0]);
    }
    expected.sort_unstable();
    expected.dedup();
    assert_eq!(actual, expected, "reachable key set does not match expectation");
}
