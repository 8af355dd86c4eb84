use crate::error::{Error, Result};
use crate::page::{Page, PAGE_SIZE};
use tracing::error;

/// Maximum children of an internal node, or entries of a leaf. Kept small
/// so test trees grow past a single level with a handful of insertions;
/// see the concrete scenarios in the integration tests.
pub const FANOUT: usize = 6;

/// Sentinel marking "no upper bound": the key of an internal node's
/// rightmost occupied slot, and of every unused slot's on-disk padding.
pub const MAX_KEY: u64 = u64::MAX;

const HEADER_SIZE: usize = 16; // is_leaf:u8 + padding + count:u64
const KEYPAIR_SIZE: usize = 16; // key:u64 + value:u64

const _: () = assert!(HEADER_SIZE + FANOUT * KEYPAIR_SIZE <= PAGE_SIZE);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyPair {
    pub key: u64,
    pub value: u64,
}

/// A B+-tree node decoded into an owned, variable-length form: leaves hold
/// stored entries, internal nodes hold `(separator, child)` pairs with the
/// rightmost pair's key fixed at [`MAX_KEY`]. Algorithms operate on this
/// form with plain `Vec` splicing, the same shape the tree's own reference
/// implementation builds with a temporary vector before writing a new
/// node out; [`BtNode::decode`]/[`BtNode::encode`] are the only places
/// that deal with the fixed-width on-disk array and its sentinel padding.
#[derive(Clone, Debug)]
pub struct BtNode {
    pub is_leaf: bool,
    pub pairs: Vec<KeyPair>,
}

impl BtNode {
    pub fn empty_leaf() -> Self {
        Self {
            is_leaf: true,
            pairs: Vec::new(),
        }
    }

    pub fn empty_internal() -> Self {
        Self {
            is_leaf: false,
            pairs: Vec::new(),
        }
    }

    pub fn count(&self) -> usize {
        self.pairs.len()
    }

    /// `count >= FANOUT/2`, the minimum a non-root node must hold.
    pub fn enough_entries(&self) -> bool {
        self.pairs.len() >= FANOUT / 2
    }

    /// `count >= FANOUT/2 + 1`: one more than the minimum, so lending one
    /// entry to a sibling still leaves this node valid.
    pub fn can_share_entry(&self) -> bool {
        self.pairs.len() >= FANOUT / 2 + 1
    }

    pub fn decode(page: &Page) -> Result<Self> {
        let bytes = page.bytes();
        let is_leaf = bytes[0] != 0;
        let count = u64::from_le_bytes(bytes[8..16].try_into().unwrap()) as usize;
        if count > FANOUT {
            error!(count, FANOUT, "node count exceeds fanout on decode");
            return Err(Error::CorruptNode(format!(
                "node count {} exceeds fanout {}",
                count, FANOUT
            )));
        }
        let mut pairs = Vec::with_capacity(count);
        for i in 0..count {
            let off = HEADER_SIZE + i * KEYPAIR_SIZE;
            let key = u64::from_le_bytes(bytes[off..off + 8].try_into().unwrap());
            let value = u64::from_le_bytes(bytes[off + 8..off + 16].try_into().unwrap());
            pairs.push(KeyPair { key, value });
        }
        Ok(Self { is_leaf, pairs })
    }

    pub fn encode(&self, page: &mut Page) -> Result<()> {
        if self.pairs.len() > FANOUT {
            error!(count = self.pairs.len(), FANOUT, "node count exceeds fanout on encode");
            return Err(Error::CorruptNode(format!(
                "node count {} exceeds fanout {}",
                self.pairs.len(),
                FANOUT
            )));
        }
        let bytes = page.bytes_mut();
        bytes.fill(0);
        bytes[0] = self.is_leaf as u8;
        bytes[8..16].copy_from_slice(&(self.pairs.len() as u64).to_le_bytes());
        for (i, p) in self.pairs.iter().enumerate() {
            let off = HEADER_SIZE + i * KEYPAIR_SIZE;
            bytes[off..off + 8].copy_from_slice(&p.key.to_le_bytes());
            bytes[off + 8..off + 16].copy_from_slice(&p.value.to_le_bytes());
        }
        for i in self.pairs.len()..FANOUT {
            let off = HEADER_SIZE + i * KEYPAIR_SIZE;
            bytes[off..off + 8].copy_from_slice(&MAX_KEY.to_le_bytes());
        }
        Ok(())
    }
}
