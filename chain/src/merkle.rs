//! Merkle tree over transaction ids.
//!
//! The tree powers the `tx_root` header field and SPV-style inclusion
//! proofs. Leaves are hex transaction ids; a parent is
//! `hash_object(left ‖ right)`; a level with an odd node count
//! duplicates its last element. The root of an empty set is the fixed
//! hash of `"EMPTY_BLOCK"`.

use serde::{Deserialize, Serialize};

use crate::crypto::hash_object;

/// Side on which a proof sibling sits relative to the running hash.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Position {
    Left,
    Right,
}

/// One step of an inclusion proof: the sibling hash and its side.
pub type ProofStep = (String, Position);

/// Root of an empty transaction set.
pub fn empty_block_root() -> String {
    hash_object(&"EMPTY_BLOCK")
}

/// Computes the merkle root of an ordered list of transaction ids.
pub fn compute_tx_root(tx_ids: &[String]) -> String {
    if tx_ids.is_empty() {
        return empty_block_root();
    }
    let mut level: Vec<String> = tx_ids.to_vec();
    while level.len() > 1 {
        if level.len() % 2 == 1 {
            level.push(level.last().expect("level is non-empty").clone());
        }
        level = level
            .chunks(2)
            .map(|pair| hash_object(&format!("{}{}", pair[0], pair[1])))
            .collect();
    }
    level.into_iter().next().expect("reduction leaves one root")
}

/// Merkle tree retaining every level, for proof generation.
#[derive(Clone, Debug)]
pub struct MerkleTree {
    leaves: Vec<String>,
    /// Levels from the leaves upward, each stored before padding.
    levels: Vec<Vec<String>>,
    root: String,
}

impl MerkleTree {
    /// Builds a tree from ordered leaf hashes.
    pub fn new(leaves: Vec<String>) -> Self {
        if leaves.is_empty() {
            return Self {
                leaves,
                levels: Vec::new(),
                root: empty_block_root(),
            };
        }

        let mut levels = Vec::new();
        let mut current = leaves.clone();
        while current.len() > 1 {
            levels.push(current.clone());
            if current.len() % 2 == 1 {
                current.push(current.last().expect("level is non-empty").clone());
            }
            current = current
                .chunks(2)
                .map(|pair| hash_object(&format!("{}{}", pair[0], pair[1])))
                .collect();
        }

        let root = current.into_iter().next().expect("one root remains");
        Self {
            leaves,
            levels,
            root,
        }
    }

    /// The tree root.
    pub fn root(&self) -> &str {
        &self.root
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        self.leaves.len()
    }

    /// True when the tree was built over no leaves.
    pub fn is_empty(&self) -> bool {
        self.leaves.is_empty()
    }

    /// Builds the inclusion proof for the leaf at `index`.
    ///
    /// Returns `None` when the index is out of range. When a level has an
    /// odd node count the duplicated last element serves as its own
    /// sibling.
    pub fn get_proof(&self, index: usize) -> Option<Vec<ProofStep>> {
        if index >= self.leaves.len() {
            return None;
        }

        let mut proof = Vec::new();
        let mut current_index = index;

        for level in &self.levels {
            let (sibling_index, position) = if current_index % 2 == 0 {
                (current_index + 1, Position::Right)
            } else {
                (current_index - 1, Position::Left)
            };

            let sibling = if sibling_index < level.len() {
                level[sibling_index].clone()
            } else {
                // Odd level: the last node was duplicated.
                level[current_index].clone()
            };
            proof.push((sibling, position));

            current_index /= 2;
        }

        Some(proof)
    }

    /// Verifies an inclusion proof bottom-up against an expected root.
    pub fn verify_proof(leaf: &str, proof: &[ProofStep], root: &str) -> bool {
        let mut current = leaf.to_string();
        for (sibling, position) in proof {
            current = match position {
                Position::Left => hash_object(&format!("{sibling}{current}")),
                Position::Right => hash_object(&format!("{current}{sibling}")),
            };
        }
        current == root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaves(n: usize) -> Vec<String> {
        (0..n).map(|i| hash_object(&format!("tx{i}"))).collect()
    }

    #[test]
    fn empty_root_is_fixed() {
        assert_eq!(compute_tx_root(&[]), empty_block_root());
        assert_eq!(MerkleTree::new(Vec::new()).root(), empty_block_root());
    }

    #[test]
    fn single_leaf_is_its_own_root() {
        let l = leaves(1);
        assert_eq!(compute_tx_root(&l), l[0]);
    }

    #[test]
    fn tree_and_static_root_agree() {
        for n in 1..=9 {
            let l = leaves(n);
            assert_eq!(MerkleTree::new(l.clone()).root(), compute_tx_root(&l));
        }
    }

    #[test]
    fn odd_count_duplicates_last_leaf() {
        let three = leaves(3);
        let mut four = three.clone();
        four.push(three[2].clone());
        assert_eq!(compute_tx_root(&three), compute_tx_root(&four));
    }

    #[test]
    fn proofs_verify_for_every_leaf() {
        for n in 1..=8 {
            let l = leaves(n);
            let tree = MerkleTree::new(l.clone());
            for (i, leaf) in l.iter().enumerate() {
                let proof = tree.get_proof(i).expect("index in range");
                assert!(
                    MerkleTree::verify_proof(leaf, &proof, tree.root()),
                    "proof failed for leaf {i} of {n}"
                );
            }
        }
    }

    #[test]
    fn proof_fails_for_wrong_leaf_or_root() {
        let l = leaves(4);
        let tree = MerkleTree::new(l.clone());
        let proof = tree.get_proof(1).unwrap();

        assert!(!MerkleTree::verify_proof(&l[2], &proof, tree.root()));
        assert!(!MerkleTree::verify_proof(&l[1], &proof, &hash_object(&"other")));
    }

    #[test]
    fn out_of_range_proof_is_none() {
        let tree = MerkleTree::new(leaves(2));
        assert!(tree.get_proof(2).is_none());
    }
}
