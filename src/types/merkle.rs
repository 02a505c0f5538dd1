use alloy::primitives::{keccak256, B256};

/// Merkle root over an ordered list of transfer ids, as the bridge contracts
/// compute it.
///
/// Leaves are hashed pairwise with keccak-256. An odd node at depth `d` is
/// paired with the default hash for that depth: `keccak256(0x00 * 32)` at the
/// leaves, then the hash of the previous default with itself. A single leaf is
/// its own root and an empty batch has the zero root.
pub fn merkle_root(leaves: &[B256]) -> B256 {
    if leaves.is_empty() {
        return B256::ZERO;
    }

    let mut level = leaves.to_vec();
    let mut default = keccak256([0u8; 32]);

    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| {
                let left = pair[0];
                let right = pair.get(1).copied().unwrap_or(default);
                hash_pair(left, right)
            })
            .collect();
        default = hash_pair(default, default);
    }

    level[0]
}

fn hash_pair(left: B256, right: B256) -> B256 {
    let mut buf = [0u8; 64];
    buf[..32].copy_from_slice(left.as_slice());
    buf[32..].copy_from_slice(right.as_slice());
    keccak256(buf)
}
