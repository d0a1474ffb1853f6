use crate::blockchain::core::chain::Block;
use crate::error::ChainError;

/// Checks that `candidate` is correctly sealed and directly extends `predecessor`.
pub fn validate_successor(candidate: &Block, predecessor: &Block) -> Result<(), ChainError> {
    let expected_hash = candidate.calculate_hash();
    if candidate.hash != expected_hash {
        return Err(ChainError::InvalidBlock(format!(
            "Hash mismatch at index {}. Expected {}, but got {}.",
            candidate.index, expected_hash, candidate.hash
        )));
    }

    if predecessor.index.checked_add(1) != Some(candidate.index) {
        return Err(ChainError::InvalidBlock(format!(
            "Invalid block index. Expected successor of {}, but got {}.",
            predecessor.index, candidate.index
        )));
    }

    if predecessor.hash != candidate.previous_hash {
        return Err(ChainError::InvalidBlock(format!(
            "Invalid previous block hash. Expected {}, but got {}.",
            predecessor.hash, candidate.previous_hash
        )));
    }

    Ok(())
}

pub fn is_valid_successor(candidate: &Block, predecessor: &Block) -> bool {
    validate_successor(candidate, predecessor).is_ok()
}

/// Whole-chain check: genesis must match bit for bit and every adjacent pair
/// must link. A single bad block rejects the entire chain.
pub fn validate_chain(chain: &[Block]) -> Result<(), ChainError> {
    let first = chain
        .first()
        .ok_or_else(|| ChainError::InvalidChain("Chain is empty.".to_string()))?;

    if !first.is_genesis() {
        return Err(ChainError::InvalidChain(format!(
            "Chain does not start at the genesis block: {}",
            first
        )));
    }

    for pair in chain.windows(2) {
        validate_successor(&pair[1], &pair[0])
            .map_err(|e| ChainError::InvalidChain(e.to_string()))?;
    }

    Ok(())
}

pub fn is_valid_chain(chain: &[Block]) -> bool {
    validate_chain(chain).is_ok()
}
