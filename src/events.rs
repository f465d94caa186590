use alloy::sol;
use alloy_primitives::{B256, keccak256};

sol! {
    event Issue(uint256 amount);
}

/// Topic-0 filter value for an event, computed from its canonical signature
/// (e.g. `Issue(uint256)`).
pub fn event_signature_hash(signature: &str) -> B256 {
    keccak256(signature.trim().as_bytes())
}
