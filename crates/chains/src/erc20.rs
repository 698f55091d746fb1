//! ERC-20 call encoding and EIP-712 domain hashing

use cosmwasm_std::Uint256;
use sha3::{Digest, Keccak256};

use xroute_types::ChainId;

use crate::ChainError;

/// `approve(address,uint256)`
pub const APPROVE_SELECTOR: [u8; 4] = [0x09, 0x5e, 0xa7, 0xb3];

const DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,uint256 chainId,address verifyingContract)";
const SALTED_DOMAIN_TYPE: &str =
    "EIP712Domain(string name,string version,address verifyingContract,bytes32 salt)";

pub fn keccak256(bytes: &[u8]) -> [u8; 32] {
    let mut hasher = Keccak256::new();
    hasher.update(bytes);
    hasher.finalize().into()
}

fn address_word(address: &str) -> Result<[u8; 32], ChainError> {
    let raw = hex::decode(address.trim_start_matches("0x"))
        .map_err(|e| ChainError::InvalidResponse(format!("bad address {}: {}", address, e)))?;
    if raw.len() != 20 {
        return Err(ChainError::InvalidResponse(format!("bad address {}", address)));
    }
    let mut word = [0u8; 32];
    word[12..].copy_from_slice(&raw);
    Ok(word)
}

/// Calldata for `approve(spender, amount)` as 0x-prefixed hex
pub fn encode_approve(spender: &str, amount: Uint256) -> Result<String, ChainError> {
    let mut data = Vec::with_capacity(68);
    data.extend_from_slice(&APPROVE_SELECTOR);
    data.extend_from_slice(&address_word(spender)?);
    data.extend_from_slice(&amount.to_be_bytes());
    Ok(format!("0x{}", hex::encode(data)))
}

/// Inverse of [`encode_approve`]
pub fn decode_approve(data: &str) -> Option<(String, Uint256)> {
    let raw = hex::decode(data.trim_start_matches("0x")).ok()?;
    if raw.len() != 68 || raw[..4] != APPROVE_SELECTOR {
        return None;
    }
    let spender = format!("0x{}", hex::encode(&raw[16..36]));
    let mut amount = [0u8; 32];
    amount.copy_from_slice(&raw[36..68]);
    Some((spender, Uint256::from_be_bytes(amount)))
}

/// EIP-712 domain separator of a permit token.
///
/// Tokens either use the standard `chainId` domain or carry the chain id as a
/// `bytes32 salt` after `verifyingContract`.
pub fn domain_separator(
    name: &str,
    version: &str,
    chain_id: ChainId,
    verifying_contract: &str,
    salted: bool,
) -> Result<[u8; 32], ChainError> {
    let chain_word = Uint256::from(chain_id).to_be_bytes();
    let contract_word = address_word(verifying_contract)?;

    let mut encoded = Vec::with_capacity(160);
    if salted {
        encoded.extend_from_slice(&keccak256(SALTED_DOMAIN_TYPE.as_bytes()));
        encoded.extend_from_slice(&keccak256(name.as_bytes()));
        encoded.extend_from_slice(&keccak256(version.as_bytes()));
        encoded.extend_from_slice(&contract_word);
        encoded.extend_from_slice(&chain_word);
    } else {
        encoded.extend_from_slice(&keccak256(DOMAIN_TYPE.as_bytes()));
        encoded.extend_from_slice(&keccak256(name.as_bytes()));
        encoded.extend_from_slice(&keccak256(version.as_bytes()));
        encoded.extend_from_slice(&chain_word);
        encoded.extend_from_slice(&contract_word);
    }
    Ok(keccak256(&encoded))
}

#[cfg(test)]
mod tests {
    use super::*;

    const SPENDER: &str = "0x1231deb6f5749ef6ce6943a275a1d3e7486f4eae";

    #[test]
    fn test_approve_selector_matches_signature() {
        assert_eq!(keccak256(b"approve(address,uint256)")[..4], APPROVE_SELECTOR);
    }

    #[test]
    fn test_encode_approve_layout() {
        let data = encode_approve(SPENDER, Uint256::from(100u128)).unwrap();
        assert!(data.starts_with("0x095ea7b3000000000000000000000000"));
        assert!(data.ends_with("64"));
        assert_eq!(data.len(), 2 + 68 * 2);

        let (spender, amount) = decode_approve(&data).unwrap();
        assert_eq!(spender, SPENDER);
        assert_eq!(amount, Uint256::from(100u128));
    }

    #[test]
    fn test_encode_approve_rejects_bad_spender() {
        assert!(encode_approve("0x1234", Uint256::one()).is_err());
        assert!(decode_approve("0xdeadbeef").is_none());
    }

    #[test]
    fn test_domain_variants_differ() {
        let plain = domain_separator("USD Coin", "2", 137, SPENDER, false).unwrap();
        let salted = domain_separator("USD Coin", "2", 137, SPENDER, true).unwrap();
        assert_ne!(plain, salted);
        assert_eq!(plain, domain_separator("USD Coin", "2", 137, SPENDER, false).unwrap());
    }
}
