use xroute_types::ChainType;

const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BECH32_PREFIXES: [&str; 3] = ["bc1", "tb1", "bcrt1"];

/// `0x` followed by 40 hex digits
pub fn is_evm_address(address: &str) -> bool {
    match address.strip_prefix("0x") {
        Some(body) => body.len() == 40 && body.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Segwit bech32 or legacy base58 P2PKH/P2SH address
pub fn is_utxo_address(address: &str) -> bool {
    is_bech32_address(address) || is_legacy_address(address)
}

/// Base58 encoded 32-byte public key
pub fn is_svm_address(address: &str) -> bool {
    if is_evm_address(address) {
        return false;
    }
    matches!(bs58::decode(address).into_vec(), Ok(bytes) if bytes.len() == 32)
}

/// Chain family an address belongs to
pub fn classify_address(address: &str) -> Option<ChainType> {
    if is_evm_address(address) {
        Some(ChainType::Evm)
    } else if is_utxo_address(address) {
        Some(ChainType::Utxo)
    } else if is_svm_address(address) {
        Some(ChainType::Svm)
    } else {
        None
    }
}

fn is_bech32_address(address: &str) -> bool {
    // Mixed case is invalid bech32
    let lower = address.to_ascii_lowercase();
    if address != lower && address != address.to_ascii_uppercase() {
        return false;
    }

    BECH32_PREFIXES.iter().any(|prefix| {
        lower
            .strip_prefix(prefix)
            .map(|data| {
                (11..=87).contains(&data.len()) && data.chars().all(|c| BECH32_CHARSET.contains(c))
            })
            .unwrap_or(false)
    })
}

fn is_legacy_address(address: &str) -> bool {
    match bs58::decode(address).into_vec() {
        // version byte, 20-byte hash, 4-byte checksum
        Ok(bytes) if bytes.len() == 25 => matches!(bytes[0], 0x00 | 0x05 | 0x6f | 0xc4),
        _ => false,
    }
}
