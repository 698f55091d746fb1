use serde::{Deserialize, Serialize};

/// Numeric chain identifier as used by the quote service.
pub type ChainId = u64;

/// Address the quote service uses for the native coin of account-based chains.
pub const EVM_NATIVE_ADDRESS: &str = "0x0000000000000000000000000000000000000000";

/// Alternative native sentinel some EVM aggregators emit.
pub const EVM_NATIVE_ALIAS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// Native coin placeholder for UTXO chains.
pub const UTXO_NATIVE_ADDRESS: &str = "bitcoin";

/// System program id standing in for SOL.
pub const SVM_NATIVE_ADDRESS: &str = "11111111111111111111111111111111";

/// Chain families the engine knows how to drive
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum ChainType {
    /// Account-based chains speaking the Ethereum JSON-RPC
    Evm,

    /// Bitcoin-style chains
    Utxo,

    /// Solana-style chains
    Svm,
}

impl std::fmt::Display for ChainType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ChainType::Evm => "evm",
            ChainType::Utxo => "utxo",
            ChainType::Svm => "svm",
        };
        f.write_str(name)
    }
}

/// Token specification
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Token {
    /// Contract address, mint, or native placeholder
    pub address: String,

    /// Chain the token lives on
    pub chain_id: ChainId,

    pub symbol: String,

    pub decimals: u8,

    #[serde(default)]
    pub name: Option<String>,

    /// USD price at quote time, informational only
    #[serde(default)]
    pub price_usd: Option<String>,
}

impl Token {
    pub fn new(
        chain_id: ChainId,
        address: impl Into<String>,
        symbol: impl Into<String>,
        decimals: u8,
    ) -> Self {
        Self {
            address: address.into(),
            chain_id,
            symbol: symbol.into(),
            decimals,
            name: None,
            price_usd: None,
        }
    }

    /// Native coins need neither allowance nor permit.
    pub fn is_native(&self) -> bool {
        let address = self.address.to_ascii_lowercase();
        address.is_empty()
            || address == EVM_NATIVE_ADDRESS
            || address == EVM_NATIVE_ALIAS
            || address == UTXO_NATIVE_ADDRESS
            || self.address == SVM_NATIVE_ADDRESS
    }

    /// Address comparison is case-insensitive only for hex addresses.
    pub fn same_address(&self, other: &str) -> bool {
        same_address(&self.address, other)
    }
}

/// Compare two addresses, ignoring case for `0x` hex addresses
pub fn same_address(a: &str, b: &str) -> bool {
    if a.starts_with("0x") && b.starts_with("0x") {
        a.eq_ignore_ascii_case(b)
    } else {
        a == b
    }
}
