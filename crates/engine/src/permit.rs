//! EIP-2612 native permits

use cosmwasm_std::Uint256;
use serde_json::{json, Value};

use xroute_chains::erc20::domain_separator;
use xroute_chains::{ChainError, PermitInfo};
use xroute_types::{ChainId, TypedData, TypedDataDomain};

pub const PERMIT_PRIMARY_TYPE: &str = "Permit";

/// Find the domain whose separator matches the token's on-chain
/// `DOMAIN_SEPARATOR()`, trying the standard and the salted encoding.
pub fn detect_domain(
    info: &PermitInfo,
    chain_id: ChainId,
    token: &str,
) -> Result<Option<TypedDataDomain>, ChainError> {
    let version = info.version.clone().unwrap_or_else(|| "1".to_string());
    let expected = info.domain_separator.trim_start_matches("0x").to_ascii_lowercase();

    for salted in [false, true] {
        let separator = domain_separator(&info.name, &version, chain_id, token, salted)?;
        if hex::encode(separator) != expected {
            continue;
        }

        let domain = if salted {
            TypedDataDomain {
                name: Some(info.name.clone()),
                version: Some(version),
                chain_id: None,
                verifying_contract: Some(token.to_string()),
                salt: Some(format!(
                    "0x{}",
                    hex::encode(Uint256::from(chain_id).to_be_bytes())
                )),
            }
        } else {
            TypedDataDomain {
                name: Some(info.name.clone()),
                version: Some(version),
                chain_id: Some(chain_id),
                verifying_contract: Some(token.to_string()),
                salt: None,
            }
        };
        return Ok(Some(domain));
    }
    Ok(None)
}

fn domain_fields(domain: &TypedDataDomain) -> Value {
    let mut fields = vec![
        json!({ "name": "name", "type": "string" }),
        json!({ "name": "version", "type": "string" }),
    ];
    if domain.chain_id.is_some() {
        fields.push(json!({ "name": "chainId", "type": "uint256" }));
    }
    fields.push(json!({ "name": "verifyingContract", "type": "address" }));
    if domain.salt.is_some() {
        fields.push(json!({ "name": "salt", "type": "bytes32" }));
    }
    Value::Array(fields)
}

/// `Permit(owner, spender, value, nonce, deadline)` typed data
pub fn build_native_permit(
    domain: TypedDataDomain,
    owner: &str,
    spender: &str,
    value: Uint256,
    nonce: Uint256,
    deadline: u64,
) -> TypedData {
    TypedData {
        primary_type: PERMIT_PRIMARY_TYPE.to_string(),
        types: json!({
            "EIP712Domain": domain_fields(&domain),
            "Permit": [
                { "name": "owner", "type": "address" },
                { "name": "spender", "type": "address" },
                { "name": "value", "type": "uint256" },
                { "name": "nonce", "type": "uint256" },
                { "name": "deadline", "type": "uint256" },
            ],
        }),
        message: json!({
            "owner": owner,
            "spender": spender,
            "value": value.to_string(),
            "nonce": nonce.to_string(),
            "deadline": deadline.to_string(),
        }),
        domain,
    }
}
