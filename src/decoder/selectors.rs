use std::collections::HashMap;

use alloy_primitives::{keccak256, FixedBytes};
use once_cell::sync::Lazy;

// Selectors common enough to name without any lookup. Consulted only after
// the contract ABI and the signature service.
const COMMON_SIGNATURES: [&str; 24] = [
    "transfer(address,uint256)",
    "transferFrom(address,address,uint256)",
    "approve(address,uint256)",
    "balanceOf(address)",
    "allowance(address,address)",
    "totalSupply()",
    "decimals()",
    "deposit()",
    "withdraw(uint256)",
    "permit(address,address,uint256,uint256,uint8,bytes32,bytes32)",
    "mint(address,uint256)",
    "burn(uint256)",
    "safeTransferFrom(address,address,uint256)",
    "safeTransferFrom(address,address,uint256,uint256,bytes)",
    "setApprovalForAll(address,bool)",
    "multicall(bytes[])",
    "multicall(uint256,bytes[])",
    "execute(bytes,bytes[],uint256)",
    "swapExactTokensForTokens(uint256,uint256,address[],address,uint256)",
    "swapExactETHForTokens(uint256,address[],address,uint256)",
    "swapExactTokensForETH(uint256,uint256,address[],address,uint256)",
    "swap(uint256,uint256,address,bytes)",
    "addLiquidity(address,address,uint256,uint256,uint256,uint256,address,uint256)",
    "addLiquidityETH(address,uint256,uint256,uint256,address,uint256)",
];

static BUILTIN_SELECTORS: Lazy<HashMap<FixedBytes<4>, &'static str>> = Lazy::new(|| {
    COMMON_SIGNATURES
        .iter()
        .map(|signature| {
            let digest = keccak256(signature.as_bytes());
            (FixedBytes::from_slice(&digest[..4]), *signature)
        })
        .collect()
});

pub fn builtin_signature(selector: &FixedBytes<4>) -> Option<&'static str> {
    BUILTIN_SELECTORS.get(selector).copied()
}

/// Signatures whose arguments are worth decoding positionally when no ABI is known.
pub fn is_allow_listed(signature: &str) -> bool {
    matches!(
        signature,
        "transfer(address,uint256)"
            | "transferFrom(address,address,uint256)"
            | "approve(address,uint256)"
    ) || signature.contains("swap")
        || signature.contains("addLiquidity")
}

/// Conventional argument names for the ERC-20 entry points.
pub fn argument_names(signature: &str) -> Option<&'static [&'static str]> {
    match signature {
        "transfer(address,uint256)" => Some(&["to", "amount"]),
        "transferFrom(address,address,uint256)" => Some(&["from", "to", "amount"]),
        "approve(address,uint256)" => Some(&["spender", "amount"]),
        _ => None,
    }
}
