//! ERC-20 call payloads

use alloy::primitives::{Address, Bytes, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

sol! {
    function transfer(address to, uint256 amount) external returns (bool);
}

/// ABI-encoded `transfer(to, amount)` call data
pub fn transfer_payload(to: Address, amount: U256) -> Bytes {
    transferCall { to, amount }.abi_encode().into()
}
