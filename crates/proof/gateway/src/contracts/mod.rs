//! Contract bindings for the rollup oracles read on L1.

pub mod linea_rollup;
pub mod output_oracle;
pub mod taiko_l1;

pub use linea_rollup::*;
pub use output_oracle::*;
pub use taiko_l1::*;

use alloy::primitives::U256;

use crate::ContractError;

/// Classifies a failed contract call, keeping reverts apart from transport failures.
pub(crate) fn classify_call_error(call: &'static str, err: alloy::contract::Error) -> ContractError {
    if let Some(data) = err.as_revert_data() {
        return ContractError::Reverted { call, reason: data.to_string() };
    }
    if let alloy::contract::Error::TransportError(transport) = &err
        && let Some(payload) = transport.as_error_resp()
        && payload.message.contains("revert")
    {
        return ContractError::Reverted { call, reason: payload.message.to_string() };
    }
    ContractError::Transport { call, reason: err.to_string() }
}

/// Narrows a `uint256` return value to `u64`.
pub(crate) fn to_u64(call: &'static str, value: U256) -> Result<u64, ContractError> {
    value
        .try_into()
        .map_err(|_| ContractError::InvalidReturn { call, reason: format!("{value} overflows u64") })
}
