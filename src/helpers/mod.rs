pub mod datetime;
pub mod depositdata;

use alloy::primitives::{FixedBytes, U256, hex, utils::format_ether};
use eyre::{Result, WrapErr, eyre};

/// Decodes a hex string (with or without `0x`) into exactly `N` bytes
pub fn decode_fixed<const N: usize>(name: &str, value: &str) -> Result<FixedBytes<N>> {
    let bytes = hex::decode(value.trim()).wrap_err_with(|| format!("{name}: invalid hex"))?;
    let arr: [u8; N] = bytes
        .as_slice()
        .try_into()
        .map_err(|_| eyre!("{name} must be {N} bytes, got {}", bytes.len()))?;
    Ok(FixedBytes::from(arr))
}

/// Wei amount as eth with trailing zeros trimmed, e.g. "34.0" or "0.25"
pub fn format_eth(amount: &U256) -> String {
    let eth_str = format_ether(*amount);
    match eth_str.split_once('.') {
        Some((int, fractional)) => {
            let fractional = fractional.trim_end_matches('0');
            match fractional.is_empty() {
                true => format!("{int}.0"),
                false => format!("{int}.{fractional}"),
            }
        }
        None => eth_str,
    }
}
