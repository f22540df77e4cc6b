use alloy::primitives::utils::{format_units, parse_units};
use alloy::primitives::{hex, Address, U256};
use chrono::{DateTime, Local};

/// Render an address as `0x`-prefixed lowercase hex.
pub fn format_address(addr: &Address) -> String {
    hex::encode_prefixed(addr.as_slice())
}

/// Shorten an address to "0xabcd...ef12" format
pub fn shorten_address(addr: &Address) -> String {
    let s = format_address(addr);
    format!("{}...{}", &s[..6], &s[s.len() - 4..])
}

/// Convert a wei amount to a gwei string, trimming trailing zeros.
pub fn wei_to_gwei(wei: U256) -> String {
    trim_decimal(format_units(wei, "gwei").unwrap_or_else(|_| wei.to_string()))
}

/// Parse a user-entered gwei amount into wei.
pub fn gwei_to_wei(gwei: &str) -> Result<U256, String> {
    let gwei = gwei.trim();
    if gwei.is_empty() {
        return Err("gas price is empty".to_string());
    }
    parse_units(gwei, "gwei")
        .map(|p| p.get_absolute())
        .map_err(|e| format!("invalid gas price '{gwei}': {e}"))
}

/// Format a U256 wei value as ether
pub fn format_ether(wei: U256) -> String {
    trim_decimal(format_units(wei, "ether").unwrap_or_else(|_| wei.to_string()))
}

/// Fee text for `gas_limit` gas at a gas price given in gwei.
pub fn compute_fee(gas_limit: u64, gas_price_gwei: &str) -> Result<String, String> {
    let price = gwei_to_wei(gas_price_gwei)?;
    let fee = U256::from(gas_limit)
        .checked_mul(price)
        .ok_or_else(|| "fee overflows uint256".to_string())?;
    Ok(format!("{} Ether", format_ether(fee)))
}

/// Format a number with comma separators
pub fn format_number(n: u64) -> String {
    let s = n.to_string();
    let mut result = String::with_capacity(s.len() + s.len() / 3);
    for (i, c) in s.chars().rev().enumerate() {
        if i > 0 && i % 3 == 0 {
            result.push(',');
        }
        result.push(c);
    }
    result.chars().rev().collect()
}

/// Format a local timestamp for the terminal panel
pub fn format_clock(time: DateTime<Local>) -> String {
    time.format("%H:%M:%S").to_string()
}

fn trim_decimal(s: String) -> String {
    if !s.contains('.') {
        return s;
    }
    let trimmed = s.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_address_lowercase() {
        let addr: Address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse().unwrap();
        assert_eq!(format_address(&addr), "0xd8da6bf26964af9d7eed9e03e53415d37aa96045");
    }

    #[test]
    fn test_shorten_address() {
        let addr: Address = "0xd8dA6BF26964aF9D7eEd9e03E53415D37aA96045".parse().unwrap();
        assert_eq!(shorten_address(&addr), "0xd8da...6045");
    }

    #[test]
    fn test_wei_to_gwei() {
        assert_eq!(wei_to_gwei(U256::from(20_000_000_000u64)), "20");
        assert_eq!(wei_to_gwei(U256::from(1_500_000_000u64)), "1.5");
    }

    #[test]
    fn test_gwei_to_wei() {
        assert_eq!(gwei_to_wei("20").unwrap(), U256::from(20_000_000_000u64));
        assert_eq!(gwei_to_wei(" 1.5 ").unwrap(), U256::from(1_500_000_000u64));
        assert!(gwei_to_wei("").is_err());
        assert!(gwei_to_wei("abc").is_err());
    }

    #[test]
    fn test_compute_fee() {
        assert_eq!(compute_fee(21_000, "20").unwrap(), "0.00042 Ether");
        assert!(compute_fee(21_000, "twenty").is_err());
    }

    #[test]
    fn test_format_ether_whole() {
        assert_eq!(format_ether(U256::from(10u64).pow(U256::from(18u64))), "1");
        assert_eq!(format_ether(U256::ZERO), "0");
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(21000), "21,000");
        assert_eq!(format_number(1234567), "1,234,567");
    }

    #[test]
    fn test_trim_decimal() {
        assert_eq!(trim_decimal("1.000000".to_string()), "1");
        assert_eq!(trim_decimal("0.000420".to_string()), "0.00042");
        assert_eq!(trim_decimal("100".to_string()), "100");
    }
}
