use alloy::primitives::U256;

/// Clean a hex string by removing "0x" prefix and whitespace
pub fn clean_hex(s: &str) -> &str {
    let s = s.trim();
    s.strip_prefix("0x")
        .or_else(|| s.strip_prefix("0X"))
        .unwrap_or(s)
}

/// Convert a string (hex or decimal) to U256
pub fn to_u256(s: &str) -> Option<U256> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if s.starts_with("0x") || s.starts_with("0X") {
        let digits = clean_hex(s);
        if digits.is_empty() {
            return Some(U256::ZERO);
        }
        return U256::from_str_radix(digits, 16).ok();
    }
    if s.chars().all(|c| c.is_ascii_digit()) {
        return U256::from_str_radix(s, 10).ok();
    }
    None
}

/// Parse a JSON-RPC quantity (`"0x1a"`) into a u64.
pub fn parse_quantity(s: &str) -> Option<u64> {
    let digits = clean_hex(s);
    if digits.is_empty() {
        return Some(0);
    }
    u64::from_str_radix(digits, 16).ok()
}

/// Encode a u64 as a JSON-RPC quantity.
pub fn quantity(value: u64) -> String {
    format!("0x{value:x}")
}
