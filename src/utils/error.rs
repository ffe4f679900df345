/// Shrinks a node error string for embedding in step failures and log lines.
///
/// Response bodies echoed back by transports (`text: ...`) and captured backtraces are
/// dropped, whitespace runs collapse to one space and the result is capped at `max_len`.
pub fn compact_error_message(message: &str, max_len: usize) -> String {
    let mut raw = message;
    if let Some((prefix, _)) = raw.split_once("Stack backtrace:") {
        raw = prefix;
    }
    let elided;
    if let Some((prefix, _)) = raw.split_once(" text: ") {
        elided = format!("{prefix} text=<omitted>");
        raw = &elided;
    }

    let collapsed = raw.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.len() <= max_len {
        return collapsed;
    }
    let mut cut = max_len;
    while !collapsed.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...(truncated)", &collapsed[..cut])
}

/// Pulls the human revert reason out of a dev-node error message.
///
/// Hardhat: `... reverted with reason string 'fund first'`.
/// Anvil: `execution reverted: fund first`.
pub fn extract_revert_reason(message: &str) -> Option<String> {
    if let Some(idx) = message.find("reverted with reason string '") {
        let tail = &message[idx + "reverted with reason string '".len()..];
        let end = tail.find('\'').unwrap_or(tail.len());
        return Some(tail[..end].to_string());
    }
    if let Some(idx) = message.find("execution reverted: ") {
        let tail = message[idx + "execution reverted: ".len()..].trim();
        let end = tail.find(['"', ',', '}']).unwrap_or(tail.len());
        let reason = tail[..end].trim();
        if !reason.is_empty() {
            return Some(reason.to_string());
        }
    }
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("revert") {
        return Some("execution reverted".to_string());
    }
    None
}
