use std::fs;
use std::path::Path;

/// Parse `KEY=value` lines; comments, blank lines and malformed lines are skipped.
fn parse_dot_env(content: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
        let Some((key, value)) = trimmed.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }

        let value_no_comment = value.split('#').next().unwrap_or("").trim();
        let unquoted = if value_no_comment.len() >= 2
            && ((value_no_comment.starts_with('"') && value_no_comment.ends_with('"'))
                || (value_no_comment.starts_with('\'') && value_no_comment.ends_with('\'')))
        {
            &value_no_comment[1..value_no_comment.len() - 1]
        } else {
            value_no_comment
        };
        pairs.push((key.to_string(), unquoted.to_string()));
    }
    pairs
}

fn load_dot_env(path: &Path) -> usize {
    if !path.exists() {
        return 0;
    }
    let content = match fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[ENV] Failed to read {}: {}", path.display(), e);
            return 0;
        }
    };

    let mut applied = 0;
    for (key, value) in parse_dot_env(&content) {
        // Explicit process environment always wins over the file.
        if std::env::var_os(&key).is_some() {
            continue;
        }
        std::env::set_var(&key, value);
        applied += 1;
    }
    applied
}

/// Seed the process environment from `./.env` before config is read.
pub fn harden_env_setup(rpc_backend: bool) {
    let applied = load_dot_env(Path::new(".env"));
    if applied > 0 {
        eprintln!("[ENV] Loaded {applied} key(s) from .env");
    }
    if rpc_backend && std::env::var("LAB_RPC_URL").is_err() {
        eprintln!("[ENV] WARN: LAB_RPC_URL is not set; falling back to http://127.0.0.1:8545");
    }
}

#[cfg(test)]
mod tests {
    use super::parse_dot_env;

    #[test]
    fn test_parse_dot_env_strips_quotes_comments_and_export() {
        let pairs = parse_dot_env(
            "# comment\nLAB_RPC_URL=\"http://127.0.0.1:8545\"\nexport LAB_GAS_POLICY=estimate # inline\nbroken line\n=novalue\n",
        );
        assert_eq!(
            pairs,
            vec![
                (
                    "LAB_RPC_URL".to_string(),
                    "http://127.0.0.1:8545".to_string()
                ),
                ("LAB_GAS_POLICY".to_string(), "estimate".to_string()),
            ]
        );
    }
}
