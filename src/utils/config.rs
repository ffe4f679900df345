use crate::error::{ConfigError, Result};
use crate::utils::constants::{DEFAULT_GAS_CEILING, MAX_TX_GAS, MIN_TX_GAS, ONE_ETHER};
use alloy::primitives::U256;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

const DEFAULT_RPC_URL: &str = "http://127.0.0.1:8545";
const DEFAULT_ARTIFACTS_DIR: &str = "artifacts";
const DEFAULT_TX_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_RECEIPT_POLL_MS: u64 = 250;
const DEFAULT_GAS_MARGIN_BPS: u64 = 2_000;
const DEFAULT_SESSION_WAIT_MS: u64 = 10_000;
const DEFAULT_RPC_READ_RETRIES: usize = 3;

/// How the gas limit of a step without an explicit override is chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GasPolicy {
    /// Send every transaction with the same generous cap.
    FixedCeiling(u64),
    /// Ask the node for an estimate, add `margin_bps`, never exceed `ceiling`.
    EstimateWithMargin { margin_bps: u64, ceiling: u64 },
}

impl GasPolicy {
    pub fn ceiling(self) -> u64 {
        match self {
            Self::FixedCeiling(cap) => cap,
            Self::EstimateWithMargin { ceiling, .. } => ceiling,
        }
    }

    /// Apply the safety margin to a node estimate.
    pub fn pad_estimate(self, estimate: u64) -> u64 {
        match self {
            Self::FixedCeiling(cap) => cap,
            Self::EstimateWithMargin {
                margin_bps,
                ceiling,
            } => {
                let padded = u128::from(estimate) * u128::from(10_000 + margin_bps) / 10_000;
                u64::try_from(padded).unwrap_or(u64::MAX).min(ceiling)
            }
        }
    }
}

impl Default for GasPolicy {
    fn default() -> Self {
        Self::FixedCeiling(DEFAULT_GAS_CEILING)
    }
}

#[derive(Debug, Clone)]
pub struct LabConfig {
    pub rpc_url: String,
    pub artifacts_dir: PathBuf,
    pub tx_timeout: Duration,
    pub receipt_poll: Duration,
    pub gas_policy: GasPolicy,
    pub min_identity_balance_wei: U256,
    pub session_wait: Duration,
    pub rpc_read_retries: usize,
}

impl Default for LabConfig {
    fn default() -> Self {
        Self {
            rpc_url: DEFAULT_RPC_URL.to_string(),
            artifacts_dir: PathBuf::from(DEFAULT_ARTIFACTS_DIR),
            tx_timeout: Duration::from_millis(DEFAULT_TX_TIMEOUT_MS),
            receipt_poll: Duration::from_millis(DEFAULT_RECEIPT_POLL_MS),
            gas_policy: GasPolicy::default(),
            min_identity_balance_wei: ONE_ETHER * U256::from(10u64),
            session_wait: Duration::from_millis(DEFAULT_SESSION_WAIT_MS),
            rpc_read_retries: DEFAULT_RPC_READ_RETRIES,
        }
    }
}

pub fn validate_http_url(name: &str, raw: &str) -> Result<()> {
    let parsed = raw.parse::<reqwest::Url>().map_err(|e| {
        ConfigError::Invalid(format!("{name} must be a valid URL, got `{raw}`: {e}"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigError::Invalid(format!(
            "{name} must use http(s) scheme, got `{other}`"
        ))
        .into()),
    }
}

fn env_u64(key: &str) -> Option<u64> {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse::<u64>().ok())
}

fn env_trimmed(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn load_gas_policy() -> Result<GasPolicy> {
    let ceiling = match env_trimmed("LAB_DEFAULT_GAS_LIMIT") {
        Some(raw) => {
            let parsed = raw.parse::<u64>().map_err(|_| {
                ConfigError::Invalid(format!("LAB_DEFAULT_GAS_LIMIT must be a u64, got `{raw}`"))
            })?;
            if !(MIN_TX_GAS..=MAX_TX_GAS).contains(&parsed) {
                return Err(ConfigError::Invalid(format!(
                    "LAB_DEFAULT_GAS_LIMIT must be within {MIN_TX_GAS}..={MAX_TX_GAS}, got {parsed}"
                ))
                .into());
            }
            parsed
        }
        None => DEFAULT_GAS_CEILING,
    };

    let policy = env_trimmed("LAB_GAS_POLICY").unwrap_or_else(|| "fixed".to_string());
    match policy.to_ascii_lowercase().as_str() {
        "fixed" => Ok(GasPolicy::FixedCeiling(ceiling)),
        "estimate" => Ok(GasPolicy::EstimateWithMargin {
            margin_bps: env_u64("LAB_GAS_MARGIN_BPS")
                .map(|v| v.min(50_000))
                .unwrap_or(DEFAULT_GAS_MARGIN_BPS),
            ceiling,
        }),
        other => Err(ConfigError::Invalid(format!(
            "LAB_GAS_POLICY must be `fixed` or `estimate`, got `{other}`"
        ))
        .into()),
    }
}

impl LabConfig {
    pub fn load() -> Result<Self> {
        let defaults = Self::default();

        let rpc_url = env_trimmed("LAB_RPC_URL").unwrap_or(defaults.rpc_url);
        validate_http_url("LAB_RPC_URL", &rpc_url)?;

        let artifacts_dir = env_trimmed("LAB_ARTIFACTS_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.artifacts_dir);

        let min_identity_balance_wei = match env_trimmed("LAB_MIN_IDENTITY_BALANCE_WEI") {
            Some(raw) => crate::utils::hex::to_u256(&raw).ok_or_else(|| {
                ConfigError::Invalid(format!(
                    "LAB_MIN_IDENTITY_BALANCE_WEI must be a decimal or 0x-hex integer, got `{raw}`"
                ))
            })?,
            None => defaults.min_identity_balance_wei,
        };

        Ok(Self {
            rpc_url,
            artifacts_dir,
            tx_timeout: Duration::from_millis(
                env_u64("LAB_TX_TIMEOUT_MS")
                    .map(|v| v.clamp(1_000, 600_000))
                    .unwrap_or(DEFAULT_TX_TIMEOUT_MS),
            ),
            receipt_poll: Duration::from_millis(
                env_u64("LAB_RECEIPT_POLL_MS")
                    .map(|v| v.clamp(10, 5_000))
                    .unwrap_or(DEFAULT_RECEIPT_POLL_MS),
            ),
            gas_policy: load_gas_policy()?,
            min_identity_balance_wei,
            session_wait: Duration::from_millis(
                env_u64("LAB_SESSION_WAIT_MS")
                    .map(|v| v.min(600_000))
                    .unwrap_or(DEFAULT_SESSION_WAIT_MS),
            ),
            rpc_read_retries: env_u64("LAB_RPC_READ_RETRIES")
                .map(|v| v.clamp(1, 10) as usize)
                .unwrap_or(DEFAULT_RPC_READ_RETRIES),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LabError;
    use std::sync::{Mutex, OnceLock};

    fn env_lock() -> &'static Mutex<()> {
        static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        LOCK.get_or_init(|| Mutex::new(()))
    }

    const KEYS: [&str; 9] = [
        "LAB_RPC_URL",
        "LAB_ARTIFACTS_DIR",
        "LAB_TX_TIMEOUT_MS",
        "LAB_RECEIPT_POLL_MS",
        "LAB_DEFAULT_GAS_LIMIT",
        "LAB_GAS_POLICY",
        "LAB_GAS_MARGIN_BPS",
        "LAB_MIN_IDENTITY_BALANCE_WEI",
        "LAB_SESSION_WAIT_MS",
    ];

    fn clear_env() {
        for key in KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn test_load_defaults_when_env_is_empty() {
        let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        let cfg = LabConfig::load().expect("defaults must load");
        assert_eq!(cfg.rpc_url, DEFAULT_RPC_URL);
        assert_eq!(cfg.gas_policy, GasPolicy::FixedCeiling(DEFAULT_GAS_CEILING));
        assert_eq!(cfg.tx_timeout, Duration::from_millis(DEFAULT_TX_TIMEOUT_MS));
    }

    #[test]
    fn test_load_clamps_timeouts_and_reads_estimate_policy() {
        let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("LAB_TX_TIMEOUT_MS", "5");
        env::set_var("LAB_GAS_POLICY", "estimate");
        env::set_var("LAB_GAS_MARGIN_BPS", "1500");
        env::set_var("LAB_DEFAULT_GAS_LIMIT", "5000000");
        let cfg = LabConfig::load().expect("config must load");
        clear_env();
        assert_eq!(cfg.tx_timeout, Duration::from_millis(1_000));
        assert_eq!(
            cfg.gas_policy,
            GasPolicy::EstimateWithMargin {
                margin_bps: 1_500,
                ceiling: 5_000_000
            }
        );
    }

    #[test]
    fn test_load_rejects_non_http_url_and_bad_gas_limit() {
        let _guard = env_lock().lock().unwrap_or_else(|e| e.into_inner());
        clear_env();
        env::set_var("LAB_RPC_URL", "ws://127.0.0.1:8545");
        let err = LabConfig::load().expect_err("ws scheme must be rejected");
        assert!(matches!(err, LabError::Config(ConfigError::Invalid(_))));

        clear_env();
        env::set_var("LAB_DEFAULT_GAS_LIMIT", "100");
        let err = LabConfig::load().expect_err("gas limit below 21000 must be rejected");
        clear_env();
        assert!(err.to_string().contains("LAB_DEFAULT_GAS_LIMIT"));
    }

    #[test]
    fn test_estimate_policy_pads_and_caps() {
        let policy = GasPolicy::EstimateWithMargin {
            margin_bps: 2_000,
            ceiling: 150_000,
        };
        assert_eq!(policy.pad_estimate(100_000), 120_000);
        assert_eq!(policy.pad_estimate(200_000), 150_000);
        assert_eq!(GasPolicy::FixedCeiling(7).pad_estimate(1), 7);
    }
}
