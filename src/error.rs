use alloy::primitives::{Address, U256};
use thiserror::Error;

use crate::scenario::Phase;

pub type Result<T> = std::result::Result<T, LabError>;

#[derive(Debug, Error)]
pub enum LabError {
    #[error("provisioning error: {0}")]
    Provisioning(#[from] ProvisioningError),
    #[error("deployment error: {0}")]
    Deployment(#[from] DeploymentError),
    #[error("{0}")]
    Step(#[from] StepFailure),
    #[error("clock ordering error: {0}")]
    Clock(#[from] ClockOrderingError),
    #[error("verifier misuse: {0}")]
    Invariant(#[from] InvariantError),
    #[error("{0}")]
    Violation(#[from] InvariantViolation),
    #[error("node error: {0}")]
    Node(#[from] NodeError),
    #[error("session error: {0}")]
    Session(#[from] SessionError),
    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NodeError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },
    #[error("request rejected by node: {0}")]
    Rejected(String),
    #[error("timed out after {waited_ms}ms: {context}")]
    Timeout { waited_ms: u64, context: String },
    #[error("malformed node response: {0}")]
    Decode(String),
    #[error("unknown transaction {0}")]
    UnknownTransaction(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error("requested {requested} identities but the node exposes only {available}")]
    InsufficientIdentities { requested: usize, available: usize },
    #[error("identity {address:#x} holds {balance} wei, below the required {required} wei")]
    Underfunded {
        address: Address,
        balance: U256,
        required: U256,
    },
    #[error("identity listing failed: {0}")]
    Node(NodeError),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeploymentError {
    #[error("{contract} constructor reverted: {reason}")]
    Reverted { contract: String, reason: String },
    #[error("{contract} deployment not mined within {waited_ms}ms")]
    Timeout { contract: String, waited_ms: u64 },
    #[error("{contract} receipt carries no contract address")]
    MissingAddress { contract: String },
    #[error("{contract} expects {expected} constructor argument(s), got {got}")]
    ConstructorArity {
        contract: String,
        expected: usize,
        got: usize,
    },
    #[error("artifact for {contract} unavailable: {reason}")]
    Artifact { contract: String, reason: String },
    #[error("{contract} deployment submission failed: {source}")]
    Node {
        contract: String,
        #[source]
        source: NodeError,
    },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClockOrderingError {
    #[error("requested timestamp {requested} is not strictly after latest block timestamp {latest}")]
    NotIncreasing { requested: u64, latest: u64 },
    #[error("timestamp arithmetic overflow (latest={latest}, seconds={seconds})")]
    Overflow { latest: u64, seconds: u64 },
    #[error("mined block timestamp {mined} is below the scheduled {scheduled}")]
    NotHonoured { scheduled: u64, mined: u64 },
    #[error("clock control failed: {0}")]
    Node(NodeError),
}

/// Why a single scenario step stopped the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StepCause {
    #[error("transaction reverted: {reason}")]
    Reverted { reason: String },
    #[error("transaction not mined within {waited_ms}ms")]
    TimedOut { waited_ms: u64 },
    #[error("{0}")]
    Deployment(DeploymentError),
    #[error("{0}")]
    Clock(ClockOrderingError),
    #[error("label `{0}` is not bound to an identity or contract")]
    UnboundLabel(String),
    #[error("label `{0}` is already bound")]
    DuplicateLabel(String),
    #[error("{0}")]
    Node(NodeError),
    #[error("scenario aborted before this step")]
    Aborted,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("step #{step_index} ({step}) failed during {phase}: {cause}")]
pub struct StepFailure {
    pub step_index: usize,
    pub step: String,
    pub phase: Phase,
    pub cause: StepCause,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InvariantError {
    #[error("run is still in phase {0}; invariants are only readable at a terminal state")]
    NotSettled(Phase),
    #[error("invariant references unbound subject `{0}`")]
    UnboundSubject(String),
    #[error("no pre-attack snapshot recorded for `{0}`")]
    MissingBaseline(String),
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("scenario `{scenario}` completed but the exploit effect did not materialise: {}", failed.join("; "))]
pub struct InvariantViolation {
    pub scenario: String,
    pub failed: Vec<String>,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SessionError {
    #[error("node `{endpoint}` is leased by another scenario (waited {waited_ms}ms)")]
    Busy { endpoint: String, waited_ms: u64 },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required configuration: {0}")]
    Missing(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl From<NodeError> for StepCause {
    fn from(err: NodeError) -> Self {
        match err {
            NodeError::Reverted { reason } => Self::Reverted { reason },
            other => Self::Node(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_revert_maps_to_step_revert() {
        let cause = StepCause::from(NodeError::Reverted {
            reason: "fund first".to_string(),
        });
        assert_eq!(
            cause,
            StepCause::Reverted {
                reason: "fund first".to_string()
            }
        );
        let cause = StepCause::from(NodeError::Transport("connection refused".to_string()));
        assert!(matches!(cause, StepCause::Node(NodeError::Transport(_))));
    }

    #[test]
    fn test_step_failure_message_names_index_and_phase() {
        let failure = StepFailure {
            step_index: 4,
            step: "invoke attack on attacker_contract".to_string(),
            phase: Phase::Attacking,
            cause: StepCause::Reverted {
                reason: "fund the attacker first".to_string(),
            },
        };
        let rendered = LabError::from(failure).to_string();
        assert!(rendered.contains("step #4"));
        assert!(rendered.contains("attacking"));
        assert!(rendered.contains("fund the attacker first"));
    }
}
