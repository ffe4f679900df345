use crate::chain::ChainNode;
use crate::contracts::abi::{IBadAccessControl, ILottery, IProxy};
use crate::error::{InvariantError, InvariantViolation, NodeError, Result};
use crate::scenario::runner::RunResult;
use alloy::primitives::{utils::format_ether, Address, U256};
use alloy::sol_types::SolCall;
use std::fmt;

/// One predicate over post-run chain state. Subjects are scenario labels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Clause {
    BalanceZero {
        subject: String,
    },
    /// The subject's players collection is empty.
    CollectionEmpty {
        subject: String,
    },
    /// Strictly above the pre-attack snapshot.
    BalanceIncreased {
        subject: String,
    },
    BalanceEqualsPreAttackSum {
        subject: String,
        sources: Vec<String>,
    },
    OwnerIs {
        subject: String,
        expected: String,
    },
    ImplementationIs {
        subject: String,
        expected: String,
    },
}

impl Clause {
    pub fn balance_zero(subject: &str) -> Self {
        Self::BalanceZero {
            subject: subject.to_string(),
        }
    }

    pub fn collection_empty(subject: &str) -> Self {
        Self::CollectionEmpty {
            subject: subject.to_string(),
        }
    }

    pub fn balance_increased(subject: &str) -> Self {
        Self::BalanceIncreased {
            subject: subject.to_string(),
        }
    }

    pub fn balance_equals_pre_attack_sum(subject: &str, sources: &[&str]) -> Self {
        Self::BalanceEqualsPreAttackSum {
            subject: subject.to_string(),
            sources: sources.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn owner_is(subject: &str, expected: &str) -> Self {
        Self::OwnerIs {
            subject: subject.to_string(),
            expected: expected.to_string(),
        }
    }

    pub fn implementation_is(subject: &str, expected: &str) -> Self {
        Self::ImplementationIs {
            subject: subject.to_string(),
            expected: expected.to_string(),
        }
    }
}

impl fmt::Display for Clause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BalanceZero { subject } => write!(f, "balance({subject}) == 0"),
            Self::CollectionEmpty { subject } => write!(f, "len({subject}.getPlayers()) == 0"),
            Self::BalanceIncreased { subject } => {
                write!(f, "balance({subject}) > pre-attack balance({subject})")
            }
            Self::BalanceEqualsPreAttackSum { subject, sources } => write!(
                f,
                "balance({subject}) == sum of pre-attack balance({})",
                sources.join(", ")
            ),
            Self::OwnerIs { subject, expected } => write!(f, "{subject}.owner() == {expected}"),
            Self::ImplementationIs { subject, expected } => {
                write!(f, "{subject}.implementation() == {expected}")
            }
        }
    }
}

/// Conjunction of clauses; holds only if every clause holds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invariant {
    pub clauses: Vec<Clause>,
}

impl Invariant {
    pub fn all(clauses: Vec<Clause>) -> Self {
        Self { clauses }
    }
}

impl fmt::Display for Invariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let rendered: Vec<String> = self.clauses.iter().map(Clause::to_string).collect();
        f.write_str(&rendered.join(" AND "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClauseOutcome {
    pub clause: Clause,
    pub holds: bool,
    pub observed: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    pub scenario: String,
    pub outcomes: Vec<ClauseOutcome>,
}

impl Verdict {
    pub fn holds(&self) -> bool {
        self.outcomes.iter().all(|outcome| outcome.holds)
    }

    pub fn failed_clauses(&self) -> Vec<String> {
        self.outcomes
            .iter()
            .filter(|outcome| !outcome.holds)
            .map(|outcome| format!("{} (observed {})", outcome.clause, outcome.observed))
            .collect()
    }

    pub fn into_result(self) -> std::result::Result<Self, InvariantViolation> {
        if self.holds() {
            return Ok(self);
        }
        Err(InvariantViolation {
            failed: self.failed_clauses(),
            scenario: self.scenario,
        })
    }
}

/// Reads post-run state once per clause. Refuses to read a run that is still in flight.
pub struct InvariantVerifier<'a> {
    node: &'a dyn ChainNode,
}

impl<'a> InvariantVerifier<'a> {
    pub fn new(node: &'a dyn ChainNode) -> Self {
        Self { node }
    }

    pub async fn verify(
        &self,
        scenario: &str,
        invariant: &Invariant,
        run: &RunResult,
    ) -> Result<Verdict> {
        if !run.phase.is_terminal() {
            return Err(InvariantError::NotSettled(run.phase).into());
        }

        let mut outcomes = Vec::with_capacity(invariant.clauses.len());
        for clause in &invariant.clauses {
            let outcome = self.check(clause, run).await?;
            tracing::info!(
                "[VERIFY] {scenario}: {clause} -> {} (observed {})",
                if outcome.holds { "holds" } else { "FAILS" },
                outcome.observed
            );
            outcomes.push(outcome);
        }
        Ok(Verdict {
            scenario: scenario.to_string(),
            outcomes,
        })
    }

    fn subject(run: &RunResult, label: &str) -> Result<Address> {
        run.bindings
            .address(label)
            .map_err(|_| InvariantError::UnboundSubject(label.to_string()).into())
    }

    fn baseline(run: &RunResult, label: &str) -> Result<U256> {
        run.pre_attack
            .as_ref()
            .and_then(|snapshot| snapshot.balance_of(label))
            .ok_or_else(|| InvariantError::MissingBaseline(label.to_string()).into())
    }

    async fn check(&self, clause: &Clause, run: &RunResult) -> Result<ClauseOutcome> {
        let (holds, observed) = match clause {
            Clause::BalanceZero { subject } => {
                let balance = self.node.get_balance(Self::subject(run, subject)?).await?;
                (balance.is_zero(), format!("{} ETH", format_ether(balance)))
            }
            Clause::CollectionEmpty { subject } => {
                let at = Self::subject(run, subject)?;
                let raw = self
                    .node
                    .call(at, ILottery::getPlayersCall {}.abi_encode().into())
                    .await?;
                let players = ILottery::getPlayersCall::abi_decode_returns(&raw, true)
                    .map_err(|e| NodeError::Decode(format!("getPlayers(): {e}")))?
                    ._0;
                (players.is_empty(), format!("{} player(s)", players.len()))
            }
            Clause::BalanceIncreased { subject } => {
                let before = Self::baseline(run, subject)?;
                let now = self.node.get_balance(Self::subject(run, subject)?).await?;
                let observed = if now >= before {
                    format!("+{} ETH", format_ether(now - before))
                } else {
                    format!("-{} ETH", format_ether(before - now))
                };
                (now > before, observed)
            }
            Clause::BalanceEqualsPreAttackSum { subject, sources } => {
                let mut expected = U256::ZERO;
                for source in sources {
                    expected += Self::baseline(run, source)?;
                }
                let now = self.node.get_balance(Self::subject(run, subject)?).await?;
                (
                    now == expected,
                    format!(
                        "{} ETH vs expected {} ETH",
                        format_ether(now),
                        format_ether(expected)
                    ),
                )
            }
            Clause::OwnerIs { subject, expected } => {
                let want = Self::subject(run, expected)?;
                let raw = self
                    .node
                    .call(
                        Self::subject(run, subject)?,
                        IBadAccessControl::ownerCall {}.abi_encode().into(),
                    )
                    .await?;
                let owner = IBadAccessControl::ownerCall::abi_decode_returns(&raw, true)
                    .map_err(|e| NodeError::Decode(format!("owner(): {e}")))?
                    ._0;
                (owner == want, format!("{owner:#x}"))
            }
            Clause::ImplementationIs { subject, expected } => {
                let want = Self::subject(run, expected)?;
                let raw = self
                    .node
                    .call(
                        Self::subject(run, subject)?,
                        IProxy::implementationCall {}.abi_encode().into(),
                    )
                    .await?;
                let implementation = IProxy::implementationCall::abi_decode_returns(&raw, true)
                    .map_err(|e| NodeError::Decode(format!("implementation(): {e}")))?
                    ._0;
                (implementation == want, format!("{implementation:#x}"))
            }
        };
        Ok(ClauseOutcome {
            clause: clause.clone(),
            holds,
            observed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invariant_renders_as_conjunction() {
        let invariant = Invariant::all(vec![
            Clause::balance_zero("vault"),
            Clause::balance_increased("attacker"),
        ]);
        assert_eq!(
            invariant.to_string(),
            "balance(vault) == 0 AND balance(attacker) > pre-attack balance(attacker)"
        );
    }

    #[test]
    fn test_verdict_reports_only_failed_clauses() {
        let verdict = Verdict {
            scenario: "reentrancy".to_string(),
            outcomes: vec![
                ClauseOutcome {
                    clause: Clause::balance_zero("vault"),
                    holds: true,
                    observed: "0 ETH".to_string(),
                },
                ClauseOutcome {
                    clause: Clause::balance_increased("attacker"),
                    holds: false,
                    observed: "-0.01 ETH".to_string(),
                },
            ],
        };
        assert!(!verdict.holds());
        let violation = verdict.into_result().expect_err("one clause fails");
        assert_eq!(violation.scenario, "reentrancy");
        assert_eq!(violation.failed.len(), 1);
        assert!(violation.failed[0].contains("balance(attacker)"));
    }
}
