use crate::chain::{ChainNode, TxRequest};
use crate::error::{NodeError, StepCause, StepFailure};
use crate::executor::{submit_and_confirm, ChainClock, ContractDeployer, Identity, NodeSession};
use crate::scenario::{AbortHandle, Bindings, Call, Phase, Scenario, Step};
use crate::utils::config::{GasPolicy, LabConfig};
use alloy::primitives::{Address, Bytes, B256, U256};
use std::collections::BTreeMap;
use std::time::Duration;

/// Balances of every bound label at one point of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSnapshot {
    pub phase: Phase,
    pub block_number: u64,
    pub balances: BTreeMap<String, U256>,
}

impl BalanceSnapshot {
    pub fn balance_of(&self, label: &str) -> Option<U256> {
        self.balances.get(label).copied()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepRecord {
    pub index: usize,
    pub step: String,
    pub phase: Phase,
    pub tx_hash: Option<B256>,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
}

/// Everything a run observed, whether or not it completed.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub scenario: String,
    pub phase: Phase,
    pub records: Vec<StepRecord>,
    pub bindings: Bindings,
    /// Taken the moment the run first enters `Attacking`.
    pub pre_attack: Option<BalanceSnapshot>,
    /// Taken once the run reached its terminal phase.
    pub post_run: Option<BalanceSnapshot>,
    pub failure: Option<StepFailure>,
}

impl RunResult {
    pub fn is_completed(&self) -> bool {
        self.phase == Phase::Completed
    }
}

struct Outcome {
    tx_hash: Option<B256>,
    block_number: Option<u64>,
    gas_used: Option<u64>,
}

impl Outcome {
    fn offchain(block_number: u64) -> Self {
        Self {
            tx_hash: None,
            block_number: Some(block_number),
            gas_used: None,
        }
    }
}

/// Executes a scenario's steps strictly in order against a leased node.
///
/// Each transaction step waits for its receipt before the next one is submitted. The
/// first revert, timeout or unbound label moves the run to `Failed`; nothing is retried.
pub struct ScenarioRunner<'s> {
    session: &'s NodeSession,
    tx_timeout: Duration,
    gas_policy: GasPolicy,
    abort: AbortHandle,
}

impl<'s> ScenarioRunner<'s> {
    pub fn new(session: &'s NodeSession, config: &LabConfig) -> Self {
        Self {
            session,
            tx_timeout: config.tx_timeout,
            gas_policy: config.gas_policy,
            abort: AbortHandle::new(),
        }
    }

    pub fn with_abort(mut self, abort: AbortHandle) -> Self {
        self.abort = abort;
        self
    }

    fn node(&self) -> &dyn ChainNode {
        self.session.node()
    }

    pub async fn run(&self, scenario: &Scenario, identities: Vec<Identity>) -> RunResult {
        let mut result = RunResult {
            scenario: scenario.name.clone(),
            phase: Phase::Created,
            records: Vec::with_capacity(scenario.steps.len()),
            bindings: Bindings::default(),
            pre_attack: None,
            post_run: None,
            failure: None,
        };
        tracing::info!(
            "[RUNNER] {}: {} step(s) on {}",
            scenario.name,
            scenario.steps.len(),
            self.session.endpoint()
        );

        for identity in identities {
            if let Err(cause) = result.bindings.bind_identity(identity) {
                self.fail(&mut result, 0, "bind identities".to_string(), cause);
                self.finish(&mut result).await;
                return result;
            }
        }

        let mut clock = ChainClock::new(self.node());
        for (index, step) in scenario.steps.iter().enumerate() {
            if self.abort.is_aborted() {
                self.fail(&mut result, index, step.to_string(), StepCause::Aborted);
                break;
            }

            let next = result.phase.max(step.phase());
            if next != result.phase {
                tracing::info!("[RUNNER] {}: {} -> {}", scenario.name, result.phase, next);
                result.phase = next;
                if next == Phase::Attacking && result.pre_attack.is_none() {
                    match self.snapshot(&result.bindings, next).await {
                        Ok(snapshot) => result.pre_attack = Some(snapshot),
                        Err(err) => {
                            self.fail(&mut result, index, step.to_string(), err.into());
                            break;
                        }
                    }
                }
            }

            match self.execute(step, &mut result.bindings, &mut clock).await {
                Ok(outcome) => {
                    tracing::info!(
                        "[RUNNER] #{index} {step} ok{}",
                        outcome
                            .block_number
                            .map(|n| format!(" (block #{n})"))
                            .unwrap_or_default()
                    );
                    result.records.push(StepRecord {
                        index,
                        step: step.to_string(),
                        phase: result.phase,
                        tx_hash: outcome.tx_hash,
                        block_number: outcome.block_number,
                        gas_used: outcome.gas_used,
                    });
                }
                Err(cause) => {
                    self.fail(&mut result, index, step.to_string(), cause);
                    break;
                }
            }
        }

        if result.failure.is_none() {
            result.phase = Phase::Completed;
        }
        self.finish(&mut result).await;
        result
    }

    fn fail(&self, result: &mut RunResult, index: usize, step: String, cause: StepCause) {
        let failure = StepFailure {
            step_index: index,
            step,
            phase: result.phase,
            cause,
        };
        tracing::error!("[RUNNER] {}: {failure}", result.scenario);
        result.failure = Some(failure);
        result.phase = Phase::Failed;
    }

    async fn finish(&self, result: &mut RunResult) {
        match self.snapshot(&result.bindings, result.phase).await {
            Ok(snapshot) => result.post_run = Some(snapshot),
            Err(err) => tracing::warn!(
                "[RUNNER] {}: final balance snapshot unavailable: {err}",
                result.scenario
            ),
        }
        tracing::info!("[RUNNER] {}: finished in phase {}", result.scenario, result.phase);
    }

    async fn snapshot(&self, bindings: &Bindings, phase: Phase) -> Result<BalanceSnapshot, NodeError> {
        let head = self
            .node()
            .get_block(crate::chain::BlockTag::Latest)
            .await?;
        let mut balances = BTreeMap::new();
        for (label, binding) in bindings.iter() {
            let balance = self.node().get_balance(binding.address()).await?;
            balances.insert(label.to_string(), balance);
        }
        tracing::debug!(
            "[RUNNER] {phase} snapshot at block #{}: {} balance(s)",
            head.number,
            balances.len()
        );
        Ok(BalanceSnapshot {
            phase,
            block_number: head.number,
            balances,
        })
    }

    async fn execute(
        &self,
        step: &Step,
        bindings: &mut Bindings,
        clock: &mut ChainClock<'_>,
    ) -> Result<Outcome, StepCause> {
        match step {
            Step::Deploy {
                label,
                contract,
                from,
                args,
            } => {
                bindings.ensure_free(label)?;
                let deployer = bindings.identity(from)?.clone();
                let args = args
                    .iter()
                    .map(|arg| bindings.address(arg))
                    .collect::<Result<Vec<Address>, _>>()?;
                let handle = ContractDeployer::new(
                    self.node(),
                    self.tx_timeout,
                    self.gas_policy.ceiling(),
                )
                .deploy(label, *contract, &deployer, &args)
                .await
                .map_err(StepCause::Deployment)?;
                let outcome = Outcome {
                    tx_hash: Some(handle.deploy_tx),
                    block_number: Some(handle.block_number),
                    gas_used: None,
                };
                bindings.bind_contract(handle)?;
                Ok(outcome)
            }
            Step::Fund { from, to, amount } => {
                let sender = bindings.identity(from)?.address;
                let to = bindings.address(to)?;
                self.transact(sender, to, Bytes::new(), *amount, None).await
            }
            Step::Invoke {
                from,
                target,
                call,
                value,
                gas_limit,
            } => {
                let sender = bindings.identity(from)?.address;
                let to = bindings.address(target)?;
                let data = call.encode(bindings)?;
                self.transact(sender, to, data, *value, *gas_limit).await
            }
            Step::Collect { from, target } => {
                let sender = bindings.identity(from)?.address;
                let to = bindings.address(target)?;
                let data = Call::Collect.encode(bindings)?;
                self.transact(sender, to, data, U256::ZERO, None).await
            }
            Step::AdvanceTime { seconds } => {
                let target = clock
                    .advance_time(*seconds)
                    .await
                    .map_err(StepCause::Clock)?;
                let head = self
                    .node()
                    .get_block(crate::chain::BlockTag::Latest)
                    .await?;
                tracing::debug!("[RUNNER] next block pinned to ts={target}");
                Ok(Outcome::offchain(head.number))
            }
            Step::MineBlock => {
                let mined = clock.mine_block().await.map_err(StepCause::Clock)?;
                Ok(Outcome::offchain(mined.number))
            }
        }
    }

    async fn resolve_gas(&self, request: &TxRequest, pinned: Option<u64>) -> u64 {
        if let Some(limit) = pinned {
            return limit;
        }
        match self.gas_policy {
            GasPolicy::FixedCeiling(cap) => cap,
            GasPolicy::EstimateWithMargin { .. } => match self.node().estimate_gas(request).await {
                Ok(estimate) => {
                    let padded = self.gas_policy.pad_estimate(estimate);
                    tracing::debug!("[RUNNER] gas estimate {estimate} -> limit {padded}");
                    padded
                }
                Err(err) => {
                    tracing::warn!(
                        "[RUNNER] gas estimation failed ({err}); sending with ceiling {}",
                        self.gas_policy.ceiling()
                    );
                    self.gas_policy.ceiling()
                }
            },
        }
    }

    async fn transact(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        value: U256,
        pinned_gas: Option<u64>,
    ) -> Result<Outcome, StepCause> {
        let mut request = TxRequest {
            from,
            to,
            data,
            value,
            gas_limit: 0,
        };
        request.gas_limit = self.resolve_gas(&request, pinned_gas).await;

        let receipt = submit_and_confirm(self.node(), request, self.tx_timeout)
            .await
            .map_err(|err| match err {
                NodeError::Timeout { waited_ms, .. } => StepCause::TimedOut { waited_ms },
                other => StepCause::from(other),
            })?;
        if !receipt.success {
            return Err(StepCause::Reverted {
                reason: receipt
                    .revert_reason
                    .unwrap_or_else(|| "execution reverted".to_string()),
            });
        }
        Ok(Outcome {
            tx_hash: Some(receipt.tx_hash),
            block_number: Some(receipt.block_number),
            gas_used: Some(receipt.gas_used),
        })
    }
}
