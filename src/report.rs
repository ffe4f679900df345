//! Human-readable run report for stdout. Logging goes to stderr; this is the pipeline output.

use crate::error::LabError;
use crate::executor::ContractHandle;
use crate::scenario::catalog::{descriptor, ScenarioId};
use crate::scenario::invariants::Invariant;
use crate::scenario::{Binding, ScenarioOutcome};
use alloy::primitives::utils::format_ether;
use std::fmt::Write as _;

pub const EXIT_OK: i32 = 0;
pub const EXIT_FAILED: i32 = 1;
pub const EXIT_USAGE: i32 = 2;

pub fn render_catalog() -> String {
    let mut out = String::new();
    for id in ScenarioId::ALL {
        let descriptor = descriptor(id);
        let attacker = descriptor
            .attacker
            .map(|kind| kind.to_string())
            .unwrap_or_else(|| "EOA only".to_string());
        let _ = writeln!(
            out,
            "[SCENARIO] {:<15} target={} attacker={} :: {}",
            id.as_str(),
            descriptor.target,
            attacker,
            id.summary()
        );
        let _ = writeln!(out, "           invariant: {}", descriptor.invariant);
    }
    out
}

pub fn render_outcome(outcome: &ScenarioOutcome, invariant: &Invariant) -> String {
    let run = &outcome.run;
    let mut out = String::new();
    let _ = writeln!(
        out,
        "[SCENARIO] {} finished in phase {} ({} step(s) mined)",
        run.scenario,
        run.phase,
        run.records.len()
    );

    for (label, binding) in run.bindings.iter() {
        let role = match binding {
            Binding::Identity(_) => "identity".to_string(),
            Binding::Contract(handle) => handle.kind.to_string(),
        };
        let _ = writeln!(out, "[ADDR] {label:<18} {:#x} ({role})", binding.address());
    }

    for (label, _) in run.bindings.iter() {
        let before = run
            .pre_attack
            .as_ref()
            .and_then(|s| s.balance_of(label))
            .map(|b| format!("{} ETH", format_ether(b)))
            .unwrap_or_else(|| "n/a".to_string());
        let after = run
            .post_run
            .as_ref()
            .and_then(|s| s.balance_of(label))
            .map(|b| format!("{} ETH", format_ether(b)))
            .unwrap_or_else(|| "n/a".to_string());
        let _ = writeln!(out, "[BALANCE] {label:<18} before={before} after={after}");
    }

    for record in &run.records {
        let mut line = format!("[STEP] #{} {:<9} {}", record.index, record.phase, record.step);
        if let Some(block) = record.block_number {
            let _ = write!(line, " | block #{block}");
        }
        if let Some(gas) = record.gas_used {
            let _ = write!(line, " | gas {gas}");
        }
        let _ = writeln!(out, "{line}");
    }
    if let Some(failure) = &run.failure {
        let _ = writeln!(out, "[STEP] {failure}");
    }

    match &outcome.verdict {
        Some(verdict) => {
            for clause in &verdict.outcomes {
                let _ = writeln!(
                    out,
                    "[VERDICT] {} {} (observed {})",
                    if clause.holds { "ok  " } else { "FAIL" },
                    clause.clause,
                    clause.observed
                );
            }
            match outcome.violation() {
                None => {
                    let _ = writeln!(out, "[VERDICT] PASS: exploit reproduced ({invariant})");
                }
                Some(violation) => {
                    let _ = writeln!(out, "[VERDICT] FAIL: {violation}");
                }
            }
        }
        None => match &outcome.verify_error {
            Some(err) => {
                let _ = writeln!(out, "[VERDICT] FAIL: invariant could not be evaluated: {err}");
            }
            None => {
                let _ = writeln!(
                    out,
                    "[VERDICT] FAIL: run did not complete; invariant not evaluated"
                );
            }
        },
    }
    out
}

pub fn render_deployments(handles: &[ContractHandle]) -> String {
    let mut out = String::new();
    for handle in handles {
        let _ = writeln!(
            out,
            "[ADDR] {:<18} {:#x} ({}, block #{})",
            handle.label, handle.address, handle.kind, handle.block_number
        );
    }
    out
}

/// Only a completed run whose invariant was read and holds counts as a pass.
pub fn exit_code(outcome: &ScenarioOutcome) -> i32 {
    match &outcome.verdict {
        Some(verdict) if verdict.holds() && outcome.run.failure.is_none() => EXIT_OK,
        _ => EXIT_FAILED,
    }
}

/// Step failures and violations are scenario results; everything else is an environment problem.
pub fn exit_code_for_error(err: &LabError) -> i32 {
    match err {
        LabError::Step(_) | LabError::Violation(_) => EXIT_FAILED,
        _ => EXIT_USAGE,
    }
}
