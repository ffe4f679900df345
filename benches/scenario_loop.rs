use exploit_lab::chain::sim::SimChain;
use exploit_lab::executor::NodeSession;
use exploit_lab::scenario::catalog::{descriptor, plan};
use exploit_lab::scenario::{execute_scenario, AbortHandle, ScenarioId};
use exploit_lab::utils::config::LabConfig;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PERF_BUDGET_MS: u128 = 250;
const BENCH_ROUNDS: usize = 7;

fn median_ms(mut samples: Vec<u128>) -> u128 {
    if samples.is_empty() {
        return 0;
    }
    samples.sort_unstable();
    samples[samples.len() / 2]
}

/// One full catalog pass on a fresh simulated chain. Returns elapsed ms, or the first failure.
async fn run_single_round(config: &LabConfig) -> Result<u128, String> {
    let chain = Arc::new(SimChain::new());
    let session = NodeSession::acquire(chain, Duration::from_secs(1))
        .await
        .map_err(|e| e.to_string())?;

    let started = Instant::now();
    for id in ScenarioId::ALL {
        let invariant = descriptor(id).invariant;
        let outcome = execute_scenario(&session, config, &plan(id), &invariant, AbortHandle::new())
            .await
            .map_err(|e| format!("{id}: {e}"))?;
        outcome.into_result().map_err(|e| format!("{id}: {e}"))?;
    }
    Ok(started.elapsed().as_millis())
}

fn main() {
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(rt) => rt,
        Err(err) => {
            eprintln!("[BENCH][FAIL] failed to construct Tokio runtime: {err}");
            std::process::exit(1);
        }
    };

    let config = LabConfig::default();
    let mut rounds = Vec::with_capacity(BENCH_ROUNDS);
    for _ in 0..BENCH_ROUNDS {
        match runtime.block_on(run_single_round(&config)) {
            Ok(elapsed_ms) => rounds.push(elapsed_ms),
            Err(err) => {
                eprintln!("[BENCH][FAIL] catalog round failed: {err}");
                std::process::exit(1);
            }
        }
    }

    let median = median_ms(rounds.clone());
    println!(
        "[BENCH] scenario_loop rounds_ms={:?} median_ms={} budget_ms={}",
        rounds, median, PERF_BUDGET_MS
    );

    if median > PERF_BUDGET_MS {
        eprintln!(
            "[BENCH][FAIL] catalog loop median {}ms exceeded {}ms budget",
            median, PERF_BUDGET_MS
        );
        std::process::exit(1);
    }

    println!(
        "[BENCH][PASS] catalog loop median {}ms within {}ms budget",
        median, PERF_BUDGET_MS
    );
}
