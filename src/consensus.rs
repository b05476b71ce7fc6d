//! Consensus Arbiter (C8): combines stage results from multiple parallel
//! worker invocations into a single representative verdict.
//!
//! Grounded on the voting strategies of `consensus/voting.py` and
//! `consensus/mechanisms.py` in the original implementation, reshaped into
//! the combination rules of spec.md §4.8.

use crate::config::{ConsensusConfig, ConsensusRule};
use crate::context::StageResult;

/// Outcome of applying a consensus rule to a set of stage results.
#[derive(Debug, Clone)]
pub struct ConsensusOutcome {
    pub reached: bool,
    pub agreement_ratio: f64,
    pub selected: StageResult,
}

/// Combine `results` (one per participating worker) under `config.rule`.
/// `results` must be non-empty. When fewer than `config.min_agents` results
/// are present, the spec's fallback applies: single-worker execution, i.e.
/// the lone result is returned with `reached = true` and ratio `1.0`.
pub fn arbitrate(config: &ConsensusConfig, results: Vec<StageResult>) -> ConsensusOutcome {
    assert!(!results.is_empty(), "arbitrate requires at least one result");

    if results.len() < config.min_agents {
        if let Some(selected) = results.first().cloned() {
            return ConsensusOutcome {
                reached: true,
                agreement_ratio: 1.0,
                selected,
            };
        }
    }

    match config.rule {
        ConsensusRule::Majority => majority(&results, config.threshold, None),
        ConsensusRule::Weighted => majority(&results, config.threshold, Some(config)),
        ConsensusRule::Unanimous => unanimous(&results),
        ConsensusRule::Threshold => threshold(&results, config.threshold),
        ConsensusRule::Median => pivot(&results, Pivot::Median),
        ConsensusRule::Average => pivot(&results, Pivot::Average),
    }
}

fn fallback(results: &[StageResult]) -> StageResult {
    results
        .iter()
        .find(|r| r.ok)
        .cloned()
        .unwrap_or_else(|| results[0].clone())
}

fn majority(results: &[StageResult], threshold: f64, weighted: Option<&ConsensusConfig>) -> ConsensusOutcome {
    let total = results.len() as f64;
    let (ok_weight, not_ok_weight, ok_count, not_ok_count) =
        results.iter().fold((0.0, 0.0, 0usize, 0usize), |(ow, nw, oc, nc), r| {
            let weight = match weighted {
                Some(cfg) => {
                    let agent_weight = cfg.agent_weights.get(&r.stage_id).copied().unwrap_or(1.0);
                    agent_weight * confidence_of(r)
                }
                None => 1.0,
            };
            if r.ok {
                (ow + weight, nw, oc + 1, nc)
            } else {
                (ow, nw + weight, oc, nc + 1)
            }
        });

    let side_ok = ok_weight > not_ok_weight;
    let strictly_greater = if weighted.is_some() {
        ok_weight != not_ok_weight && side_ok
    } else {
        ok_count > not_ok_count
    };

    let majority_count = if side_ok { ok_count } else { not_ok_count };
    let ratio = majority_count as f64 / total;

    let reached = strictly_greater && ratio >= threshold;
    let selected = if reached {
        results
            .iter()
            .find(|r| r.ok == side_ok)
            .cloned()
            .unwrap_or_else(|| fallback(results))
    } else {
        fallback(results)
    };

    ConsensusOutcome {
        reached,
        agreement_ratio: ratio,
        selected,
    }
}

fn confidence_of(_r: &StageResult) -> f64 {
    // Per-vote confidence is carried by the worker's own result metadata in
    // the general case; stage results here do not expose a separate
    // confidence field, so weighted votes default to full confidence.
    1.0
}

fn unanimous(results: &[StageResult]) -> ConsensusOutcome {
    let all_ok = results.iter().all(|r| r.ok);
    let all_failed = results.iter().all(|r| !r.ok);
    let reached = all_ok || all_failed;
    let ratio = if reached { 1.0 } else { 0.0 };
    ConsensusOutcome {
        reached,
        agreement_ratio: ratio,
        selected: if reached {
            results[0].clone()
        } else {
            fallback(results)
        },
    }
}

fn threshold(results: &[StageResult], success_threshold: f64) -> ConsensusOutcome {
    let total = results.len() as f64;
    let ok_count = results.iter().filter(|r| r.ok).count() as f64;
    let ok_ratio = ok_count / total;
    let fail_ratio = 1.0 - ok_ratio;

    if ok_ratio >= success_threshold {
        ConsensusOutcome {
            reached: true,
            agreement_ratio: ok_ratio,
            selected: results.iter().find(|r| r.ok).cloned().unwrap_or_else(|| fallback(results)),
        }
    } else if fail_ratio >= success_threshold {
        ConsensusOutcome {
            reached: true,
            agreement_ratio: fail_ratio,
            selected: results.iter().find(|r| !r.ok).cloned().unwrap_or_else(|| fallback(results)),
        }
    } else {
        ConsensusOutcome {
            reached: false,
            agreement_ratio: ok_ratio.max(fail_ratio),
            selected: fallback(results),
        }
    }
}

enum Pivot {
    Median,
    Average,
}

/// For numeric result fields (elapsed): select the result closest to the
/// median/mean elapsed; agreement ratio is the fraction within 10% of that
/// pivot.
fn pivot(results: &[StageResult], kind: Pivot) -> ConsensusOutcome {
    let mut elapsed_ms: Vec<f64> = results.iter().map(|r| r.elapsed.as_millis() as f64).collect();
    let pivot_value = match kind {
        Pivot::Average => elapsed_ms.iter().sum::<f64>() / elapsed_ms.len() as f64,
        Pivot::Median => {
            elapsed_ms.sort_by(|a, b| a.total_cmp(b));
            let mid = elapsed_ms.len() / 2;
            if elapsed_ms.len() % 2 == 0 {
                (elapsed_ms[mid - 1] + elapsed_ms[mid]) / 2.0
            } else {
                elapsed_ms[mid]
            }
        }
    };

    let selected = results
        .iter()
        .min_by(|a, b| {
            let da = (a.elapsed.as_millis() as f64 - pivot_value).abs();
            let db = (b.elapsed.as_millis() as f64 - pivot_value).abs();
            da.total_cmp(&db)
        })
        .cloned()
        .unwrap_or_else(|| fallback(results));

    let within_10pct = results
        .iter()
        .filter(|r| {
            let v = r.elapsed.as_millis() as f64;
            pivot_value == 0.0 || ((v - pivot_value).abs() / pivot_value) <= 0.10
        })
        .count();
    let ratio = within_10pct as f64 / results.len() as f64;

    ConsensusOutcome {
        reached: true,
        agreement_ratio: ratio,
        selected,
    }
}
