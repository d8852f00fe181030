//! Independent-posting null model.
//!
//! Each message author is drawn independently from a per-user popularity `p`, with the
//! constraint that two consecutive authors differ. Under that model a user's share of
//! received replies is proportional to `p_u - p_u²`, so `p` is fitted by matching that
//! share against the observed in-degree shares. Expected pair counts then follow from
//! `p_source * p_target` over all ordered pairs of distinct users.
//!
//! All functions are pure and deterministic.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::weights::EdgeCounts;

/// Standard deviation used in place of an exactly-zero one.
pub const STD_FLOOR: f64 = 1e-3;

const DEFAULT_TOLERANCE: f64 = 1e-8;
const DEFAULT_MAX_ITERATIONS: usize = 5000;

/// Sufficient decrease factor for the Armijo line search.
const ARMIJO: f64 = 1e-4;
const MAX_BACKTRACKS: usize = 60;
const MAX_STEP: f64 = 1e6;

#[derive(Debug, Clone)]
pub struct FitOptions {
    pub tolerance: f64,
    pub max_iterations: usize,
    pub std_floor: f64,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            tolerance: DEFAULT_TOLERANCE,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            std_floor: STD_FLOOR,
        }
    }
}

/// Result of fitting popularities on the probability simplex.
#[derive(Debug, Clone, Serialize)]
pub struct PopularityFit {
    pub probabilities: Vec<f64>,
    /// Euclidean distance between modelled and observed shares at the optimum.
    pub objective: f64,
    pub iterations: usize,
    pub converged: bool,
}

/// Fitted model plus the expected count of every ordered pair of distinct users.
#[derive(Debug, Clone, Serialize)]
pub struct NullModel {
    /// Users that received at least one reply, sorted.
    pub nodes: Vec<String>,
    pub fit: PopularityFit,
    pub expected: BTreeMap<(String, String), f64>,
}

// =============================================================================
// Popularity fit
// =============================================================================

/// Shares `(p - p²) / Σ(p - p²)`, or `None` when every user sits at 0 or 1.
fn modelled_shares(p: &[f64]) -> Option<Vec<f64>> {
    let g: Vec<f64> = p.iter().map(|x| x - x * x).collect();
    let total: f64 = g.iter().sum();
    if total <= f64::EPSILON {
        return None;
    }
    Some(g.into_iter().map(|x| x / total).collect())
}

/// Squared distance to the observed shares. Same minimiser as the distance itself,
/// but smooth at the optimum.
fn squared_distance(p: &[f64], observed: &[f64]) -> f64 {
    match modelled_shares(p) {
        Some(shares) => shares.iter().zip(observed).map(|(s, o)| (s - o).powi(2)).sum(),
        None => f64::INFINITY,
    }
}

fn gradient(p: &[f64], observed: &[f64]) -> Vec<f64> {
    let g: Vec<f64> = p.iter().map(|x| x - x * x).collect();
    let total: f64 = g.iter().sum();
    if total <= f64::EPSILON {
        return vec![0.0; p.len()];
    }
    let shares: Vec<f64> = g.iter().map(|x| x / total).collect();
    let residual: Vec<f64> = shares.iter().zip(observed).map(|(s, o)| s - o).collect();
    let weighted: f64 = residual.iter().zip(&shares).map(|(r, s)| r * s).sum();

    p.iter()
        .zip(&residual)
        .map(|(pk, rk)| 2.0 * (1.0 - 2.0 * pk) / total * (rk - weighted))
        .collect()
}

/// Euclidean projection onto `{x : x_i >= 0, Σx = 1}`. Also enforces `x_i <= 1`.
pub fn project_onto_simplex(v: &[f64]) -> Vec<f64> {
    if v.is_empty() {
        return Vec::new();
    }
    let mut sorted = v.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));

    let mut cumulative = 0.0;
    let mut theta = 0.0;
    for (i, value) in sorted.iter().enumerate() {
        cumulative += value;
        let candidate = (cumulative - 1.0) / (i + 1) as f64;
        if value - candidate > 0.0 {
            theta = candidate;
        }
    }

    v.iter().map(|x| (x - theta).max(0.0)).collect()
}

/// Minimise `‖(p - p²)/Σ(p - p²) - observed‖` over the probability simplex, starting
/// from the observed shares. Projected gradient descent with Armijo backtracking.
pub fn fit_popularity(observed: &[f64], options: &FitOptions) -> PopularityFit {
    let mut p = project_onto_simplex(observed);
    let mut value = squared_distance(&p, observed);
    let mut step = 1.0;
    let mut iterations = 0;
    let mut converged = false;

    while iterations < options.max_iterations {
        if value.sqrt() <= options.tolerance {
            converged = true;
            break;
        }

        let grad = gradient(&p, observed);
        let mut accepted = None;
        let mut t = step;
        for _ in 0..MAX_BACKTRACKS {
            let trial: Vec<f64> = p.iter().zip(&grad).map(|(x, g)| x - t * g).collect();
            let candidate = project_onto_simplex(&trial);
            let candidate_value = squared_distance(&candidate, observed);
            let decrease: f64 = grad.iter().zip(candidate.iter().zip(&p)).map(|(g, (c, x))| g * (c - x)).sum();
            if candidate_value <= value + ARMIJO * decrease {
                accepted = Some((candidate, candidate_value, t));
                break;
            }
            t *= 0.5;
        }

        iterations += 1;
        let Some((candidate, candidate_value, t)) = accepted else {
            // No step decreases the objective: stationary point.
            converged = true;
            break;
        };

        let moved = candidate.iter().zip(&p).map(|(c, x)| (c - x).powi(2)).sum::<f64>().sqrt();
        let improvement = value - candidate_value;
        p = candidate;
        value = candidate_value;
        step = (t * 2.0).min(MAX_STEP);

        if moved < options.tolerance || improvement.abs() < options.tolerance * options.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        warn!(
            "[NullModel] Fit stopped after {} iterations (distance {:.3e})",
            iterations,
            value.sqrt()
        );
    }

    PopularityFit {
        probabilities: p,
        objective: value.sqrt(),
        iterations,
        converged,
    }
}

// =============================================================================
// Expected counts
// =============================================================================

/// Fit the null model to an observed pair-count table.
///
/// Returns `None` when fewer than two users ever received a reply: no ordered pair
/// of distinct users exists to spread the expectation over.
pub fn fit_null_model(counts: &EdgeCounts, options: &FitOptions) -> Option<NullModel> {
    let mut received: BTreeMap<&str, usize> = BTreeMap::new();
    for ((_, target), count) in counts {
        *received.entry(target.as_str()).or_insert(0) += count;
    }
    if received.len() < 2 {
        return None;
    }

    let total: usize = received.values().sum();
    let nodes: Vec<String> = received.keys().map(|n| n.to_string()).collect();
    let observed: Vec<f64> = received.values().map(|c| *c as f64 / total as f64).collect();

    let fit = fit_popularity(&observed, options);
    debug!(
        "[NullModel] {} nodes, distance {:.3e} after {} iterations",
        nodes.len(),
        fit.objective,
        fit.iterations
    );

    let p = &fit.probabilities;
    let mut products: Vec<((String, String), f64)> = Vec::with_capacity(nodes.len() * (nodes.len() - 1));
    for (i, source) in nodes.iter().enumerate() {
        for (j, target) in nodes.iter().enumerate() {
            if i != j {
                products.push(((source.clone(), target.clone()), p[i] * p[j]));
            }
        }
    }

    let mass: f64 = products.iter().map(|(_, w)| w).sum();
    if mass <= 0.0 {
        warn!("[NullModel] Fitted popularities leave no mass on any pair");
        return None;
    }

    let expected = products
        .into_iter()
        .map(|(pair, w)| (pair, w / mass * total as f64))
        .collect();

    Some(NullModel { nodes, fit, expected })
}

/// Binomial standard deviation of every expected pair count.
///
/// For each target the incoming expectation is `n` trials, and a source's share of
/// it is the success probability. Exactly-zero deviations are replaced by `floor`.
pub fn standard_deviations(expected: &BTreeMap<(String, String), f64>, floor: f64) -> BTreeMap<(String, String), f64> {
    let mut incoming: BTreeMap<&str, f64> = BTreeMap::new();
    for ((_, target), value) in expected {
        *incoming.entry(target.as_str()).or_insert(0.0) += value;
    }

    expected
        .iter()
        .filter_map(|((source, target), value)| {
            let trials = incoming.get(target.as_str()).copied().unwrap_or(0.0);
            if trials <= 0.0 {
                return None;
            }
            let probability = value / trials;
            let std = (trials * probability * (1.0 - probability)).max(0.0).sqrt();
            let std = if std == 0.0 { floor } else { std };
            Some(((source.clone(), target.clone()), std))
        })
        .collect()
}

/// Signed distance, in standard deviations, between observed and expected counts.
/// Only pairs present in both tables are scored.
pub fn deviations(counts: &EdgeCounts, model: &NullModel, floor: f64) -> BTreeMap<(String, String), f64> {
    let stds = standard_deviations(&model.expected, floor);
    counts
        .iter()
        .filter_map(|(pair, observed)| {
            let expected = model.expected.get(pair)?;
            let std = stds.get(pair)?;
            Some((pair.clone(), (*observed as f64 - expected) / std))
        })
        .collect()
}

// =============================================================================
// Normal distribution
// =============================================================================

/// Complementary error function (Chebyshev fit, fractional error < 1.2e-7).
fn erfc(x: f64) -> f64 {
    let z = x.abs();
    let t = 1.0 / (1.0 + 0.5 * z);
    let poly = -z * z - 1.265_512_23
        + t * (1.000_023_68
            + t * (0.374_091_96
                + t * (0.096_784_18
                    + t * (-0.186_288_06
                        + t * (0.278_868_07
                            + t * (-1.135_203_98
                                + t * (1.488_515_87 + t * (-0.822_152_23 + t * 0.170_872_77))))))));
    let ans = t * poly.exp();
    if x >= 0.0 {
        ans
    } else {
        2.0 - ans
    }
}

/// Standard normal CDF.
pub fn normal_cdf(x: f64) -> f64 {
    0.5 * erfc(-x / std::f64::consts::SQRT_2)
}
