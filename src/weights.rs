//! Edge weighting engine.
//!
//! Turns the multiset of reply instances into one weight per ordered pair of distinct
//! users. Several normalizations can be requested at once, each bound to its own
//! output column; they are all computed from the same pair-count table and merged on
//! the (source, target) key.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::edges::DirectedEdge;
use crate::error::{ChatNetError, Result};
use crate::null_model::{self, FitOptions, NullModel};

/// Observed instances per ordered (source, target) pair, self-transitions excluded.
pub type EdgeCounts = BTreeMap<(String, String), usize>;

/// Column name used when a single normalization is requested.
pub const WEIGHT_COLUMN: &str = "weight";

pub const DEVIATION_LONG_NAME: &str = "MLE_multinomial_distribution_difference_in_standard_deviations";
pub const CDF_LONG_NAME: &str = "MLE_multinomial_distribution_CDF";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normalization {
    /// Raw number of instances.
    #[default]
    Count,
    /// Share of the source's outgoing instances.
    OutEdges,
    /// Share of the target's incoming instances.
    InEdges,
    /// Standard deviations away from the null-model expectation.
    Deviation,
    /// Standard normal CDF of the deviation.
    #[serde(rename = "CDF")]
    Cdf,
}

impl Normalization {
    pub const ALL: [Normalization; 5] = [
        Normalization::Count,
        Normalization::OutEdges,
        Normalization::InEdges,
        Normalization::Deviation,
        Normalization::Cdf,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Normalization::Count => "count",
            Normalization::OutEdges => "out_edges",
            Normalization::InEdges => "in_edges",
            Normalization::Deviation => "deviation",
            Normalization::Cdf => "CDF",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "count" => Some(Normalization::Count),
            "out_edges" => Some(Normalization::OutEdges),
            "in_edges" => Some(Normalization::InEdges),
            "deviation" | DEVIATION_LONG_NAME => Some(Normalization::Deviation),
            "CDF" | CDF_LONG_NAME => Some(Normalization::Cdf),
            _ => None,
        }
    }

    /// Like [`Normalization::from_str`], failing with the offending name.
    pub fn parse(s: &str) -> Result<Self> {
        Self::from_str(s).ok_or_else(|| ChatNetError::UnknownNormalization(s.to_string()))
    }

    pub fn needs_null_model(&self) -> bool {
        matches!(self, Normalization::Deviation | Normalization::Cdf)
    }
}

/// Output columns to compute, in order.
#[derive(Debug, Clone, Default)]
pub struct WeightRequest {
    columns: Vec<(String, Normalization)>,
}

impl WeightRequest {
    pub fn new() -> Self {
        Self::default()
    }

    /// One column named [`WEIGHT_COLUMN`].
    pub fn single(mode: Normalization) -> Self {
        Self { columns: vec![(WEIGHT_COLUMN.to_string(), mode)] }
    }

    pub fn with(mut self, column: &str, mode: Normalization) -> Result<Self> {
        if self.columns.iter().any(|(name, _)| name == column) {
            return Err(ChatNetError::DuplicateColumn(column.to_string()));
        }
        self.columns.push((column.to_string(), mode));
        Ok(self)
    }

    /// Build a request from `(column, mode name)` pairs. Every name is validated
    /// before anything is computed.
    pub fn parse<'a, I>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        pairs
            .into_iter()
            .try_fold(Self::new(), |request, (column, mode)| request.with(column, Normalization::parse(mode)?))
    }

    pub fn columns(&self) -> &[(String, Normalization)] {
        &self.columns
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// One ordered pair with its weights, keyed by column name. A column is absent when
/// that normalization has no value for the pair (e.g. the null model does not cover
/// a source that never received a reply).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WeightedEdge {
    pub source: String,
    pub target: String,
    pub weights: BTreeMap<String, f64>,
}

impl WeightedEdge {
    pub fn weight(&self, column: &str) -> Option<f64> {
        self.weights.get(column).copied()
    }
}

/// Weighted edge table sorted by (source, target).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeightTable {
    pub columns: Vec<String>,
    pub edges: Vec<WeightedEdge>,
}

impl WeightTable {
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.columns.iter().any(|c| c == column)
    }

    pub fn get(&self, source: &str, target: &str) -> Option<&WeightedEdge> {
        self.edges.iter().find(|e| e.source == source && e.target == target)
    }

    /// `(source, target, weight)` rows that have a value in `column`.
    pub fn column(&self, column: &str) -> Result<Vec<(&str, &str, f64)>> {
        if !self.has_column(column) {
            return Err(ChatNetError::MissingColumn(column.to_string()));
        }
        Ok(self
            .edges
            .iter()
            .filter_map(|e| e.weight(column).map(|w| (e.source.as_str(), e.target.as_str(), w)))
            .collect())
    }
}

/// Count instances per ordered pair, skipping self-transitions.
pub fn count_edges(edges: &[DirectedEdge]) -> EdgeCounts {
    let mut counts = EdgeCounts::new();
    for edge in edges.iter().filter(|e| !e.is_self_loop()) {
        *counts.entry((edge.source.clone(), edge.target.clone())).or_insert(0) += 1;
    }
    counts
}

/// Divide each count by the total of its group (source or target).
fn normalize_by<F>(counts: &EdgeCounts, group_of: F) -> BTreeMap<(String, String), f64>
where
    F: Fn(&(String, String)) -> &str,
{
    let mut totals: BTreeMap<&str, usize> = BTreeMap::new();
    for (pair, count) in counts {
        *totals.entry(group_of(pair)).or_insert(0) += count;
    }
    counts
        .iter()
        .map(|(pair, count)| (pair.clone(), *count as f64 / totals[group_of(pair)] as f64))
        .collect()
}

/// Compute every requested column over the same count table.
pub fn weight_edges(edges: &[DirectedEdge], request: &WeightRequest, options: &FitOptions) -> WeightTable {
    weight_counts(&count_edges(edges), request, options)
}

pub fn weight_counts(counts: &EdgeCounts, request: &WeightRequest, options: &FitOptions) -> WeightTable {
    weight_report(counts, request, options).table
}

/// Weight table plus the null model behind its deviation columns, when one was fitted.
#[derive(Debug, Clone, Serialize)]
pub struct WeightReport {
    pub table: WeightTable,
    pub model: Option<NullModel>,
}

/// Like [`weight_counts`], keeping the fitted model for convergence reporting.
pub fn weight_report(counts: &EdgeCounts, request: &WeightRequest, options: &FitOptions) -> WeightReport {
    let columns: Vec<String> = request.columns().iter().map(|(name, _)| name.clone()).collect();

    let model = if request.columns().iter().any(|(_, mode)| mode.needs_null_model()) {
        null_model::fit_null_model(counts, options)
    } else {
        None
    };
    let deviations = model
        .as_ref()
        .map(|m| null_model::deviations(counts, m, options.std_floor))
        .unwrap_or_default();

    let mut rows: BTreeMap<(String, String), BTreeMap<String, f64>> = BTreeMap::new();
    for (column, mode) in request.columns() {
        let values: BTreeMap<(String, String), f64> = match mode {
            Normalization::Count => counts.iter().map(|(pair, c)| (pair.clone(), *c as f64)).collect(),
            Normalization::OutEdges => normalize_by(counts, |(source, _)| source.as_str()),
            Normalization::InEdges => normalize_by(counts, |(_, target)| target.as_str()),
            Normalization::Deviation => deviations.clone(),
            Normalization::Cdf => deviations
                .iter()
                .map(|(pair, d)| (pair.clone(), null_model::normal_cdf(*d)))
                .collect(),
        };
        for (pair, value) in values {
            rows.entry(pair).or_default().insert(column.clone(), value);
        }
    }

    debug!(
        "[Weights] {} pairs, columns {:?}",
        rows.len(),
        request.columns().iter().map(|(c, m)| format!("{}={}", c, m.as_str())).collect::<Vec<_>>()
    );

    let table = WeightTable {
        columns,
        edges: rows
            .into_iter()
            .map(|((source, target), weights)| WeightedEdge { source, target, weights })
            .collect(),
    };
    WeightReport { table, model }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::directed_edges;
    use crate::edges::tests::{chat, edge};
    use proptest::prelude::*;

    fn weights(users: &[&str], request: &WeightRequest) -> WeightTable {
        weight_edges(&directed_edges(&chat(users)), request, &FitOptions::default())
    }

    fn rows(table: &WeightTable, column: &str) -> Vec<(String, String, f64)> {
        table
            .column(column)
            .unwrap()
            .into_iter()
            .map(|(s, t, w)| (s.to_string(), t.to_string(), w))
            .collect()
    }

    fn row(source: &str, target: &str, weight: f64) -> (String, String, f64) {
        (source.to_string(), target.to_string(), weight)
    }

    const FIVE: [&str; 5] = ["Valen", "Bowen", "Ale", "Bowen", "Ale"];
    const SIX: [&str; 6] = ["Valen", "Bowen", "Ale", "Bowen", "Ale", "Valen"];

    #[test]
    fn test_count_weights() {
        let table = weights(&FIVE, &WeightRequest::single(Normalization::Count));
        assert_eq!(table.columns, vec![WEIGHT_COLUMN]);
        assert_eq!(
            rows(&table, WEIGHT_COLUMN),
            vec![row("Ale", "Bowen", 2.0), row("Bowen", "Ale", 1.0), row("Bowen", "Valen", 1.0)]
        );
    }

    #[test]
    fn test_out_edges_weights() {
        let table = weights(&FIVE, &WeightRequest::single(Normalization::OutEdges));
        assert_eq!(
            rows(&table, WEIGHT_COLUMN),
            vec![row("Ale", "Bowen", 1.0), row("Bowen", "Ale", 0.5), row("Bowen", "Valen", 0.5)]
        );
    }

    #[test]
    fn test_in_edges_weights() {
        let table = weights(&SIX, &WeightRequest::single(Normalization::InEdges));
        assert_eq!(
            rows(&table, WEIGHT_COLUMN),
            vec![
                row("Ale", "Bowen", 1.0),
                row("Bowen", "Ale", 0.5),
                row("Bowen", "Valen", 1.0),
                row("Valen", "Ale", 0.5),
            ]
        );
    }

    #[test]
    fn test_named_columns_in_one_request() {
        let request = WeightRequest::parse([
            ("Cuantos", "count"),
            ("PorcentajeRecibidos", "in_edges"),
            ("PorcentajeEnviados", "out_edges"),
        ])
        .unwrap();
        let table = weights(&FIVE, &request);
        assert_eq!(table.columns, vec!["Cuantos", "PorcentajeRecibidos", "PorcentajeEnviados"]);
        assert_eq!(table.len(), 3);

        let bowen_valen = table.get("Bowen", "Valen").unwrap();
        assert_eq!(bowen_valen.weight("Cuantos"), Some(1.0));
        assert_eq!(bowen_valen.weight("PorcentajeRecibidos"), Some(1.0));
        assert_eq!(bowen_valen.weight("PorcentajeEnviados"), Some(0.5));

        let ale_bowen = table.get("Ale", "Bowen").unwrap();
        assert_eq!(ale_bowen.weight("Cuantos"), Some(2.0));
        assert_eq!(ale_bowen.weight("PorcentajeEnviados"), Some(1.0));
    }

    #[test]
    fn test_unknown_normalization_is_rejected() {
        let err = WeightRequest::parse([("weight", "count"), ("other", "unknown_normalization")]).unwrap_err();
        match err {
            ChatNetError::UnknownNormalization(name) => assert_eq!(name, "unknown_normalization"),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_column_is_rejected() {
        let err = WeightRequest::parse([("w", "count"), ("w", "CDF")]).unwrap_err();
        assert!(matches!(err, ChatNetError::DuplicateColumn(ref c) if c == "w"));
    }

    #[test]
    fn test_long_mode_names() {
        assert_eq!(Normalization::parse(DEVIATION_LONG_NAME).unwrap(), Normalization::Deviation);
        assert_eq!(Normalization::parse(CDF_LONG_NAME).unwrap(), Normalization::Cdf);
        for mode in Normalization::ALL {
            assert_eq!(Normalization::parse(mode.as_str()).unwrap(), mode);
        }
    }

    #[test]
    fn test_missing_column_lookup_fails() {
        let table = weights(&FIVE, &WeightRequest::single(Normalization::Count));
        assert!(matches!(table.column("CDF"), Err(ChatNetError::MissingColumn(_))));
    }

    #[test]
    fn test_cdf_is_normal_cdf_of_deviation() {
        let request = WeightRequest::new()
            .with("count", Normalization::Count).unwrap()
            .with("deviations", Normalization::Deviation).unwrap()
            .with("CDF", Normalization::Cdf).unwrap();
        let table = weights(&["A", "B", "C", "A", "B", "A", "C", "B", "C", "A", "D", "A", "B"], &request);
        assert!(!table.is_empty());

        let mut scored = 0;
        for edge in &table.edges {
            assert!(edge.weight("count").is_some());
            match (edge.weight("deviations"), edge.weight("CDF")) {
                (Some(d), Some(c)) => {
                    assert!(d.is_finite());
                    assert!((0.0..=1.0).contains(&c));
                    assert!((c - null_model::normal_cdf(d)).abs() < 1e-12);
                    scored += 1;
                }
                (None, None) => {}
                other => panic!("deviation and CDF disagree: {:?}", other),
            }
        }
        assert!(scored > 0);
    }

    #[test]
    fn test_deviation_skips_sources_outside_model() {
        // Valen only ever speaks first, so never receives a reply
        let request = WeightRequest::new()
            .with("count", Normalization::Count).unwrap()
            .with("deviations", Normalization::Deviation).unwrap();
        let table = weight_edges(
            &[edge("Valen", "Ale"), edge("Ale", "Dani"), edge("Dani", "Ale")],
            &request,
            &FitOptions::default(),
        );
        assert_eq!(table.len(), 3);
        let valen_ale = table.get("Valen", "Ale").unwrap();
        assert_eq!(valen_ale.weight("count"), Some(1.0));
        assert_eq!(valen_ale.weight("deviations"), None);
        assert_eq!(rows(&table, "deviations").len(), 2);
    }

    #[test]
    fn test_deviation_only_request_drops_unscored_rows() {
        let table = weight_edges(
            &[edge("Valen", "Ale"), edge("Ale", "Dani"), edge("Dani", "Ale")],
            &WeightRequest::single(Normalization::Deviation),
            &FitOptions::default(),
        );
        assert_eq!(table.len(), 2);
        assert!(table.get("Valen", "Ale").is_none());
    }

    #[test]
    fn test_report_keeps_model_only_when_needed() {
        let counts = count_edges(&directed_edges(&chat(&FIVE)));
        let options = FitOptions::default();

        let report = weight_report(&counts, &WeightRequest::single(Normalization::Deviation), &options);
        let model = report.model.unwrap();
        let total: f64 = model.fit.probabilities.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert_eq!(report.table, weight_counts(&counts, &WeightRequest::single(Normalization::Deviation), &options));

        let plain = weight_report(&counts, &WeightRequest::single(Normalization::OutEdges), &options);
        assert!(plain.model.is_none());
        assert_eq!(plain.table.len(), 3);
    }

    #[test]
    fn test_single_user_gives_empty_table() {
        let request = WeightRequest::parse([("count", "count"), ("CDF", "CDF")]).unwrap();
        assert!(weights(&["Valen"], &request).is_empty());
        assert!(weights(&[], &request).is_empty());
    }

    #[test]
    fn test_self_transitions_are_excluded() {
        let table = weights(&["Ale", "Ale", "Dani", "Dani", "Ale"], &WeightRequest::single(Normalization::Count));
        assert_eq!(rows(&table, WEIGHT_COLUMN), vec![row("Ale", "Dani", 1.0), row("Dani", "Ale", 1.0)]);
    }

    proptest! {
        #[test]
        fn prop_normalized_weights_sum_to_one(users in proptest::collection::vec(0..4usize, 2..60)) {
            let names: Vec<&str> = users.iter().map(|u| ["A", "B", "C", "D"][*u]).collect();
            let request = WeightRequest::parse([("count", "count"), ("out", "out_edges"), ("in", "in_edges")]).unwrap();
            let edges = directed_edges(&chat(&names));
            let table = weight_edges(&edges, &request, &FitOptions::default());

            let mut out_sums: BTreeMap<&str, f64> = BTreeMap::new();
            let mut in_sums: BTreeMap<&str, f64> = BTreeMap::new();
            let mut count_sums: BTreeMap<&str, f64> = BTreeMap::new();
            for e in &table.edges {
                *out_sums.entry(e.source.as_str()).or_insert(0.0) += e.weight("out").unwrap();
                *in_sums.entry(e.target.as_str()).or_insert(0.0) += e.weight("in").unwrap();
                *count_sums.entry(e.source.as_str()).or_insert(0.0) += e.weight("count").unwrap();
            }
            for sum in out_sums.values().chain(in_sums.values()) {
                prop_assert!((sum - 1.0).abs() < 1e-9);
            }
            for (source, sum) in count_sums {
                let outgoing = edges.iter().filter(|e| e.source == source && !e.is_self_loop()).count();
                prop_assert_eq!(sum as usize, outgoing);
            }
        }
    }
}
