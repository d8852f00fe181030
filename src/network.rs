//! One transcript, every view of it.
//!
//! `ChatNetwork` owns a parsed transcript and derives edges, weighted tables,
//! graphs and the render contract on demand. Nothing is cached; repeated calls
//! recompute from the records.

use std::path::Path;

use tracing::info;

use crate::drawing::{self, DrawOptions, Drawing, DrawingParameters};
use crate::edges::{self, DirectedEdge};
use crate::error::Result;
use crate::graph::{Layout, TimedGraph, WeightedGraph};
use crate::null_model::{self, FitOptions, NullModel};
use crate::symmetric::{self, PairRecord};
use crate::transcript::{self, ParseOptions, Transcript};
use crate::weights::{self, Normalization, WeightReport, WeightRequest, WeightTable, WEIGHT_COLUMN};

#[derive(Debug, Clone)]
pub struct ChatNetwork {
    transcript: Transcript,
    fit: FitOptions,
}

impl ChatNetwork {
    pub fn new(transcript: Transcript, fit: FitOptions) -> Self {
        Self { transcript, fit }
    }

    pub fn from_file(path: &Path, parse: &ParseOptions, fit: FitOptions) -> Result<Self> {
        let transcript = transcript::read_chat(path, parse)?;
        info!(
            "[Network] {}: {} messages from {} users",
            path.display(),
            transcript.len(),
            transcript.users().len()
        );
        Ok(Self::new(transcript, fit))
    }

    pub fn from_text(content: &str, parse: &ParseOptions, fit: FitOptions) -> Result<Self> {
        Ok(Self::new(transcript::parse_chat(content, parse)?, fit))
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    /// Users in order of first appearance.
    pub fn nodes(&self) -> Vec<String> {
        self.transcript.users()
    }

    pub fn directed_edges(&self) -> Vec<DirectedEdge> {
        edges::directed_edges(&self.transcript)
    }

    pub fn weighted_edges(&self, request: &WeightRequest) -> WeightTable {
        weights::weight_edges(&self.directed_edges(), request, &self.fit)
    }

    /// Weighted table together with the null model fitted for it, if any column needed one.
    pub fn weight_report(&self, request: &WeightRequest) -> WeightReport {
        weights::weight_report(&weights::count_edges(&self.directed_edges()), request, &self.fit)
    }

    /// Fitted null model, or `None` when fewer than two users ever received a reply.
    pub fn null_model(&self) -> Option<NullModel> {
        let counts = weights::count_edges(&self.directed_edges());
        null_model::fit_null_model(&counts, &self.fit)
    }

    /// Weighted graph for one normalization.
    pub fn directed_graph(&self, mode: Normalization) -> Result<WeightedGraph> {
        let table = self.weighted_edges(&WeightRequest::single(mode));
        WeightedGraph::from_table(&self.nodes(), &table, WEIGHT_COLUMN)
    }

    /// One edge per reply instance, keyed by record index.
    pub fn multi_directed_graph(&self) -> TimedGraph {
        TimedGraph::new(&self.nodes(), &self.directed_edges())
    }

    pub fn symmetric_pairs(&self, request: &WeightRequest) -> Vec<PairRecord> {
        symmetric::unite_symmetric_edges(&self.weighted_edges(request))
    }

    pub fn drawing_parameters(&self, layout: &dyn Layout, options: &DrawOptions) -> Result<DrawingParameters> {
        drawing::drawing_parameters(&self.transcript, layout, &self.with_fit(options))
    }

    pub fn draw(&self, options: &DrawOptions, selected: &[String]) -> Result<Drawing> {
        drawing::draw(&self.transcript, &self.with_fit(options), selected)
    }

    fn with_fit(&self, options: &DrawOptions) -> DrawOptions {
        DrawOptions { fit: self.fit.clone(), ..options.clone() }
    }
}
