//! Render contract for the network view.
//!
//! Everything a chart layer needs to paint the circular network, and nothing it
//! does not: node markers with sizes and labels, and per-pair edge lines split into
//! segments whose colours fade from one direction's surprise score to the other's.
//! No caching: every call recomputes from the transcript.

use serde::Serialize;
use std::collections::HashSet;
use tracing::info;

use crate::edges::directed_edges;
use crate::error::{ChatNetError, Result};
use crate::graph::{node_sizes, Incidence, Layout, LayoutKind, NodePositions, WeightedGraph};
use crate::null_model::FitOptions;
use crate::symmetric::{unite_symmetric_edges, PairRecord};
use crate::transcript::Transcript;
use crate::weights::{weight_edges, Normalization, WeightRequest, WeightTable};

pub const COUNT_COLUMN: &str = "count";
pub const CDF_COLUMN: &str = "CDF";
pub const DEVIATIONS_COLUMN: &str = "deviations";
/// Column holding the normalization chosen for node sizes.
pub const SIZE_COLUMN: &str = "size";

const EDGE_SEGMENTS: usize = 40;
const EDGE_WIDTH: f64 = 10.0;
const MARKER_SCALE: f64 = 150.0;
const UNSELECTED_OPACITY: f64 = 0.25;

#[derive(Debug, Clone)]
pub struct DrawOptions {
    pub layout: LayoutKind,
    pub layout_scale: f64,
    pub layout_seed: u64,
    pub edge_segments: usize,
    /// Normalization summed over incoming edges to size nodes.
    pub size_by: Normalization,
    pub unselected_opacity: f64,
    pub fit: FitOptions,
}

impl Default for DrawOptions {
    fn default() -> Self {
        Self {
            layout: LayoutKind::Circular,
            layout_scale: 1.0,
            layout_seed: 42,
            edge_segments: EDGE_SEGMENTS,
            size_by: Normalization::Count,
            unselected_opacity: UNSELECTED_OPACITY,
            fit: FitOptions::default(),
        }
    }
}

/// Positions, sizes and the edge table with `count`, `CDF`, `deviations` and `size` columns.
#[derive(Debug, Clone, Serialize)]
pub struct DrawingParameters {
    pub positions: NodePositions,
    pub sizes: Vec<(String, f64)>,
    pub edges: WeightTable,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeMarker {
    pub user: String,
    pub x: f64,
    pub y: f64,
    /// Fraction of the total node size.
    pub share: f64,
    /// Marker diameter.
    pub size: f64,
    /// Legend entry, e.g. `Ale (42.00%)`.
    pub name: String,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeSegment {
    pub from: (f64, f64),
    pub to: (f64, f64),
    pub weight: f64,
    pub color: String,
    pub width: f64,
}

/// Line between the two users of a pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EdgeTrace {
    /// `source:target`
    pub key: String,
    pub source: String,
    pub target: String,
    pub hover: String,
    pub segments: Vec<EdgeSegment>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Drawing {
    pub markers: Vec<NodeMarker>,
    pub edges: Vec<EdgeTrace>,
    pub pairs: Vec<PairRecord>,
}

fn drawing_request(size_by: Normalization) -> Result<WeightRequest> {
    WeightRequest::new()
        .with(COUNT_COLUMN, Normalization::Count)?
        .with(CDF_COLUMN, Normalization::Cdf)?
        .with(DEVIATIONS_COLUMN, Normalization::Deviation)?
        .with(SIZE_COLUMN, size_by)
}

/// Lay out the count graph and size nodes by their incoming `size_by` weight.
pub fn drawing_parameters(transcript: &Transcript, layout: &dyn Layout, options: &DrawOptions) -> Result<DrawingParameters> {
    let edges = weight_edges(&directed_edges(transcript), &drawing_request(options.size_by)?, &options.fit);
    let graph = WeightedGraph::from_table(&transcript.users(), &edges, COUNT_COLUMN)?;
    let positions = layout.place(&graph);
    let users: Vec<&str> = positions.positions.iter().map(|p| p.user.as_str()).collect();
    let sizes = node_sizes(&users, &edges, SIZE_COLUMN, Incidence::Incoming)?;
    Ok(DrawingParameters { positions, sizes, edges })
}

/// Markers scaled so that the largest one roughly fills its arc of the circle.
pub fn node_markers(positions: &NodePositions, sizes: &[(String, f64)]) -> Vec<NodeMarker> {
    let total: f64 = sizes.iter().map(|(_, s)| s).sum();
    let share_of = |user: &str| -> f64 {
        if total <= 0.0 {
            return 0.0;
        }
        sizes.iter().find(|(u, _)| u == user).map(|(_, s)| s / total).unwrap_or(0.0)
    };

    let max_share = positions.positions.iter().map(|p| share_of(&p.user)).fold(0.0, f64::max);
    let arc = 2.0 * std::f64::consts::PI * positions.mean_radius() / positions.len().max(1) as f64;
    let scale_factor = if max_share > 0.0 {
        arc / 2.0 * (std::f64::consts::PI / max_share).sqrt()
    } else {
        0.0
    };

    positions
        .positions
        .iter()
        .map(|p| {
            let share = share_of(&p.user);
            NodeMarker {
                user: p.user.clone(),
                x: p.x,
                y: p.y,
                share,
                size: share.sqrt() * scale_factor * MARKER_SCALE,
                name: format!("{} ({:.2}%)", p.user, share * 100.0),
                opacity: 1.0,
            }
        })
        .collect()
}

/// Blue-white-red ramp over [0, 1].
pub fn bwr_color(value: f64) -> (u8, u8, u8) {
    let v = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.5 };
    let (r, g, b) = if v < 0.5 {
        let t = v / 0.5;
        (t, t, 1.0)
    } else {
        let t = (v - 0.5) / 0.5;
        (1.0, 1.0 - t, 1.0 - t)
    };
    let byte = |c: f64| (c * 255.0).round() as u8;
    (byte(r), byte(g), byte(b))
}

fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    match n {
        0 => Vec::new(),
        1 => vec![start],
        _ => (0..n).map(|i| start + (end - start) * i as f64 / (n - 1) as f64).collect(),
    }
}

/// One trace per pair, coloured by the `CDF` column and annotated with `deviations`.
pub fn edge_traces(positions: &NodePositions, pairs: &[PairRecord], segments: usize) -> Result<Vec<EdgeTrace>> {
    let segments = segments.max(1);
    pairs
        .iter()
        .map(|pair| {
            let source = positions.get(&pair.source)?;
            let target = positions.get(&pair.target)?;

            let xs = linspace(source.x, target.x, segments + 1);
            let ys = linspace(source.y, target.y, segments + 1);
            let weights = linspace(pair.forward(CDF_COLUMN), pair.backward(CDF_COLUMN), segments);

            let parts = weights
                .iter()
                .enumerate()
                .map(|(i, weight)| {
                    let (r, g, b) = bwr_color(*weight);
                    EdgeSegment {
                        from: (xs[i], ys[i]),
                        to: (xs[i + 1], ys[i + 1]),
                        weight: *weight,
                        color: format!("rgba({}, {}, {}, 255)", r, g, b),
                        width: EDGE_WIDTH,
                    }
                })
                .collect();

            Ok(EdgeTrace {
                key: format!("{}:{}", pair.source, pair.target),
                source: pair.source.clone(),
                target: pair.target.clone(),
                hover: format!(
                    "{} -> {}. Deviated {:.2} σ <br>{} -> {}. Deviated {:.2} σ",
                    pair.source,
                    pair.target,
                    pair.forward(DEVIATIONS_COLUMN),
                    pair.target,
                    pair.source,
                    pair.backward(DEVIATIONS_COLUMN),
                ),
                segments: parts,
            })
        })
        .collect()
}

/// Highlight `selected` users.
///
/// Selected markers are opaque, the rest faded (all of them when nothing is
/// selected). Edges: all of them with no selection, those touching the user with
/// one selected, and only those between selected users with two or more.
pub fn filter_selection(mut drawing: Drawing, selected: &[String], unselected_opacity: f64) -> Result<Drawing> {
    let known: HashSet<&str> = drawing.markers.iter().map(|m| m.user.as_str()).collect();
    if let Some(unknown) = selected.iter().find(|u| !known.contains(u.as_str())) {
        return Err(ChatNetError::UnknownNode(unknown.clone()));
    }

    let chosen: HashSet<&str> = selected.iter().map(|s| s.as_str()).collect();
    for marker in &mut drawing.markers {
        marker.opacity = if chosen.contains(marker.user.as_str()) { 1.0 } else { unselected_opacity };
    }
    if chosen.is_empty() {
        return Ok(drawing);
    }

    let keep = |source: &str, target: &str| {
        if chosen.len() == 1 {
            chosen.contains(source) || chosen.contains(target)
        } else {
            chosen.contains(source) && chosen.contains(target)
        }
    };
    drawing.edges.retain(|e| keep(&e.source, &e.target));
    drawing.pairs.retain(|p| keep(&p.source, &p.target));
    Ok(drawing)
}

/// Full drawing for a transcript, optionally highlighting some users.
pub fn draw(transcript: &Transcript, options: &DrawOptions, selected: &[String]) -> Result<Drawing> {
    let layout = options.layout.build(options.layout_scale, options.layout_seed);
    let params = drawing_parameters(transcript, layout.as_ref(), options)?;
    let pairs = unite_symmetric_edges(&params.edges);
    let drawing = Drawing {
        markers: node_markers(&params.positions, &params.sizes),
        edges: edge_traces(&params.positions, &pairs, options.edge_segments)?,
        pairs,
    };
    info!(
        "[Drawing] {} nodes, {} pair traces",
        drawing.markers.len(),
        drawing.edges.len()
    );
    filter_selection(drawing, selected, options.unselected_opacity)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edges::tests::chat;
    use crate::graph::{CircularLayout, NodePosition};
    use std::collections::BTreeMap;

    const SIX: [&str; 6] = ["Valen", "Bowen", "Ale", "Bowen", "Ale", "Valen"];

    fn pair(source: &str, target: &str, forward: &[(&str, f64)], backward: &[(&str, f64)]) -> PairRecord {
        let map = |values: &[(&str, f64)]| values.iter().map(|(k, v)| (k.to_string(), *v)).collect::<BTreeMap<_, _>>();
        PairRecord {
            pair_id: crate::symmetric::pair_id(source, target),
            source: source.to_string(),
            target: target.to_string(),
            source_to_target: map(forward),
            target_to_source: map(backward),
        }
    }

    fn positions(points: &[(&str, f64, f64)]) -> NodePositions {
        NodePositions {
            positions: points
                .iter()
                .map(|(u, x, y)| NodePosition { user: u.to_string(), x: *x, y: *y })
                .collect(),
        }
    }

    #[test]
    fn test_drawing_parameters() {
        let params = drawing_parameters(&chat(&SIX), &CircularLayout::default(), &DrawOptions::default()).unwrap();
        assert_eq!(params.positions.len(), 3);
        assert_eq!(params.edges.columns, vec![COUNT_COLUMN, CDF_COLUMN, DEVIATIONS_COLUMN, SIZE_COLUMN]);
        // Incoming counts: Valen <- Bowen, Bowen <- Ale x2, Ale <- Bowen, Valen
        assert_eq!(
            params.sizes,
            vec![("Valen".to_string(), 1.0), ("Bowen".to_string(), 2.0), ("Ale".to_string(), 2.0)]
        );
    }

    #[test]
    fn test_sizes_follow_chosen_normalization() {
        let in_edges = DrawOptions { size_by: Normalization::InEdges, ..DrawOptions::default() };
        let params = drawing_parameters(&chat(&SIX), &CircularLayout::default(), &in_edges).unwrap();
        // Every user that received a reply gets a full share of its own incoming edges
        for (user, size) in &params.sizes {
            assert!((size - 1.0).abs() < 1e-12, "{} has size {}", user, size);
        }

        let out_edges = DrawOptions { size_by: Normalization::OutEdges, ..DrawOptions::default() };
        let params = drawing_parameters(&chat(&SIX), &CircularLayout::default(), &out_edges).unwrap();
        assert_eq!(
            params.sizes,
            vec![("Valen".to_string(), 0.5), ("Bowen".to_string(), 1.0), ("Ale".to_string(), 1.5)]
        );

        let drawing = draw(&chat(&SIX), &in_edges, &[]).unwrap();
        assert_eq!(drawing.markers.len(), 3);
        assert!(drawing.markers.iter().all(|m| (m.share - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_node_markers_scale() {
        let pos = positions(&[("A", 1.0, 0.0), ("B", -1.0, 0.0)]);
        let markers = node_markers(&pos, &[("A".to_string(), 3.0), ("B".to_string(), 1.0)]);
        assert_eq!(markers[0].name, "A (75.00%)");
        assert_eq!(markers[1].name, "B (25.00%)");
        // arc = 2π/2 = π, scale = π/2 * sqrt(π/0.75)
        let scale = std::f64::consts::PI / 2.0 * (std::f64::consts::PI / 0.75).sqrt();
        assert!((markers[0].size - 0.75_f64.sqrt() * scale * 150.0).abs() < 1e-9);
        assert!((markers[1].size - 0.5 * scale * 150.0).abs() < 1e-9);
    }

    #[test]
    fn test_node_markers_without_edges() {
        let pos = positions(&[("A", 0.0, 0.0)]);
        let markers = node_markers(&pos, &[("A".to_string(), 0.0)]);
        assert_eq!(markers[0].size, 0.0);
        assert_eq!(markers[0].name, "A (0.00%)");
    }

    #[test]
    fn test_bwr_color() {
        assert_eq!(bwr_color(0.0), (0, 0, 255));
        assert_eq!(bwr_color(0.5), (255, 255, 255));
        assert_eq!(bwr_color(1.0), (255, 0, 0));
        assert_eq!(bwr_color(f64::NAN), (255, 255, 255));
    }

    #[test]
    fn test_edge_trace_segments() {
        let pos = positions(&[("A", 0.0, 0.0), ("B", 4.0, 0.0)]);
        let pairs = vec![pair(
            "A",
            "B",
            &[(CDF_COLUMN, 0.0), (DEVIATIONS_COLUMN, -1.5)],
            &[(CDF_COLUMN, 1.0), (DEVIATIONS_COLUMN, 2.25)],
        )];
        let traces = edge_traces(&pos, &pairs, 4).unwrap();
        assert_eq!(traces.len(), 1);
        let trace = &traces[0];
        assert_eq!(trace.key, "A:B");
        assert_eq!(trace.hover, "A -> B. Deviated -1.50 σ <br>B -> A. Deviated 2.25 σ");
        assert_eq!(trace.segments.len(), 4);
        assert_eq!(trace.segments[0].from, (0.0, 0.0));
        assert_eq!(trace.segments[3].to, (4.0, 0.0));
        assert_eq!(trace.segments[0].color, "rgba(0, 0, 255, 255)");
        assert_eq!(trace.segments[3].color, "rgba(255, 0, 0, 255)");
        assert!((trace.segments[1].weight - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_edge_trace_unknown_endpoint() {
        let pos = positions(&[("A", 0.0, 0.0)]);
        let pairs = vec![pair("A", "Z", &[], &[])];
        assert!(matches!(edge_traces(&pos, &pairs, 4), Err(ChatNetError::UnknownNode(_))));
    }

    #[test]
    fn test_draw_full_pipeline() {
        let drawing = draw(&chat(&SIX), &DrawOptions::default(), &[]).unwrap();
        assert_eq!(drawing.markers.len(), 3);
        // Pairs: Ale-Bowen, Bowen-Valen, Ale-Valen
        assert_eq!(drawing.edges.len(), 3);
        assert_eq!(drawing.pairs.len(), 3);
        assert!(drawing.edges.iter().all(|e| e.segments.len() == EDGE_SEGMENTS));
        // Nothing selected: every marker faded, every edge kept
        assert!(drawing.markers.iter().all(|m| m.opacity == 0.25));
        let total_share: f64 = drawing.markers.iter().map(|m| m.share).sum();
        assert!((total_share - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_selection_filters() {
        let drawing = draw(&chat(&SIX), &DrawOptions::default(), &[]).unwrap();

        let one = filter_selection(drawing.clone(), &["Valen".to_string()], 0.25).unwrap();
        assert_eq!(one.edges.len(), 2);
        assert!(one.edges.iter().all(|e| e.source == "Valen" || e.target == "Valen"));
        for m in &one.markers {
            assert_eq!(m.opacity, if m.user == "Valen" { 1.0 } else { 0.25 });
        }

        let two = filter_selection(drawing.clone(), &["Ale".to_string(), "Bowen".to_string()], 0.25).unwrap();
        assert_eq!(two.edges.len(), 1);
        assert_eq!(two.pairs.len(), 1);

        let err = filter_selection(drawing, &["Nobody".to_string()], 0.25).unwrap_err();
        assert!(matches!(err, ChatNetError::UnknownNode(ref u) if u == "Nobody"));
    }

    #[test]
    fn test_draw_single_user_chat() {
        let drawing = draw(&chat(&["Valen"]), &DrawOptions::default(), &[]).unwrap();
        assert_eq!(drawing.markers.len(), 1);
        assert!(drawing.edges.is_empty());
    }
}
