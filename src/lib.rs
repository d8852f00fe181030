//! Reply networks from exported group-chat transcripts.
//!
//! Pipeline: [`transcript`] parses the export into message records, [`edges`] turns
//! consecutive senders into reply instances, [`weights`] aggregates and normalizes
//! them (including the [`null_model`] deviation scores), and [`graph`],
//! [`symmetric`] and [`drawing`] shape the result for a renderer.
//! [`network::ChatNetwork`] ties the stages together for one transcript.

pub mod drawing;
pub mod edges;
pub mod error;
pub mod graph;
pub mod network;
pub mod null_model;
pub mod settings;
pub mod symmetric;
pub mod transcript;
pub mod weights;

pub use error::{ChatNetError, Result};
pub use network::ChatNetwork;
