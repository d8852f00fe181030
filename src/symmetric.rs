//! Collapse both directions of a user pair into one record for undirected drawing.

use std::collections::BTreeMap;

use serde::Serialize;

use crate::weights::WeightTable;

/// Both directed weights of one unordered pair.
///
/// `source`/`target` are the endpoints of whichever direction appears first in the
/// edge table. Every column of the table is present on both sides; a missing
/// direction counts as 0.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairRecord {
    pub pair_id: String,
    pub source: String,
    pub target: String,
    pub source_to_target: BTreeMap<String, f64>,
    pub target_to_source: BTreeMap<String, f64>,
}

impl PairRecord {
    pub fn forward(&self, column: &str) -> f64 {
        self.source_to_target.get(column).copied().unwrap_or(0.0)
    }

    pub fn backward(&self, column: &str) -> f64 {
        self.target_to_source.get(column).copied().unwrap_or(0.0)
    }

    pub fn touches(&self, user: &str) -> bool {
        self.source == user || self.target == user
    }
}

/// Case-sensitive pair identity: the two labels sorted and concatenated.
pub fn pair_id(a: &str, b: &str) -> String {
    if a <= b {
        format!("{}{}", a, b)
    } else {
        format!("{}{}", b, a)
    }
}

/// One record per unordered pair, ordered by the sorted pair labels.
pub fn unite_symmetric_edges(table: &WeightTable) -> Vec<PairRecord> {
    let zeros: BTreeMap<String, f64> = table.columns.iter().map(|c| (c.clone(), 0.0)).collect();
    // Keyed by the sorted label tuple: same grouping as the concatenated id, without
    // collisions such as "ab"+"c" vs "a"+"bc".
    let mut pairs: BTreeMap<(&str, &str), PairRecord> = BTreeMap::new();

    for edge in &table.edges {
        let key = if edge.source <= edge.target {
            (edge.source.as_str(), edge.target.as_str())
        } else {
            (edge.target.as_str(), edge.source.as_str())
        };
        let record = pairs.entry(key).or_insert_with(|| PairRecord {
            pair_id: pair_id(&edge.source, &edge.target),
            source: edge.source.clone(),
            target: edge.target.clone(),
            source_to_target: zeros.clone(),
            target_to_source: zeros.clone(),
        });
        let side = if edge.source == record.source {
            &mut record.source_to_target
        } else {
            &mut record.target_to_source
        };
        for (column, value) in &edge.weights {
            *side.entry(column.clone()).or_insert(0.0) += value;
        }
    }

    pairs.into_values().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::weights::WeightedEdge;

    fn table(rows: &[(&str, &str, f64)]) -> WeightTable {
        WeightTable {
            columns: vec!["weight".to_string()],
            edges: rows
                .iter()
                .map(|(s, t, w)| WeightedEdge {
                    source: s.to_string(),
                    target: t.to_string(),
                    weights: [("weight".to_string(), *w)].into_iter().collect(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_unite_symmetric_edges() {
        let united = unite_symmetric_edges(&table(&[("Valen", "Ale", 1.0), ("Ale", "Dani", 2.0), ("Dani", "Ale", 3.0)]));
        assert_eq!(united.len(), 2);

        assert_eq!(united[0].pair_id, "AleDani");
        assert_eq!((united[0].source.as_str(), united[0].target.as_str()), ("Ale", "Dani"));
        assert_eq!(united[0].forward("weight"), 2.0);
        assert_eq!(united[0].backward("weight"), 3.0);

        assert_eq!(united[1].pair_id, "AleValen");
        assert_eq!((united[1].source.as_str(), united[1].target.as_str()), ("Valen", "Ale"));
        assert_eq!(united[1].forward("weight"), 1.0);
        assert_eq!(united[1].backward("weight"), 0.0);
        assert_eq!(united[1].target_to_source.get("weight"), Some(&0.0));
    }

    #[test]
    fn test_pair_id_is_order_independent() {
        assert_eq!(pair_id("Dani", "Ale"), pair_id("Ale", "Dani"));
        // Case-sensitive: uppercase sorts first
        assert_eq!(pair_id("ale", "Bowen"), "Bowenale");
    }

    #[test]
    fn test_missing_column_values_count_as_zero() {
        let mut t = table(&[("A", "B", 4.0), ("B", "A", 1.0)]);
        t.columns.push("deviations".to_string());
        t.edges[1].weights.insert("deviations".to_string(), -0.5);
        let united = unite_symmetric_edges(&t);
        assert_eq!(united.len(), 1);
        assert_eq!(united[0].forward("deviations"), 0.0);
        assert_eq!(united[0].backward("deviations"), -0.5);
        assert!(united[0].touches("A") && united[0].touches("B") && !united[0].touches("C"));
    }

    #[test]
    fn test_empty_table() {
        assert!(unite_symmetric_edges(&WeightTable::default()).is_empty());
    }
}
