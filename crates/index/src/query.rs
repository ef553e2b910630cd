use crate::{DocumentStore, StoreError};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// Result entry for a similarity query.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryMatch {
    /// Id of the matched document.
    pub id: String,
    /// Distance to the query vector (smaller is more similar).
    pub distance: f32,
    /// Stored document text.
    pub text: String,
    /// Metadata stored alongside the document.
    pub metadata: serde_json::Value,
}

/// Distance function used to rank documents against a query vector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    /// Squared Euclidean distance.
    #[default]
    #[serde(rename = "l2")]
    L2,
    /// `1 - cosine similarity`.
    #[serde(rename = "cosine")]
    Cosine,
    /// `1 - dot product`; meaningful for unit-length vectors.
    #[serde(rename = "ip")]
    InnerProduct,
}

impl DistanceMetric {
    /// Distance between two vectors of equal length.
    #[inline]
    pub fn distance(self, a: &[f32], b: &[f32]) -> f32 {
        match self {
            DistanceMetric::L2 => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let d = x - y;
                    d * d
                })
                .sum(),
            DistanceMetric::Cosine => {
                let (dot, norm_a, norm_b) = a.iter().zip(b).fold(
                    (0.0f32, 0.0f32, 0.0f32),
                    |(dot, na, nb), (x, y)| (dot + x * y, na + x * x, nb + y * y),
                );
                if norm_a == 0.0 || norm_b == 0.0 {
                    return 1.0;
                }
                1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
            }
            DistanceMetric::InnerProduct => 1.0 - a.iter().zip(b).map(|(x, y)| x * y).sum::<f32>(),
        }
    }
}

/// Nearest-first ordering with the id as tie-breaker, so equal distances rank the same way on
/// every call.
fn nearest_first(a: &(f32, &str), b: &(f32, &str)) -> Ordering {
    a.0.total_cmp(&b.0).then_with(|| a.1.cmp(b.1))
}

impl DocumentStore {
    /// Return up to `k` stored documents ordered by increasing distance to `vector`.
    ///
    /// An empty collection or `k == 0` yields an empty list. The scan is exact: every cached
    /// vector is compared, then only the winners are read back from the backend.
    pub fn similarity_query(&self, vector: &[f32], k: usize) -> Result<Vec<QueryMatch>, StoreError> {
        let cache = self.read_cache()?;
        if k == 0 || cache.entries.is_empty() {
            return Ok(Vec::new());
        }
        if let Some(expected) = cache.dimension {
            if vector.len() != expected {
                return Err(StoreError::DimensionMismatch {
                    expected,
                    found: vector.len(),
                });
            }
        }

        let metric = self.cfg.metric;
        let mut scored: Vec<(f32, &str)> = cache
            .entries
            .iter()
            .map(|(id, stored)| (metric.distance(vector, stored), id.as_str()))
            .collect();

        if scored.len() > k {
            scored.select_nth_unstable_by(k - 1, nearest_first);
            scored.truncate(k);
        }
        scored.sort_unstable_by(nearest_first);

        let mut matches = Vec::with_capacity(scored.len());
        for (distance, id) in scored {
            let Some(record) = self.get(id)? else {
                tracing::warn!(id, "cached vector has no stored record");
                continue;
            };
            matches.push(QueryMatch {
                id: record.id,
                distance,
                text: record.text,
                metadata: record.metadata,
            });
        }
        Ok(matches)
    }
}
