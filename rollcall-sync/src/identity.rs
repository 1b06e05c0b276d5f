//! In-memory face identity index
//!
//! Holds L2-normalized embeddings for every registered student and answers
//! nearest-neighbor queries with one vectorized pass of dot products
//! (cosine similarity, since all rows are unit-norm). The active snapshot
//! is swapped atomically on reload so readers in flight never observe a
//! partially rebuilt index.
//!
//! Complexity is O(N·D) per query; N is registered students (hundreds),
//! which is small relative to the frame sampling rate.

use rollcall_common::Result;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Result of an identity query
#[derive(Debug, Clone, PartialEq)]
pub enum FaceMatch {
    /// Best match exceeded the similarity threshold
    Known { student_id: String, score: f32 },
    /// No registered embedding scored above the threshold
    Unknown,
}

/// Immutable index snapshot: ids plus a row-major unit-norm matrix
struct IndexSnapshot {
    ids: Vec<String>,
    matrix: Vec<f32>,
    dim: usize,
}

impl IndexSnapshot {
    fn empty() -> Self {
        Self {
            ids: Vec::new(),
            matrix: Vec::new(),
            dim: 0,
        }
    }
}

/// Swappable identity index shared between the HTTP adapter and the
/// background analysis tasks.
pub struct IdentityIndex {
    threshold: f32,
    snapshot: RwLock<Arc<IndexSnapshot>>,
}

impl IdentityIndex {
    pub fn new(threshold: f32) -> Self {
        Self {
            threshold,
            snapshot: RwLock::new(Arc::new(IndexSnapshot::empty())),
        }
    }

    /// Rebuild the index from all students with a registered embedding.
    ///
    /// Called at startup and after every embedding write. The new snapshot
    /// replaces the old one in a single swap; concurrent `query` calls keep
    /// reading whichever snapshot they already hold.
    ///
    /// Returns the number of identities loaded.
    pub async fn reload(&self, pool: &SqlitePool) -> Result<usize> {
        let rows = crate::db::students::load_registered_embeddings(pool).await?;

        let mut ids = Vec::with_capacity(rows.len());
        let mut matrix = Vec::new();
        let mut dim = 0usize;

        for (student_id, embedding) in rows {
            match normalize(&embedding) {
                Some(unit) => {
                    if dim == 0 {
                        dim = unit.len();
                    } else if unit.len() != dim {
                        tracing::warn!(
                            student_id = %student_id,
                            expected = dim,
                            actual = unit.len(),
                            "Skipping embedding with mismatched dimensionality"
                        );
                        continue;
                    }
                    ids.push(student_id);
                    matrix.extend_from_slice(&unit);
                }
                None => {
                    tracing::warn!(student_id = %student_id, "Skipping degenerate embedding");
                }
            }
        }

        let count = ids.len();
        let new_snapshot = Arc::new(IndexSnapshot { ids, matrix, dim });

        *self.snapshot.write().await = new_snapshot;
        tracing::info!(identities = count, "Identity index reloaded");

        Ok(count)
    }

    /// Find the closest registered identity for an embedding.
    ///
    /// Empty index, degenerate input, or a best score at or below the
    /// threshold all yield `Unknown`.
    pub async fn query(&self, embedding: &[f32]) -> FaceMatch {
        let snapshot = self.snapshot.read().await.clone();

        if snapshot.ids.is_empty() {
            return FaceMatch::Unknown;
        }
        if embedding.len() != snapshot.dim {
            tracing::warn!(
                expected = snapshot.dim,
                actual = embedding.len(),
                "Query embedding dimensionality mismatch"
            );
            return FaceMatch::Unknown;
        }
        let Some(unit) = normalize(embedding) else {
            return FaceMatch::Unknown;
        };

        // One dot product per row; all rows are pre-normalized so the dot
        // product is the cosine similarity.
        let mut best_idx = 0usize;
        let mut best_score = f32::MIN;
        for (i, row) in snapshot.matrix.chunks_exact(snapshot.dim).enumerate() {
            let score: f32 = row.iter().zip(unit.iter()).map(|(a, b)| a * b).sum();
            if score > best_score {
                best_score = score;
                best_idx = i;
            }
        }

        if best_score > self.threshold {
            FaceMatch::Known {
                student_id: snapshot.ids[best_idx].clone(),
                score: best_score,
            }
        } else {
            FaceMatch::Unknown
        }
    }

    /// Number of identities in the active snapshot
    pub async fn len(&self) -> usize {
        self.snapshot.read().await.ids.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

/// L2-normalize a vector; None if the norm is zero or not finite
pub fn normalize(v: &[f32]) -> Option<Vec<f32>> {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if !norm.is_finite() || norm <= f32::EPSILON {
        return None;
    }
    Some(v.iter().map(|x| x / norm).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_common::db::init_tables;

    async fn seeded_pool(students: &[(&str, Vec<f32>)]) -> SqlitePool {
        let pool = SqlitePool::connect("sqlite::memory:").await.unwrap();
        init_tables(&pool).await.unwrap();
        for (id, emb) in students {
            crate::db::students::upsert_student(&pool, id, None, Some(emb)).await.unwrap();
        }
        pool
    }

    #[tokio::test]
    async fn test_query_round_trip_identity() {
        let pool = seeded_pool(&[
            ("S1", vec![1.0, 0.0, 0.0, 0.0]),
            ("S2", vec![0.0, 1.0, 0.0, 0.0]),
            ("S3", vec![0.0, 0.0, 3.0, 4.0]),
        ])
        .await;

        let index = IdentityIndex::new(0.50);
        assert_eq!(index.reload(&pool).await.unwrap(), 3);

        // Each registered embedding matches itself with score ~1.0,
        // including ones stored un-normalized.
        for (id, emb) in [
            ("S1", vec![1.0, 0.0, 0.0, 0.0]),
            ("S3", vec![0.0, 0.0, 3.0, 4.0]),
        ] {
            match index.query(&emb).await {
                FaceMatch::Known { student_id, score } => {
                    assert_eq!(student_id, id);
                    assert!((score - 1.0).abs() < 1e-5);
                }
                FaceMatch::Unknown => panic!("expected match for {id}"),
            }
        }
    }

    #[tokio::test]
    async fn test_query_below_threshold_is_unknown() {
        let pool = seeded_pool(&[("S1", vec![1.0, 0.0, 0.0, 0.0])]).await;
        let index = IdentityIndex::new(0.50);
        index.reload(&pool).await.unwrap();

        // Orthogonal vector scores 0.0 against everything
        assert_eq!(index.query(&[0.0, 0.0, 1.0, 0.0]).await, FaceMatch::Unknown);
    }

    #[tokio::test]
    async fn test_empty_index_is_unknown() {
        let index = IdentityIndex::new(0.50);
        assert_eq!(index.query(&[1.0, 0.0]).await, FaceMatch::Unknown);
        assert!(index.is_empty().await);
    }

    #[tokio::test]
    async fn test_reload_replaces_previous_snapshot() {
        let pool = seeded_pool(&[("S1", vec![1.0, 0.0])]).await;
        let index = IdentityIndex::new(0.50);
        index.reload(&pool).await.unwrap();
        assert_eq!(index.len().await, 1);

        crate::db::students::upsert_student(&pool, "S2", None, Some(&[0.0, 1.0]))
            .await
            .unwrap();
        index.reload(&pool).await.unwrap();
        assert_eq!(index.len().await, 2);

        match index.query(&[0.0, 1.0]).await {
            FaceMatch::Known { student_id, .. } => assert_eq!(student_id, "S2"),
            FaceMatch::Unknown => panic!("expected S2 after reload"),
        }
    }

    #[test]
    fn test_normalize_rejects_zero_vector() {
        assert!(normalize(&[0.0, 0.0]).is_none());
        let unit = normalize(&[3.0, 4.0]).unwrap();
        assert!((unit[0] - 0.6).abs() < 1e-6);
        assert!((unit[1] - 0.8).abs() < 1e-6);
    }
}
