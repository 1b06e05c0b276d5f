//! Student records and registered face embeddings
//!
//! Embeddings are stored as JSON float arrays in the `embedding` column;
//! a NULL embedding means the student exists but has not registered a
//! face yet and is invisible to the identity index.

use rollcall_common::{Error, Result};
use sqlx::{Row, SqlitePool};

/// Load all `(student_id, embedding)` pairs with a registered embedding.
///
/// Rows with unparseable embedding JSON are skipped with a warning rather
/// than failing the whole reload.
pub async fn load_registered_embeddings(pool: &SqlitePool) -> Result<Vec<(String, Vec<f32>)>> {
    let rows = sqlx::query(
        "SELECT student_id, embedding FROM students WHERE embedding IS NOT NULL",
    )
    .fetch_all(pool)
    .await?;

    let mut out = Vec::with_capacity(rows.len());
    for row in rows {
        let student_id: String = row.get("student_id");
        let raw: String = row.get("embedding");
        match serde_json::from_str::<Vec<f32>>(&raw) {
            Ok(embedding) => out.push((student_id, embedding)),
            Err(e) => {
                tracing::warn!(student_id = %student_id, error = %e, "Corrupt embedding data");
            }
        }
    }
    Ok(out)
}

/// Insert or update a student, optionally setting name and embedding.
///
/// Passing `None` for a field leaves any existing value in place.
pub async fn upsert_student(
    pool: &SqlitePool,
    student_id: &str,
    full_name: Option<&str>,
    embedding: Option<&[f32]>,
) -> Result<()> {
    let embedding_json = match embedding {
        Some(e) => Some(
            serde_json::to_string(e)
                .map_err(|e| Error::Internal(format!("Embedding serialization failed: {e}")))?,
        ),
        None => None,
    };

    sqlx::query(
        r#"
        INSERT INTO students (student_id, full_name, embedding)
        VALUES (?, ?, ?)
        ON CONFLICT(student_id) DO UPDATE SET
            full_name = COALESCE(excluded.full_name, students.full_name),
            embedding = COALESCE(excluded.embedding, students.embedding)
        "#,
    )
    .bind(student_id)
    .bind(full_name)
    .bind(embedding_json)
    .execute(pool)
    .await?;

    Ok(())
}

/// Check whether a student exists at all (registered face or not)
pub async fn student_exists(pool: &SqlitePool, student_id: &str) -> Result<bool> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM students WHERE student_id = ?")
        .bind(student_id)
        .fetch_one(pool)
        .await?;
    Ok(count > 0)
}
