//! TF-IDF conversation similarity.
//!
//! `find_similar` plays the same "vectorize, rank, return top-N" role a
//! free-text search query would, but is built around an in-process,
//! fitted TF-IDF model instead of a database full-text index, since the
//! core needs a cloneable vectorizer it owns rather than a database
//! index. All-pairs accumulation runs in parallel via `rayon`; writes stay
//! single-threaded and transactional.

use crate::config::SimilarityConfig;
use crate::decimal::Amount;
use crate::errors::ChatLakeResult;
use crate::ledger;
use crate::models::{RunSummary, RunStatus, RunType};
use crate::text::tokenize;
use rayon::prelude::*;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

pub struct Document {
    pub conversation_id: i64,
    pub tokens: Vec<String>,
}

/// A fitted vocabulary: term -> (index, inverse document frequency).
pub struct Vocabulary {
    pub terms: HashMap<String, (usize, f64)>,
}

pub fn build_vocabulary(docs: &[Document], cap: usize) -> Vocabulary {
    let mut doc_freq: HashMap<&str, usize> = HashMap::new();
    for doc in docs {
        let unique: std::collections::HashSet<&str> = doc.tokens.iter().map(|s| s.as_str()).collect();
        for term in unique {
            *doc_freq.entry(term).or_insert(0) += 1;
        }
    }

    let n = docs.len().max(1) as f64;
    let mut ranked: Vec<(&str, usize)> = doc_freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

    let mut terms = HashMap::new();
    for (idx, (term, df)) in ranked.into_iter().take(cap).enumerate() {
        let idf = (n / (1.0 + df as f64)).ln() + 1.0;
        terms.insert(term.to_string(), (idx, idf));
    }

    Vocabulary { terms }
}

pub fn vectorize(doc: &Document, vocab: &Vocabulary) -> Vec<f64> {
    let mut counts: HashMap<usize, f64> = HashMap::new();
    for token in &doc.tokens {
        if let Some((idx, _)) = vocab.terms.get(token) {
            *counts.entry(*idx).or_insert(0.0) += 1.0;
        }
    }

    let idf_by_index: HashMap<usize, f64> = vocab.terms.values().map(|(idx, idf)| (*idx, *idf)).collect();
    let total = doc.tokens.len().max(1) as f64;
    let mut vector = vec![0f64; vocab.terms.len()];
    for (idx, count) in counts {
        if let Some(idf) = idf_by_index.get(&idx) {
            vector[idx] = (count / total) * idf;
        }
    }
    vector
}

pub fn cosine_similarity(a: &[f64], b: &[f64]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f64>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f64>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

/// Computes and persists conversation-to-conversation similarity edges.
pub async fn execute(
    pool: &SqlitePool,
    config: &SimilarityConfig,
    cancel: &CancellationToken,
) -> ChatLakeResult<RunSummary> {
    let start = Instant::now();

    let rows: Vec<(i64, String)> = sqlx::query_as(
        r#"
        SELECT conversation_id, group_concat(content_text, ' ')
        FROM conversation_segments
        GROUP BY conversation_id
        "#,
    )
    .fetch_all(pool)
    .await?;

    let docs: Vec<Document> = rows
        .into_iter()
        .map(|(conversation_id, text)| Document { conversation_id, tokens: tokenize(&text) })
        .collect();

    let feature_config = json!({
        "min_similarity": config.min_similarity,
        "max_pairs_per_conversation": config.max_pairs_per_conversation,
        "vocabulary_cap": config.vocabulary_cap,
    });
    let run_id = ledger::start(
        pool,
        RunType::Similarity,
        "chatlake-tfidf",
        env!("CARGO_PKG_VERSION"),
        &feature_config,
        "all_conversations",
        None,
    )
    .await?;

    let vocab = build_vocabulary(&docs, config.vocabulary_cap);
    let vectors: Vec<Vec<f64>> = docs.iter().map(|d| vectorize(d, &vocab)).collect();

    let n = docs.len();
    let mut pairs: Vec<(usize, usize, f64)> = Vec::new();

    'outer: for i in 0..n {
        if cancel.is_cancelled() {
            break 'outer;
        }
        let row: Vec<(usize, usize, f64)> = (i + 1..n)
            .into_par_iter()
            .filter_map(|j| {
                let score = cosine_similarity(&vectors[i], &vectors[j]);
                if score >= config.min_similarity {
                    Some((i, j, score))
                } else {
                    None
                }
            })
            .collect();
        pairs.extend(row);
    }

    pairs.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));

    let mut quota: HashMap<usize, usize> = HashMap::new();
    let mut written = 0usize;

    for (i, j, score) in pairs {
        let qi = *quota.get(&i).unwrap_or(&0);
        let qj = *quota.get(&j).unwrap_or(&0);
        if qi >= config.max_pairs_per_conversation || qj >= config.max_pairs_per_conversation {
            continue;
        }

        let (conv_a, conv_b) = if docs[i].conversation_id < docs[j].conversation_id {
            (docs[i].conversation_id, docs[j].conversation_id)
        } else {
            (docs[j].conversation_id, docs[i].conversation_id)
        };

        let decimal_score = Amount::from(
            Decimal::from_f64_retain((score * 1_000_000.0).round() / 1_000_000.0).unwrap_or(Decimal::ZERO),
        );

        sqlx::query(
            r#"
            INSERT INTO conversation_similarities
                (inference_run_id, conversation_id_a, conversation_id_b, score, method)
            VALUES (?, ?, ?, ?, 'tfidf_cosine')
            ON CONFLICT(inference_run_id, conversation_id_a, conversation_id_b) DO UPDATE SET score = excluded.score
            "#,
        )
        .bind(run_id)
        .bind(conv_a)
        .bind(conv_b)
        .bind(decimal_score)
        .execute(pool)
        .await?;

        *quota.entry(i).or_insert(0) += 1;
        *quota.entry(j).or_insert(0) += 1;
        written += 1;
    }

    ledger::complete(pool, run_id, &json!({"conversations": n, "edges": written})).await?;
    info!("similarity run {run_id} wrote {written} edges over {n} conversations");

    Ok(RunSummary {
        run_id,
        status: RunStatus::Completed,
        items_processed: n,
        items_written: written,
        errors: vec![],
        elapsed_ms: start.elapsed().as_millis() as u64,
        umap_dimensions: 0,
    })
}

/// Returns the top `limit` conversations most similar to `conversation_id`
/// from the most recent similarity run, ranked by score.
pub async fn find_similar(
    pool: &SqlitePool,
    conversation_id: i64,
    limit: i64,
) -> ChatLakeResult<Vec<(i64, Amount)>> {
    let rows: Vec<(i64, i64, Amount)> = sqlx::query_as(
        r#"
        SELECT conversation_id_a, conversation_id_b, score
        FROM conversation_similarities
        WHERE conversation_id_a = ? OR conversation_id_b = ?
        ORDER BY score DESC
        LIMIT ?
        "#,
    )
    .bind(conversation_id)
    .bind(conversation_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(rows
        .into_iter()
        .map(|(a, b, score)| {
            let other = if a == conversation_id { b } else { a };
            (other, score)
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_documents_have_similarity_one() {
        let docs = vec![
            Document { conversation_id: 1, tokens: tokenize("rust is great for systems programming") },
            Document { conversation_id: 2, tokens: tokenize("rust is great for systems programming") },
        ];
        let vocab = build_vocabulary(&docs, 50);
        let v1 = vectorize(&docs[0], &vocab);
        let v2 = vectorize(&docs[1], &vocab);
        assert!((cosine_similarity(&v1, &v2) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disjoint_documents_have_similarity_zero() {
        let docs = vec![
            Document { conversation_id: 1, tokens: tokenize("apples bananas cherries") },
            Document { conversation_id: 2, tokens: tokenize("xylophones yodeling zeppelins") },
        ];
        let vocab = build_vocabulary(&docs, 50);
        let v1 = vectorize(&docs[0], &vocab);
        let v2 = vectorize(&docs[1], &vocab);
        assert_eq!(cosine_similarity(&v1, &v2), 0.0);
    }
}
