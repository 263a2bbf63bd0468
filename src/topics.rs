//! LDA topic extraction via collapsed Gibbs sampling. Hand-rolled: no
//! crate in the wider Rust ecosystem implements LDA. Shares
//! [`crate::text::tokenize`] with the similarity engine and the seeded
//! RNG stream from [`crate::rng`] so a run is reproducible from its seed.

use crate::config::TopicsConfig;
use crate::decimal::Amount;
use crate::errors::ChatLakeResult;
use crate::ledger;
use crate::models::{RunSummary, RunStatus, RunType};
use crate::rng::SeededStream;
use crate::text::tokenize;
use rust_decimal::Decimal;
use serde_json::json;
use sqlx::SqlitePool;
use std::collections::HashMap;
use std::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

const ALPHA: f64 = 0.1;
const BETA: f64 = 0.01;

struct Corpus {
    conversation_ids: Vec<i64>,
    /// Per-document token ids into `vocabulary`.
    docs: Vec<Vec<usize>>,
    vocabulary: Vec<String>,
}

fn build_corpus(rows: Vec<(i64, String)>) -> Corpus {
    let mut vocab_index: HashMap<String, usize> = HashMap::new();
    let mut vocabulary = Vec::new();
    let mut docs = Vec::new();
    let mut conversation_ids = Vec::new();

    for (conversation_id, text) in rows {
        let tokens = tokenize(&text);
        if tokens.is_empty() {
            continue;
        }
        let mut doc = Vec::with_capacity(tokens.len());
        for token in tokens {
            let idx = *vocab_index.entry(token.clone()).or_insert_with(|| {
                vocabulary.push(token);
                vocabulary.len() - 1
            });
            doc.push(idx);
        }
        conversation_ids.push(conversation_id);
        docs.push(doc);
    }

    Corpus { conversation_ids, docs, vocabulary }
}

struct GibbsState {
    /// topic assignment per token, indexed the same way as `corpus.docs`.
    assignments: Vec<Vec<usize>>,
    doc_topic_counts: Vec<Vec<u64>>,
    topic_word_counts: Vec<Vec<u64>>,
    topic_totals: Vec<u64>,
}

fn run_gibbs(corpus: &Corpus, k: usize, iterations: usize, seed: u64, cancel: &CancellationToken) -> GibbsState {
    let vocab_size = corpus.vocabulary.len().max(1);
    let mut rng = SeededStream::new(seed);

    let mut assignments: Vec<Vec<usize>> = corpus.docs.iter().map(|d| vec![0usize; d.len()]).collect();
    let mut doc_topic_counts = vec![vec![0u64; k]; corpus.docs.len()];
    let mut topic_word_counts = vec![vec![0u64; vocab_size]; k];
    let mut topic_totals = vec![0u64; k];

    for (d, doc) in corpus.docs.iter().enumerate() {
        for (pos, &word) in doc.iter().enumerate() {
            let topic = rng.next_index(k);
            assignments[d][pos] = topic;
            doc_topic_counts[d][topic] += 1;
            topic_word_counts[topic][word] += 1;
            topic_totals[topic] += 1;
        }
    }

    for _ in 0..iterations {
        if cancel.is_cancelled() {
            break;
        }
        for (d, doc) in corpus.docs.iter().enumerate() {
            for (pos, &word) in doc.iter().enumerate() {
                let old_topic = assignments[d][pos];
                doc_topic_counts[d][old_topic] -= 1;
                topic_word_counts[old_topic][word] -= 1;
                topic_totals[old_topic] -= 1;

                let mut weights = vec![0f64; k];
                let mut total_weight = 0.0;
                for t in 0..k {
                    let doc_term = doc_topic_counts[d][t] as f64 + ALPHA;
                    let word_term = (topic_word_counts[t][word] as f64 + BETA)
                        / (topic_totals[t] as f64 + BETA * vocab_size as f64);
                    let w = doc_term * word_term;
                    weights[t] = w;
                    total_weight += w;
                }

                let draw = rng.next_float() * total_weight.max(1e-12);
                let mut cumulative = 0.0;
                let mut new_topic = k - 1;
                for (t, &w) in weights.iter().enumerate() {
                    cumulative += w;
                    if draw <= cumulative {
                        new_topic = t;
                        break;
                    }
                }

                assignments[d][pos] = new_topic;
                doc_topic_counts[d][new_topic] += 1;
                topic_word_counts[new_topic][word] += 1;
                topic_totals[new_topic] += 1;
            }
        }
    }

    GibbsState { assignments, doc_topic_counts, topic_word_counts, topic_totals }
}

/// Runs LDA over every conversation's concatenated segment text and
/// persists per-topic keyword labels plus each conversation's topic-score
/// distribution, which sums to ~1.
pub async fn execute(
    pool: &SqlitePool,
    config: &TopicsConfig,
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

    let corpus = build_corpus(rows);

    let feature_config = json!({
        "topic_count": config.topic_count,
        "keywords_per_topic": config.keywords_per_topic,
        "max_iterations": config.max_iterations,
        "seed": config.seed,
    });
    let run_id = ledger::start(
        pool,
        RunType::Topics,
        "chatlake-lda",
        env!("CARGO_PKG_VERSION"),
        &feature_config,
        "all_conversations",
        None,
    )
    .await?;

    if corpus.docs.is_empty() {
        ledger::complete(pool, run_id, &json!({"conversations": 0})).await?;
        return Ok(RunSummary {
            run_id,
            status: RunStatus::Completed,
            items_processed: 0,
            items_written: 0,
            errors: vec![],
            elapsed_ms: start.elapsed().as_millis() as u64,
            umap_dimensions: 0,
        });
    }

    let k = config.topic_count.max(1);
    let seed = config.seed.unwrap_or(42);
    let state = run_gibbs(&corpus, k, config.max_iterations, seed, cancel);

    let mut topic_ids = Vec::with_capacity(k);
    for t in 0..k {
        let mut ranked: Vec<(usize, u64)> = state.topic_word_counts[t]
            .iter()
            .enumerate()
            .map(|(w, &c)| (w, c))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        let keywords: Vec<&str> = ranked
            .into_iter()
            .take(config.keywords_per_topic)
            .filter(|(_, c)| *c > 0)
            .map(|(w, _)| corpus.vocabulary[w].as_str())
            .collect();
        let label = if keywords.is_empty() { format!("topic-{t}") } else { keywords.join(", ") };

        let topic_id: i64 = sqlx::query_scalar(
            "INSERT INTO topics (inference_run_id, topic_index, label, keywords_json) VALUES (?, ?, ?, ?) RETURNING id",
        )
        .bind(run_id)
        .bind(t as i64)
        .bind(&label)
        .bind(serde_json::to_string(&keywords).unwrap_or_default())
        .fetch_one(pool)
        .await?;
        topic_ids.push(topic_id);
    }

    let mut written = 0usize;
    for (d, conversation_id) in corpus.conversation_ids.iter().enumerate() {
        let total: u64 = state.doc_topic_counts[d].iter().sum::<u64>().max(1);
        for t in 0..k {
            let score = state.doc_topic_counts[d][t] as f64 / total as f64;
            if score <= 0.0 {
                continue;
            }
            let decimal_score = Amount::from(
                Decimal::from_f64_retain((score * 1_000_000.0).round() / 1_000_000.0).unwrap_or(Decimal::ZERO),
            );

            sqlx::query(
                r#"
                INSERT INTO conversation_topics (inference_run_id, conversation_id, topic_id, score)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(inference_run_id, conversation_id, topic_id) DO UPDATE SET score = excluded.score
                "#,
            )
            .bind(run_id)
            .bind(conversation_id)
            .bind(topic_ids[t])
            .bind(decimal_score)
            .execute(pool)
            .await?;
            written += 1;
        }
    }

    let _ = &state.topic_totals;
    ledger::complete(pool, run_id, &json!({"conversations": corpus.docs.len(), "topics": k})).await?;
    info!("topics run {run_id} fit {k} topics over {} conversations", corpus.docs.len());

    Ok(RunSummary {
        run_id,
        status: RunStatus::Completed,
        items_processed: corpus.docs.len(),
        items_written: written,
        errors: vec![],
        elapsed_ms: start.elapsed().as_millis() as u64,
        umap_dimensions: 0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn doc_topic_distribution_sums_to_one() {
        let rows = vec![
            (1i64, "rust systems programming memory safety".to_string()),
            (2i64, "baking bread yeast flour kitchen".to_string()),
            (3i64, "rust memory safety ownership borrowing".to_string()),
        ];
        let corpus = build_corpus(rows);
        let cancel = CancellationToken::new();
        let state = run_gibbs(&corpus, 2, 50, 7, &cancel);

        for counts in &state.doc_topic_counts {
            let total: u64 = counts.iter().sum();
            assert!(total > 0);
        }
    }
}
