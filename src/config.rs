use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: DatabaseConfig,

    #[serde(default)]
    pub segment: SegmentConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub kmeans: KMeansConfig,

    #[serde(default)]
    pub similarity: SimilarityConfig,

    #[serde(default)]
    pub topics: TopicsConfig,

    #[serde(default)]
    pub drift: DriftConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_true")]
    pub wal_mode: bool,

    #[serde(default = "default_mmap_size")]
    pub mmap_size: u64,

    #[serde(default = "default_cache_size")]
    pub cache_size: i32,
}

/// Segmenter options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentConfig {
    #[serde(default = "default_max_messages_per_segment")]
    pub max_messages_per_segment: usize,

    #[serde(default = "default_max_chars_per_segment")]
    pub max_chars_per_segment: usize,

    #[serde(default = "default_gap_seconds")]
    pub gap_seconds: i64,
}

/// UMAP + HDBSCAN clustering options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusteringConfig {
    #[serde(default = "default_umap_dimensions")]
    pub umap_dimensions: usize,

    #[serde(default = "default_umap_neighbors")]
    pub umap_neighbors: usize,

    #[serde(default = "default_min_cluster_size")]
    pub min_cluster_size: usize,

    #[serde(default = "default_min_points")]
    pub min_points: usize,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,
}

/// KMeans fallback options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KMeansConfig {
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    #[serde(default)]
    pub outlier_threshold: f64,

    pub seed: Option<u64>,
}

/// TF-IDF similarity options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimilarityConfig {
    #[serde(default = "default_min_similarity")]
    pub min_similarity: f64,

    #[serde(default = "default_max_pairs_per_conversation")]
    pub max_pairs_per_conversation: usize,

    #[serde(default = "default_vocabulary_cap")]
    pub vocabulary_cap: usize,
}

/// LDA topic extractor options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicsConfig {
    #[serde(default = "default_topic_count")]
    pub topic_count: usize,

    #[serde(default = "default_keywords_per_topic")]
    pub keywords_per_topic: usize,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    pub seed: Option<u64>,
}

/// Drift detector options.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriftConfig {
    #[serde(default = "default_window_days")]
    pub window_days: i64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: DatabaseConfig::default(),
            segment: SegmentConfig::default(),
            clustering: ClusteringConfig::default(),
            kmeans: KMeansConfig::default(),
            similarity: SimilarityConfig::default(),
            topics: TopicsConfig::default(),
            drift: DriftConfig::default(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            wal_mode: true,
            mmap_size: default_mmap_size(),
            cache_size: default_cache_size(),
        }
    }
}

impl Default for SegmentConfig {
    fn default() -> Self {
        Self {
            max_messages_per_segment: default_max_messages_per_segment(),
            max_chars_per_segment: default_max_chars_per_segment(),
            gap_seconds: default_gap_seconds(),
        }
    }
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            umap_dimensions: default_umap_dimensions(),
            umap_neighbors: default_umap_neighbors(),
            min_cluster_size: default_min_cluster_size(),
            min_points: default_min_points(),
            random_seed: default_random_seed(),
        }
    }
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            outlier_threshold: 0.0,
            seed: None,
        }
    }
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            min_similarity: default_min_similarity(),
            max_pairs_per_conversation: default_max_pairs_per_conversation(),
            vocabulary_cap: default_vocabulary_cap(),
        }
    }
}

impl Default for TopicsConfig {
    fn default() -> Self {
        Self {
            topic_count: default_topic_count(),
            keywords_per_topic: default_keywords_per_topic(),
            max_iterations: default_max_iterations(),
            seed: None,
        }
    }
}

impl Default for DriftConfig {
    fn default() -> Self {
        Self {
            window_days: default_window_days(),
        }
    }
}

impl Config {
    /// Load configuration from file or use defaults
    pub fn load() -> Result<Self> {
        let config_paths = [
            "./chatlake.toml",
            "./config.toml",
            "~/.config/chatlake/config.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            let path = Path::new(expanded.as_ref());

            if path.exists() {
                let content = std::fs::read_to_string(path)?;
                let config: Config = toml::from_str(&content)?;
                return Ok(config);
            }
        }

        Ok(Config::default())
    }

    /// Save configuration to file
    pub fn save(&self, path: &Path) -> Result<()> {
        let toml = toml::to_string_pretty(self)?;
        std::fs::write(path, toml)?;
        Ok(())
    }
}

// Default value functions
fn default_db_path() -> String {
    "./chatlake.db".to_string()
}

fn default_true() -> bool {
    true
}

fn default_mmap_size() -> u64 {
    1_073_741_824 // 1GB
}

fn default_cache_size() -> i32 {
    -64000 // 64MB in pages
}

fn default_max_messages_per_segment() -> usize {
    20
}

fn default_max_chars_per_segment() -> usize {
    6000
}

fn default_gap_seconds() -> i64 {
    3600
}

fn default_umap_dimensions() -> usize {
    15
}

fn default_umap_neighbors() -> usize {
    15
}

fn default_min_cluster_size() -> usize {
    5
}

fn default_min_points() -> usize {
    3
}

fn default_random_seed() -> u64 {
    42
}

fn default_max_iterations() -> usize {
    100
}

fn default_min_similarity() -> f64 {
    0.1
}

fn default_max_pairs_per_conversation() -> usize {
    10
}

fn default_vocabulary_cap() -> usize {
    500
}

fn default_topic_count() -> usize {
    10
}

fn default_keywords_per_topic() -> usize {
    10
}

fn default_window_days() -> i64 {
    30
}
