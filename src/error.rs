use thiserror::Error;

/// Rejected `DetectorBuilder` settings.
/// 被拒绝的 `DetectorBuilder` 配置。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("{table} table capacity must be a non-zero power of two, got {value}")]
    Capacity { table: &'static str, value: usize },

    #[error("probe bound must be at least 1")]
    ZeroProbeBound,

    #[error("overflow shard count must be a non-zero power of two, got {0}")]
    Shards(usize),
}
