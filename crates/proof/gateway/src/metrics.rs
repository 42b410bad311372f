//! Metric names recorded by the gateway.

/// Counter: total proof cache hits, labelled with `cache_name`.
pub const CACHE_HITS_TOTAL: &str = "base_gateway_cache_hits_total";

/// Counter: total proof cache misses, labelled with `cache_name`.
pub const CACHE_MISSES_TOTAL: &str = "base_gateway_cache_misses_total";

/// Counter: total proof fetch calls issued to the L2, labelled with `scheme`.
pub const PROOF_FETCHES_TOTAL: &str = "base_gateway_proof_fetches_total";

/// Counter: total commits fetched from a rollup, labelled with `rollup`.
pub const COMMITS_FETCHED_TOTAL: &str = "base_gateway_commits_fetched_total";

/// Counter: total cached commits dropped after failing revalidation, labelled with `rollup`.
pub const COMMITS_INVALIDATED_TOTAL: &str = "base_gateway_commits_invalidated_total";

/// Counter: total requests answered, labelled with `rollup`.
pub const REQUESTS_TOTAL: &str = "base_gateway_requests_total";

/// Label key for cache name.
pub const LABEL_CACHE_NAME: &str = "cache_name";

/// Label key for the proof scheme.
pub const LABEL_SCHEME: &str = "scheme";

/// Label key for the rollup kind.
pub const LABEL_ROLLUP: &str = "rollup";
