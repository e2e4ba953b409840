//! Configuration constants and parser limits.

use serde::Deserialize;

/// XLIFF 1.2 namespace URI.
pub const XLIFF_1_2_NS: &str = "urn:oasis:names:tc:xliff:document:1.2";

/// XLIFF 2.0 namespace URI.
pub const XLIFF_2_0_NS: &str = "urn:oasis:names:tc:xliff:document:2.0";

/// Unit element name in XLIFF 1.0 and 1.2.
pub const TRANS_UNIT_TAG: &str = "trans-unit";

/// Unit element name in XLIFF 2.0.
pub const UNIT_TAG: &str = "unit";

/// XLIFF 2.0 wrapper holding the source/target pair.
pub const SEGMENT_TAG: &str = "segment";

pub const SOURCE_TAG: &str = "source";

pub const TARGET_TAG: &str = "target";

/// Default upper bound for the fully expanded size of one entity, and for the
/// expanded entity content of a single unit (1 MiB).
pub const DEFAULT_MAX_ENTITY_EXPANSION: usize = 1024 * 1024;

/// Default upper bound for the number of entity substitutions.
///
/// The classic three-level "lol" payload needs 1110 substitutions.
pub const DEFAULT_MAX_ENTITY_SUBSTITUTIONS: usize = 256;

/// Default maximum nesting of entity references inside entity values.
pub const DEFAULT_MAX_ENTITY_DEPTH: usize = 8;

/// Default node limit for one isolated unit subtree.
pub const DEFAULT_NODES_LIMIT: u32 = 100_000;

/// Limits applied by both the outer scan and the per-unit re-parse.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    pub max_entity_expansion: usize,
    pub max_entity_substitutions: usize,
    pub max_entity_depth: usize,
    pub nodes_limit: u32,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_entity_expansion: DEFAULT_MAX_ENTITY_EXPANSION,
            max_entity_substitutions: DEFAULT_MAX_ENTITY_SUBSTITUTIONS,
            max_entity_depth: DEFAULT_MAX_ENTITY_DEPTH,
            nodes_limit: DEFAULT_NODES_LIMIT,
        }
    }
}

impl ParserConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a config from `XLIFF_*` environment variables.
    ///
    /// Missing or unparsable values fall back to the defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_entity_expansion: env_or("XLIFF_MAX_ENTITY_EXPANSION", defaults.max_entity_expansion),
            max_entity_substitutions: env_or(
                "XLIFF_MAX_ENTITY_SUBSTITUTIONS",
                defaults.max_entity_substitutions,
            ),
            max_entity_depth: env_or("XLIFF_MAX_ENTITY_DEPTH", defaults.max_entity_depth),
            nodes_limit: env_or("XLIFF_NODES_LIMIT", defaults.nodes_limit),
        }
    }

    pub fn with_max_entity_expansion(mut self, bytes: usize) -> Self {
        self.max_entity_expansion = bytes;
        self
    }

    pub fn with_max_entity_substitutions(mut self, count: usize) -> Self {
        self.max_entity_substitutions = count;
        self
    }

    pub fn with_max_entity_depth(mut self, depth: usize) -> Self {
        self.max_entity_depth = depth;
        self
    }

    pub fn with_nodes_limit(mut self, limit: u32) -> Self {
        self.nodes_limit = limit;
        self
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}
