use crate::batch::BatchConfig;
use crate::cache::CacheConfig;
use crate::deduplication::DeduplicationConfig;
use crate::progressive::ProgressiveOptions;
use crate::Result;
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Prefix for environment overrides, e.g. `STUDIO_PERF_CACHE__TTL_MS=60000`
pub const ENV_PREFIX: &str = "STUDIO_PERF_";

/// Settings for every performance helper, loadable from YAML
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub cache: CacheConfig,
    pub deduplication: DeduplicationConfig,
    pub batch: BatchConfig,
    pub progressive: ProgressiveOptions,
}

impl PerformanceConfig {
    /// Defaults, overridden by the YAML file at `path` (if it exists) and
    /// then by `STUDIO_PERF_*` environment variables
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let config = Self::figment()
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()?;
        log::debug!("Loaded performance config from {}", path.as_ref().display());
        Ok(config)
    }

    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Ok(Self::figment().merge(Yaml::string(yaml)).extract()?)
    }

    fn figment() -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
    }
}

/// Serde adapter storing a `Duration` as whole milliseconds
pub(crate) mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
