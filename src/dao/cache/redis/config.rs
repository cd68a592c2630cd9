/// Connection settings for the Redis cache tier.
#[derive(Debug, Clone)]
pub struct RedisConfig {
    /// Connection URL, e.g. `redis://localhost:6379`.
    pub url: String,
    /// Prefix prepended to every key, isolating this deployment's namespace.
    pub prefix: String,
}

impl RedisConfig {
    const DEFAULT_URL: &'static str = "redis://localhost:6379";
    const DEFAULT_PREFIX: &'static str = "taprush:";

    /// Build a config from `REDIS_URL` / `REDIS_PREFIX`, falling back to
    /// local defaults so a dev setup needs no environment at all.
    pub fn from_env() -> Self {
        Self {
            url: std::env::var("REDIS_URL").unwrap_or_else(|_| Self::DEFAULT_URL.into()),
            prefix: std::env::var("REDIS_PREFIX").unwrap_or_else(|_| Self::DEFAULT_PREFIX.into()),
        }
    }
}
