use redis::RedisError;
use thiserror::Error;

pub type RedisResult<T> = std::result::Result<T, RedisDaoError>;

#[derive(Debug, Error)]
pub enum RedisDaoError {
    #[error("failed to parse Redis connection URL `{url}`")]
    InvalidUrl {
        url: String,
        #[source]
        source: RedisError,
    },
    #[error("failed to establish Redis connection")]
    Connect {
        #[source]
        source: RedisError,
    },
    #[error("Redis `{op}` command failed")]
    Command {
        op: &'static str,
        #[source]
        source: RedisError,
    },
}
