//! Startup capability probe.

use std::sync::Arc;
use std::time::Duration;

use redis::aio::MultiplexedConnection;
use redis::Client;

use super::{InProcessExecutor, JobRunner, RedisExecutor, TaskError, TaskExecutor};
use crate::config::EngineConfig;

/// Connect and `PING` within `timeout`.
pub async fn probe_redis(
    url: &str,
    timeout: Duration,
) -> Result<(Client, MultiplexedConnection), TaskError> {
    let client = Client::open(url)?;
    let attempt = async {
        let mut conn = client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<_, String>(&mut conn).await?;
        Ok::<_, redis::RedisError>(conn)
    };
    match tokio::time::timeout(timeout, attempt).await {
        Ok(Ok(conn)) => Ok((client, conn)),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(TaskError::BackendUnreachable(format!(
            "no PING reply within {}ms",
            timeout.as_millis()
        ))),
    }
}

/// Pick the backend once. A configured broker that answers wins; anything
/// else falls back to the in-process executor.
pub async fn select_executor(config: &EngineConfig, runner: Arc<dyn JobRunner>) -> TaskExecutor {
    if let Some(url) = config.redis_url.as_deref() {
        match probe_redis(url, config.backend_probe_timeout).await {
            Ok((client, conn)) => {
                tracing::info!(prefix = %config.redis_key_prefix, "Using Redis task backend");
                return TaskExecutor::Distributed(RedisExecutor::new(
                    client,
                    conn,
                    &config.redis_key_prefix,
                    config.task_retention_window,
                    config.max_task_runtime,
                ));
            }
            Err(e) => {
                tracing::warn!(error = %e, "Redis backend unreachable, using in-process tasks");
            }
        }
    }

    tracing::info!(
        recognition_workers = config.recognition_workers,
        enhancement_workers = config.enhancement_workers,
        "Using in-process task backend"
    );
    TaskExecutor::InProcess(InProcessExecutor::new(
        runner,
        config.recognition_workers,
        config.enhancement_workers,
        config.max_task_runtime,
    ))
}
