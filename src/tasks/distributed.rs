//! Redis-brokered task backend.
//!
//! Each task is one JSON record under `{prefix}:task:{id}`. Every status move
//! goes through a Lua compare-and-set so concurrent workers cannot clobber
//! each other. Jobs travel as envelopes on one list per pool; consumers block
//! on `BRPOP` over a connection of their own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::aio::MultiplexedConnection;
use redis::{Client, Script};
use serde::{Deserialize, Serialize};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::in_process::to_chrono;
use super::{execute_job, timeout_failure, JobRunner, TaskError};
use crate::models::{ErrorKind, SlowPassJob, TaskRecord, TaskStatus};

/// Seconds a consumer blocks on an empty queue before checking for shutdown.
const POP_TIMEOUT_SECS: u64 = 1;

/// Pause after a broker error before reconnecting.
const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// KEYS[1] = task key
/// ARGV[1] = expected status, ARGV[2] = next status,
/// ARGV[3] = next record JSON, ARGV[4] = TTL seconds (0 = none)
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if not current then return -1 end
local from = cjson.decode(current)['status']
if from ~= ARGV[1] then return 0 end
local allowed = {
  PENDING = { PROCESSING = true, FAILED = true },
  PROCESSING = { PROCESSING = true, COMPLETED = true, FAILED = true },
}
if not (allowed[from] and allowed[from][ARGV[2]]) then return 0 end
local ttl = tonumber(ARGV[4])
if ttl > 0 then
  redis.call('SET', KEYS[1], ARGV[3], 'EX', ttl)
else
  redis.call('SET', KEYS[1], ARGV[3])
end
return 1
"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pool {
    Recognition,
    Enhancement,
}

impl Pool {
    pub fn for_job(job: &SlowPassJob) -> Self {
        if job.needs_recognition {
            Pool::Recognition
        } else {
            Pool::Enhancement
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Pool::Recognition => "recognition",
            Pool::Enhancement => "enhancement",
        }
    }
}

/// Key naming under one configurable prefix.
#[derive(Debug, Clone)]
pub struct KeySpace {
    prefix: String,
}

impl KeySpace {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.trim_end_matches(':').to_string(),
        }
    }

    pub fn task(&self, task_id: &str) -> String {
        format!("{}:task:{task_id}", self.prefix)
    }

    pub fn task_pattern(&self) -> String {
        format!("{}:task:*", self.prefix)
    }

    pub fn queue(&self, pool: Pool) -> String {
        format!("{}:queue:{}", self.prefix, pool.as_str())
    }
}

/// What travels on a queue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub task_id: String,
    pub job: SlowPassJob,
}

#[derive(Clone)]
pub struct RedisExecutor {
    client: Client,
    conn: MultiplexedConnection,
    keys: KeySpace,
    retention: Duration,
    max_runtime: Duration,
}

impl RedisExecutor {
    pub fn new(
        client: Client,
        conn: MultiplexedConnection,
        key_prefix: &str,
        retention: Duration,
        max_runtime: Duration,
    ) -> Self {
        Self {
            client,
            conn,
            keys: KeySpace::new(key_prefix),
            retention,
            max_runtime,
        }
    }

    pub fn keys(&self) -> &KeySpace {
        &self.keys
    }

    /// Write the `PENDING` record and enqueue the envelope in one
    /// transaction.
    pub async fn submit(&self, job: SlowPassJob) -> Result<String, TaskError> {
        let task_id = Uuid::new_v4().to_string();
        let record = TaskRecord::pending(task_id.clone(), job.document_id.clone());
        let queue = self.keys.queue(Pool::for_job(&job));
        let envelope = JobEnvelope {
            task_id: task_id.clone(),
            job,
        };

        let mut conn = self.conn.clone();
        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.keys.task(&task_id))
            .arg(serde_json::to_string(&record)?)
            .ignore()
            .cmd("LPUSH")
            .arg(&queue)
            .arg(serde_json::to_string(&envelope)?)
            .ignore()
            .query_async::<_, ()>(&mut conn)
            .await?;

        tracing::debug!(task_id = %task_id, queue = %queue, "Task enqueued");
        Ok(task_id)
    }

    pub async fn get(&self, task_id: &str) -> Result<Option<TaskRecord>, TaskError> {
        let mut conn = self.conn.clone();
        let raw: Option<String> = redis::cmd("GET")
            .arg(self.keys.task(task_id))
            .query_async(&mut conn)
            .await?;
        raw.map(|json| serde_json::from_str(&json).map_err(TaskError::from))
            .transpose()
    }

    /// Atomic compare-and-set on the stored status. Terminal records get
    /// the retention TTL.
    pub async fn compare_and_set(
        &self,
        expected: TaskStatus,
        next: &TaskRecord,
    ) -> Result<bool, TaskError> {
        let ttl = if next.status.is_terminal() {
            self.retention.as_secs().max(1)
        } else {
            0
        };
        let mut conn = self.conn.clone();
        let applied: i64 = Script::new(CAS_SCRIPT)
            .key(self.keys.task(&next.task_id))
            .arg(expected.as_str())
            .arg(next.status.as_str())
            .arg(serde_json::to_string(next)?)
            .arg(ttl)
            .invoke_async(&mut conn)
            .await?;

        match applied {
            1 => Ok(true),
            -1 => Err(TaskError::NotFound(next.task_id.clone())),
            _ => Ok(false),
        }
    }

    pub async fn ping(&self) -> bool {
        let mut conn = self.conn.clone();
        redis::cmd("PING")
            .query_async::<_, String>(&mut conn)
            .await
            .is_ok()
    }

    /// Terminal records expire through their TTL, so there is nothing to do.
    pub async fn cleanup(&self, _older_than: Duration) -> Result<usize, TaskError> {
        Ok(0)
    }

    /// Scan every task record and fail the overdue `PROCESSING` ones. This
    /// is how a lost worker surfaces.
    pub async fn expire_overdue(&self) -> Result<usize, TaskError> {
        let mut conn = self.conn.clone();
        let now = Utc::now();
        let limit = to_chrono(self.max_runtime);
        let failure = timeout_failure(self.max_runtime);
        let mut cursor: u64 = 0;
        let mut expired = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = redis::cmd("SCAN")
                .cursor_arg(cursor)
                .arg("MATCH")
                .arg(self.keys.task_pattern())
                .arg("COUNT")
                .arg(200)
                .query_async(&mut conn)
                .await?;

            for key in keys {
                let raw: Option<String> = redis::cmd("GET").arg(&key).query_async(&mut conn).await?;
                let Some(record) = raw.and_then(|json| serde_json::from_str::<TaskRecord>(&json).ok())
                else {
                    continue;
                };
                if record.is_overdue(now, limit) {
                    let failed = record.failed(ErrorKind::TaskTimeout, failure.message.clone());
                    if self.compare_and_set(TaskStatus::Processing, &failed).await? {
                        expired += 1;
                    }
                }
            }

            if next_cursor == 0 {
                break;
            }
            cursor = next_cursor;
        }
        Ok(expired)
    }

    /// Start consumer loops: `recognition` on the recognition queue and
    /// `enhancement` on the enhancement queue. Each pool shares one set of
    /// slots, so a consumer whose job timed out waits for that body to end
    /// before taking more work.
    pub fn spawn_consumers(
        &self,
        runner: Arc<dyn JobRunner>,
        recognition: usize,
        enhancement: usize,
        shutdown: Arc<AtomicBool>,
    ) -> Vec<JoinHandle<()>> {
        let recognition = recognition.max(1);
        let enhancement = enhancement.max(1);
        let recognition_slots = Arc::new(Semaphore::new(recognition));
        let enhancement_slots = Arc::new(Semaphore::new(enhancement));
        let pools = std::iter::repeat((Pool::Recognition, recognition_slots))
            .take(recognition)
            .chain(std::iter::repeat((Pool::Enhancement, enhancement_slots)).take(enhancement));

        pools
            .enumerate()
            .map(|(worker, (pool, slots))| {
                let executor = self.clone();
                let runner = Arc::clone(&runner);
                let shutdown = Arc::clone(&shutdown);
                tokio::spawn(async move {
                    executor.consume(worker, pool, slots, runner, shutdown).await;
                })
            })
            .collect()
    }

    async fn consume(
        &self,
        worker: usize,
        pool: Pool,
        slots: Arc<Semaphore>,
        runner: Arc<dyn JobRunner>,
        shutdown: Arc<AtomicBool>,
    ) {
        let queue = self.keys.queue(pool);
        tracing::info!(worker, queue = %queue, "Consumer started");

        while !shutdown.load(Ordering::Relaxed) {
            // BRPOP blocks the connection, so each consumer owns one.
            let mut blocking = match self.client.get_multiplexed_async_connection().await {
                Ok(conn) => conn,
                Err(e) => {
                    tracing::warn!(worker, error = %e, "Consumer cannot reach broker, retrying");
                    tokio::time::sleep(RECONNECT_BACKOFF).await;
                    continue;
                }
            };

            while !shutdown.load(Ordering::Relaxed) {
                let Ok(permit) = Arc::clone(&slots).acquire_owned().await else {
                    return;
                };
                let popped: Option<(String, String)> = match redis::cmd("BRPOP")
                    .arg(&queue)
                    .arg(POP_TIMEOUT_SECS)
                    .query_async(&mut blocking)
                    .await
                {
                    Ok(popped) => popped,
                    Err(e) => {
                        tracing::warn!(worker, error = %e, "BRPOP failed, reconnecting");
                        tokio::time::sleep(RECONNECT_BACKOFF).await;
                        break;
                    }
                };
                let Some((_, payload)) = popped else {
                    continue;
                };
                match serde_json::from_str::<JobEnvelope>(&payload) {
                    Ok(envelope) => {
                        if let Err(e) = self.handle(envelope, Arc::clone(&runner), permit).await {
                            tracing::error!(worker, error = %e, "Task handling failed");
                        }
                    }
                    Err(e) => tracing::error!(worker, error = %e, "Dropping malformed envelope"),
                }
            }
        }
        tracing::info!(worker, queue = %queue, "Consumer shutting down");
    }

    async fn handle(
        &self,
        envelope: JobEnvelope,
        runner: Arc<dyn JobRunner>,
        permit: OwnedSemaphorePermit,
    ) -> Result<(), TaskError> {
        let task_id = envelope.task_id;
        let Some(record) = self.get(&task_id).await? else {
            tracing::warn!(task_id = %task_id, "Envelope for unknown or expired task");
            return Ok(());
        };
        if record.status.is_terminal() {
            return Ok(());
        }

        let processing = record.processing();
        if !self.compare_and_set(record.status, &processing).await? {
            tracing::debug!(task_id = %task_id, "Task claimed elsewhere");
            return Ok(());
        }
        tracing::debug!(task_id = %task_id, document_id = %envelope.job.document_id, "Task picked up");

        let terminal = match execute_job(runner, envelope.job, self.max_runtime, permit).await {
            Ok(result) => processing.completed(result),
            Err(failure) => processing.failed(failure.kind, failure.message),
        };
        if !self.compare_and_set(TaskStatus::Processing, &terminal).await? {
            tracing::warn!(task_id = %task_id, "Late task outcome rejected");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tasks::testing::job;

    #[test]
    fn keys_share_one_prefix() {
        let keys = KeySpace::new("docflow:");
        assert_eq!(keys.task("abc"), "docflow:task:abc");
        assert_eq!(keys.task_pattern(), "docflow:task:*");
        assert_eq!(keys.queue(Pool::Recognition), "docflow:queue:recognition");
        assert_eq!(keys.queue(Pool::Enhancement), "docflow:queue:enhancement");
    }

    #[test]
    fn jobs_route_by_recognition_need() {
        assert_eq!(Pool::for_job(&job("d", true)), Pool::Recognition);
        assert_eq!(Pool::for_job(&job("d", false)), Pool::Enhancement);
    }

    #[test]
    fn envelope_wire_shape() {
        let envelope = JobEnvelope {
            task_id: "t1".into(),
            job: job("abc", true),
        };
        let json = serde_json::to_value(&envelope).unwrap();
        assert_eq!(json["task_id"], "t1");
        assert_eq!(json["job"]["document_id"], "abc");
        assert_eq!(json["job"]["format"], "image");
        assert_eq!(json["job"]["needs_recognition"], true);

        let back: JobEnvelope = serde_json::from_value(json).unwrap();
        assert_eq!(back, envelope);
    }

    #[test]
    fn script_allows_same_moves_as_state_machine() {
        let allowed = [
            ("PENDING", "PROCESSING"),
            ("PENDING", "FAILED"),
            ("PROCESSING", "PROCESSING"),
            ("PROCESSING", "COMPLETED"),
            ("PROCESSING", "FAILED"),
        ];
        for (from, to) in allowed {
            let from: TaskStatus = from.parse().unwrap();
            let to: TaskStatus = to.parse().unwrap();
            assert!(from.can_transition_to(to));
            assert!(CAS_SCRIPT.contains(&format!("{} = true", to.as_str())));
        }
        assert!(!TaskStatus::Completed.can_transition_to(TaskStatus::Processing));
        assert!(!CAS_SCRIPT.contains("COMPLETED = {"));
        assert!(!CAS_SCRIPT.contains("FAILED = {"));
    }
}
