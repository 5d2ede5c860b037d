//! Redis-backed coordinator client.
//!
//! One multiplexed connection is shared by all operations; every trait
//! method is a single command or one pipelined batch, so the client holds
//! no state beyond the connection itself.

use crate::coordinator::{data_key, event_key, Coordinator, Task};
use crate::core::config::CoordinatorConfig;
use crate::core::error::CoordinatorError;

use async_trait::async_trait;
use redis::aio::MultiplexedConnection;
use redis::AsyncCommands;
use std::fmt;

/// Sorted set holding pending requests, scored by expiry.
const TASKS_KEY: &str = "tasks";

/// Coordinator client speaking to a Redis server.
pub struct RedisCoordinator {
    con: MultiplexedConnection,
    addr: String,
}

impl RedisCoordinator {
    /// Connects to the configured coordinator.
    ///
    /// Connection failures surface as `CoordinatorError::Unavailable`; the
    /// bootstrap treats them as fatal after its ping retries are exhausted.
    pub async fn connect(config: &CoordinatorConfig) -> Result<Self, CoordinatorError> {
        let client = redis::Client::open(config.url())
            .map_err(|e| CoordinatorError::unavailable(e.to_string()))?;
        let con = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| CoordinatorError::unavailable(e.to_string()))?;

        Ok(Self {
            con,
            addr: config.addr.clone(),
        })
    }

    /// Returns the address this client is connected to.
    pub fn addr(&self) -> &str {
        &self.addr
    }
}

impl fmt::Debug for RedisCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisCoordinator")
            .field("addr", &self.addr)
            .finish()
    }
}

/// Decodes one `ZPOPMIN` entry into a task. Scores are stored as whole
/// seconds; fractional scores are truncated.
fn decode_task(member: String, score: f64) -> Task {
    Task {
        root_id: member,
        expire_at: score as i64,
    }
}

#[async_trait]
impl Coordinator for RedisCoordinator {
    async fn pop_task(&self) -> Result<Option<Task>, CoordinatorError> {
        let mut con = self.con.clone();
        let popped: Vec<(String, f64)> = con
            .zpopmin(TASKS_KEY, 1)
            .await
            .map_err(|e| CoordinatorError::io("zpopmin", e.to_string()))?;

        Ok(popped
            .into_iter()
            .next()
            .map(|(member, score)| decode_task(member, score)))
    }

    async fn drain_bytes(&self, pointer: &str) -> Result<Vec<u8>, CoordinatorError> {
        let mut con = self.con.clone();
        let key = data_key(pointer);
        let mut data = Vec::new();

        loop {
            let chunk: Option<Vec<u8>> = con
                .lpop(&key, None)
                .await
                .map_err(|e| CoordinatorError::io("lpop", e.to_string()))?;
            match chunk {
                Some(chunk) => data.extend_from_slice(&chunk),
                None => break,
            }
        }

        Ok(data)
    }

    async fn push_bytes(
        &self,
        pointer: &str,
        chunk: &[u8],
        expire_at: i64,
    ) -> Result<(), CoordinatorError> {
        let mut con = self.con.clone();
        let key = data_key(pointer);

        redis::pipe()
            .cmd("RPUSH")
            .arg(&key)
            .arg(chunk)
            .ignore()
            .cmd("EXPIREAT")
            .arg(&key)
            .arg(expire_at)
            .ignore()
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(|e| CoordinatorError::io("rpush data", e.to_string()))
    }

    async fn emit(
        &self,
        root_id: &str,
        record: &[u8],
        expire_at: i64,
    ) -> Result<(), CoordinatorError> {
        let mut con = self.con.clone();
        let key = event_key(root_id);

        redis::pipe()
            .cmd("RPUSH")
            .arg(&key)
            .arg(record)
            .ignore()
            .cmd("EXPIREAT")
            .arg(&key)
            .arg(expire_at)
            .ignore()
            .query_async::<_, ()>(&mut con)
            .await
            .map_err(|e| CoordinatorError::io("rpush event", e.to_string()))
    }

    async fn ping(&self) -> Result<(), CoordinatorError> {
        let mut con = self.con.clone();
        let reply: String = redis::cmd("PING")
            .query_async(&mut con)
            .await
            .map_err(|e| CoordinatorError::unavailable(e.to_string()))?;

        if reply == "PONG" {
            Ok(())
        } else {
            Err(CoordinatorError::protocol("ping", reply))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_task_truncates_score() {
        let task = decode_task("r1".into(), 1700000000.9);
        assert_eq!(task.root_id, "r1");
        assert_eq!(task.expire_at, 1700000000);
    }
}
