//! Redis-backed event queue.
//!
//! Key layout under the configured prefix:
//!
//! | key | type | role |
//! |---|---|---|
//! | `{p}:queue` | list | pending events, `LPUSH` in, `BLMOVE` out |
//! | `{p}:dedup:{key}` | string | duplicate marker with expiry |
//! | `{p}:inflight` | list | every popped event, moved here atomically |
//! | `{p}:processing:{id}` | string | TTL stamp of an in-flight event |
//! | `{p}:dlq` | list | dead letters, oldest at the tail |
//!
//! An entry in `{p}:inflight` without a stamp was popped by a worker that
//! never got to stamp it. Recovery stamps it on first sight, so it ages
//! out like any other in-flight event. Needs Redis 6.2 for `BLMOVE`.

use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Client, Script};
use async_trait::async_trait;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{EventQueue, FailOutcome, QueueError, QueueStats, record_failure};
use crate::config::QueueConfig;
use crate::events::QueuedEvent;

/// KEYS: dedup marker, queue. ARGV: marker ttl (s), event json.
const PUSH_DEDUP_SCRIPT: &str = r#"
if not redis.call('SET', KEYS[1], '1', 'NX', 'EX', ARGV[1]) then
  return 0
end
redis.call('LPUSH', KEYS[2], ARGV[2])
return 1
"#;

/// KEYS: processing key, inflight, queue. ARGV: raw event, threshold (s),
/// processing ttl (s).
const RECOVER_SCRIPT: &str = r#"
local ttl = redis.call('TTL', KEYS[1])
if ttl == -2 then
  if redis.call('LPOS', KEYS[2], ARGV[1]) then
    redis.call('SET', KEYS[1], ARGV[1], 'EX', ARGV[3])
  end
  return 0
end
if ttl < 0 or ttl >= tonumber(ARGV[2]) then
  return 0
end
if redis.call('LREM', KEYS[2], 1, ARGV[1]) == 0 then
  redis.call('DEL', KEYS[1])
  return 0
end
redis.call('DEL', KEYS[1])
redis.call('RPUSH', KEYS[3], ARGV[1])
return 1
"#;

/// KEYS: processing key, inflight. Returns the stamped entry, if any.
const ACK_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if raw then
  redis.call('LREM', KEYS[2], 1, raw)
  redis.call('DEL', KEYS[1])
end
return raw
"#;

/// KEYS: processing key, inflight, target list. ARGV: updated event json.
const FAIL_SCRIPT: &str = r#"
local raw = redis.call('GET', KEYS[1])
if raw then
  redis.call('LREM', KEYS[2], 1, raw)
  redis.call('DEL', KEYS[1])
end
redis.call('LPUSH', KEYS[3], ARGV[1])
return 1
"#;

/// KEYS: dlq, queue.
const REPLAY_SCRIPT: &str = r#"
local n = 0
while true do
  local raw = redis.call('RPOP', KEYS[1])
  if not raw then
    break
  end
  local event = cjson.decode(raw)
  event['retry_count'] = 0
  redis.call('LPUSH', KEYS[2], cjson.encode(event))
  n = n + 1
end
return n
"#;

pub struct RedisEventQueue {
    manager: ConnectionManager,
    /// `BLMOVE` holds its connection; keep it off the shared one.
    blocking: Mutex<ConnectionManager>,
    config: QueueConfig,
    push_dedup: Script,
    recover: Script,
    ack: Script,
    fail: Script,
    replay: Script,
}

impl RedisEventQueue {
    pub async fn connect(url: &str, config: QueueConfig) -> Result<Self, QueueError> {
        let client = Client::open(url)?;
        let manager = ConnectionManager::new(client.clone()).await?;
        let blocking = ConnectionManager::new(client).await?;
        debug!(prefix = %config.key_prefix, "Redis event queue connected");
        Ok(Self {
            manager,
            blocking: Mutex::new(blocking),
            config,
            push_dedup: Script::new(PUSH_DEDUP_SCRIPT),
            recover: Script::new(RECOVER_SCRIPT),
            ack: Script::new(ACK_SCRIPT),
            fail: Script::new(FAIL_SCRIPT),
            replay: Script::new(REPLAY_SCRIPT),
        })
    }

    fn queue_key(&self) -> String {
        format!("{}:queue", self.config.key_prefix)
    }

    fn inflight_key(&self) -> String {
        format!("{}:inflight", self.config.key_prefix)
    }

    fn dlq_key(&self) -> String {
        format!("{}:dlq", self.config.key_prefix)
    }

    fn dedup_key(&self, key: &str) -> String {
        format!("{}:dedup:{}", self.config.key_prefix, key)
    }

    fn processing_key(&self, id: Uuid) -> String {
        format!("{}:processing:{}", self.config.key_prefix, id)
    }

    /// Move an unparseable in-flight entry to the dead letters.
    async fn bury_malformed(&self, raw: &str) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let _: () = ::redis::pipe()
            .atomic()
            .lrem(self.inflight_key(), 1, raw)
            .ignore()
            .lpush(self.dlq_key(), raw)
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl EventQueue for RedisEventQueue {
    async fn push(&self, event: QueuedEvent) -> Result<Option<Uuid>, QueueError> {
        let json = serde_json::to_string(&event)?;
        let mut conn = self.manager.clone();
        match event.dedup_key() {
            Some(key) => {
                let pushed: i64 = self
                    .push_dedup
                    .key(self.dedup_key(&key))
                    .key(self.queue_key())
                    .arg(self.config.dedup_ttl.as_secs().max(1))
                    .arg(json)
                    .invoke_async(&mut conn)
                    .await?;
                if pushed == 0 {
                    debug!(address = %event.address, slot = event.slot, "Duplicate event dropped");
                    return Ok(None);
                }
            }
            None => {
                let _: i64 = conn.lpush(self.queue_key(), json).await?;
            }
        }
        Ok(Some(event.id))
    }

    async fn pop(&self, timeout: Duration) -> Result<Option<QueuedEvent>, QueueError> {
        let popped: Option<String> = {
            let mut conn = self.blocking.lock().await;
            ::redis::cmd("BLMOVE")
                .arg(self.queue_key())
                .arg(self.inflight_key())
                .arg("RIGHT")
                .arg("LEFT")
                .arg(timeout.as_secs().max(1))
                .query_async(&mut *conn)
                .await?
        };
        let Some(json) = popped else {
            return Ok(None);
        };
        let event: QueuedEvent = match serde_json::from_str(&json) {
            Ok(event) => event,
            Err(e) => {
                // unparseable entries cannot be acked or failed; park them
                warn!(error = %e, "Dropping malformed queue entry into dead letters");
                self.bury_malformed(&json).await?;
                return Ok(None);
            }
        };
        // already in the inflight list; a failed stamp is picked up by recovery
        let mut conn = self.manager.clone();
        let _: () = ::redis::cmd("SET")
            .arg(self.processing_key(event.id))
            .arg(json)
            .arg("EX")
            .arg(self.config.processing_ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(Some(event))
    }

    async fn ack(&self, id: Uuid) -> Result<(), QueueError> {
        let mut conn = self.manager.clone();
        let raw: Option<String> = self
            .ack
            .key(self.processing_key(id))
            .key(self.inflight_key())
            .invoke_async(&mut conn)
            .await?;
        if raw.is_none() {
            warn!(event_id = %id, "Acked event had no processing stamp");
        }
        Ok(())
    }

    async fn fail(&self, mut event: QueuedEvent, error: &str) -> Result<FailOutcome, QueueError> {
        let outcome = record_failure(&mut event, error);
        let target = match outcome {
            FailOutcome::Requeued { .. } => self.queue_key(),
            FailOutcome::DeadLettered => self.dlq_key(),
        };
        let json = serde_json::to_string(&event)?;
        let mut conn = self.manager.clone();
        let _: i64 = self
            .fail
            .key(self.processing_key(event.id))
            .key(self.inflight_key())
            .key(target)
            .arg(json)
            .invoke_async(&mut conn)
            .await?;
        Ok(outcome)
    }

    async fn stats(&self) -> Result<QueueStats, QueueError> {
        let mut conn = self.manager.clone();
        let (queue_length, processing_count, dlq_length): (u64, u64, u64) = ::redis::pipe()
            .llen(self.queue_key())
            .llen(self.inflight_key())
            .llen(self.dlq_key())
            .query_async(&mut conn)
            .await?;
        Ok(QueueStats {
            queue_length,
            processing_count,
            dlq_length,
        })
    }

    async fn recover_stale(&self) -> Result<u64, QueueError> {
        let threshold = self.config.recovery_threshold.as_secs().max(1);
        let ttl = self.config.processing_ttl.as_secs().max(1);
        let mut conn = self.manager.clone();
        let inflight: Vec<String> = conn.lrange(self.inflight_key(), 0, -1).await?;
        let mut recovered = 0;
        for raw in inflight {
            let id = match serde_json::from_str::<QueuedEvent>(&raw) {
                Ok(event) => event.id,
                Err(e) => {
                    warn!(error = %e, "Moving malformed in-flight entry into dead letters");
                    self.bury_malformed(&raw).await?;
                    continue;
                }
            };
            let moved: i64 = self
                .recover
                .key(self.processing_key(id))
                .key(self.inflight_key())
                .key(self.queue_key())
                .arg(&raw)
                .arg(threshold)
                .arg(ttl)
                .invoke_async(&mut conn)
                .await?;
            if moved == 1 {
                warn!(event_id = %id, "Re-enqueued stale in-flight event");
                recovered += 1;
            }
        }
        Ok(recovered)
    }

    async fn dead_letters(&self, limit: usize) -> Result<(Vec<QueuedEvent>, u64), QueueError> {
        let mut conn = self.manager.clone();
        let total: u64 = conn.llen(self.dlq_key()).await?;
        if limit == 0 {
            return Ok((Vec::new(), total));
        }
        // LPUSH puts the newest at the head, so the oldest are at the tail
        let stop = -1_isize;
        let start = -(limit.min(isize::MAX as usize) as isize);
        let raw: Vec<String> = conn.lrange(self.dlq_key(), start, stop).await?;
        let entries = raw
            .iter()
            .rev()
            .filter_map(|json| match serde_json::from_str(json) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Skipping malformed dead letter");
                    None
                }
            })
            .collect();
        Ok((entries, total))
    }

    async fn clear_dead_letters(&self) -> Result<u64, QueueError> {
        let mut conn = self.manager.clone();
        let (cleared, _): (u64, i64) = ::redis::pipe()
            .atomic()
            .llen(self.dlq_key())
            .del(self.dlq_key())
            .query_async(&mut conn)
            .await?;
        Ok(cleared)
    }

    async fn replay_dead_letters(&self) -> Result<u64, QueueError> {
        let mut conn = self.manager.clone();
        let replayed: u64 = self
            .replay
            .key(self.dlq_key())
            .key(self.queue_key())
            .invoke_async(&mut conn)
            .await?;
        Ok(replayed)
    }
}
