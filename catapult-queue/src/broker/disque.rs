use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use redis::aio::ConnectionManager;
use redis::Value;
use tracing::{debug, info, warn};

use crate::{
    broker::Broker, DisqueConnectOptions, JobDetails, JobId, PushOptions, QueueError, QueueResult,
};

/// Broker backed by a Disque node, spoken to over the RESP protocol.
pub struct DisqueBroker {
    manager: RwLock<Option<ConnectionManager>>,
}

impl DisqueBroker {
    pub async fn connect(options: &DisqueConnectOptions) -> QueueResult<Self> {
        let client = redis::Client::open(options.url())?;
        let manager = ConnectionManager::new(client).await?;
        info!("Connected broker to {}", options.address);
        Ok(Self::from_manager(manager))
    }

    pub fn from_manager(manager: ConnectionManager) -> Self {
        Self {
            manager: RwLock::new(Some(manager)),
        }
    }

    fn connection(&self) -> QueueResult<ConnectionManager> {
        self.manager.read().clone().ok_or(QueueError::Closed)
    }

    async fn show(&self, conn: &mut ConnectionManager, id: &JobId) -> QueueResult<Option<JobDetails>> {
        let reply: Option<Vec<Value>> = redis::cmd("SHOW").arg(id.as_str()).query_async(conn).await?;
        reply.map(|fields| parse_show(id, &fields)).transpose()
    }

    async fn nack_with(&self, conn: &mut ConnectionManager, id: &JobId) -> QueueResult<()> {
        let _: i64 = redis::cmd("NACK").arg(id.as_str()).query_async(conn).await?;
        Ok(())
    }
}

fn seconds(duration: Duration) -> u64 {
    duration.as_secs()
}

/// A job that could not be loaded is nacked; a failed nack leaves it with
/// the broker until its retry period lapses
fn report_hand_back(id: &JobId, result: QueueResult<()>) {
    if let Err(e) = result {
        warn!("Failed to nack job {}: {}", id, e);
    }
}

/// Turn the flat field/value list of `SHOW` into job details
fn parse_show(id: &JobId, fields: &[Value]) -> QueueResult<JobDetails> {
    let mut details = JobDetails::new(id.clone(), String::new(), String::new());

    for pair in fields.chunks(2) {
        let [name, value] = pair else { continue };
        let name: String = redis::from_redis_value(name)?;
        match name.as_str() {
            "queue" => details.queue = redis::from_redis_value(value)?,
            "body" => details.body = redis::from_redis_value(value)?,
            "nacks" => details.nacks = redis::from_redis_value(value)?,
            "additional-deliveries" => details.additional_deliveries = redis::from_redis_value(value)?,
            _ => {}
        }
    }

    if details.queue.is_empty() {
        return Err(QueueError::Broker(format!("SHOW {} returned no queue", id)));
    }
    Ok(details)
}

#[async_trait]
impl Broker for DisqueBroker {
    async fn push(
        &self,
        queue: &str,
        payload: &str,
        timeout: Duration,
        options: &PushOptions,
    ) -> QueueResult<JobId> {
        let mut conn = self.connection()?;
        let mut cmd = redis::cmd("ADDJOB");
        cmd.arg(queue)
            .arg(payload)
            .arg(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX));

        if let Some(delay) = options.delay.map(seconds).filter(|s| *s > 0) {
            cmd.arg("DELAY").arg(delay);
        }
        if let Some(retry) = options.retry {
            cmd.arg("RETRY").arg(seconds(retry));
        }
        if let Some(ttl) = options.ttl {
            cmd.arg("TTL").arg(seconds(ttl).max(1));
        }

        let id: String = cmd.query_async(&mut conn).await?;
        Ok(JobId::from(id))
    }

    async fn fetch_due(
        &self,
        queue: &str,
        count: usize,
        timeout: Duration,
    ) -> QueueResult<Vec<JobDetails>> {
        let mut conn = self.connection()?;
        let reply: Option<Vec<Vec<String>>> = redis::cmd("GETJOB")
            .arg("TIMEOUT")
            .arg(u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX).max(1))
            .arg("COUNT")
            .arg(count.max(1))
            .arg("FROM")
            .arg(queue)
            .query_async(&mut conn)
            .await?;

        let mut batch = Vec::new();
        for entry in reply.unwrap_or_default() {
            let Some(id) = entry.get(1).cloned().map(JobId::from) else {
                continue;
            };
            match self.show(&mut conn, &id).await {
                Ok(Some(details)) => batch.push(details),
                Ok(None) => debug!("Job {} vanished before it could be loaded", id),
                Err(e) => {
                    warn!("Failed to load job {}, handing it back: {}", id, e);
                    report_hand_back(&id, self.nack_with(&mut conn, &id).await);
                }
            }
        }
        Ok(batch)
    }

    async fn get_details(&self, id: &JobId) -> QueueResult<Option<JobDetails>> {
        let mut conn = self.connection()?;
        self.show(&mut conn, id).await
    }

    async fn delete(&self, id: &JobId) -> QueueResult<()> {
        let mut conn = self.connection()?;
        let _: i64 = redis::cmd("DELJOB").arg(id.as_str()).query_async(&mut conn).await?;
        Ok(())
    }

    async fn ack(&self, id: &JobId) -> QueueResult<()> {
        let mut conn = self.connection()?;
        let _: i64 = redis::cmd("ACKJOB").arg(id.as_str()).query_async(&mut conn).await?;
        Ok(())
    }

    async fn nack(&self, id: &JobId) -> QueueResult<()> {
        let mut conn = self.connection()?;
        self.nack_with(&mut conn, id).await
    }

    async fn close(&self) -> QueueResult<()> {
        if self.manager.write().take().is_some() {
            debug!("Closed broker connection manager");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn bulk(s: &str) -> Value {
        Value::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    #[traced_test]
    fn test_failed_hand_back_is_logged() {
        report_hand_back(&JobId::from("D-9"), Ok(()));
        assert!(!logs_contain("Failed to nack"));

        report_hand_back(&JobId::from("D-9"), Err(QueueError::Broker("connection reset".into())));
        assert!(logs_contain("Failed to nack job D-9: Broker error: connection reset"));
    }

    #[test]
    fn test_parse_show() {
        let fields = vec![
            bulk("id"),
            bulk("D-1"),
            bulk("queue"),
            bulk("emails"),
            bulk("nacks"),
            Value::Int(2),
            bulk("additional-deliveries"),
            Value::Int(1),
            bulk("body"),
            bulk("{}"),
        ];

        let details = parse_show(&JobId::from("D-1"), &fields).unwrap();

        assert_eq!(details.queue, "emails");
        assert_eq!(details.body, "{}");
        assert_eq!(details.nacks, 2);
        assert_eq!(details.additional_deliveries, 1);
    }
}
