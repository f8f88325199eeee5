use std::sync::Arc;

use redis::aio::ConnectionManager;
use uuid::Uuid;

use crate::dispatch::{Dispatch, DispatchFuture};
use crate::error::DispatchError;

/// Creates a single `ConnectionManager` that auto-reconnects on failure.
///
/// `ConnectionManager` is cheaply cloneable: every clone shares the same
/// underlying multiplexed TCP connection, so concurrent dispatches pipeline
/// over one socket.
pub async fn connect(url: &str) -> Result<ConnectionManager, DispatchError> {
    let client = redis::Client::open(url)?;
    Ok(ConnectionManager::new(client).await?)
}

/// Appends one create-instance command per dispatch to a Redis stream.
///
/// The request counts as successful once the broker has acknowledged the
/// `XADD`; consumers of the stream are outside this tool.
#[derive(Clone)]
pub struct RedisDispatcher {
    conn: ConnectionManager,
    stream: Arc<str>,
    process_id: Arc<str>,
}

impl RedisDispatcher {
    pub fn new(conn: ConnectionManager, stream: &str, process_id: &str) -> Self {
        Self {
            conn,
            stream: stream.into(),
            process_id: process_id.into(),
        }
    }
}

impl Dispatch for RedisDispatcher {
    type Future = DispatchFuture;

    fn dispatch(&self) -> DispatchFuture {
        let mut conn = self.conn.clone();
        let stream = self.stream.clone();
        let process_id = self.process_id.clone();

        Box::pin(async move {
            let instance_key = Uuid::new_v4().to_string();
            let created_at = chrono::Utc::now().to_rfc3339();

            let _entry_id: String = redis::cmd("XADD")
                .arg(&*stream)
                .arg("*")
                .arg("instance_key")
                .arg(&instance_key)
                .arg("process_id")
                .arg(&*process_id)
                .arg("created_at")
                .arg(&created_at)
                .query_async(&mut conn)
                .await?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn invalid_url_is_an_error_not_an_exit() {
        let err = match connect("not a redis url").await {
            Err(e) => e,
            Ok(_) => panic!("expected connect to fail"),
        };
        assert!(matches!(err, DispatchError::Redis(_)));
    }
}
