/// Redis adapter built on the synchronous `redis` client.
///
/// Each [`RedisStore`] owns one TCP connection bound to one logical
/// database, with the configured read/write timeout applied to every
/// request. A timed-out request surfaces as a [`StoreError::Redis`].
use crate::config::ConnectionConfig;
use crate::error::StoreError;
use crate::store::{Connector, KeyValueStore, ScanPage};
use redis::{ConnectionAddr, ConnectionInfo, RedisConnectionInfo, Value};
use tracing::debug;

/// Opens [`RedisStore`] connections for a fixed server and credentials.
#[derive(Debug, Clone)]
pub struct RedisConnector {
    config: ConnectionConfig,
}

impl RedisConnector {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    fn connection_info(&self, db: u32) -> ConnectionInfo {
        ConnectionInfo {
            addr: ConnectionAddr::Tcp(self.config.host.clone(), self.config.port),
            redis: RedisConnectionInfo {
                db: i64::from(db),
                username: self.config.username.clone(),
                password: self.config.password.clone(),
                ..Default::default()
            },
        }
    }
}

impl Connector for RedisConnector {
    type Store = RedisStore;

    fn connect(&self, db: u32) -> Result<RedisStore, StoreError> {
        debug!("Connecting to {} db {db}", self.config.address());
        let client = redis::Client::open(self.connection_info(db))?;
        let conn = client.get_connection_with_timeout(self.config.connect_timeout)?;
        conn.set_read_timeout(Some(self.config.read_timeout))?;
        conn.set_write_timeout(Some(self.config.read_timeout))?;
        Ok(RedisStore { conn, db })
    }
}

/// One Redis connection, already `SELECT`ed into its database.
pub struct RedisStore {
    conn: redis::Connection,
    db: u32,
}

impl RedisStore {
    pub fn db(&self) -> u32 {
        self.db
    }
}

impl KeyValueStore for RedisStore {
    fn ping(&mut self) -> Result<(), StoreError> {
        let pong: String = redis::cmd("PING").query(&mut self.conn)?;
        if pong.is_empty() {
            return Err(StoreError::UnexpectedReply {
                command: "PING",
                detail: "empty reply".into(),
            });
        }
        Ok(())
    }

    fn keyspace_summary(&mut self) -> Result<String, StoreError> {
        Ok(redis::cmd("INFO").arg("keyspace").query(&mut self.conn)?)
    }

    fn scan(&mut self, cursor: u64, pattern: &str, count: usize) -> Result<ScanPage, StoreError> {
        let reply: Value = redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query(&mut self.conn)?;
        scan_page(&reply)
    }

    fn memory_usage(&mut self, key: &[u8]) -> Result<Option<u64>, StoreError> {
        // SAMPLES 0 walks every element of aggregate values instead of
        // extrapolating from the default five.
        Ok(redis::cmd("MEMORY")
            .arg("USAGE")
            .arg(key)
            .arg("SAMPLES")
            .arg(0)
            .query(&mut self.conn)?)
    }
}

/// Decode a `SCAN` reply: the next cursor and the keys as raw bytes.
fn scan_page(reply: &Value) -> Result<ScanPage, StoreError> {
    let (cursor, keys): (u64, Vec<Vec<u8>>) = redis::from_redis_value(reply)?;
    Ok(ScanPage { cursor, keys })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_reply_keeps_binary_keys() {
        let reply = Value::Array(vec![
            Value::BulkString(b"17".to_vec()),
            Value::Array(vec![
                Value::BulkString(b"user:1".to_vec()),
                Value::BulkString(vec![0xff, b':', 0x01]),
            ]),
        ]);
        let page = scan_page(&reply).unwrap();
        assert_eq!(page.cursor, 17);
        assert_eq!(page.keys, vec![b"user:1".to_vec(), vec![0xff, b':', 0x01]]);
    }

    #[test]
    fn malformed_scan_reply_is_an_error() {
        assert!(scan_page(&Value::Okay).is_err());
    }

    #[test]
    fn connection_info_selects_database_and_credentials() {
        let connector = RedisConnector::new(ConnectionConfig {
            host: "redis.example".into(),
            port: 6380,
            username: Some("analyst".into()),
            password: Some("secret".into()),
            ..Default::default()
        });
        let info = connector.connection_info(7);
        assert_eq!(
            info.addr,
            ConnectionAddr::Tcp("redis.example".to_string(), 6380)
        );
        assert_eq!(info.redis.db, 7);
        assert_eq!(info.redis.username.as_deref(), Some("analyst"));
        assert_eq!(info.redis.password.as_deref(), Some("secret"));
    }

    /// Nothing listens on port 1, so connecting must fail with an error
    /// rather than hang or panic.
    #[test]
    fn connect_to_closed_port_fails() {
        let connector = RedisConnector::new(ConnectionConfig {
            host: "127.0.0.1".into(),
            port: 1,
            connect_timeout: std::time::Duration::from_millis(500),
            ..Default::default()
        });
        assert!(connector.connect(0).is_err());
    }
}
