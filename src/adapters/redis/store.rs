//! Store handles backed by a Redis connection.

use super::client::{wait_reply, RedisClient};
use super::{RedisCommand, RedisValue};
use crate::core::error::ProbeError;
use crate::probe::key::StoreKey;
use crate::store::{PrimaryStore, ReplicaStore, StoreFuture, TtlEntry, WriteAck};

impl PrimaryStore for RedisClient {
    fn set(&self, entry: &TtlEntry) -> WriteAck {
        let command = RedisCommand::set_ex(entry.key.as_str(), &entry.value, entry.ttl_seconds);
        let receiver = self.dispatch(&command);
        let endpoint = self.endpoint().to_string();

        WriteAck::pending(async move {
            match wait_reply(&endpoint, receiver).await? {
                reply if reply.is_ok() => Ok(()),
                other => Err(ProbeError::protocol(format!(
                    "unexpected SET reply: {:?}",
                    other
                ))),
            }
        })
    }
}

impl ReplicaStore for RedisClient {
    fn get<'a>(&'a self, key: &'a StoreKey) -> StoreFuture<'a, Option<String>> {
        Box::pin(async move {
            match self.request(&RedisCommand::get(key.as_str())).await? {
                RedisValue::Null => Ok(None),
                RedisValue::BulkString(data) => Ok(Some(String::from_utf8_lossy(&data).into_owned())),
                other => Err(ProbeError::protocol(format!(
                    "unexpected GET reply: {:?}",
                    other
                ))),
            }
        })
    }
}
