//! Stream Transport: `FanoutChannel` and `GroupStream` over a
//! Redis-compatible backend, plus the ketama hash ring that picks a shard
//! per topic.

pub mod address;
pub mod error;
pub mod fanout;
pub mod group;
pub mod ring;
pub mod shard;

pub use address::ShardAddr;
pub use error::StreamError;
pub use fanout::{FanoutChannel, FanoutSubscription};
pub use group::{ClaimedEntry, GroupStream};
pub use ring::HashRing;
pub use shard::{check_address, choose_shard};
