//! # Satchel
//!
//! A lightweight, persistent, point-to-point message-queue broker with
//! SQS-style semantics: producers push opaque payloads onto named queues,
//! consumers receive them under a per-receive visibility timeout and must
//! delete them to complete the handoff. Undeleted messages become eligible
//! for redelivery when the timeout expires (at-least-once delivery).
//!
//! ## Architecture
//!
//! - **Atomicity**: every mutating queue operation executes as a single
//!   serialized transaction on the storage backend; observers never see a
//!   partial mutation.
//! - **Ordering**: messages are delivered in ascending delivery-time
//!   order; message ids embed a microsecond timestamp and sort by send
//!   time.
//! - **Serialization**: metadata maps travel as MessagePack via
//!   `rmp-serde`; payloads default to JSON through a pluggable codec.
//! - **Streams**: an independent append-log surface with consumer groups,
//!   pending-entry tracking and auto-claim of idle entries.
//!
//! This crate holds the domain types, codecs and store contracts; the
//! `satchel-sqlite` crate provides the embedded reference backend.

pub mod broker;
pub mod codec;
pub mod config;
pub mod error;
pub mod id;
pub mod message;
pub mod queue;
pub mod serialize;
pub mod store;
pub mod stream;
pub mod time;
pub mod validation;

pub use broker::Broker;
pub use codec::{FieldValue, Metadata};
pub use config::{QueueConfig, QueueInfo, QueueMetadata};
pub use error::{SatchelError, SatchelResult};
pub use message::{QueueMessage, ReceivedMessage};
pub use queue::Queue;
pub use serialize::{JsonCodec, PayloadCodec};
pub use store::{PushEntry, QueueStore, StreamStore};
pub use stream::{Consumer, ConsumerGroupInfo, Stream, StreamMessage};
