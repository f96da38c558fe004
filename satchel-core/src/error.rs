use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SatchelError {
    #[error("queue name cannot be empty")]
    InvalidQueueName,
    #[error("the queue name must be shorter than {0} characters")]
    QueueNameTooLong(usize),
    #[error("the '{0}' character is not allowed in queue names")]
    InvalidCharacter(char),
    #[error("message of {size} bytes exceeds the queue limit of {maxsize} bytes")]
    MessageTooLarge { size: usize, maxsize: u64 },
    #[error("cannot serialize message: {0}")]
    UnserializableMessage(String),
    #[error("cannot deserialize message: {0}")]
    UndeserializableMessage(String),
    #[error("there are no messages in queue '{0}'")]
    NoMessageInQueue(String),
    #[error("the value must not be lower than {0}")]
    ValueTooLow(i64),
    #[error("the value must not be higher than {0}")]
    ValueTooHigh(i64),
    #[error("queue '{0}' already exists")]
    QueueAlreadyExists(String),
    #[error("queue '{0}' does not exist")]
    QueueDoesNotExist(String),
    #[error("no consumer group '{group}' on stream '{stream}'")]
    NoSuchConsumerGroup { stream: String, group: String },
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("serialization error: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("deserialization error: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("storage error: {0}")]
    Storage(String),
}

pub type SatchelResult<T> = Result<T, SatchelError>;
