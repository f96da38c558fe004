use rand::Rng;

use crate::codec::{b36_decode, b36_encode};
use crate::error::{SatchelError, SatchelResult};

/// 62-character alphanumeric alphabet for the random id suffix.
const ID_CHARSET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789";

/// Alphabet for short consumer ids, with lookalike characters removed.
const SHORT_ID_CHARSET: &[u8] = b"23456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Number of random characters appended to every message id.
pub const RANDOM_SUFFIX_LEN: usize = 22;

/// Length of an auto-generated consumer name.
pub const SHORT_ID_LEN: usize = 8;

/// Builds a time-sortable unique message id.
///
/// The prefix is the send timestamp in microseconds, base-36 encoded, which
/// keeps ids ordered by send time; the 22 random characters make collisions
/// within a single microsecond vanishingly unlikely (62^-22).
pub fn make_message_id(now_us: u64) -> String {
    let mut rng = rand::thread_rng();
    let mut id = b36_encode(now_us);
    id.reserve(RANDOM_SUFFIX_LEN);
    for _ in 0..RANDOM_SUFFIX_LEN {
        id.push(ID_CHARSET[rng.gen_range(0..ID_CHARSET.len())] as char);
    }
    id
}

/// Generates a short random id, used to auto-name stream consumers.
pub fn short_id() -> String {
    let mut rng = rand::thread_rng();
    (0..SHORT_ID_LEN)
        .map(|_| SHORT_ID_CHARSET[rng.gen_range(0..SHORT_ID_CHARSET.len())] as char)
        .collect()
}

/// Recovers the send timestamp (epoch microseconds) from a message id by
/// decoding the base-36 prefix in front of the random suffix.
pub fn message_sent_us(id: &str) -> SatchelResult<u64> {
    if id.len() <= RANDOM_SUFFIX_LEN {
        return Err(SatchelError::InvalidArgument(format!(
            "message id '{id}' is too short"
        )));
    }
    b36_decode(&id[..id.len() - RANDOM_SUFFIX_LEN])
}
