use std::collections::BTreeMap;
use std::time::Duration;

use rusqlite::{params, OptionalExtension, Transaction};
use satchel_core::error::{SatchelError, SatchelResult};
use satchel_core::store::StreamStore;
use satchel_core::stream::{ConsumerGroupInfo, StreamMessage};
use satchel_core::validation::validate_queue_name;
use tracing::debug;

use crate::{db_err, Storage};

fn format_stream_id(ms: i64, seq: i64) -> String {
    format!("{ms}-{seq}")
}

fn parse_stream_id(id: &str) -> SatchelResult<(i64, i64)> {
    let invalid = || SatchelError::InvalidArgument(format!("invalid stream id '{id}'"));
    let (ms, seq) = id.split_once('-').ok_or_else(invalid)?;
    Ok((
        ms.parse().map_err(|_| invalid())?,
        seq.parse().map_err(|_| invalid())?,
    ))
}

fn encode_fields(fields: &BTreeMap<String, String>) -> SatchelResult<Vec<u8>> {
    Ok(rmp_serde::to_vec(fields)?)
}

fn decode_fields(bytes: &[u8]) -> SatchelResult<BTreeMap<String, String>> {
    Ok(rmp_serde::from_slice(bytes)?)
}

/// Last entry id of the stream, `(0, 0)` when empty.
fn tail_entry(tx: &Transaction<'_>, stream: &str) -> SatchelResult<(i64, i64)> {
    let tail = tx
        .query_row(
            "SELECT ms, seq FROM stream_entries WHERE stream = ?1
             ORDER BY ms DESC, seq DESC LIMIT 1",
            params![stream],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(db_err)?;
    Ok(tail.unwrap_or((0, 0)))
}

fn group_cursor(tx: &Transaction<'_>, stream: &str, group: &str) -> SatchelResult<Option<(i64, i64)>> {
    tx.query_row(
        "SELECT last_ms, last_seq FROM stream_groups WHERE stream = ?1 AND grp = ?2",
        params![stream, group],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(db_err)
}

fn no_such_group(stream: &str, group: &str) -> SatchelError {
    SatchelError::NoSuchConsumerGroup {
        stream: stream.to_string(),
        group: group.to_string(),
    }
}

fn ensure_group(
    tx: &Transaction<'_>,
    stream: &str,
    group: &str,
    from_start: bool,
) -> SatchelResult<bool> {
    if group_cursor(tx, stream, group)?.is_some() {
        return Ok(false);
    }
    let (last_ms, last_seq, entries_read) = if from_start {
        (0, 0, 0i64)
    } else {
        let (ms, seq) = tail_entry(tx, stream)?;
        let read: i64 = tx
            .query_row(
                "SELECT COUNT(*) FROM stream_entries WHERE stream = ?1",
                params![stream],
                |row| row.get(0),
            )
            .map_err(db_err)?;
        (ms, seq, read)
    };
    tx.execute(
        "INSERT INTO stream_groups (stream, grp, last_ms, last_seq, entries_read)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![stream, group, last_ms, last_seq, entries_read],
    )
    .map_err(db_err)?;
    Ok(true)
}

fn register_consumer(
    tx: &Transaction<'_>,
    stream: &str,
    group: &str,
    consumer: &str,
) -> SatchelResult<()> {
    tx.execute(
        "INSERT OR IGNORE INTO stream_consumers (stream, grp, consumer) VALUES (?1, ?2, ?3)",
        params![stream, group, consumer],
    )
    .map_err(db_err)?;
    Ok(())
}

impl Storage {
    fn try_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        noack: bool,
    ) -> SatchelResult<Vec<StreamMessage>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_ms = self.clock().now_system_ms();
        let Some((last_ms, last_seq)) = group_cursor(&tx, stream, group)? else {
            return Err(no_such_group(stream, group));
        };
        register_consumer(&tx, stream, group, consumer)?;

        let rows = {
            let mut stmt = tx
                .prepare(
                    "SELECT ms, seq, fields FROM stream_entries
                     WHERE stream = ?1 AND (ms > ?2 OR (ms = ?2 AND seq > ?3))
                     ORDER BY ms ASC, seq ASC LIMIT ?4",
                )
                .map_err(db_err)?;
            let result = stmt
                .query_map(params![stream, last_ms, last_seq, count as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            result
        };
        let Some(&(tip_ms, tip_seq, _)) = rows.last() else {
            tx.commit().map_err(db_err)?;
            return Ok(Vec::new());
        };

        if !noack {
            for &(ms, seq, _) in &rows {
                tx.execute(
                    "INSERT INTO stream_pending (stream, grp, ms, seq, consumer, delivered_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![stream, group, ms, seq, consumer, now_ms],
                )
                .map_err(db_err)?;
            }
        }
        tx.execute(
            "UPDATE stream_groups SET last_ms = ?3, last_seq = ?4,
             entries_read = entries_read + ?5 WHERE stream = ?1 AND grp = ?2",
            params![stream, group, tip_ms, tip_seq, rows.len() as i64],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        rows.into_iter()
            .map(|(ms, seq, fields)| {
                Ok(StreamMessage {
                    stream_id: format_stream_id(ms, seq),
                    fields: decode_fields(&fields)?,
                })
            })
            .collect()
    }
}

impl StreamStore for Storage {
    fn publish(&self, stream: &str, fields: &BTreeMap<String, String>) -> SatchelResult<String> {
        validate_queue_name(stream)?;
        let encoded = encode_fields(fields)?;
        let id = {
            let mut conn = self.conn.lock().unwrap();
            let tx = conn.transaction().map_err(db_err)?;
            let now_ms = self.clock().now_system_ms();
            let (tail_ms, tail_seq) = tail_entry(&tx, stream)?;
            // Ids never move backwards: same-millisecond publishes bump seq.
            let (ms, seq) = if now_ms > tail_ms {
                (now_ms, 0)
            } else {
                (tail_ms, tail_seq + 1)
            };
            tx.execute(
                "INSERT INTO stream_entries (stream, ms, seq, fields) VALUES (?1, ?2, ?3, ?4)",
                params![stream, ms, seq, encoded],
            )
            .map_err(db_err)?;
            tx.commit().map_err(db_err)?;
            format_stream_id(ms, seq)
        };
        self.publish_signal.notify();
        Ok(id)
    }

    fn create_consumer_group(
        &self,
        stream: &str,
        group: &str,
        from_start: bool,
    ) -> SatchelResult<()> {
        validate_queue_name(stream)?;
        validate_queue_name(group)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let created = ensure_group(&tx, stream, group, from_start)?;
        tx.commit().map_err(db_err)?;
        if created {
            debug!("created consumer group {group} on stream {stream}");
        }
        Ok(())
    }

    fn list_consumer_groups(&self, stream: &str) -> SatchelResult<Vec<ConsumerGroupInfo>> {
        validate_queue_name(stream)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let groups = {
            let mut stmt = tx
                .prepare(
                    "SELECT grp, last_ms, last_seq, entries_read FROM stream_groups
                     WHERE stream = ?1 ORDER BY grp",
                )
                .map_err(db_err)?;
            let result = stmt
                .query_map(params![stream], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            result
        };

        let mut infos = Vec::with_capacity(groups.len());
        for (name, last_ms, last_seq, entries_read) in groups {
            let consumers: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM stream_consumers WHERE stream = ?1 AND grp = ?2",
                    params![stream, name],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            let pending: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM stream_pending WHERE stream = ?1 AND grp = ?2",
                    params![stream, name],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            let lag: i64 = tx
                .query_row(
                    "SELECT COUNT(*) FROM stream_entries
                     WHERE stream = ?1 AND (ms > ?2 OR (ms = ?2 AND seq > ?3))",
                    params![stream, last_ms, last_seq],
                    |row| row.get(0),
                )
                .map_err(db_err)?;
            infos.push(ConsumerGroupInfo {
                name,
                consumers: consumers as u64,
                pending: pending as u64,
                last_delivered_id: format_stream_id(last_ms, last_seq),
                entries_read: entries_read as u64,
                lag: lag as u64,
            });
        }
        Ok(infos)
    }

    fn delete_consumer_group(&self, stream: &str, group: &str) -> SatchelResult<()> {
        validate_queue_name(stream)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute(
            "DELETE FROM stream_pending WHERE stream = ?1 AND grp = ?2",
            params![stream, group],
        )
        .map_err(db_err)?;
        tx.execute(
            "DELETE FROM stream_consumers WHERE stream = ?1 AND grp = ?2",
            params![stream, group],
        )
        .map_err(db_err)?;
        let removed = tx
            .execute(
                "DELETE FROM stream_groups WHERE stream = ?1 AND grp = ?2",
                params![stream, group],
            )
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        if removed > 0 {
            debug!("deleted consumer group {group} on stream {stream}");
        }
        Ok(())
    }

    fn create_consumer(&self, stream: &str, group: &str, consumer: &str) -> SatchelResult<()> {
        validate_queue_name(stream)?;
        validate_queue_name(group)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        ensure_group(&tx, stream, group, true)?;
        register_consumer(&tx, stream, group, consumer)?;
        tx.commit().map_err(db_err)?;
        Ok(())
    }

    fn read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        timeout_ms: Option<u64>,
        noack: bool,
    ) -> SatchelResult<Vec<StreamMessage>> {
        validate_queue_name(stream)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let deadline = timeout_ms.map(|ms| self.clock().now_instant() + Duration::from_millis(ms));
        loop {
            let seen = self.publish_signal.generation();
            let messages = self.try_read_group(stream, group, consumer, count, noack)?;
            if !messages.is_empty() {
                return Ok(messages);
            }
            let Some(deadline) = deadline else {
                return Ok(messages);
            };
            if !self.publish_signal.wait_past(seen, deadline) {
                return Ok(Vec::new());
            }
        }
    }

    fn auto_claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        count: usize,
    ) -> SatchelResult<Vec<StreamMessage>> {
        validate_queue_name(stream)?;
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_ms = self.clock().now_system_ms();
        if group_cursor(&tx, stream, group)?.is_none() {
            return Err(no_such_group(stream, group));
        }
        register_consumer(&tx, stream, group, consumer)?;

        let cutoff = now_ms.saturating_sub(min_idle_ms as i64);
        let rows = {
            let mut stmt = tx
                .prepare(
                    "SELECT p.ms, p.seq, e.fields FROM stream_pending p
                     JOIN stream_entries e
                       ON e.stream = p.stream AND e.ms = p.ms AND e.seq = p.seq
                     WHERE p.stream = ?1 AND p.grp = ?2 AND p.delivered_at <= ?3
                     ORDER BY p.ms ASC, p.seq ASC LIMIT ?4",
                )
                .map_err(db_err)?;
            let result = stmt
                .query_map(params![stream, group, cutoff, count as i64], |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, Vec<u8>>(2)?,
                    ))
                })
                .map_err(db_err)?
                .collect::<Result<Vec<_>, _>>()
                .map_err(db_err)?;
            result
        };

        // Ownership transfers to the caller and the pending timer restarts.
        for &(ms, seq, _) in &rows {
            tx.execute(
                "UPDATE stream_pending SET consumer = ?5, delivered_at = ?6,
                 delivery_count = delivery_count + 1
                 WHERE stream = ?1 AND grp = ?2 AND ms = ?3 AND seq = ?4",
                params![stream, group, ms, seq, consumer, now_ms],
            )
            .map_err(db_err)?;
        }
        tx.commit().map_err(db_err)?;

        rows.into_iter()
            .map(|(ms, seq, fields)| {
                Ok(StreamMessage {
                    stream_id: format_stream_id(ms, seq),
                    fields: decode_fields(&fields)?,
                })
            })
            .collect()
    }

    fn ack(&self, stream: &str, group: &str, ids: &[String]) -> SatchelResult<u64> {
        validate_queue_name(stream)?;
        let parsed = ids
            .iter()
            .map(|id| parse_stream_id(id))
            .collect::<SatchelResult<Vec<_>>>()?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let mut acked = 0u64;
        for (ms, seq) in parsed {
            acked += tx
                .execute(
                    "DELETE FROM stream_pending
                     WHERE stream = ?1 AND grp = ?2 AND ms = ?3 AND seq = ?4",
                    params![stream, group, ms, seq],
                )
                .map_err(db_err)? as u64;
        }
        tx.commit().map_err(db_err)?;
        Ok(acked)
    }
}
