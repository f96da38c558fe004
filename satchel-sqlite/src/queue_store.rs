use std::collections::BTreeSet;

use rusqlite::{params, OptionalExtension, Transaction};
use satchel_core::codec::{decode_metadata, encode_metadata, FieldValue, Metadata};
use satchel_core::config::{QueueConfig, QueueInfo, QueueMetadata};
use satchel_core::error::{SatchelError, SatchelResult};
use satchel_core::id::make_message_id;
use satchel_core::message::QueueMessage;
use satchel_core::store::{PushEntry, QueueStore};
use satchel_core::validation::{validate_interval, validate_queue_name};
use tracing::debug;

use crate::{db_err, Storage};

struct QueueRow {
    config: QueueConfig,
    created: i64,
    modified: i64,
    totalsent: u64,
    totalrecv: u64,
}

fn ensure_queue(
    tx: &Transaction<'_>,
    name: &str,
    config: &QueueConfig,
    now_s: i64,
) -> SatchelResult<bool> {
    let inserted = tx
        .execute(
            "INSERT INTO queues (name, vt, delay, maxsize, retries, ttl, created, modified)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7)
             ON CONFLICT(name) DO NOTHING",
            params![
                name,
                config.vt,
                config.delay,
                config.maxsize as i64,
                config.retries,
                config.ttl.map(|ttl| ttl as i64),
                now_s
            ],
        )
        .map_err(db_err)?;
    Ok(inserted == 1)
}

fn load_queue(tx: &Transaction<'_>, name: &str) -> SatchelResult<Option<QueueRow>> {
    tx.query_row(
        "SELECT vt, delay, maxsize, retries, ttl, created, modified, totalsent, totalrecv
         FROM queues WHERE name = ?1",
        params![name],
        |row| {
            Ok(QueueRow {
                config: QueueConfig {
                    vt: row.get(0)?,
                    delay: row.get(1)?,
                    maxsize: row.get::<_, i64>(2)? as u64,
                    retries: row.get(3)?,
                    ttl: row.get::<_, Option<i64>>(4)?.map(|ttl| ttl as u64),
                },
                created: row.get(5)?,
                modified: row.get(6)?,
                totalsent: row.get::<_, i64>(7)? as u64,
                totalrecv: row.get::<_, i64>(8)? as u64,
            })
        },
    )
    .optional()
    .map_err(db_err)
}

fn build_info(
    tx: &Transaction<'_>,
    name: &str,
    queue: QueueRow,
    now_ms: i64,
) -> SatchelResult<QueueInfo> {
    let msgs: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM messages WHERE queue_name = ?1",
            params![name],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    let hiddenmsgs: i64 = tx
        .query_row(
            "SELECT COUNT(*) FROM messages WHERE queue_name = ?1 AND deliver_at > ?2",
            params![name, now_ms],
            |row| row.get(0),
        )
        .map_err(db_err)?;
    Ok(QueueInfo {
        config: queue.config,
        metadata: QueueMetadata {
            created: queue.created,
            modified: queue.modified,
            totalsent: queue.totalsent,
            totalrecv: queue.totalrecv,
            msgs: msgs as u64,
            hiddenmsgs: hiddenmsgs as u64,
        },
    })
}

fn sent_from_metadata(metadata: &Metadata) -> i64 {
    match metadata.get("sent") {
        Some(FieldValue::Int(sent)) => *sent,
        _ => 0,
    }
}

fn push_one(
    tx: &Transaction<'_>,
    name: &str,
    queue: &QueueConfig,
    entry: &PushEntry,
    now_us: i64,
) -> SatchelResult<String> {
    if queue.maxsize > 0 && entry.body.len() as u64 > queue.maxsize {
        return Err(SatchelError::MessageTooLarge {
            size: entry.body.len(),
            maxsize: queue.maxsize,
        });
    }
    let now_ms = now_us / 1_000;
    let delay = entry.delay.unwrap_or(queue.delay);
    let deliver_at = now_ms + i64::from(delay) * 1_000;
    let message_id = make_message_id(now_us as u64);

    let mut metadata = entry.metadata.clone().unwrap_or_default();
    metadata.insert("sent".to_string(), FieldValue::Int(now_us / 1_000_000));
    let encoded = encode_metadata(&metadata)?;

    tx.execute(
        "INSERT INTO messages (queue_name, message_id, body, metadata, deliver_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![name, message_id, entry.body, encoded, deliver_at],
    )
    .map_err(db_err)?;
    tx.execute(
        "UPDATE queues SET totalsent = totalsent + 1 WHERE name = ?1",
        params![name],
    )
    .map_err(db_err)?;
    Ok(message_id)
}

type VisibleRow = (String, Vec<u8>, Vec<u8>, u32, i64);

/// The smallest-score visible index entry, ties broken by id (ids sort by
/// send time, so this matches insertion order).
fn next_visible(tx: &Transaction<'_>, name: &str, now_ms: i64) -> SatchelResult<Option<VisibleRow>> {
    tx.query_row(
        "SELECT message_id, body, metadata, rc, fr FROM messages
         WHERE queue_name = ?1 AND deliver_at <= ?2
         ORDER BY deliver_at ASC, message_id ASC LIMIT 1",
        params![name, now_ms],
        |row| {
            Ok((
                row.get(0)?,
                row.get(1)?,
                row.get(2)?,
                row.get(3)?,
                row.get(4)?,
            ))
        },
    )
    .optional()
    .map_err(db_err)
}

impl Storage {
    fn push_batch(&self, name: &str, entries: &[PushEntry]) -> SatchelResult<Vec<String>> {
        validate_queue_name(name)?;
        for entry in entries {
            if let Some(delay) = entry.delay {
                validate_interval(delay)?;
            }
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let base_us = self.clock().now_system_us();
        ensure_queue(&tx, name, &QueueConfig::default(), base_us / 1_000_000)?;
        let Some(queue) = load_queue(&tx, name)? else {
            return Err(SatchelError::QueueDoesNotExist(name.to_string()));
        };
        let mut ids = Vec::with_capacity(entries.len());
        for (i, entry) in entries.iter().enumerate() {
            // Offset same-snapshot batch entries by one microsecond each so
            // their ids stay distinct and ordered.
            ids.push(push_one(&tx, name, &queue.config, entry, base_us + i as i64)?);
        }
        tx.commit().map_err(db_err)?;
        Ok(ids)
    }

    fn update_queue_field(&self, name: &str, sql: &str, value: i64) -> SatchelResult<()> {
        validate_queue_name(name)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_s = self.clock().now_system_s();
        let updated = tx.execute(sql, params![name, value, now_s]).map_err(db_err)?;
        if updated == 0 {
            return Err(SatchelError::QueueDoesNotExist(name.to_string()));
        }
        tx.commit().map_err(db_err)?;
        Ok(())
    }
}

impl QueueStore for Storage {
    fn create_queue(&self, name: &str, config: &QueueConfig) -> SatchelResult<bool> {
        validate_queue_name(name)?;
        validate_interval(config.vt)?;
        validate_interval(config.delay)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let created = ensure_queue(&tx, name, config, self.clock().now_system_s())?;
        tx.commit().map_err(db_err)?;
        if created {
            debug!("created queue {name}");
        }
        Ok(created)
    }

    fn delete_queue(&self, name: &str) -> SatchelResult<()> {
        validate_queue_name(name)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        tx.execute("DELETE FROM messages WHERE queue_name = ?1", params![name])
            .map_err(db_err)?;
        let removed = tx
            .execute("DELETE FROM queues WHERE name = ?1", params![name])
            .map_err(db_err)?;
        tx.commit().map_err(db_err)?;
        if removed > 0 {
            debug!("deleted queue {name}");
        }
        Ok(())
    }

    fn list_queues(&self) -> SatchelResult<BTreeSet<String>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT name FROM queues")
            .map_err(db_err)?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?
            .collect::<Result<BTreeSet<_>, _>>()
            .map_err(db_err)?;
        Ok(names)
    }

    fn queue_info(&self, name: &str) -> SatchelResult<QueueInfo> {
        validate_queue_name(name)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_us = self.clock().now_system_us();
        ensure_queue(&tx, name, &QueueConfig::default(), now_us / 1_000_000)?;
        let Some(queue) = load_queue(&tx, name)? else {
            return Err(SatchelError::QueueDoesNotExist(name.to_string()));
        };
        let info = build_info(&tx, name, queue, now_us / 1_000)?;
        tx.commit().map_err(db_err)?;
        Ok(info)
    }

    fn describe_queue(&self, name: &str) -> SatchelResult<QueueInfo> {
        validate_queue_name(name)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_ms = self.clock().now_system_ms();
        let Some(queue) = load_queue(&tx, name)? else {
            return Err(SatchelError::QueueDoesNotExist(name.to_string()));
        };
        build_info(&tx, name, queue, now_ms)
    }

    fn set_queue_vt(&self, name: &str, vt: u32) -> SatchelResult<()> {
        validate_interval(vt)?;
        self.update_queue_field(
            name,
            "UPDATE queues SET vt = ?2, modified = ?3 WHERE name = ?1",
            i64::from(vt),
        )
    }

    fn set_queue_delay(&self, name: &str, delay: u32) -> SatchelResult<()> {
        validate_interval(delay)?;
        self.update_queue_field(
            name,
            "UPDATE queues SET delay = ?2, modified = ?3 WHERE name = ?1",
            i64::from(delay),
        )
    }

    fn set_queue_maxsize(&self, name: &str, maxsize: u64) -> SatchelResult<()> {
        self.update_queue_field(
            name,
            "UPDATE queues SET maxsize = ?2, modified = ?3 WHERE name = ?1",
            maxsize as i64,
        )
    }

    fn push_message(
        &self,
        name: &str,
        body: &[u8],
        delay: Option<u32>,
        metadata: Option<Metadata>,
    ) -> SatchelResult<String> {
        let entry = PushEntry {
            body: body.to_vec(),
            delay,
            metadata,
        };
        let mut ids = self.push_batch(name, std::slice::from_ref(&entry))?;
        Ok(ids.swap_remove(0))
    }

    fn push_many(&self, name: &str, entries: &[PushEntry]) -> SatchelResult<Vec<String>> {
        self.push_batch(name, entries)
    }

    fn get_message(&self, name: &str, vt: Option<u32>) -> SatchelResult<Option<QueueMessage>> {
        validate_queue_name(name)?;
        if let Some(vt) = vt {
            validate_interval(vt)?;
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_ms = self.clock().now_system_ms();
        let Some(queue) = load_queue(&tx, name)? else {
            return Ok(None);
        };
        let Some((message_id, body, metadata, rc, fr)) = next_visible(&tx, name, now_ms)? else {
            return Ok(None);
        };

        let effective_vt = vt.unwrap_or(queue.config.vt);
        let new_deliver_at = now_ms + i64::from(effective_vt) * 1_000;
        let new_rc = rc + 1;
        let new_fr = if fr == 0 { now_ms } else { fr };
        tx.execute(
            "UPDATE messages SET deliver_at = ?3, rc = ?4, fr = ?5
             WHERE queue_name = ?1 AND message_id = ?2",
            params![name, message_id, new_deliver_at, new_rc, new_fr],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE queues SET totalrecv = totalrecv + 1 WHERE name = ?1",
            params![name],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        let metadata = decode_metadata(&metadata)?;
        let sent = sent_from_metadata(&metadata);
        Ok(Some(QueueMessage {
            message_id,
            body,
            metadata,
            sent,
            rc: new_rc,
            fr: new_fr,
        }))
    }

    fn delete_message(&self, name: &str, message_id: &str) -> SatchelResult<()> {
        validate_queue_name(name)?;
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM messages WHERE queue_name = ?1 AND message_id = ?2",
            params![name, message_id],
        )
        .map_err(db_err)?;
        Ok(())
    }

    fn pop_message(&self, name: &str) -> SatchelResult<Option<QueueMessage>> {
        validate_queue_name(name)?;
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction().map_err(db_err)?;
        let now_ms = self.clock().now_system_ms();
        if load_queue(&tx, name)?.is_none() {
            return Ok(None);
        }
        let Some((message_id, body, metadata, rc, fr)) = next_visible(&tx, name, now_ms)? else {
            return Ok(None);
        };

        tx.execute(
            "DELETE FROM messages WHERE queue_name = ?1 AND message_id = ?2",
            params![name, message_id],
        )
        .map_err(db_err)?;
        tx.execute(
            "UPDATE queues SET totalrecv = totalrecv + 1 WHERE name = ?1",
            params![name],
        )
        .map_err(db_err)?;
        tx.commit().map_err(db_err)?;

        let metadata = decode_metadata(&metadata)?;
        let sent = sent_from_metadata(&metadata);
        Ok(Some(QueueMessage {
            message_id,
            body,
            metadata,
            sent,
            rc: rc + 1,
            fr: if fr == 0 { now_ms } else { fr },
        }))
    }
}
