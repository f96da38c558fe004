pub const CREATE_TABLES: &str = "
    CREATE TABLE IF NOT EXISTS queues (
        name TEXT PRIMARY KEY,
        vt INTEGER NOT NULL,
        delay INTEGER NOT NULL,
        maxsize INTEGER NOT NULL,
        retries INTEGER NOT NULL,
        ttl INTEGER,
        created INTEGER NOT NULL,
        modified INTEGER NOT NULL,
        totalsent INTEGER NOT NULL DEFAULT 0,
        totalrecv INTEGER NOT NULL DEFAULT 0
    );

    CREATE TABLE IF NOT EXISTS messages (
        queue_name TEXT NOT NULL,
        message_id TEXT NOT NULL,
        body BLOB NOT NULL,
        metadata BLOB NOT NULL,
        deliver_at INTEGER NOT NULL,
        rc INTEGER NOT NULL DEFAULT 0,
        fr INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (queue_name, message_id)
    );

    CREATE INDEX IF NOT EXISTS idx_messages_deliver
        ON messages(queue_name, deliver_at, message_id);

    CREATE TABLE IF NOT EXISTS stream_entries (
        stream TEXT NOT NULL,
        ms INTEGER NOT NULL,
        seq INTEGER NOT NULL,
        fields BLOB NOT NULL,
        PRIMARY KEY (stream, ms, seq)
    );

    CREATE TABLE IF NOT EXISTS stream_groups (
        stream TEXT NOT NULL,
        grp TEXT NOT NULL,
        last_ms INTEGER NOT NULL,
        last_seq INTEGER NOT NULL,
        entries_read INTEGER NOT NULL DEFAULT 0,
        PRIMARY KEY (stream, grp)
    );

    CREATE TABLE IF NOT EXISTS stream_consumers (
        stream TEXT NOT NULL,
        grp TEXT NOT NULL,
        consumer TEXT NOT NULL,
        PRIMARY KEY (stream, grp, consumer)
    );

    CREATE TABLE IF NOT EXISTS stream_pending (
        stream TEXT NOT NULL,
        grp TEXT NOT NULL,
        ms INTEGER NOT NULL,
        seq INTEGER NOT NULL,
        consumer TEXT NOT NULL,
        delivered_at INTEGER NOT NULL,
        delivery_count INTEGER NOT NULL DEFAULT 1,
        PRIMARY KEY (stream, grp, ms, seq)
    );

    CREATE INDEX IF NOT EXISTS idx_pending_idle
        ON stream_pending(stream, grp, delivered_at);
";
