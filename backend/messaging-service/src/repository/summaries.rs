//! SQL for `chat_conversations`.
//!
//! Counter changes are always expressed relative to the stored value or
//! recomputed from `chat_messages` inside the statement, never written back
//! from an application-side read.

use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::models::{ConversationSummary, LastMessage, Members, Message, MessageKind};

const SUMMARY_COLUMNS: &str = "id, relationship_id, participant_a, participant_b, \
     last_message_id, last_message_content, last_message_kind, last_message_sender, \
     last_message_at, unread_a, unread_b, is_active, blocked_by, created_at, updated_at";

fn summary_from_row(row: &PgRow) -> Result<ConversationSummary, sqlx::Error> {
    let participant_a: Uuid = row.try_get("participant_a")?;
    let participant_b: Uuid = row.try_get("participant_b")?;
    let members = Members::try_new(participant_a, participant_b).ok_or_else(|| {
        sqlx::Error::ColumnDecode {
            index: "participant_b".to_string(),
            source: "participants must differ".into(),
        }
    })?;

    let last_message = match row.try_get::<Option<Uuid>, _>("last_message_id")? {
        Some(id) => {
            let kind_raw: Option<String> = row.try_get("last_message_kind")?;
            let kind = kind_raw
                .as_deref()
                .and_then(MessageKind::from_db)
                .ok_or_else(|| sqlx::Error::ColumnDecode {
                    index: "last_message_kind".to_string(),
                    source: format!("unexpected value {kind_raw:?}").into(),
                })?;
            let sender_id: Option<Uuid> = row.try_get("last_message_sender")?;
            let created_at: Option<chrono::DateTime<chrono::Utc>> =
                row.try_get("last_message_at")?;
            match (sender_id, created_at) {
                (Some(sender_id), Some(created_at)) => Some(LastMessage {
                    id,
                    content: row.try_get("last_message_content")?,
                    kind,
                    sender_id,
                    created_at,
                }),
                _ => None,
            }
        }
        None => None,
    };

    Ok(ConversationSummary {
        id: row.try_get("id")?,
        relationship_id: row.try_get("relationship_id")?,
        members,
        last_message,
        unread_a: row.try_get("unread_a")?,
        unread_b: row.try_get("unread_b")?,
        is_active: row.try_get("is_active")?,
        blocked_by: row.try_get("blocked_by")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn upsert_after_send(
    conn: &mut PgConnection,
    members: Members,
    message: &Message,
) -> Result<(), sqlx::Error> {
    // Older messages never replace a newer snapshot
    sqlx::query(
        r#"
        INSERT INTO chat_conversations AS c (
            id, relationship_id, participant_a, participant_b,
            last_message_id, last_message_content, last_message_kind,
            last_message_sender, last_message_at,
            unread_a, unread_b, updated_at
        )
        VALUES (
            $1, $2, $3, $4, $5, $6, $7, $8, $9,
            CASE WHEN $10::uuid = $3 THEN 1 ELSE 0 END,
            CASE WHEN $10::uuid = $4 THEN 1 ELSE 0 END,
            NOW()
        )
        ON CONFLICT (relationship_id) DO UPDATE SET
            unread_a = c.unread_a + CASE WHEN $10::uuid = c.participant_a THEN 1 ELSE 0 END,
            unread_b = c.unread_b + CASE WHEN $10::uuid = c.participant_b THEN 1 ELSE 0 END,
            last_message_id = CASE
                WHEN c.last_message_at IS NULL OR c.last_message_at <= EXCLUDED.last_message_at
                THEN EXCLUDED.last_message_id ELSE c.last_message_id END,
            last_message_content = CASE
                WHEN c.last_message_at IS NULL OR c.last_message_at <= EXCLUDED.last_message_at
                THEN EXCLUDED.last_message_content ELSE c.last_message_content END,
            last_message_kind = CASE
                WHEN c.last_message_at IS NULL OR c.last_message_at <= EXCLUDED.last_message_at
                THEN EXCLUDED.last_message_kind ELSE c.last_message_kind END,
            last_message_sender = CASE
                WHEN c.last_message_at IS NULL OR c.last_message_at <= EXCLUDED.last_message_at
                THEN EXCLUDED.last_message_sender ELSE c.last_message_sender END,
            last_message_at = GREATEST(c.last_message_at, EXCLUDED.last_message_at),
            is_active = TRUE,
            updated_at = NOW()
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(message.relationship_id)
    .bind(members.participant_a)
    .bind(members.participant_b)
    .bind(message.id)
    .bind(message.content.as_deref())
    .bind(message.kind.to_db())
    .bind(message.sender_id)
    .bind(message.created_at)
    .bind(message.receiver_id)
    .execute(&mut *conn)
    .await?;

    Ok(())
}

/// Create the summary row if needed and lock it for a send. Returns the
/// current blocker, if any.
pub async fn lock_for_send(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    members: Members,
) -> Result<Option<Uuid>, sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO chat_conversations (id, relationship_id, participant_a, participant_b, updated_at)
        VALUES ($1, $2, $3, $4, NOW())
        ON CONFLICT (relationship_id) DO NOTHING
        "#,
    )
    .bind(Uuid::new_v4())
    .bind(relationship_id)
    .bind(members.participant_a)
    .bind(members.participant_b)
    .execute(&mut *conn)
    .await?;

    sqlx::query_scalar::<_, Option<Uuid>>(
        "SELECT blocked_by FROM chat_conversations WHERE relationship_id = $1 FOR UPDATE",
    )
    .bind(relationship_id)
    .fetch_one(&mut *conn)
    .await
}

/// Take the row lock so that concurrent sends queue behind the caller.
pub async fn lock(conn: &mut PgConnection, relationship_id: Uuid) -> Result<bool, sqlx::Error> {
    let row = sqlx::query("SELECT id FROM chat_conversations WHERE relationship_id = $1 FOR UPDATE")
        .bind(relationship_id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row.is_some())
}

pub async fn reset_unread(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    reader_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE chat_conversations
        SET unread_a = CASE WHEN participant_a = $2 THEN 0 ELSE unread_a END,
            unread_b = CASE WHEN participant_b = $2 THEN 0 ELSE unread_b END
        WHERE relationship_id = $1
        "#,
    )
    .bind(relationship_id)
    .bind(reader_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn recount_unread(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    user_id: Uuid,
) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE chat_conversations c
        SET unread_a = CASE WHEN c.participant_a = $2 THEN n.remaining ELSE c.unread_a END,
            unread_b = CASE WHEN c.participant_b = $2 THEN n.remaining ELSE c.unread_b END
        FROM (
            SELECT COUNT(*)::int AS remaining
            FROM chat_messages
            WHERE relationship_id = $1
              AND receiver_id = $2
              AND read_at IS NULL
              AND deleted_at IS NULL
        ) n
        WHERE c.relationship_id = $1
        "#,
    )
    .bind(relationship_id)
    .bind(user_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn refresh(conn: &mut PgConnection, relationship_id: Uuid) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        UPDATE chat_conversations c
        SET unread_a = (
                SELECT COUNT(*)::int FROM chat_messages m
                WHERE m.relationship_id = c.relationship_id
                  AND m.receiver_id = c.participant_a
                  AND m.read_at IS NULL AND m.deleted_at IS NULL
            ),
            unread_b = (
                SELECT COUNT(*)::int FROM chat_messages m
                WHERE m.relationship_id = c.relationship_id
                  AND m.receiver_id = c.participant_b
                  AND m.read_at IS NULL AND m.deleted_at IS NULL
            ),
            last_message_id = l.id,
            last_message_content = l.content,
            last_message_kind = l.message_type,
            last_message_sender = l.sender_id,
            last_message_at = l.created_at,
            updated_at = NOW()
        FROM (SELECT $1::uuid AS relationship_id) r
        LEFT JOIN LATERAL (
            SELECT id, content, message_type, sender_id, created_at
            FROM chat_messages m
            WHERE m.relationship_id = r.relationship_id AND m.deleted_at IS NULL
            ORDER BY m.created_at DESC, m.seq DESC
            LIMIT 1
        ) l ON TRUE
        WHERE c.relationship_id = r.relationship_id
        "#,
    )
    .bind(relationship_id)
    .execute(&mut *conn)
    .await?;
    Ok(())
}

pub async fn find(
    conn: &mut PgConnection,
    relationship_id: Uuid,
) -> Result<Option<ConversationSummary>, sqlx::Error> {
    let sql = format!("SELECT {SUMMARY_COLUMNS} FROM chat_conversations WHERE relationship_id = $1");
    let row = sqlx::query(&sql)
        .bind(relationship_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(summary_from_row).transpose()
}

pub async fn list_for_user(
    conn: &mut PgConnection,
    user_id: Uuid,
    offset: i64,
    limit: i64,
) -> Result<(i64, Vec<ConversationSummary>), sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*) FROM chat_conversations
        WHERE is_active AND (participant_a = $1 OR participant_b = $1)
        "#,
    )
    .bind(user_id)
    .fetch_one(&mut *conn)
    .await?;

    let sql = format!(
        "SELECT {SUMMARY_COLUMNS} FROM chat_conversations \
         WHERE is_active AND (participant_a = $1 OR participant_b = $1) \
         ORDER BY updated_at DESC, relationship_id DESC \
         LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query(&sql)
        .bind(user_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

    let summaries = rows
        .iter()
        .map(summary_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((total, summaries))
}

/// First blocker wins. A conversation already blocked is returned as stored.
pub async fn block(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    members: Members,
    blocker: Uuid,
) -> Result<ConversationSummary, sqlx::Error> {
    let sql = format!(
        r#"
        INSERT INTO chat_conversations AS c (
            id, relationship_id, participant_a, participant_b, is_blocked, blocked_by, updated_at
        )
        VALUES ($1, $2, $3, $4, TRUE, $5, NOW())
        ON CONFLICT (relationship_id) DO UPDATE SET
            is_blocked = TRUE,
            blocked_by = EXCLUDED.blocked_by,
            updated_at = NOW()
        WHERE c.blocked_by IS NULL
        RETURNING {SUMMARY_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(relationship_id)
        .bind(members.participant_a)
        .bind(members.participant_b)
        .bind(blocker)
        .fetch_optional(&mut *conn)
        .await?;
    match row {
        Some(row) => summary_from_row(&row),
        None => find(conn, relationship_id).await?.ok_or(sqlx::Error::RowNotFound),
    }
}

/// Clears the block only when `blocker` placed it. `None` when nothing matched.
pub async fn unblock(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    blocker: Uuid,
) -> Result<Option<ConversationSummary>, sqlx::Error> {
    let sql = format!(
        r#"
        UPDATE chat_conversations
        SET is_blocked = FALSE, blocked_by = NULL, updated_at = NOW()
        WHERE relationship_id = $1 AND blocked_by = $2
        RETURNING {SUMMARY_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(relationship_id)
        .bind(blocker)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(summary_from_row).transpose()
}
