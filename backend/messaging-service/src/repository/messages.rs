//! SQL for `chat_messages`.
//!
//! Functions take a bare connection so they compose inside a transaction as
//! well as on a pooled connection.

use serde_json::Value as JsonValue;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Row};
use uuid::Uuid;

use crate::error::{AppError, AppResult};
use crate::models::{
    DeleteMode, DeleteOutcome, Disposition, MediaRef, Message, MessageKind, MessageStatus,
    NewMessage, SystemMeta,
};

const MESSAGE_COLUMNS: &str = "id, seq, relationship_id, sender_id, receiver_id, content, \
     message_type, media_url, media_size, media_duration, status, read_at, reply_to_id, \
     system_type, system_data, deleted_at, deleted_by, created_at, updated_at";

fn decode_error(column: &str, value: &str) -> sqlx::Error {
    sqlx::Error::ColumnDecode {
        index: column.to_string(),
        source: format!("unexpected value {value:?}").into(),
    }
}

pub(crate) fn message_from_row(row: &PgRow) -> Result<Message, sqlx::Error> {
    let kind_raw: String = row.try_get("message_type")?;
    let kind = MessageKind::from_db(&kind_raw).ok_or_else(|| decode_error("message_type", &kind_raw))?;
    let status_raw: String = row.try_get("status")?;
    let status =
        MessageStatus::from_db(&status_raw).ok_or_else(|| decode_error("status", &status_raw))?;

    let media = row
        .try_get::<Option<String>, _>("media_url")?
        .map(|url| -> Result<MediaRef, sqlx::Error> {
            Ok(MediaRef {
                url,
                size: row.try_get("media_size")?,
                duration: row.try_get("media_duration")?,
            })
        })
        .transpose()?;

    let system = row
        .try_get::<Option<String>, _>("system_type")?
        .map(|system_type| -> Result<SystemMeta, sqlx::Error> {
            let payload: Option<JsonValue> = row.try_get("system_data")?;
            Ok(SystemMeta {
                system_type,
                payload: payload.unwrap_or(JsonValue::Null),
            })
        })
        .transpose()?;

    Ok(Message {
        id: row.try_get("id")?,
        seq: row.try_get("seq")?,
        relationship_id: row.try_get("relationship_id")?,
        sender_id: row.try_get("sender_id")?,
        receiver_id: row.try_get("receiver_id")?,
        content: row.try_get("content")?,
        kind,
        media,
        status,
        read_at: row.try_get("read_at")?,
        reply_to: row.try_get("reply_to_id")?,
        system,
        disposition: Disposition::from_columns(row.try_get("deleted_at")?, row.try_get("deleted_by")?),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

pub async fn find_live(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    message_id: Uuid,
) -> Result<Option<Message>, sqlx::Error> {
    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_messages \
         WHERE id = $1 AND relationship_id = $2 AND deleted_at IS NULL"
    );
    let row = sqlx::query(&sql)
        .bind(message_id)
        .bind(relationship_id)
        .fetch_optional(&mut *conn)
        .await?;
    row.as_ref().map(message_from_row).transpose()
}

pub async fn insert(conn: &mut PgConnection, message: &NewMessage) -> AppResult<Message> {
    if message.sender_id == message.receiver_id {
        return Err(AppError::InvalidState(
            "sender and receiver must differ".to_string(),
        ));
    }
    if let Some(reply_to) = message.reply_to {
        if find_live(conn, message.relationship_id, reply_to).await?.is_none() {
            return Err(AppError::InvalidReference(format!(
                "reply target {reply_to} is not a live message of this conversation"
            )));
        }
    }

    let sql = format!(
        r#"
        INSERT INTO chat_messages (
            id, relationship_id, sender_id, receiver_id, content, message_type,
            media_url, media_size, media_duration, status, reply_to_id,
            system_type, system_data
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 'sent', $10, $11, $12)
        RETURNING {MESSAGE_COLUMNS}
        "#
    );
    let media = message.media.as_ref();
    let system = message.system.as_ref();
    let row = sqlx::query(&sql)
        .bind(Uuid::new_v4())
        .bind(message.relationship_id)
        .bind(message.sender_id)
        .bind(message.receiver_id)
        .bind(message.content.as_deref())
        .bind(message.kind.to_db())
        .bind(media.map(|m| m.url.as_str()))
        .bind(media.and_then(|m| m.size))
        .bind(media.and_then(|m| m.duration))
        .bind(message.reply_to)
        .bind(system.map(|s| s.system_type.as_str()))
        .bind(system.map(|s| s.payload.clone()))
        .fetch_one(&mut *conn)
        .await?;

    Ok(message_from_row(&row)?)
}

pub async fn page(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    offset: i64,
    limit: i64,
) -> Result<(i64, Vec<Message>), sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM chat_messages WHERE relationship_id = $1 AND deleted_at IS NULL",
    )
    .bind(relationship_id)
    .fetch_one(&mut *conn)
    .await?;

    let sql = format!(
        "SELECT {MESSAGE_COLUMNS} FROM chat_messages \
         WHERE relationship_id = $1 AND deleted_at IS NULL \
         ORDER BY created_at DESC, seq DESC \
         LIMIT $2 OFFSET $3"
    );
    let rows = sqlx::query(&sql)
        .bind(relationship_id)
        .bind(limit)
        .bind(offset)
        .fetch_all(&mut *conn)
        .await?;

    let messages = rows
        .iter()
        .map(message_from_row)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((total, messages))
}

pub async fn mark_read(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    message_ids: &[Uuid],
    reader_id: Uuid,
) -> Result<u64, sqlx::Error> {
    if message_ids.is_empty() {
        return Ok(0);
    }
    let result = sqlx::query(
        r#"
        UPDATE chat_messages
        SET read_at = NOW(), status = 'read', updated_at = NOW()
        WHERE relationship_id = $1
          AND id = ANY($2)
          AND receiver_id = $3
          AND read_at IS NULL
          AND deleted_at IS NULL
        "#,
    )
    .bind(relationship_id)
    .bind(message_ids)
    .bind(reader_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

pub async fn mark_all_read(
    conn: &mut PgConnection,
    relationship_id: Uuid,
    reader_id: Uuid,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        r#"
        UPDATE chat_messages
        SET read_at = NOW(), status = 'read', updated_at = NOW()
        WHERE relationship_id = $1
          AND receiver_id = $2
          AND read_at IS NULL
          AND deleted_at IS NULL
        "#,
    )
    .bind(relationship_id)
    .bind(reader_id)
    .execute(&mut *conn)
    .await?;

    Ok(result.rows_affected())
}

/// Relationships that a delete by `deleter_id` would touch, sorted.
pub async fn owned_relationships(
    conn: &mut PgConnection,
    message_ids: &[Uuid],
    deleter_id: Uuid,
) -> Result<Vec<Uuid>, sqlx::Error> {
    sqlx::query_scalar(
        r#"
        SELECT DISTINCT relationship_id
        FROM chat_messages
        WHERE id = ANY($1) AND sender_id = $2
        ORDER BY relationship_id
        "#,
    )
    .bind(message_ids)
    .bind(deleter_id)
    .fetch_all(&mut *conn)
    .await
}

pub async fn delete(
    conn: &mut PgConnection,
    message_ids: &[Uuid],
    deleter_id: Uuid,
    mode: DeleteMode,
) -> Result<DeleteOutcome, sqlx::Error> {
    if message_ids.is_empty() {
        return Ok(DeleteOutcome::default());
    }
    let sql = match mode {
        DeleteMode::Soft => {
            r#"
            UPDATE chat_messages
            SET deleted_at = NOW(), deleted_by = $2, updated_at = NOW()
            WHERE id = ANY($1) AND sender_id = $2 AND deleted_at IS NULL
            RETURNING relationship_id
            "#
        }
        DeleteMode::Hard => {
            r#"
            DELETE FROM chat_messages
            WHERE id = ANY($1) AND sender_id = $2
            RETURNING relationship_id
            "#
        }
    };
    let touched: Vec<Uuid> = sqlx::query_scalar(sql)
        .bind(message_ids)
        .bind(deleter_id)
        .fetch_all(&mut *conn)
        .await?;

    let affected = touched.len() as u64;
    let mut relationships = touched;
    relationships.sort();
    relationships.dedup();
    Ok(DeleteOutcome {
        affected,
        relationships,
    })
}
