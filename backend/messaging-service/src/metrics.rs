use actix_web::{http::header, HttpResponse};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntCounterVec, Opts, TextEncoder};

use crate::models::{DeleteMode, MessageKind};

static MESSAGES_SENT_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "match_messaging_messages_sent_total",
            "Messages persisted by send, by kind",
        ),
        &["kind"],
    )
    .expect("failed to create match_messaging_messages_sent_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register match_messaging_messages_sent_total");
    counter
});

static MESSAGES_READ_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "match_messaging_messages_read_total",
            "Messages moved to the read state",
        ),
        &["source"],
    )
    .expect("failed to create match_messaging_messages_read_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register match_messaging_messages_read_total");
    counter
});

static MESSAGES_DELETED_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    let counter = IntCounterVec::new(
        Opts::new(
            "match_messaging_messages_deleted_total",
            "Messages deleted by their sender, by mode",
        ),
        &["mode"],
    )
    .expect("failed to create match_messaging_messages_deleted_total");
    prometheus::default_registry()
        .register(Box::new(counter.clone()))
        .expect("failed to register match_messaging_messages_deleted_total");
    counter
});

pub fn record_message_sent(kind: MessageKind) {
    MESSAGES_SENT_TOTAL.with_label_values(&[kind.to_db()]).inc();
}

/// `source` is `selected` for explicit id lists, `all` for mark-all.
pub fn record_messages_read(source: &str, count: u64) {
    if count > 0 {
        MESSAGES_READ_TOTAL.with_label_values(&[source]).inc_by(count);
    }
}

pub fn record_messages_deleted(mode: DeleteMode, count: u64) {
    if count > 0 {
        let mode = match mode {
            DeleteMode::Soft => "soft",
            DeleteMode::Hard => "hard",
        };
        MESSAGES_DELETED_TOTAL.with_label_values(&[mode]).inc_by(count);
    }
}

pub async fn metrics_handler() -> HttpResponse {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();

    let mut buffer = Vec::new();
    if let Err(err) = encoder.encode(&metric_families, &mut buffer) {
        return HttpResponse::InternalServerError().body(err.to_string());
    }

    HttpResponse::Ok()
        .insert_header((header::CONTENT_TYPE, encoder.format_type()))
        .body(buffer)
}
