pub mod chat;

use actix_web::{get, web, HttpResponse};

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().body("OK")
}

/// Register every route. Shared by `main` and the HTTP tests.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(health)
        .route("/metrics", web::get().to(crate::metrics::metrics_handler))
        .service(
            web::scope("/api/v1/chat")
                .service(chat::send_message)
                .service(chat::mark_read)
                .service(chat::delete_messages)
                .service(chat::list_conversations)
                .service(chat::get_history)
                .service(chat::mark_all_read)
                .service(chat::get_unread_count)
                .service(chat::block_conversation)
                .service(chat::unblock_conversation),
        );
}
