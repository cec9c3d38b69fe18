mod common;

use common::Fixture;
use messaging_service::error::AppError;
use messaging_service::models::{DeleteMode, MediaRef, MessageKind};
use messaging_service::services::{PageRequest, SendMessageRequest};
use uuid::Uuid;

#[tokio::test]
async fn send_increments_receiver_unread_only() {
    let fx = Fixture::new().await;

    let receipt = fx
        .service
        .send(fx.alice, SendMessageRequest::text(fx.relationship_id, "hi bob"))
        .await
        .unwrap();
    assert_eq!(receipt.status.to_db(), "sent");

    assert_eq!(fx.unread(fx.bob).await, 1);
    assert_eq!(fx.unread(fx.alice).await, 0);

    let summary = fx
        .service
        .get_unread_count(fx.relationship_id, fx.bob)
        .await
        .unwrap();
    let last = summary.last_message.expect("last message recorded");
    assert_eq!(last.id, receipt.message_id);
    assert_eq!(last.sender_id, fx.alice);
    assert_eq!(last.content.as_deref(), Some("hi bob"));
}

#[tokio::test]
async fn receiver_is_the_directory_counterpart() {
    let fx = Fixture::new().await;
    fx.send_text(fx.bob, "hello alice").await;

    let history = fx
        .service
        .get_history(fx.relationship_id, fx.alice, PageRequest::default())
        .await
        .unwrap();
    let entry = &history.messages[0];
    assert_eq!(entry.sender_id, fx.bob);
    assert_eq!(entry.receiver_id, fx.alice);
    assert_eq!(entry.sender_name, "Bob");
    assert!(!entry.is_read);
}

#[tokio::test]
async fn history_is_oldest_first_within_page() {
    let fx = Fixture::new().await;
    fx.send_text(fx.alice, "one").await;
    fx.send_text(fx.bob, "two").await;
    fx.send_text(fx.alice, "three").await;

    let history = fx
        .service
        .get_history(fx.relationship_id, fx.bob, PageRequest::default())
        .await
        .unwrap();
    let contents: Vec<_> = history
        .messages
        .iter()
        .map(|m| m.content.clone().unwrap_or_default())
        .collect();
    assert_eq!(contents, vec!["one", "two", "three"]);
    assert_eq!(history.pagination.total, 3);
    assert!(!history.pagination.has_more);
}

#[tokio::test]
async fn mark_read_updates_messages_and_recounts() {
    let fx = Fixture::new().await;
    let first = fx.send_text(fx.alice, "a").await;
    let second = fx.send_text(fx.alice, "b").await;
    fx.send_text(fx.alice, "c").await;
    assert_eq!(fx.unread(fx.bob).await, 3);

    let changed = fx
        .service
        .mark_read(fx.relationship_id, &[first, second], fx.bob)
        .await
        .unwrap();
    assert!(changed);
    assert_eq!(fx.unread(fx.bob).await, 1);

    // Already read
    let changed = fx
        .service
        .mark_read(fx.relationship_id, &[first], fx.bob)
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(fx.unread(fx.bob).await, 1);

    let read = fx
        .store
        .all_messages()
        .await
        .into_iter()
        .find(|m| m.id == first)
        .unwrap();
    assert!(read.is_read());
    assert!(read.read_at.is_some());
}

#[tokio::test]
async fn sender_cannot_mark_own_message_read() {
    let fx = Fixture::new().await;
    let id = fx.send_text(fx.alice, "mine").await;

    let changed = fx
        .service
        .mark_read(fx.relationship_id, &[id], fx.alice)
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(fx.unread(fx.bob).await, 1);
}

#[tokio::test]
async fn mark_read_with_empty_list_is_a_noop() {
    let fx = Fixture::new().await;
    fx.send_text(fx.alice, "hello").await;

    let changed = fx
        .service
        .mark_read(fx.relationship_id, &[], fx.bob)
        .await
        .unwrap();
    assert!(!changed);
    assert_eq!(fx.unread(fx.bob).await, 1);
}

#[tokio::test]
async fn mark_read_ignores_ids_from_other_conversations() {
    let fx = Fixture::new().await;
    let carol = Uuid::new_v4();
    let other = fx.relate(carol, fx.bob).await;
    let foreign = fx.send_text_in(other, carol, "from carol").await;
    fx.send_text(fx.alice, "from alice").await;

    let changed = fx
        .service
        .mark_read(fx.relationship_id, &[foreign], fx.bob)
        .await
        .unwrap();
    assert!(!changed);

    let other_unread = fx
        .service
        .get_unread_count(other, fx.bob)
        .await
        .unwrap()
        .unread_count;
    assert_eq!(other_unread, 1);
}

#[tokio::test]
async fn mark_all_read_resets_counter() {
    let fx = Fixture::new().await;
    for i in 0..4 {
        fx.send_text(fx.alice, &format!("msg {i}")).await;
    }
    fx.send_text(fx.bob, "reply").await;

    let updated = fx
        .service
        .mark_all_read(fx.relationship_id, fx.bob)
        .await
        .unwrap();
    assert_eq!(updated, 4);
    assert_eq!(fx.unread(fx.bob).await, 0);
    assert_eq!(fx.unread(fx.alice).await, 1);

    let again = fx
        .service
        .mark_all_read(fx.relationship_id, fx.bob)
        .await
        .unwrap();
    assert_eq!(again, 0);
}

#[tokio::test]
async fn soft_delete_hides_message_and_refreshes_summary() {
    let fx = Fixture::new().await;
    let keep = fx.send_text(fx.alice, "keep").await;
    let dropped = fx.send_text(fx.alice, "drop").await;
    assert_eq!(fx.unread(fx.bob).await, 2);

    let deleted = fx
        .service
        .delete_messages(&[dropped], fx.alice, DeleteMode::Soft)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let history = fx
        .service
        .get_history(fx.relationship_id, fx.bob, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.pagination.total, 1);
    assert_eq!(history.messages[0].id, keep);

    let summary = fx
        .service
        .get_unread_count(fx.relationship_id, fx.bob)
        .await
        .unwrap();
    assert_eq!(summary.unread_count, 1);
    assert_eq!(summary.last_message.map(|m| m.id), Some(keep));

    // The row survives with its deletion recorded
    let stored = fx
        .store
        .all_messages()
        .await
        .into_iter()
        .find(|m| m.id == dropped)
        .unwrap();
    assert!(!stored.is_live());
}

#[tokio::test]
async fn hard_delete_removes_row_and_clears_replies() {
    let fx = Fixture::new().await;
    let original = fx.send_text(fx.alice, "original").await;

    let mut reply = SendMessageRequest::text(fx.relationship_id, "reply");
    reply.reply_to = Some(original);
    let reply_id = fx.service.send(fx.bob, reply).await.unwrap().message_id;

    let deleted = fx
        .service
        .delete_messages(&[original], fx.alice, DeleteMode::Hard)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let messages = fx.store.all_messages().await;
    assert!(messages.iter().all(|m| m.id != original));
    let reply = messages.iter().find(|m| m.id == reply_id).unwrap();
    assert_eq!(reply.reply_to, None);

    assert_eq!(fx.unread(fx.bob).await, 0);
    assert_eq!(fx.unread(fx.alice).await, 1);
}

#[tokio::test]
async fn delete_only_touches_own_messages() {
    let fx = Fixture::new().await;
    let from_alice = fx.send_text(fx.alice, "alice's").await;
    let from_bob = fx.send_text(fx.bob, "bob's").await;

    let deleted = fx
        .service
        .delete_messages(&[from_alice, from_bob], fx.bob, DeleteMode::Soft)
        .await
        .unwrap();
    assert_eq!(deleted, 1);

    let history = fx
        .service
        .get_history(fx.relationship_id, fx.alice, PageRequest::default())
        .await
        .unwrap();
    let ids: Vec<_> = history.messages.iter().map(|m| m.id).collect();
    assert_eq!(ids, vec![from_alice]);
}

#[tokio::test]
async fn delete_with_no_ids_returns_zero() {
    let fx = Fixture::new().await;
    let deleted = fx
        .service
        .delete_messages(&[], fx.alice, DeleteMode::Hard)
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn reply_must_reference_live_message_in_same_conversation() {
    let fx = Fixture::new().await;
    let carol = Uuid::new_v4();
    let other = fx.relate(fx.alice, carol).await;
    let elsewhere = fx.send_text_in(other, carol, "elsewhere").await;

    let mut request = SendMessageRequest::text(fx.relationship_id, "re");
    request.reply_to = Some(elsewhere);
    let err = fx.service.send(fx.alice, request).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidReference(_)));

    let mut request = SendMessageRequest::text(fx.relationship_id, "re");
    request.reply_to = Some(Uuid::new_v4());
    let err = fx.service.send(fx.alice, request).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidReference(_)));

    // Nothing was written
    assert_eq!(fx.unread(fx.bob).await, 0);
}

#[tokio::test]
async fn reply_to_soft_deleted_message_is_rejected() {
    let fx = Fixture::new().await;
    let gone = fx.send_text(fx.alice, "oops").await;
    fx.service
        .delete_messages(&[gone], fx.alice, DeleteMode::Soft)
        .await
        .unwrap();

    let mut request = SendMessageRequest::text(fx.relationship_id, "what was that?");
    request.reply_to = Some(gone);
    let err = fx.service.send(fx.bob, request).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidReference(_)));
}

#[tokio::test]
async fn media_message_carries_its_reference() {
    let fx = Fixture::new().await;
    let mut request = SendMessageRequest::text(fx.relationship_id, "");
    request.kind = MessageKind::Voice;
    request.media = Some(MediaRef {
        url: "https://cdn.example/v.ogg".into(),
        size: Some(2048),
        duration: Some(7),
    });
    fx.service.send(fx.alice, request).await.unwrap();

    let history = fx
        .service
        .get_history(fx.relationship_id, fx.bob, PageRequest::default())
        .await
        .unwrap();
    let entry = &history.messages[0];
    assert_eq!(entry.kind, MessageKind::Voice);
    assert_eq!(entry.media.as_ref().and_then(|m| m.duration), Some(7));
}

#[tokio::test]
async fn invalid_payloads_are_rejected_before_any_write() {
    let fx = Fixture::new().await;

    let err = fx
        .service
        .send(fx.alice, SendMessageRequest::text(fx.relationship_id, "  "))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let mut image = SendMessageRequest::text(fx.relationship_id, "");
    image.kind = MessageKind::Image;
    let err = fx.service.send(fx.alice, image).await.unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    let err = fx
        .service
        .send(fx.alice, SendMessageRequest::text(fx.relationship_id, "a\u{0000}b"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InvalidState(_)));

    assert!(fx.store.all_messages().await.is_empty());
}

#[tokio::test]
async fn outsiders_are_forbidden() {
    let fx = Fixture::new().await;
    let mallory = Uuid::new_v4();
    let id = fx.send_text(fx.alice, "private").await;

    let err = fx
        .service
        .send(mallory, SendMessageRequest::text(fx.relationship_id, "hi"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = fx
        .service
        .get_history(fx.relationship_id, mallory, PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = fx
        .service
        .mark_read(fx.relationship_id, &[id], mallory)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = fx
        .service
        .mark_read(fx.relationship_id, &[], mallory)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = fx
        .service
        .get_unread_count(fx.relationship_id, mallory)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let err = fx
        .service
        .block_conversation(fx.relationship_id, mallory)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    // Deleting someone else's message is a silent no-op
    let deleted = fx
        .service
        .delete_messages(&[id], mallory, DeleteMode::Hard)
        .await
        .unwrap();
    assert_eq!(deleted, 0);
}

#[tokio::test]
async fn unknown_relationship_is_not_found() {
    let fx = Fixture::new().await;
    let missing = Uuid::new_v4();

    let err = fx
        .service
        .send(fx.alice, SendMessageRequest::text(missing, "anyone?"))
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));

    let err = fx
        .service
        .get_history(missing, fx.alice, PageRequest::default())
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[tokio::test]
async fn unread_count_before_any_message_is_zero() {
    let fx = Fixture::new().await;
    let summary = fx
        .service
        .get_unread_count(fx.relationship_id, fx.alice)
        .await
        .unwrap();
    assert_eq!(summary.unread_count, 0);
    assert!(summary.last_message.is_none());
}

#[tokio::test]
async fn blocked_conversation_rejects_sends_until_unblocked() {
    let fx = Fixture::new().await;
    fx.send_text(fx.alice, "before").await;

    let state = fx
        .service
        .block_conversation(fx.relationship_id, fx.bob)
        .await
        .unwrap();
    assert!(state.is_blocked);
    assert_eq!(state.blocked_by, Some(fx.bob));

    for sender in [fx.alice, fx.bob] {
        let err = fx
            .service
            .send(sender, SendMessageRequest::text(fx.relationship_id, "blocked?"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden));
    }

    // History stays readable
    let history = fx
        .service
        .get_history(fx.relationship_id, fx.alice, PageRequest::default())
        .await
        .unwrap();
    assert_eq!(history.pagination.total, 1);

    // Only the blocker may lift it
    let err = fx
        .service
        .unblock_conversation(fx.relationship_id, fx.alice)
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::Forbidden));

    let state = fx
        .service
        .unblock_conversation(fx.relationship_id, fx.bob)
        .await
        .unwrap();
    assert!(!state.is_blocked);

    fx.send_text(fx.alice, "after").await;
    assert_eq!(fx.unread(fx.bob).await, 2);
}

#[tokio::test]
async fn blocking_twice_keeps_the_first_blocker() {
    let fx = Fixture::new().await;
    fx.service
        .block_conversation(fx.relationship_id, fx.alice)
        .await
        .unwrap();
    let state = fx
        .service
        .block_conversation(fx.relationship_id, fx.bob)
        .await
        .unwrap();
    assert!(state.is_blocked);
    assert_eq!(state.blocked_by, Some(fx.alice));
}

#[tokio::test]
async fn unblocking_an_open_conversation_is_a_noop() {
    let fx = Fixture::new().await;
    let state = fx
        .service
        .unblock_conversation(fx.relationship_id, fx.alice)
        .await
        .unwrap();
    assert!(!state.is_blocked);
    assert_eq!(state.relationship_id, fx.relationship_id);
}

#[tokio::test]
async fn read_then_more_sends_scenario() {
    let fx = Fixture::new().await;
    let hi = fx.send_text(fx.alice, "hi").await;
    assert_eq!(fx.unread(fx.bob).await, 1);

    assert!(fx
        .service
        .mark_read(fx.relationship_id, &[hi], fx.bob)
        .await
        .unwrap());
    assert_eq!(fx.unread(fx.bob).await, 0);

    let history = fx
        .service
        .get_history(fx.relationship_id, fx.bob, PageRequest::default())
        .await
        .unwrap();
    assert!(history.messages[0].is_read);
    assert!(history.messages[0].read_at.is_some());

    fx.send_text(fx.alice, "second").await;
    let latest = fx.send_text(fx.alice, "third").await;
    assert_eq!(fx.unread(fx.bob).await, 2);

    for user in [fx.alice, fx.bob] {
        let page = fx
            .service
            .list_conversations(user, PageRequest::default())
            .await
            .unwrap();
        let entry = &page.conversations[0];
        assert_eq!(entry.last_message.as_ref().map(|m| m.id), Some(latest));
    }
}
