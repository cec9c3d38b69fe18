#![allow(dead_code)]

use std::env;
use std::sync::Arc;

use messaging_service::config::ChatSettings;
use messaging_service::models::Members;
use messaging_service::repository::{InMemoryChatStore, InMemoryDirectory, InMemoryProfiles};
use messaging_service::services::{MessagingService, SendMessageRequest};
use uuid::Uuid;

pub fn test_database_url() -> Option<String> {
    env::var("TEST_DATABASE_URL").ok()
}

/// A service over in-memory stores with one relationship between alice and bob.
pub struct Fixture {
    pub service: Arc<MessagingService>,
    pub store: Arc<InMemoryChatStore>,
    pub directory: Arc<InMemoryDirectory>,
    pub profiles: Arc<InMemoryProfiles>,
    pub relationship_id: Uuid,
    pub alice: Uuid,
    pub bob: Uuid,
}

impl Fixture {
    pub async fn new() -> Self {
        Self::with_settings(ChatSettings::default()).await
    }

    pub async fn with_settings(settings: ChatSettings) -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let profiles = Arc::new(InMemoryProfiles::new());
        let service = Arc::new(MessagingService::new(
            directory.clone(),
            store.clone(),
            profiles.clone(),
            settings,
        ));

        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        profiles
            .insert(alice, "Alice", "https://cdn.example/alice.png")
            .await;
        profiles.insert(bob, "Bob", "https://cdn.example/bob.png").await;

        let fixture = Self {
            service,
            store,
            directory,
            profiles,
            relationship_id: Uuid::nil(),
            alice,
            bob,
        };
        let relationship_id = fixture.relate(alice, bob).await;
        Self {
            relationship_id,
            ..fixture
        }
    }

    /// Registers a new relationship and returns its id.
    pub async fn relate(&self, a: Uuid, b: Uuid) -> Uuid {
        let relationship_id = Uuid::new_v4();
        let members = Members::try_new(a, b).expect("distinct participants");
        self.directory.insert(relationship_id, members).await;
        relationship_id
    }

    pub async fn send_text(&self, sender: Uuid, content: &str) -> Uuid {
        self.send_text_in(self.relationship_id, sender, content).await
    }

    pub async fn send_text_in(&self, relationship_id: Uuid, sender: Uuid, content: &str) -> Uuid {
        self.service
            .send(sender, SendMessageRequest::text(relationship_id, content))
            .await
            .expect("send should succeed")
            .message_id
    }

    pub async fn unread(&self, user: Uuid) -> i32 {
        self.service
            .get_unread_count(self.relationship_id, user)
            .await
            .expect("unread count")
            .unread_count
    }
}
