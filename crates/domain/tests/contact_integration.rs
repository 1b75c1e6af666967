//! Integration tests for the Contact aggregate, including concurrent
//! commands racing on the same stream.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use common::{AggregateId, AggregateKey};
use domain::contact::{CONTACT_EMAIL_LINK_V1, CONTACT_EMAIL_SET_NON_PRIMARY_V1};
use domain::{
    CommandContext, ContactDataFields, ContactService, DomainError, LinkEmail, LinkLocation,
    SetEmailNonPrimary, SourceFields, UpsertContact,
};
use event_store::{EventEnvelope, EventStore, InMemoryEventStore, Version};
use tokio::sync::Barrier;

fn key(object_id: &str) -> AggregateKey {
    AggregateKey::new("acme", object_id)
}

fn ada() -> ContactDataFields {
    ContactDataFields {
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
        ..Default::default()
    }
}

/// Event log whose next `gated` reads all wait for each other after
/// reading, so that every gated command loads the same version.
struct BarrierStore {
    inner: InMemoryEventStore,
    barrier: Barrier,
    gated: AtomicUsize,
}

impl BarrierStore {
    fn new(inner: InMemoryEventStore) -> Self {
        Self {
            inner,
            barrier: Barrier::new(2),
            gated: AtomicUsize::new(0),
        }
    }

    fn gate_next_reads(&self) {
        self.gated.store(2, Ordering::SeqCst);
    }
}

#[async_trait]
impl EventStore for BarrierStore {
    async fn read_stream(&self, aggregate_id: &AggregateId) -> event_store::Result<Vec<EventEnvelope>> {
        let events = self.inner.read_stream(aggregate_id).await?;
        let gated = self
            .gated
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if gated {
            self.barrier.wait().await;
        }
        Ok(events)
    }

    async fn append_to_stream(
        &self,
        aggregate_id: &AggregateId,
        expected_version: Version,
        events: Vec<EventEnvelope>,
    ) -> event_store::Result<Version> {
        self.inner
            .append_to_stream(aggregate_id, expected_version, events)
            .await
    }

    async fn stream_version(&self, aggregate_id: &AggregateId) -> event_store::Result<Option<Version>> {
        self.inner.stream_version(aggregate_id).await
    }
}

mod concurrency {
    use super::*;

    #[tokio::test]
    async fn racing_commands_both_land_after_one_retry() {
        let store = Arc::new(BarrierStore::new(InMemoryEventStore::new()));
        let service = ContactService::new(store.clone());
        let ctx = CommandContext::new();

        service
            .upsert_contact(&ctx, UpsertContact::new(key("c1"), ada()))
            .await
            .unwrap();
        service
            .link_email(&ctx, LinkEmail::new(key("c1"), "e1", "work", true))
            .await
            .unwrap();
        let setup = service
            .link_location(&ctx, LinkLocation::new(key("c1"), "loc-0"))
            .await
            .unwrap();
        assert_eq!(setup.version, Version::new(3));

        store.gate_next_reads();
        let (a, b) = tokio::join!(
            service.link_location(&ctx, LinkLocation::new(key("c1"), "loc-a")),
            service.link_location(&ctx, LinkLocation::new(key("c1"), "loc-b")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let mut attempts = [a.attempts, b.attempts];
        attempts.sort_unstable();
        assert_eq!(attempts, [1, 2]);

        let mut versions = [a.version, b.version];
        versions.sort();
        assert_eq!(versions, [Version::new(4), Version::new(5)]);

        let contact = service.get_contact(key("c1")).await.unwrap().unwrap();
        let mut locations = contact.locations.clone();
        locations.sort();
        assert_eq!(locations, ["loc-0", "loc-a", "loc-b"].map(String::from));

        let id = AggregateId::new("contact", key("c1"));
        assert_eq!(
            store.stream_version(&id).await.unwrap(),
            Some(Version::new(5))
        );
    }

    #[tokio::test]
    async fn racing_updates_are_folded_in_order() {
        let store = Arc::new(BarrierStore::new(InMemoryEventStore::new()));
        let service = ContactService::new(store.clone());
        let ctx = CommandContext::new();

        service
            .upsert_contact(
                &ctx,
                UpsertContact::new(
                    key("c6"),
                    ContactDataFields {
                        first_name: "Ada".into(),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();
        service
            .link_email(&ctx, LinkEmail::new(key("c6"), "e1", "work", true))
            .await
            .unwrap();
        service
            .link_location(&ctx, LinkLocation::new(key("c6"), "loc-0"))
            .await
            .unwrap();

        let update = |fields: ContactDataFields| {
            UpsertContact::new(key("c6"), fields).with_source(SourceFields::new("hubspot", "sync"))
        };
        let surname = update(ContactDataFields {
            last_name: "King".into(),
            ..Default::default()
        });
        let timezone = update(ContactDataFields {
            timezone: "Europe/London".into(),
            ..Default::default()
        });

        store.gate_next_reads();
        let (a, b) = tokio::join!(
            service.upsert_contact(&ctx, surname),
            service.upsert_contact(&ctx, timezone),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        let (first, second) = if a.attempts == 1 { (a, b) } else { (b, a) };
        assert_eq!((first.attempts, first.version), (1, Version::new(4)));
        assert_eq!((second.attempts, second.version), (2, Version::new(5)));

        // The platform owns the contact, so each update only fills blanks
        let contact = service.get_contact(key("c6")).await.unwrap().unwrap();
        assert_eq!(contact.fields.first_name, "Ada");
        assert_eq!(contact.fields.last_name, "King");
        assert_eq!(contact.fields.timezone, "Europe/London");
        assert_eq!(contact, second.aggregate);
    }

    #[tokio::test]
    async fn racing_identical_links_write_once() {
        let store = Arc::new(BarrierStore::new(InMemoryEventStore::new()));
        let service = ContactService::new(store.clone());
        let ctx = CommandContext::new();
        service
            .upsert_contact(&ctx, UpsertContact::new(key("c2"), ada()))
            .await
            .unwrap();

        store.gate_next_reads();
        let (a, b) = tokio::join!(
            service.link_location(&ctx, LinkLocation::new(key("c2"), "loc-a")),
            service.link_location(&ctx, LinkLocation::new(key("c2"), "loc-a")),
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        // The loser re-decides against fresh state and finds the link present
        assert_eq!(a.events_emitted + b.events_emitted, 1);
        assert!(a.is_no_op() || b.is_no_op());

        let contact = service.get_contact(key("c2")).await.unwrap().unwrap();
        assert_eq!(contact.locations, vec!["loc-a".to_string()]);
    }
}

mod emails {
    use super::*;

    #[tokio::test]
    async fn linking_new_primary_demotes_old_one() {
        let events = InMemoryEventStore::new();
        let service = ContactService::new(events.clone());
        let ctx = CommandContext::new();
        service
            .upsert_contact(&ctx, UpsertContact::new(key("c3"), ada()))
            .await
            .unwrap();
        service
            .link_email(&ctx, LinkEmail::new(key("c3"), "e1", "work", true))
            .await
            .unwrap();

        let outcome = service
            .link_email(&ctx, LinkEmail::new(key("c3"), "e2", "home", true))
            .await
            .unwrap();

        assert_eq!(outcome.events_emitted, 2);
        assert_eq!(outcome.aggregate.primary_email(), Some("e2"));

        let stored = events
            .read_stream(&AggregateId::new("contact", key("c3")))
            .await
            .unwrap();
        let types: Vec<_> = stored[2..].iter().map(|e| e.event_type.as_str()).collect();
        assert_eq!(types, [CONTACT_EMAIL_LINK_V1, CONTACT_EMAIL_SET_NON_PRIMARY_V1]);
    }

    #[tokio::test]
    async fn set_non_primary_is_idempotent() {
        let service = ContactService::new(InMemoryEventStore::new());
        let ctx = CommandContext::new();
        service
            .upsert_contact(&ctx, UpsertContact::new(key("c4"), ada()))
            .await
            .unwrap();
        service
            .link_email(&ctx, LinkEmail::new(key("c4"), "e1", "work", true))
            .await
            .unwrap();

        let first = service
            .set_email_non_primary(&ctx, SetEmailNonPrimary::new(key("c4"), "e1"))
            .await
            .unwrap();
        let second = service
            .set_email_non_primary(&ctx, SetEmailNonPrimary::new(key("c4"), "e1"))
            .await
            .unwrap();

        assert_eq!(first.version, Version::new(3));
        assert!(second.is_no_op());
        assert_eq!(second.version, Version::new(3));
        assert!(second.aggregate.has_email("e1", "work", false));
    }

    #[tokio::test]
    async fn linking_email_to_missing_contact_fails() {
        let events = InMemoryEventStore::new();
        let service = ContactService::new(events.clone());

        let result = service
            .link_email(
                &CommandContext::new(),
                LinkEmail::new(key("ghost"), "e1", "work", true),
            )
            .await;

        assert!(matches!(result, Err(DomainError::AggregateNotFound { .. })));
        assert_eq!(events.event_count().await, 0);
    }
}

mod source_of_truth {
    use super::*;

    #[tokio::test]
    async fn external_update_only_fills_blanks_on_platform_owned_contact() {
        let service = ContactService::new(InMemoryEventStore::new());
        let ctx = CommandContext::new();
        service
            .upsert_contact(
                &ctx,
                UpsertContact::new(
                    key("c5"),
                    ContactDataFields {
                        first_name: "Ada".into(),
                        ..Default::default()
                    },
                ),
            )
            .await
            .unwrap();

        let outcome = service
            .upsert_contact(
                &ctx,
                UpsertContact::new(
                    key("c5"),
                    ContactDataFields {
                        first_name: "Augusta".into(),
                        last_name: "King".into(),
                        timezone: "Europe/London".into(),
                        ..Default::default()
                    },
                )
                .with_source(SourceFields::new("hubspot", "sync")),
            )
            .await
            .unwrap();

        let fields = &outcome.aggregate.fields;
        assert_eq!(outcome.version, Version::new(2));
        assert_eq!(fields.first_name, "Ada");
        assert_eq!(fields.last_name, "King");
        assert_eq!(fields.timezone, "Europe/London");
    }
}
