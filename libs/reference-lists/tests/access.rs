#[allow(unused)]
mod support;

use gestihotel_reference_lists::{
    ItemChanges, ListItem, ListSnapshot, ReferenceListAccess, ReferenceListStore,
};
use std::sync::{Arc, Mutex};
use support::{TestSystem, HOTEL};

fn recorder() -> (Arc<Mutex<Vec<ListSnapshot>>>, impl Fn(&ListSnapshot) + Send + Sync) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |snapshot: &ListSnapshot| {
        sink.lock().unwrap().push(snapshot.clone())
    })
}

// ============================================================================
// Reads
// ============================================================================

#[tokio::test]
async fn absent_list_is_empty_not_an_error() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let items = env.system.access.get_list(HOTEL, "roomStatuses").await?;
    assert!(items.is_empty());
    Ok(())
}

#[tokio::test]
async fn list_is_returned_in_display_order() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    env.system
        .cascade
        .add_item(
            HOTEL,
            "interventionTypes",
            ListItem::new("plumbing", "Plomberie"),
            Some(-1),
            &env.admin,
        )
        .await?;

    let values: Vec<String> = env
        .system
        .access
        .get_list(HOTEL, "interventionTypes")
        .await?
        .into_iter()
        .map(|item| item.value)
        .collect();
    assert_eq!(values, vec!["plumbing", "urgent", "normal"]);
    Ok(())
}

#[tokio::test]
async fn active_list_hides_deactivated_items() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    env.system
        .cascade
        .deactivate_item(HOTEL, "interventionTypes", "normal", &env.admin)
        .await?;

    let active = env
        .system
        .access
        .get_active_list(HOTEL, "interventionTypes")
        .await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].value, "urgent");

    // Still resolvable for historical records.
    let item = env
        .system
        .access
        .find_item(HOTEL, "interventionTypes", "normal")
        .await?;
    assert!(item.is_some_and(|i| !i.active));
    Ok(())
}

#[tokio::test]
async fn item_by_value_falls_back_instead_of_failing() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let access = &env.system.access;

    let known = access
        .get_item_by_value(HOTEL, "interventionTypes", "urgent", ListItem::fallback("urgent"))
        .await;
    assert_eq!(known.label, "Urgent");

    let unknown = access
        .get_item_by_value(HOTEL, "interventionTypes", "legacy", ListItem::fallback("legacy"))
        .await;
    assert_eq!(unknown, ListItem::fallback("legacy"));

    let missing_document = access
        .get_item_by_value("hotel-unknown", "interventionTypes", "urgent", ListItem::fallback("urgent"))
        .await;
    assert!(!missing_document.active);
    Ok(())
}

// ============================================================================
// Cache
// ============================================================================

#[tokio::test]
async fn cache_entry_follows_commits() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let access = &env.system.access;

    assert_eq!(access.cached_version(HOTEL, "interventionTypes"), None);
    access.get_list(HOTEL, "interventionTypes").await?;
    assert_eq!(access.cached_version(HOTEL, "interventionTypes"), Some(3));

    env.system
        .cascade
        .update_item(
            HOTEL,
            "interventionTypes",
            "urgent",
            ItemChanges::label("Très urgent"),
            &env.admin,
        )
        .await?;

    assert_eq!(access.cached_version(HOTEL, "interventionTypes"), Some(4));
    let item = access
        .find_item(HOTEL, "interventionTypes", "urgent")
        .await?
        .unwrap();
    assert_eq!(item.label, "Très urgent");

    access.invalidate(HOTEL);
    assert_eq!(access.cached_version(HOTEL, "interventionTypes"), None);
    Ok(())
}

#[tokio::test]
async fn older_document_never_replaces_newer_cache_entry() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let access = &env.system.access;
    let old = env.system.store.get(HOTEL).await?;

    env.system
        .cascade
        .deactivate_item(HOTEL, "interventionTypes", "urgent", &env.admin)
        .await?;
    access.get_list(HOTEL, "interventionTypes").await?;
    assert_eq!(access.cached_version(HOTEL, "interventionTypes"), Some(4));

    access.apply_document(&old);
    assert_eq!(access.cached_version(HOTEL, "interventionTypes"), Some(4));
    let urgent = access
        .find_item(HOTEL, "interventionTypes", "urgent")
        .await?
        .unwrap();
    assert!(!urgent.active);
    Ok(())
}

#[tokio::test]
async fn refresh_picks_up_commits_from_another_process() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let access = &env.system.access;
    access.get_list(HOTEL, "interventionTypes").await?;

    // A second store on the same backend without the access hook, like another server.
    let elsewhere = ReferenceListStore::new(env.backend.clone());
    let current = elsewhere.get(HOTEL).await?;
    elsewhere
        .commit(
            HOTEL,
            current.version,
            &env.admin,
            gestihotel_reference_lists::Mutation::new(
                gestihotel_reference_lists::AuditAction::AddItem,
                Some("interventionTypes"),
                serde_json::json!({}),
            ),
            |lists| lists.insert_item("interventionTypes", ListItem::new("painting", "Peinture")),
        )
        .await?;

    assert!(access.needs_refresh(HOTEL, 4));
    assert_eq!(access.get_list(HOTEL, "interventionTypes").await?.len(), 2);

    access.refresh(HOTEL).await?;
    assert!(!access.needs_refresh(HOTEL, 4));
    assert_eq!(access.get_list(HOTEL, "interventionTypes").await?.len(), 3);
    Ok(())
}

#[tokio::test]
async fn zero_capacity_cache_still_serves_reads() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let access = ReferenceListAccess::new(env.backend.clone(), 0);
    assert_eq!(access.get_list(HOTEL, "interventionTypes").await?.len(), 2);
    assert_eq!(access.get_list(HOTEL, "interventionTypes").await?.len(), 2);
    Ok(())
}

#[tokio::test]
async fn cache_miss_overtaken_by_a_commit_serves_the_newer_version() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    assert_eq!(
        env.system.access.cached_version(HOTEL, "interventionTypes"),
        None
    );

    // The read loads version 3, then waits while version 4 is committed.
    let (loaded, release) = env.backend.pause_next_load();
    let access = env.system.access.clone();
    let reader =
        tokio::spawn(async move { access.get_list(HOTEL, "interventionTypes").await });
    loaded.await?;

    env.system
        .cascade
        .add_item(
            HOTEL,
            "interventionTypes",
            ListItem::new("planned", "Planifiée"),
            None,
            &env.admin,
        )
        .await?;
    let _ = release.send(());

    let items = reader.await??;
    assert_eq!(items.len(), 3);

    let access = &env.system.access;
    assert_eq!(access.cached_version(HOTEL, "interventionTypes"), Some(4));
    assert!(!access.needs_refresh(HOTEL, 4));
    let later = access.get_list(HOTEL, "interventionTypes").await?;
    assert!(later.iter().any(|item| item.value == "planned"));
    Ok(())
}

// ============================================================================
// Subscriptions
// ============================================================================

#[tokio::test]
async fn subscriber_gets_current_state_then_each_new_version() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let (seen, callback) = recorder();

    env.system
        .access
        .subscribe(HOTEL, "interventionTypes", callback)
        .await?;
    env.system
        .cascade
        .deactivate_item(HOTEL, "interventionTypes", "normal", &env.admin)
        .await?;

    let seen = seen.lock().unwrap();
    let versions: Vec<u64> = seen.iter().map(|s| s.version).collect();
    assert_eq!(versions, vec![3, 4]);
    assert!(!seen[1].items[1].active);
    Ok(())
}

#[tokio::test]
async fn stale_and_repeated_versions_are_coalesced() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let (seen, callback) = recorder();
    let access = &env.system.access;
    access
        .subscribe(HOTEL, "interventionTypes", callback)
        .await?;

    let v3 = env.system.store.get(HOTEL).await?;
    env.system
        .cascade
        .deactivate_item(HOTEL, "interventionTypes", "normal", &env.admin)
        .await?;
    let v4 = env.system.store.get(HOTEL).await?;

    // Late or duplicate deliveries of already-seen versions.
    access.apply_document(&v3);
    access.apply_document(&v4);

    let versions: Vec<u64> = seen.lock().unwrap().iter().map(|s| s.version).collect();
    assert_eq!(versions, vec![3, 4]);
    Ok(())
}

#[tokio::test]
async fn cache_is_refreshed_before_subscribers_run() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let access = env.system.access.clone();
    access.get_list(HOTEL, "interventionTypes").await?;

    let observed = Arc::new(Mutex::new(Vec::new()));
    let sink = observed.clone();
    let probe = access.clone();
    access
        .subscribe(HOTEL, "interventionTypes", move |snapshot: &ListSnapshot| {
            let cached = probe.cached_version(&snapshot.establishment_id, &snapshot.list_key);
            sink.lock().unwrap().push((snapshot.version, cached));
        })
        .await?;

    env.system
        .cascade
        .add_item(
            HOTEL,
            "interventionTypes",
            ListItem::new("painting", "Peinture"),
            None,
            &env.admin,
        )
        .await?;

    let observed = observed.lock().unwrap();
    assert_eq!(observed.last(), Some(&(4, Some(4))));
    assert!(observed.iter().all(|(version, cached)| cached >= &Some(*version)));
    Ok(())
}

#[tokio::test]
async fn unsubscribed_callback_is_not_called() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let (seen, callback) = recorder();
    let access = &env.system.access;

    let id = access
        .subscribe(HOTEL, "interventionTypes", callback)
        .await?;
    assert!(access.unsubscribe(id));
    assert!(!access.unsubscribe(id));
    assert_eq!(access.subscription_count(), 0);

    env.system
        .cascade
        .deactivate_item(HOTEL, "interventionTypes", "normal", &env.admin)
        .await?;
    assert_eq!(seen.lock().unwrap().len(), 1);
    Ok(())
}

#[tokio::test]
async fn subscription_before_initialization_gets_first_version() -> anyhow::Result<()> {
    let env = TestSystem::new().await?;
    let (seen, callback) = recorder();

    env.system
        .access
        .subscribe("hotel-nice", "priorities", callback)
        .await?;
    assert!(seen.lock().unwrap().is_empty());

    env.system.store.initialize("hotel-nice", &env.admin).await?;
    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].version, 1);
    assert!(seen[0].items.is_empty());
    Ok(())
}
