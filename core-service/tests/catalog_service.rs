//! End-to-end tests of the catalog façade: bootstrap, ordering operations and
//! the events published after each commit.

use core_service::library::models::{MembershipRequest, TrackRef};
use core_service::library::LibraryError;
use core_service::runtime::config::CatalogConfig;
use core_service::runtime::events::{CoreEvent, EventStream, LibraryEvent};
use core_service::{bootstrap, CatalogService, CoreError};
use std::time::Duration;

async fn catalog() -> CatalogService {
    let config = CatalogConfig::builder()
        .in_memory()
        .max_conflict_retries(20)
        .retry_backoff(Duration::from_millis(2))
        .build()
        .unwrap();
    bootstrap(config).await.unwrap()
}

async fn album_with_tracks(catalog: &CatalogService, names: &[&str]) -> String {
    let artist = catalog.create_artist("Alice Coltrane").await.unwrap();
    let album = catalog
        .create_album("Journey in Satchidananda", &artist.id, Some(1971))
        .await
        .unwrap();
    let requests = names
        .iter()
        .map(|name| MembershipRequest::append(TrackRef::new_track(*name)))
        .collect();
    catalog.membership().bulk_insert(&album.id, requests).await.unwrap();
    album.id
}

async fn names(catalog: &CatalogService, album_id: &str) -> Vec<String> {
    catalog
        .list(album_id)
        .await
        .unwrap()
        .into_iter()
        .map(|entry| entry.name)
        .collect()
}

fn library_error(err: CoreError) -> LibraryError {
    match err {
        CoreError::Library(err) => err,
        other => panic!("expected a library error, got {other:?}"),
    }
}

#[tokio::test]
async fn test_bootstrap_rejects_invalid_config() {
    let mut config = CatalogConfig::builder().in_memory().build().unwrap();
    config.max_connections = 0;

    let result = bootstrap(config).await;
    assert!(matches!(result, Err(CoreError::Runtime(_))));
}

#[tokio::test]
async fn test_insert_publishes_final_position() {
    let catalog = catalog().await;
    let album_id = album_with_tracks(&catalog, &["A", "B", "C"]).await;
    let mut events = catalog.subscribe();

    let row = catalog
        .insert(&album_id, MembershipRequest::at(TrackRef::new_track("X"), 2))
        .await
        .unwrap();

    assert_eq!(row.position, 2);
    assert_eq!(names(&catalog, &album_id).await, vec!["A", "X", "B", "C"]);
    assert_eq!(
        events.try_recv().unwrap(),
        CoreEvent::Library(LibraryEvent::TracksAdded {
            album_id: album_id.clone(),
            positions: vec![2],
        })
    );
}

#[tokio::test]
async fn test_each_mutation_publishes_one_event() {
    let catalog = catalog().await;
    let album_id = album_with_tracks(&catalog, &["A", "B", "C", "D"]).await;
    let mut events = catalog.subscribe();

    catalog.move_track(&album_id, 1, 4).await.unwrap();
    catalog.remove(&album_id, 1).await.unwrap();
    catalog
        .bulk_insert(
            &album_id,
            vec![
                MembershipRequest::append(TrackRef::new_track("E")),
                MembershipRequest::append(TrackRef::new_track("F")),
            ],
        )
        .await
        .unwrap();

    assert_eq!(names(&catalog, &album_id).await, vec!["C", "D", "A", "E", "F"]);

    let received: Vec<LibraryEvent> = std::iter::from_fn(|| events.try_recv().ok())
        .map(|CoreEvent::Library(event)| event)
        .collect();
    assert_eq!(
        received,
        vec![
            LibraryEvent::TrackMoved {
                album_id: album_id.clone(),
                from: 1,
                to: 4,
            },
            LibraryEvent::TrackRemoved {
                album_id: album_id.clone(),
                position: 1,
            },
            LibraryEvent::TracksAdded {
                album_id: album_id.clone(),
                positions: vec![4, 5],
            },
        ]
    );
}

#[tokio::test]
async fn test_failed_operations_publish_nothing() {
    let catalog = catalog().await;
    let album_id = album_with_tracks(&catalog, &["A", "B", "C"]).await;
    let mut events = catalog.subscribe();

    let err = catalog.remove(&album_id, 10).await.unwrap_err();
    assert!(matches!(library_error(err), LibraryError::NotFound { .. }));

    let err = catalog.move_track(&album_id, 1, 4).await.unwrap_err();
    assert!(matches!(
        library_error(err),
        LibraryError::PositionOutOfRange { position: 4, max: 3 }
    ));

    let err = catalog
        .bulk_insert(
            &album_id,
            vec![
                MembershipRequest::at(TrackRef::new_track("X"), 1),
                MembershipRequest::append(TrackRef::new_track("Y")),
            ],
        )
        .await
        .unwrap_err();
    assert!(matches!(
        library_error(err),
        LibraryError::InconsistentBulkOrder { .. }
    ));

    // A move onto the same slot changes nothing and is not announced
    catalog.move_track(&album_id, 2, 2).await.unwrap();

    assert!(events.try_recv().is_err());
    assert_eq!(names(&catalog, &album_id).await, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_purge_announces_affected_albums() {
    let catalog = catalog().await;
    let artist = catalog.create_artist("Pharoah Sanders").await.unwrap();
    let karma = catalog.create_album("Karma", &artist.id, None).await.unwrap();
    let jewels = catalog
        .create_album("Jewels of Thought", &artist.id, Some(1970))
        .await
        .unwrap();
    let creator = catalog.create_track("The Creator Has a Master Plan", &artist.id).await.unwrap();
    let colors = catalog.create_track("Colors", &artist.id).await.unwrap();

    for album_id in [&karma.id, &jewels.id] {
        catalog
            .bulk_insert(
                album_id,
                vec![
                    MembershipRequest::append(TrackRef::existing(&creator.id)),
                    MembershipRequest::append(TrackRef::existing(&colors.id)),
                ],
            )
            .await
            .unwrap();
    }

    let mut purges = EventStream::new(catalog.subscribe())
        .filter(|event| matches!(event, CoreEvent::Library(LibraryEvent::TrackPurged { .. })));

    let mut affected = catalog.purge_track(&creator.id).await.unwrap();
    affected.sort();
    let mut expected = vec![karma.id.clone(), jewels.id.clone()];
    expected.sort();
    assert_eq!(affected, expected);

    for album_id in [&karma.id, &jewels.id] {
        let entries = catalog.list(album_id).await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].position, 1);
        assert_eq!(entries[0].track_id, colors.id);
    }
    assert!(!catalog.tracks().exists(&creator.id).await.unwrap());

    match purges.recv().await.unwrap() {
        CoreEvent::Library(LibraryEvent::TrackPurged { track_id, album_ids }) => {
            assert_eq!(track_id, creator.id);
            assert_eq!(album_ids.len(), 2);
        }
        other => panic!("unexpected event {other:?}"),
    }
}

#[tokio::test]
async fn test_entity_helpers_validate_input() {
    let catalog = catalog().await;

    let err = catalog.create_artist("   ").await.unwrap_err();
    assert!(matches!(library_error(err), LibraryError::InvalidInput { .. }));

    let err = catalog.create_album("Orphan", "missing-artist", None).await.unwrap_err();
    assert!(matches!(
        library_error(err),
        LibraryError::NotFound { entity_type, .. } if entity_type == "Artist"
    ));

    let artist = catalog.create_artist("Sun Ra").await.unwrap();
    let err = catalog.create_album("Lanquidity", &artist.id, Some(1500)).await.unwrap_err();
    assert!(matches!(library_error(err), LibraryError::InvalidInput { .. }));

    catalog.create_album("Lanquidity", &artist.id, Some(1978)).await.unwrap();
    let err = catalog.create_album("lanquidity", &artist.id, None).await.unwrap_err();
    assert!(matches!(library_error(err), LibraryError::InvalidInput { .. }));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_cloned_services_serialize_same_album() {
    let catalog = catalog().await;
    let album_id = album_with_tracks(&catalog, &["A", "B"]).await;
    let mut events = catalog.subscribe();

    let tasks: Vec<_> = (0..8)
        .map(|i| {
            let catalog = catalog.clone();
            let album_id = album_id.clone();
            tokio::spawn(async move {
                catalog
                    .insert(
                        &album_id,
                        MembershipRequest::at(TrackRef::new_track(format!("T{i}")), 1),
                    )
                    .await
            })
        })
        .collect();

    for result in futures::future::join_all(tasks).await {
        assert_eq!(result.unwrap().unwrap().position, 1);
    }

    let entries = catalog.list(&album_id).await.unwrap();
    let positions: Vec<i64> = entries.iter().map(|e| e.position).collect();
    assert_eq!(positions, (1..=10).collect::<Vec<_>>());
    assert_eq!(entries[8].name, "A");
    assert_eq!(entries[9].name, "B");

    let added = std::iter::from_fn(|| events.try_recv().ok()).count();
    assert_eq!(added, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_purge_racing_insert_still_announces() {
    let catalog = catalog().await;
    let artist = catalog.create_artist("Don Cherry").await.unwrap();

    for round in 0..10 {
        let first = catalog
            .create_album(&format!("Mu {}", round), &artist.id, None)
            .await
            .unwrap();
        let second = catalog
            .create_album(&format!("Symphony {}", round), &artist.id, None)
            .await
            .unwrap();
        let track = catalog
            .create_track(&format!("Brown Rice {}", round), &artist.id)
            .await
            .unwrap();
        catalog
            .insert(&first.id, MembershipRequest::append(TrackRef::existing(&track.id)))
            .await
            .unwrap();

        let mut purges = EventStream::new(catalog.subscribe())
            .filter(|event| matches!(event, CoreEvent::Library(LibraryEvent::TrackPurged { .. })));

        let purge = {
            let catalog = catalog.clone();
            let track_id = track.id.clone();
            tokio::spawn(async move { catalog.purge_track(&track_id).await })
        };
        let insert = {
            let catalog = catalog.clone();
            let album_id = second.id.clone();
            let track_id = track.id.clone();
            tokio::spawn(async move {
                catalog
                    .insert(&album_id, MembershipRequest::append(TrackRef::existing(track_id)))
                    .await
            })
        };

        let affected = purge.await.unwrap().unwrap();
        let _ = insert.await.unwrap();

        assert!(affected.contains(&first.id));
        assert_eq!(catalog.count(&first.id).await.unwrap(), 0);
        assert_eq!(catalog.count(&second.id).await.unwrap(), 0);

        match purges.recv().await.unwrap() {
            CoreEvent::Library(LibraryEvent::TrackPurged { track_id, album_ids }) => {
                assert_eq!(track_id, track.id);
                assert_eq!(album_ids, affected);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_album_events_only_concern_one_album() {
    let catalog = catalog().await;
    let watched = album_with_tracks(&catalog, &["A", "B"]).await;
    let artist_id = catalog
        .albums()
        .find_by_id(&watched)
        .await
        .unwrap()
        .unwrap()
        .artist_id;
    let other = catalog.create_album("Ptah, the El Daoud", &artist_id, None).await.unwrap();
    let shared = catalog.create_track("Turiya", &artist_id).await.unwrap();

    let mut events = catalog.album_events(&watched);

    catalog
        .insert(&other.id, MembershipRequest::append(TrackRef::existing(&shared.id)))
        .await
        .unwrap();
    catalog.move_track(&watched, 2, 1).await.unwrap();
    catalog
        .insert(&watched, MembershipRequest::append(TrackRef::existing(&shared.id)))
        .await
        .unwrap();

    let mut listed = catalog.albums_for_track(&shared.id).await.unwrap();
    listed.sort();
    let mut expected = vec![watched.clone(), other.id.clone()];
    expected.sort();
    assert_eq!(listed, expected);

    catalog.purge_track(&shared.id).await.unwrap();

    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Library(LibraryEvent::TrackMoved {
            album_id: watched.clone(),
            from: 2,
            to: 1,
        })
    );
    assert_eq!(
        events.recv().await.unwrap(),
        CoreEvent::Library(LibraryEvent::TracksAdded {
            album_id: watched.clone(),
            positions: vec![3],
        })
    );
    assert!(matches!(
        events.recv().await.unwrap(),
        CoreEvent::Library(LibraryEvent::TrackPurged { album_ids, .. }) if album_ids.contains(&watched)
    ));
    assert!(events.try_recv().is_none());
}
