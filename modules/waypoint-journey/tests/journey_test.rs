//! Journey engine behaviour against the in-memory store.

use std::sync::Arc;

use waypoint_common::{CityId, CityUpsert, JourneyError};
use waypoint_journey::JourneyEngine;
use waypoint_store::JourneyRepo;

fn stop(id: &str, name: &str, region: &str, order: u32) -> CityUpsert {
    CityUpsert {
        id: Some(CityId::from(id)),
        name: name.to_string(),
        region: region.to_string(),
        latitude: 41.88,
        longitude: -87.63,
        sequence_order: order,
        keywords: Vec::new(),
    }
}

async fn seeded_engine() -> JourneyEngine {
    let engine = JourneyEngine::new(JourneyRepo::in_memory());
    for (id, name, region, order) in [
        ("1", "Austin", "Texas", 1),
        ("2", "Dallas", "Texas", 2),
        ("3", "Chicago", "Illinois", 3),
        ("4", "Detroit", "Michigan", 4),
    ] {
        engine.upsert_city(stop(id, name, region, order)).await.unwrap();
    }
    engine
}

async fn current_count(engine: &JourneyEngine) -> usize {
    engine
        .list_cities()
        .await
        .unwrap()
        .iter()
        .filter(|c| c.is_current)
        .count()
}

#[tokio::test]
async fn exactly_one_current_after_any_sequence_of_moves() {
    let engine = seeded_engine().await;
    for id in ["1", "3", "2", "2", "4", "1"] {
        engine.set_current(&CityId::from(id)).await.unwrap();
        assert_eq!(current_count(&engine).await, 1);
        let journey = engine.compute_journey().await.unwrap();
        assert_eq!(journey.current_city.unwrap().id.as_str(), id);
    }
}

#[tokio::test]
async fn path_contains_earlier_stops_in_order() {
    let engine = seeded_engine().await;
    engine.set_current(&CityId::from("3")).await.unwrap();

    let journey = engine.compute_journey().await.unwrap();
    let names: Vec<&str> = journey.path.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["Austin", "Dallas"]);
    assert_eq!(journey.current_city.unwrap().name, "Chicago");
}

#[tokio::test]
async fn set_current_stamps_time_and_mirrors_status() {
    let engine = seeded_engine().await;
    let before = chrono::Utc::now();
    let city = engine.set_current(&CityId::from("3")).await.unwrap();

    assert!(city.became_current_at.unwrap() >= before);
    let stored = engine.get_city(&CityId::from("3")).await.unwrap();
    assert_eq!(stored.became_current_at, city.became_current_at);

    let status = engine.status().await.unwrap();
    assert_eq!(status.city.as_deref(), Some("Chicago"));
    assert_eq!(status.region.as_deref(), Some("Illinois"));
    assert_eq!(status.city_id, Some(CityId::from("3")));
    assert!(status.last_updated.is_some());
}

#[tokio::test]
async fn set_current_unknown_city_is_not_found_and_changes_nothing() {
    let engine = seeded_engine().await;
    engine.set_current(&CityId::from("2")).await.unwrap();

    let err = engine.set_current(&CityId::from("99")).await.unwrap_err();
    assert!(matches!(err, JourneyError::NotFound { .. }));

    let journey = engine.compute_journey().await.unwrap();
    assert_eq!(journey.current_city.unwrap().id.as_str(), "2");
}

#[tokio::test]
async fn concurrent_moves_leave_one_current_city() {
    let engine = Arc::new(seeded_engine().await);

    let moves = ["1", "2", "3", "4", "3", "2", "1", "4"].map(|id| {
        let engine = engine.clone();
        tokio::spawn(async move { engine.set_current(&CityId::from(id)).await })
    });
    for result in futures::future::join_all(moves).await {
        result.unwrap().unwrap();
    }

    assert_eq!(current_count(&engine).await, 1);
}

#[tokio::test]
async fn sequence_collisions_are_rejected() {
    let engine = seeded_engine().await;

    let err = engine
        .upsert_city(stop("5", "Denver", "Colorado", 2))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        JourneyError::SequenceConflict { order: 2, ref existing } if existing.as_str() == "2"
    ));

    let err = engine.reorder(&CityId::from("4"), 1).await.unwrap_err();
    assert!(matches!(err, JourneyError::SequenceConflict { order: 1, .. }));

    // Re-saving a city at its own position is not a collision.
    engine.upsert_city(stop("2", "Dallas", "TX", 2)).await.unwrap();
}

#[tokio::test]
async fn reorder_moves_city_along_the_path() {
    let engine = seeded_engine().await;
    engine.reorder(&CityId::from("1"), 10).await.unwrap();
    engine.set_current(&CityId::from("4")).await.unwrap();

    let journey = engine.compute_journey().await.unwrap();
    let ids: Vec<&str> = journey.path.iter().map(|c| c.id.as_str()).collect();
    assert_eq!(ids, vec!["2", "3"]);

    let err = engine.reorder(&CityId::from("nope"), 20).await.unwrap_err();
    assert!(matches!(err, JourneyError::NotFound { .. }));
}

#[tokio::test]
async fn upsert_preserves_current_flag_and_refreshes_status() {
    let engine = seeded_engine().await;
    let current = engine.set_current(&CityId::from("3")).await.unwrap();

    let mut edit = stop("3", "Chicago", "IL", 3);
    edit.keywords = vec!["windy city".into()];
    let saved = engine.upsert_city(edit).await.unwrap();

    assert!(saved.is_current);
    assert_eq!(saved.became_current_at, current.became_current_at);
    assert_eq!(engine.status().await.unwrap().region.as_deref(), Some("IL"));
}

#[tokio::test]
async fn upsert_generates_ids_and_validates_names() {
    let engine = seeded_engine().await;
    let mut input = stop("x", "Denver", "Colorado", 9);
    input.id = None;
    let city = engine.upsert_city(input).await.unwrap();
    assert!(!city.id.as_str().is_empty());
    assert!(!city.is_current);

    let err = engine
        .upsert_city(stop("y", "   ", "Nowhere", 11))
        .await
        .unwrap_err();
    assert!(matches!(err, JourneyError::Validation(_)));
}

#[tokio::test]
async fn upsert_rejects_bad_coordinates_and_stores_nothing() {
    let engine = seeded_engine().await;
    for (lat, lng) in [(f64::NAN, 500.0), (91.0, 0.0), (0.0, -180.5), (0.0, f64::INFINITY)] {
        let mut input = stop("bad", "Nowhere", "Ocean", 9);
        input.latitude = lat;
        input.longitude = lng;
        let err = engine.upsert_city(input).await.unwrap_err();
        assert!(matches!(err, JourneyError::Validation(_)), "{lat}, {lng}");
    }
    assert_eq!(engine.list_cities().await.unwrap().len(), 4);
    assert!(matches!(
        engine.get_city(&CityId::from("bad")).await,
        Err(JourneyError::NotFound { .. })
    ));

    let mut edge = stop("edge", "Edge", "Pole", 10);
    edge.latitude = 90.0;
    edge.longitude = -180.0;
    engine.upsert_city(edge).await.unwrap();
    assert_eq!(engine.list_cities().await.unwrap().len(), 5);
}

#[tokio::test]
async fn removing_current_city_clears_status() {
    let engine = seeded_engine().await;
    engine.set_current(&CityId::from("2")).await.unwrap();

    engine.remove_city(&CityId::from("2")).await.unwrap();
    let status = engine.status().await.unwrap();
    assert!(status.city.is_none());
    assert!(status.city_id.is_none());

    // No flagged city left: the last stop stands in.
    let journey = engine.compute_journey().await.unwrap();
    assert_eq!(journey.current_city.unwrap().id.as_str(), "4");
}

#[tokio::test]
async fn sleep_flag_and_quote() {
    let engine = seeded_engine().await;
    assert!(!engine.is_sleeping().await.unwrap());

    engine.set_sleep(true).await.unwrap();
    engine.set_current(&CityId::from("1")).await.unwrap();
    assert!(engine.is_sleeping().await.unwrap());

    let status = engine.set_quote("  On the road again  ").await.unwrap();
    assert_eq!(status.quote.as_deref(), Some("On the road again"));
    assert!(status.is_sleep);

    let too_long = "x".repeat(501);
    assert!(matches!(
        engine.set_quote(&too_long).await.unwrap_err(),
        JourneyError::Validation(_)
    ));
    assert!(engine.set_quote("").await.is_err());
}
