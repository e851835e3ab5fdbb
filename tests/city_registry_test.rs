// City registry against a real database: upsert identity, lookups,
// listing order, deactivation and delete protection

mod common;

use futures::stream::TryStreamExt;
use serial_test::serial;
use weatherwise_service::db::{
    City, CityRepository, ObservationRepository, UpsertOutcome,
};
use weatherwise_service::error::WeatherError;
use weatherwise_service::services::{CityRegistry, ObservationStore};

use common::{city_input, create_city, metrics, test_pool};

fn registry(pool: &sqlx::PgPool) -> CityRegistry {
    CityRegistry::new(CityRepository::new(pool.clone()))
}

#[tokio::test]
#[serial]
async fn test_upsert_inserts_then_updates_same_record() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    let first = registry.upsert(&city_input("Fortaleza", "BR")).await.unwrap();
    assert_eq!(first.outcome, UpsertOutcome::Inserted);

    let mut moved = city_input("Fortaleza", "BR");
    moved.latitude = -3.73;
    let second = registry.upsert(&moved).await.unwrap();

    assert_eq!(second.outcome, UpsertOutcome::Updated);
    assert_eq!(second.city.id, first.city.id);
    assert_eq!(second.city.latitude, -3.73);
    assert_eq!(registry.count().await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn test_identical_upsert_leaves_record_untouched() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    let first = registry.upsert(&city_input("Recife", "BR")).await.unwrap();
    let again = registry.upsert(&city_input("Recife", "BR")).await.unwrap();

    assert_eq!(again.outcome, UpsertOutcome::Updated);
    assert_eq!(again.city, first.city);
}

#[tokio::test]
#[serial]
async fn test_upsert_normalizes_country_code() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    registry.upsert(&city_input("Salvador", "BR")).await.unwrap();
    let lower = registry.upsert(&city_input("Salvador", "br")).await.unwrap();

    assert_eq!(lower.outcome, UpsertOutcome::Updated);
    assert_eq!(lower.city.country, "BR");
    assert_eq!(registry.count().await.unwrap(), 1);
}

#[tokio::test]
#[serial]
async fn test_upsert_rejects_invalid_input() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    let mut bad_latitude = city_input("Nowhere", "BR");
    bad_latitude.latitude = 91.0;
    assert!(matches!(
        registry.upsert(&bad_latitude).await,
        Err(WeatherError::Validation(_))
    ));

    let mut bad_timezone = city_input("Nowhere", "BR");
    bad_timezone.timezone = "Mars/Olympus_Mons".to_string();
    assert!(matches!(
        registry.upsert(&bad_timezone).await,
        Err(WeatherError::Validation(_))
    ));

    assert_eq!(registry.count().await.unwrap(), 0);
}

#[tokio::test]
#[serial]
async fn test_find_missing_city_is_not_found() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    assert!(matches!(
        registry.find("Atlantis", "BR").await,
        Err(WeatherError::NotFound(_))
    ));
    assert!(matches!(
        registry.find_by_id(9999).await,
        Err(WeatherError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn test_resolve_requires_country_for_ambiguous_names() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    create_city(&pool, "Valencia", "ES").await;
    let venezuela = create_city(&pool, "Valencia", "VE").await;
    create_city(&pool, "Recife", "BR").await;

    assert!(matches!(
        registry.resolve("Valencia", None).await,
        Err(WeatherError::Validation(_))
    ));
    assert_eq!(registry.resolve("Valencia", Some("ve")).await.unwrap().id, venezuela.id);
    assert_eq!(registry.resolve("Recife", None).await.unwrap().country, "BR");
}

#[tokio::test]
#[serial]
async fn test_list_is_insertion_ordered_and_filters_inactive() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    let names = ["Fortaleza", "São Paulo", "Rio de Janeiro"];
    for name in names {
        create_city(&pool, name, "BR").await;
    }

    let all: Vec<City> = registry.list(false).try_collect().await.unwrap();
    let listed: Vec<&str> = all.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(listed, names);

    registry.deactivate(all[1].id).await.unwrap();

    let active: Vec<City> = registry.list(true).try_collect().await.unwrap();
    assert_eq!(active.len(), 2);
    assert!(active.iter().all(|c| c.active));

    // Listing is restartable
    let again: Vec<City> = registry.list(false).try_collect().await.unwrap();
    assert_eq!(again.len(), 3);
}

#[tokio::test]
#[serial]
async fn test_update_coordinates_validates_range() {
    let pool = test_pool().await;
    let registry = registry(&pool);
    let city = create_city(&pool, "Fortaleza", "BR").await;

    let updated = registry.update_coordinates(city.id, -3.8, -38.6).await.unwrap();
    assert_eq!((updated.latitude, updated.longitude), (-3.8, -38.6));

    assert!(matches!(
        registry.update_coordinates(city.id, 0.0, 181.0).await,
        Err(WeatherError::Validation(_))
    ));
}

#[tokio::test]
#[serial]
async fn test_delete_rejected_while_observations_reference_city() {
    let pool = test_pool().await;
    let registry = registry(&pool);
    let city = create_city(&pool, "Fortaleza", "BR").await;

    let observations = ObservationStore::new(
        ObservationRepository::new(pool.clone()),
        CityRepository::new(pool.clone()),
        300,
    );
    observations
        .record(city.id, chrono::Utc::now(), &metrics(30.0), "station")
        .await
        .unwrap();

    assert!(matches!(
        registry.delete(city.id).await,
        Err(WeatherError::CityReferenced(id)) if id == city.id
    ));
    assert!(registry.find_by_id(city.id).await.is_ok());
}

#[tokio::test]
#[serial]
async fn test_delete_unreferenced_city() {
    let pool = test_pool().await;
    let registry = registry(&pool);
    let city = create_city(&pool, "Recife", "BR").await;

    registry.delete(city.id).await.unwrap();

    assert!(matches!(
        registry.find_by_id(city.id).await,
        Err(WeatherError::NotFound(_))
    ));
    assert!(matches!(
        registry.delete(city.id).await,
        Err(WeatherError::NotFound(_))
    ));
}

#[tokio::test]
#[serial]
async fn test_concurrent_upserts_yield_one_city() {
    let pool = test_pool().await;
    let registry = registry(&pool);

    let handles: Vec<_> = (0..16)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.upsert(&city_input("Fortaleza", "BR")).await })
        })
        .collect();

    let mut ids = Vec::new();
    for handle in handles {
        ids.push(handle.await.unwrap().unwrap().city.id);
    }

    assert!(ids.iter().all(|id| *id == ids[0]));
    assert_eq!(registry.count().await.unwrap(), 1);
}
