// Bootstrap provisioning is re-runnable with the bundled seed list

mod common;

use std::path::PathBuf;

use serial_test::serial;
use weatherwise_service::bootstrap::{Bootstrap, OBSERVATIONS_COLLECTION};
use weatherwise_service::db::{CityRepository, RetentionPolicyRepository};
use weatherwise_service::seed::SeedList;
use weatherwise_service::services::CityRegistry;

use common::test_pool;

fn bundled_seed() -> SeedList {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/cities.toml");
    SeedList::from_file(&path).expect("bundled seed list parses")
}

#[tokio::test]
#[serial]
async fn test_bootstrap_twice_is_idempotent() {
    let pool = test_pool().await;
    let seed = bundled_seed();

    let first = Bootstrap::run(&pool, &seed).await.unwrap();
    assert_eq!(first.inserted, 5);
    assert_eq!(first.updated, 0);
    assert_eq!(first.total_cities, 5);

    let registry = CityRegistry::new(CityRepository::new(pool.clone()));
    let before = registry.find("Fortaleza", "BR").await.unwrap();

    let second = Bootstrap::run(&pool, &seed).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(second.updated, 5);
    assert_eq!(second.total_cities, 5);

    let after = registry.find("Fortaleza", "BR").await.unwrap();
    assert_eq!(before, after);
}

#[tokio::test]
#[serial]
async fn test_bootstrap_declares_observation_retention() {
    let pool = test_pool().await;

    Bootstrap::run(&pool, &bundled_seed()).await.unwrap();

    let max_age = RetentionPolicyRepository::new(pool.clone())
        .find(OBSERVATIONS_COLLECTION)
        .await
        .unwrap();
    assert_eq!(max_age, Some(15_552_000));
}

#[tokio::test]
#[serial]
async fn test_bootstrap_seeds_brazilian_capitals() {
    let pool = test_pool().await;

    Bootstrap::run(&pool, &bundled_seed()).await.unwrap();

    let registry = CityRegistry::new(CityRepository::new(pool.clone()));
    let sao_paulo = registry.find("São Paulo", "BR").await.unwrap();
    assert_eq!(sao_paulo.timezone, "America/Sao_Paulo");
    assert!(sao_paulo.active);
}
