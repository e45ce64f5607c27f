use std::{
    sync::Arc,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use earnings_ledger::{
    app_database::{AppDatabase, AppDatabaseError},
    models::InsertEarning,
};

// These tests need a live MySQL. They skip cleanly when DATABASE_URL
// is not set so the suite stays green on machines without one.
async fn test_db() -> Option<Arc<AppDatabase>> {
    dotenv::dotenv().ok();
    let url = match std::env::var("DATABASE_URL") {
        Ok(url) => url,
        Err(_) => {
            eprintln!("DATABASE_URL not set, skipping store test");
            return None;
        }
    };

    let app_database = AppDatabase::new(url);
    app_database
        .run_migrations()
        .await
        .expect("migrations should apply");
    Some(Arc::new(app_database))
}

// Each test works against its own challenge id so runs don't interfere.
fn unique_challenge_id() -> i32 {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .subsec_nanos();
    (nanos % (i32::MAX as u32)) as i32
}

#[tokio::test]
async fn insert_and_read_back_by_generated_id() {
    let Some(app_database) = test_db().await else {
        return;
    };
    let challenge_id = unique_challenge_id();

    let new_earning = InsertEarning::new(1, 1, challenge_id, Some(500));
    app_database
        .add_new_earning(new_earning)
        .await
        .expect("insert should succeed");

    let earnings = app_database
        .get_earnings_for_challenge(challenge_id)
        .await
        .expect("query should succeed");
    assert_eq!(earnings.len(), 1);
    assert_eq!(earnings[0].amount, 500);

    let by_id = app_database
        .get_earning_by_id(earnings[0].id)
        .await
        .expect("read by id should succeed");
    assert_eq!(by_id.amount, 500);
    assert_eq!(by_id.miner_id, 1);
    assert_eq!(by_id.pool_id, 1);
    assert_eq!(by_id.challenge_id, challenge_id);
}

#[tokio::test]
async fn amount_defaults_to_zero_when_unspecified() {
    let Some(app_database) = test_db().await else {
        return;
    };
    let challenge_id = unique_challenge_id();

    let new_earning = InsertEarning::new(2, 1, challenge_id, None);
    app_database
        .add_new_earning(new_earning)
        .await
        .expect("insert should succeed");

    let earnings = app_database
        .get_earnings_for_challenge(challenge_id)
        .await
        .expect("query should succeed");
    assert_eq!(earnings.len(), 1);
    assert_eq!(earnings[0].amount, 0);
}

#[tokio::test]
async fn update_changes_only_amount_and_updated_at() {
    let Some(app_database) = test_db().await else {
        return;
    };
    let challenge_id = unique_challenge_id();

    let new_earning = InsertEarning::new(3, 1, challenge_id, Some(500));
    app_database
        .add_new_earning(new_earning)
        .await
        .expect("insert should succeed");
    let before = app_database
        .get_earnings_for_challenge(challenge_id)
        .await
        .expect("query should succeed")
        .remove(0);
    assert!(before.updated_at >= before.created_at);

    // TIMESTAMP has one-second resolution, so give updated_at room to move
    tokio::time::sleep(Duration::from_millis(1100)).await;

    app_database
        .update_earning_amount(before.id, 750)
        .await
        .expect("update should succeed");

    let after = app_database
        .get_earning_by_id(before.id)
        .await
        .expect("read by id should succeed");
    assert_eq!(after.id, before.id);
    assert_eq!(after.miner_id, before.miner_id);
    assert_eq!(after.pool_id, before.pool_id);
    assert_eq!(after.challenge_id, before.challenge_id);
    assert_eq!(after.amount, 750);
    assert_eq!(after.created_at, before.created_at);
    assert!(after.updated_at >= before.updated_at);
    assert!(after.updated_at >= after.created_at);
}

#[tokio::test]
async fn update_of_missing_id_reports_failed_update() {
    let Some(app_database) = test_db().await else {
        return;
    };

    let res = app_database.update_earning_amount(i32::MAX, 1).await;
    assert!(matches!(res, Err(AppDatabaseError::FailedToUpdateRow)));
}

#[tokio::test]
async fn read_of_missing_id_reports_entity_does_not_exist() {
    let Some(app_database) = test_db().await else {
        return;
    };

    let res = app_database.get_earning_by_id(i32::MAX).await;
    assert!(matches!(res, Err(AppDatabaseError::EntityDoesNotExist)));
}

#[tokio::test]
async fn concurrent_inserts_get_distinct_ids() {
    let Some(app_database) = test_db().await else {
        return;
    };
    let challenge_id = unique_challenge_id();

    let db_a = app_database.clone();
    let db_b = app_database.clone();
    let (res_a, res_b) = tokio::join!(
        db_a.add_new_earning(InsertEarning::new(4, 1, challenge_id, Some(10))),
        db_b.add_new_earning(InsertEarning::new(5, 1, challenge_id, Some(20))),
    );
    res_a.expect("first insert should succeed");
    res_b.expect("second insert should succeed");

    let earnings = app_database
        .get_earnings_for_challenge(challenge_id)
        .await
        .expect("query should succeed");
    assert_eq!(earnings.len(), 2);
    assert_ne!(earnings[0].id, earnings[1].id);
}

#[tokio::test]
async fn batch_insert_and_miner_total() {
    let Some(app_database) = test_db().await else {
        return;
    };
    let challenge_id = unique_challenge_id();
    // miner ids are arbitrary, this one is only used by this test run
    let miner_id = unique_challenge_id();

    let batch = vec![
        InsertEarning::new(miner_id, 1, challenge_id, Some(100)),
        InsertEarning::new(miner_id, 1, challenge_id, Some(250)),
        InsertEarning::new(miner_id, 1, challenge_id, None),
    ];
    app_database
        .add_new_earnings_batch(batch)
        .await
        .expect("batch insert should succeed");

    let total = app_database
        .get_miner_total_earnings(miner_id)
        .await
        .expect("total should succeed");
    assert_eq!(total, 350);

    let earnings = app_database
        .get_earnings_for_miner(miner_id, 0)
        .await
        .expect("miner query should succeed");
    assert_eq!(earnings.len(), 3);
}
