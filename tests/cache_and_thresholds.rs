mod common;

use std::sync::Arc;

use healthsync_lib::{
    cache::{CacheStore, NoQuota},
    db::{StorageInfo, VitalType},
    thresholds::{
        default_range, ThresholdError, ThresholdRangeInput, ThresholdRegistry, ThresholdSource,
    },
};

use common::{heart_rate, temp_database, FlakyRemote};

#[tokio::test]
async fn storage_info_degrades_to_zero_without_quota() {
    let cache = CacheStore::new(temp_database(), Arc::new(NoQuota), 10);
    cache.upsert_vital(&heart_rate("p1", 0, 70.0)).await;

    let info = cache.get_storage_info().await;
    assert!(info.is_degraded());
    assert_eq!(info.value, StorageInfo::default());
    assert_eq!(info.value.percentage_used, 0.0);
}

#[tokio::test]
async fn threshold_load_falls_back_to_local_snapshot() {
    let db = temp_database();
    let remote = FlakyRemote::new();

    let mut tuned = default_range(VitalType::OxygenLevel);
    tuned.min_value = 92.0;
    let first = ThresholdRegistry::new(remote.clone(), db.clone());
    first.load().await.unwrap();
    first.save_range(VitalType::OxygenLevel, tuned).await.unwrap();

    // A fresh process with the store unreachable keeps the last saved bounds.
    remote.set_failing(true);
    let restarted = ThresholdRegistry::new(remote.clone(), db.clone());
    let err = restarted.load().await.unwrap_err();
    assert!(matches!(err, ThresholdError::Remote(_)));
    assert_eq!(restarted.source(), ThresholdSource::LocalSnapshot);
    assert_eq!(
        restarted.range_for(VitalType::OxygenLevel).unwrap().min_value,
        92.0
    );

    // Without any snapshot the built-in defaults stay in effect.
    let blank = ThresholdRegistry::new(remote.clone(), temp_database());
    assert!(blank.load().await.is_err());
    assert_eq!(blank.source(), ThresholdSource::BuiltIn);
    assert_eq!(
        blank.range_for(VitalType::OxygenLevel),
        Some(default_range(VitalType::OxygenLevel))
    );
}

#[tokio::test]
async fn threshold_form_input_must_be_complete() {
    let mut input = ThresholdRangeInput::from(&default_range(VitalType::HeartRate));
    input.warning_max = None;
    let err = input.into_range(VitalType::HeartRate).unwrap_err();
    assert!(matches!(
        err,
        ThresholdError::MissingField {
            field: "warningMax",
            ..
        }
    ));
}
