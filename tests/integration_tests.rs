/// Integration tests for the training pipeline and prediction service
///
/// Run with: cargo test --test integration_tests -- --nocapture
use ev_battery_predictor::config::TrainConfig;
use ev_battery_predictor::dataset::{self, RawDataset, TrainingTable};
use ev_battery_predictor::error::{Error, PersistenceError};
use ev_battery_predictor::features::FEATURE_COLUMNS;
use ev_battery_predictor::metrics::Evaluation;
use ev_battery_predictor::model::{Predictor, Target};
use ev_battery_predictor::pipeline;
use ev_battery_predictor::service::{self, AppState, PredictionService};
use ev_battery_predictor::store::ModelStore;
use ev_battery_predictor::train::{Trainer, TrainerOptions};
use ev_battery_predictor::types::PredictRequest;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;
use tempfile::TempDir;

const HEADER: &str = "Rider_ID,Date,Trip_ID,Trip_Distance_km,Trip_Duration_min,Average_Speed_kmph,Acceleration_Pattern,Braking_Pattern,Energy_Consumption_kWh_per_km,Idle_Time_min,Voltage_V,Current_A,Charge_Cycles,Depth_of_Discharge_percent,Temperature_C,Charging_Power_kW,Charging_Duration_min,Charging_Type,Charging_Station_Location,Charging_Start_Time,Charging_End_Time,Battery_Charge_Efficiency_percent,Energy_kWh,Battery_Health_percent,Estimated_Range_km,Recommended_Action";

/// Deterministic synthetic raw dataset with a few missing targets.
fn synthetic_csv(rows: usize) -> String {
    let accel = ["Aggressive", "Moderate", "Smooth"];
    let braking = ["Hard", "Normal", "Soft"];
    let charging = ["AC", "DC Fast"];
    let stations = ["Home", "Office", "Public", "Highway"];
    let power = [3.3, 7.2, 22.0, 50.0];

    let mut out = String::from(HEADER);
    for i in 0..rows {
        let distance = 5.0 + ((i * 7) % 40) as f64;
        let consumption = 0.12 + (i % 10) as f64 * 0.01;
        let cycles = 50.0 + (i * 5) as f64;
        let dod = 40.0 + ((i * 11) % 50) as f64;
        let temp = 15.0 + ((i * 13) % 25) as f64;
        let health = 100.0 - cycles * 0.02 - temp * 0.1;
        let range = 4.0 * health - dod * 0.5;
        let action = if dod > 70.0 {
            "Charge Now"
        } else if temp > 30.0 {
            "Cool Down"
        } else {
            "Delay Charging"
        };

        let energy = if i % 11 == 5 { String::new() } else { format!("{:.3}", distance * consumption) };
        let health = if i % 9 == 4 { "NA".to_string() } else { format!("{health:.2}") };
        let range = if i % 13 == 7 { String::new() } else { format!("{range:.1}") };

        out.push_str(&format!(
            "\nR{i},2024-03-{day:02},T{i},{distance},{duration},{speed},{accel},{braking},{consumption:.2},{idle},{voltage},{current:.1},{cycles},{dod},{temp},{power},{cduration},{ctype},{station},08:00,09:00,{eff},{energy},{health},{range},{action}",
            day = 1 + i % 28,
            duration = distance * 2.1 + (i % 5) as f64,
            speed = 30 + (i * 3) % 25,
            accel = accel[i % 3],
            braking = braking[(i / 3) % 3],
            idle = i % 8,
            voltage = 360 + i % 30,
            current = 10.0 + (i % 7) as f64 * 0.8,
            power = power[i % 4],
            cduration = 20 + (i * 17) % 60,
            ctype = charging[i % 2],
            station = stations[i % 4],
            eff = 85 + i % 10,
        ));
    }
    out
}

fn train_config(dir: &Path, rows: usize) -> TrainConfig {
    let raw = dir.join("raw.csv");
    std::fs::write(&raw, synthetic_csv(rows)).unwrap();
    TrainConfig {
        raw_dataset: raw,
        processed_dataset: dir.join("processed_data.csv"),
        model_dir: dir.join("models"),
        test_fraction: 0.2,
        seed: 42,
        n_trees: 10,
    }
}

/// The literal scenario request; categoricals given as assigned codes.
fn scenario_request() -> PredictRequest {
    let value = json!({
        "Trip_Distance_km": 15.2,
        "Trip_Duration_min": 34,
        "Average_Speed_kmph": 42.5,
        "Acceleration_Pattern": 1,
        "Braking_Pattern": 0,
        "Energy_Consumption_kWh_per_km": 0.18,
        "Idle_Time_min": 5,
        "Voltage_V": 380,
        "Current_A": 12.4,
        "Charge_Cycles": 120,
        "Depth_of_Discharge_percent": 65,
        "Temperature_C": 28,
        "Charging_Power_kW": 7.2,
        "Charging_Duration_min": 45,
        "Charging Type": 1,
        "Charging Station Location": 2,
        "Battery_Charge_Efficiency_percent": 92.5
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => unreachable!(),
    }
}

fn has_decimals(v: f64, places: i32) -> bool {
    let scaled = v * 10f64.powi(places);
    (scaled - scaled.round()).abs() < 1e-6
}

#[test]
fn test_full_pipeline_writes_artifacts() {
    println!("\n=== Test: Full Pipeline ===");
    let dir = TempDir::new().unwrap();
    let cfg = train_config(dir.path(), 60);

    let report = pipeline::run_training(&cfg).unwrap();
    println!("✓ Trained on {} rows", report.rows);

    assert_eq!(report.rows, 60);
    assert_eq!(report.targets.len(), 4);
    for t in &report.targets {
        assert_eq!(t.train_rows, 48, "{}", t.target);
        assert_eq!(t.test_rows, 12, "{}", t.target);
        match (t.target.is_classification(), t.evaluation) {
            (true, Some(Evaluation::Classification { accuracy })) => {
                assert!((0.0..=1.0).contains(&accuracy))
            }
            (false, Some(Evaluation::Regression { mae, mse, .. })) => {
                assert!(mae >= 0.0 && mse >= 0.0)
            }
            other => panic!("unexpected evaluation for {}: {other:?}", t.target),
        }
    }

    let store = ModelStore::new(&cfg.model_dir);
    for target in Target::ALL {
        assert!(store.path_for(target.artifact_name()).exists());
    }
    assert!(store.path_for("feature_codec").exists());
    assert!(cfg.model_dir.join("training_report.json").exists());

    let processed = TrainingTable::from_path(&cfg.processed_dataset).unwrap();
    assert_eq!(processed.len(), 60);
    let header = std::fs::read_to_string(&cfg.processed_dataset).unwrap();
    assert!(!header.contains("Rider_ID"));
    assert!(!header.contains("Charging_Start_Time"));
    println!("✓ All assertions passed");
}

#[test]
fn test_training_partitions_are_reproducible() {
    println!("\n=== Test: Reproducible Partitions ===");
    let raw = RawDataset::from_reader(synthetic_csv(40).as_bytes()).unwrap();
    let table = dataset::prepare(&raw).unwrap().table;

    let options = TrainerOptions {
        n_trees: 5,
        ..TrainerOptions::default()
    };
    let first = Trainer::new(options);
    let second = Trainer::new(options);
    for target in Target::ALL {
        let a = first.split(table.len(), target).unwrap();
        let b = second.split(table.len(), target).unwrap();
        assert_eq!(a, b, "partition differs for {target}");
    }

    let (m1, _) = first.train(&table).unwrap();
    let (m2, _) = second.train(&table).unwrap();
    let inputs = table.features();
    for target in Target::ALL {
        assert_eq!(
            m1.get(target).predict_batch(&inputs).unwrap(),
            m2.get(target).predict_batch(&inputs).unwrap()
        );
    }
    println!("✓ Identical partitions across runs");
}

#[test]
fn test_store_round_trip_matches_in_memory_models() {
    println!("\n=== Test: Save/Load Round Trip ===");
    let dir = TempDir::new().unwrap();
    let raw = RawDataset::from_reader(synthetic_csv(30).as_bytes()).unwrap();
    let prepared = dataset::prepare(&raw).unwrap();
    let trainer = Trainer::new(TrainerOptions {
        n_trees: 6,
        ..TrainerOptions::default()
    });
    let (models, _) = trainer.train(&prepared.table).unwrap();

    let store = ModelStore::new(dir.path());
    store.save_all(&models, &prepared.codec).unwrap();

    let inputs = prepared.table.features();
    for target in Target::ALL {
        let loaded = store.load_model(target).unwrap();
        assert_eq!(
            models.get(target).predict_batch(&inputs).unwrap(),
            loaded.predict_batch(&inputs).unwrap(),
            "{target} changed across save/load"
        );
    }
    assert_eq!(store.load_codec().unwrap(), prepared.codec);
    println!("✓ Predictions identical after reload");
}

#[tokio::test]
async fn test_service_end_to_end_scenario() {
    println!("\n=== Test: Service Scenario ===");
    let dir = TempDir::new().unwrap();
    let cfg = train_config(dir.path(), 60);
    pipeline::run_training(&cfg).unwrap();

    let svc = PredictionService::load(&ModelStore::new(&cfg.model_dir)).unwrap();
    let state = AppState {
        service: Arc::new(svc),
    };

    let Json(result) = service::predict(State(state.clone()), Ok(Json(scenario_request())))
        .await
        .unwrap();
    let body = serde_json::to_value(result).unwrap();
    println!("  response: {body}");

    let obj = body.as_object().unwrap();
    assert_eq!(obj.len(), 4);
    let usage = obj["Predicted Battery Usage (kWh)"].as_f64().unwrap();
    let lifespan = obj["Predicted Battery Lifespan (%)"].as_f64().unwrap();
    let degradation = obj["Predicted Battery Degradation (km)"].as_f64().unwrap();
    assert!(has_decimals(usage, 4));
    assert!(has_decimals(lifespan, 2));
    assert!(has_decimals(degradation, 2));
    let class = obj["Optimal Charging Recommendation"].as_i64().unwrap();
    assert!((0..3).contains(&class), "class={class}");

    // Bad request, then the same service keeps serving.
    let mut bad = scenario_request();
    bad.remove("Temperature_C");
    let (status, Json(err)) = service::predict(State(state.clone()), Ok(Json(bad)))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("Temperature_C"));

    let mut unknown = scenario_request();
    unknown.insert("Charging Type".to_string(), json!("Wireless"));
    let (status, Json(err)) = service::predict(State(state.clone()), Ok(Json(unknown)))
        .await
        .unwrap_err();
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(err["error"].as_str().unwrap().contains("Wireless"));

    let Json(again) = service::predict(State(state), Ok(Json(scenario_request())))
        .await
        .unwrap();
    assert_eq!(again, result);
    println!("✓ Service recovered after malformed requests");
}

#[test]
fn test_category_labels_match_codes() {
    println!("\n=== Test: Labels vs Codes ===");
    let dir = TempDir::new().unwrap();
    let cfg = train_config(dir.path(), 40);
    pipeline::run_training(&cfg).unwrap();
    let svc = PredictionService::load(&ModelStore::new(&cfg.model_dir)).unwrap();

    let by_code = svc.predict(&scenario_request()).unwrap();

    let mut by_label = scenario_request();
    let table = svc.codec().encodings();
    for feature in FEATURE_COLUMNS {
        if let Some(codes) = table.column(feature) {
            let code = by_label[feature].as_u64().unwrap() as u32;
            let label = codes.category(code).unwrap().to_string();
            by_label.insert(feature.to_string(), json!(label));
        }
    }
    assert_eq!(svc.predict(&by_label).unwrap(), by_code);
    println!("✓ Label and code inputs agree");
}

#[test]
fn test_service_refuses_to_start_without_models() {
    println!("\n=== Test: Fail Fast ===");
    let dir = TempDir::new().unwrap();
    let store = ModelStore::new(dir.path());
    assert!(matches!(
        PredictionService::load(&store),
        Err(PersistenceError::ModelNotFound { .. })
    ));
}

#[test]
fn test_pipeline_rejects_empty_dataset() {
    let dir = TempDir::new().unwrap();
    let mut cfg = train_config(dir.path(), 0);
    cfg.model_dir = dir.path().join("never");
    let err = pipeline::run_training(&cfg).unwrap_err();
    assert!(matches!(err, Error::TrainingData(_)), "{err}");
    assert!(!cfg.model_dir.exists());
}
