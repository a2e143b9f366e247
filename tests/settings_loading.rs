use std::fs;
use std::path::PathBuf;

use config::FileFormat;

use cartwise::{Analysis, CartwiseError, Metric, QueryMode, Settings};

fn settings_file(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("cartwise-{}-{name}", std::process::id()));
    fs::write(&path, contents).expect("temp dir is writable");
    path
}

// Environment variables are process wide, so every case lives in one test.
#[test]
fn file_then_environment() {
    let path = settings_file(
        "layered.toml",
        "[mining]\nmin_support = 0.25\n\n[rules]\nmetric = \"confidence\"\nmin_threshold = 0.5\n\n[index]\ndefault_mode = \"exact\"\n",
    );
    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.mining.min_support, 0.25);
    assert_eq!(settings.rules.metric, Metric::Confidence);
    assert_eq!(settings.index.default_mode, QueryMode::Exact);

    unsafe { std::env::set_var("CARTWISE_MINING__MIN_SUPPORT", "0.5") };
    let settings = Settings::load(Some(&path)).unwrap();
    assert_eq!(settings.mining.min_support, 0.5);
    assert_eq!(settings.rules.min_threshold, 0.5);

    unsafe { std::env::set_var("CARTWISE_MINING__MIN_SUPPORT", "2.0") };
    let result = Settings::load(Some(&path));
    assert!(matches!(result, Err(CartwiseError::InvalidArgument { .. })));

    unsafe { std::env::remove_var("CARTWISE_MINING__MIN_SUPPORT") };
    fs::remove_file(&path).ok();

    let missing = std::env::temp_dir().join("cartwise-does-not-exist.toml");
    assert!(matches!(Settings::load(Some(&missing)), Err(CartwiseError::Config(_))));
}

#[test]
fn loaded_settings_drive_the_analysis() {
    // parsed rather than loaded so the environment test cannot interfere
    let settings = Settings::parse(
        r#"{"mining": {"min_support": 0.25}, "rules": {"metric": "confidence", "min_threshold": 0.6}}"#,
        FileFormat::Json,
    )
    .unwrap();
    let analysis = Analysis::run(
        vec![
            vec!["milk", "bread"],
            vec!["milk", "bread", "eggs"],
            vec!["bread"],
            vec!["milk"],
        ],
        &settings,
    )
    .unwrap();
    assert!(analysis.rules().iter().all(|r| r.confidence() >= 0.6));
    assert_eq!(analysis.summary().metric, Metric::Confidence);
    assert!(!analysis.rules().is_empty());
}
