use std::{env, fs};

use featurebundle_controller::config::loader::load_config;

#[test]
fn config_parsing_and_env_overrides_and_validation() {
    let dir = tempfile::tempdir().expect("tmp dir");
    let path = dir.path().join("featurebundle.toml");

    let toml_content = r#"
[controller]
concurrent_reconciles = 4
delete_requeue_after_secs = 30
reconcile_timeout_secs = 120

[logging]
level = "debug"
"#;
    fs::write(&path, toml_content).expect("write toml");

    // 1) File values parse, missing keys fall back to defaults
    let cfg = load_config(path.to_str()).expect("should parse config");
    assert_eq!(cfg.controller.concurrent_reconciles, 4);
    assert_eq!(cfg.controller.delete_requeue_after_secs, 30);
    assert_eq!(cfg.controller.normal_requeue_after_secs, 20);
    assert_eq!(cfg.controller.reconcile_timeout_secs, Some(120));
    assert_eq!(cfg.controller.status_write_retries, 3);
    assert_eq!(cfg.logging.level, "debug");

    // 2) Env override wins over file
    unsafe {
        env::set_var("FEATUREBUNDLE__CONTROLLER__CONCURRENT_RECONCILES", "2");
    }
    let cfg_env = load_config(path.to_str()).expect("should parse config with env overrides");
    assert_eq!(cfg_env.controller.concurrent_reconciles, 2);
    unsafe {
        env::remove_var("FEATUREBUNDLE__CONTROLLER__CONCURRENT_RECONCILES");
    }

    // 3) Invalid values are rejected
    let bad_path = dir.path().join("bad.toml");
    fs::write(&bad_path, "[controller]\nconcurrent_reconciles = 0\n").expect("write bad toml");
    let err = load_config(bad_path.to_str()).expect_err("zero concurrency must fail");
    assert!(err.to_string().contains("concurrent_reconciles"));

    // 4) A missing file yields defaults
    let missing = dir.path().join("missing.toml");
    let cfg = load_config(missing.to_str()).expect("defaults");
    assert_eq!(cfg.controller.concurrent_reconciles, 10);
}
