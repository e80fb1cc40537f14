//! Loading and validating configuration files from disk.

use std::fs;

use tdc_daq::config::TdcConfig;
use tdc_daq::AppError;
use tempfile::TempDir;

const FULL: &str = r#"
[application]
name = "bench"
log_level = "debug"
log_format = "compact"

[crate]
base_address = 0x200000
address_increment = 0x10000
modules = 4
crate_id = 3

[acquisition]
full_scale_range_ns = 400
keep_overflow = true
berr_enable = false
common_stop = true

[interrupt]
enabled = true
source = 2
threshold = 8
level = 3
vector = 0xb0
"#;

fn write_config(dir: &TempDir, text: &str) -> std::path::PathBuf {
    let path = dir.path().join("tdc.toml");
    fs::write(&path, text).unwrap();
    path
}

#[test]
fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, FULL);

    let config = TdcConfig::load_from(&path).unwrap();
    config.validate().unwrap();

    assert_eq!(config.application.name, "bench");
    assert_eq!(config.application.log_format, "compact");
    assert_eq!(config.layout.base_address, 0x20_0000);
    assert_eq!(config.layout.modules, 4);
    assert_eq!(config.layout.crate_id, 3);
    assert_eq!(config.acquisition.full_scale_range_ns, 400);
    assert!(config.acquisition.keep_overflow);
    assert!(!config.acquisition.keep_underflow);
    assert!(!config.acquisition.berr_enable);
    assert!(config.acquisition.common_stop);
    assert!(config.interrupt.enabled);
    assert_eq!(config.interrupt.source, 2);
    assert_eq!(config.interrupt.threshold, 8);
    assert_eq!(config.interrupt.vector, 0xb0);
}

#[test]
fn test_shipped_config_is_valid() {
    let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/tdc.toml");
    let config = TdcConfig::load_from(path).unwrap();
    assert!(config.validate().is_ok());
    assert_eq!(config.layout.effective_modules(), 2);
}

#[test]
fn test_missing_section_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, "[application]\nname = \"x\"\nlog_level = \"info\"\n");

    let err = TdcConfig::load_from(&path).unwrap_err();
    assert!(matches!(err, AppError::Config(_)));
}

#[test]
fn test_wrong_type_is_a_load_error() {
    let dir = TempDir::new().unwrap();
    let text = FULL.replace("modules = 4", "modules = \"four\"");
    let path = write_config(&dir, &text);

    assert!(matches!(TdcConfig::load_from(&path), Err(AppError::Config(_))));
}

#[test]
fn test_out_of_range_values_fail_validation() {
    let dir = TempDir::new().unwrap();
    for (from, to) in [
        ("full_scale_range_ns = 400", "full_scale_range_ns = 100"),
        ("threshold = 8", "threshold = 0"),
        ("source = 2", "source = 4"),
        ("level = 3", "level = 9"),
        ("log_format = \"compact\"", "log_format = \"xml\""),
    ] {
        let path = write_config(&dir, &FULL.replace(from, to));
        let config = TdcConfig::load_from(&path).unwrap();
        let err = config.validate().unwrap_err();
        assert!(
            matches!(err, AppError::Configuration(_)),
            "{to}: unexpected {err:?}"
        );
    }
}

#[test]
fn test_environment_overrides_file() {
    let dir = TempDir::new().unwrap();
    let path = write_config(&dir, FULL);

    std::env::set_var("TDC_DAQ_SIMULATION__HITS_PER_EVENT", "3");
    let config = TdcConfig::load_from(&path);
    std::env::remove_var("TDC_DAQ_SIMULATION__HITS_PER_EVENT");

    let config = config.unwrap();
    assert_eq!(config.simulation.hits_per_event, 3);
    assert_eq!(config.layout.modules, 4);
}

#[test]
fn test_rendered_config_loads_back() {
    let dir = TempDir::new().unwrap();
    let original = TdcConfig::load_from(write_config(&dir, FULL)).unwrap();

    let rendered = original.to_toml().unwrap();
    let path = dir.path().join("rendered.toml");
    fs::write(&path, rendered).unwrap();

    let reloaded = TdcConfig::from_toml_str(&fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(reloaded.layout, original.layout);
    assert_eq!(reloaded.acquisition, original.acquisition);
    assert_eq!(reloaded.interrupt, original.interrupt);
}
