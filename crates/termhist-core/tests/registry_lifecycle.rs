//! Registry lifecycle and settings-driven resizing, end to end

use serde_json::json;
use std::fs;
use std::sync::Arc;
use tempfile::TempDir;
use termhist_core::{
    FileStorage, HistoryError, HistoryRegistry, SettingsRegistry, global, init_global,
    HISTORY_LIMIT_SETTING,
};

#[test]
fn registry_over_file_storage_shares_instances() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::open(temp_dir.path().join("storage.json")).unwrap());
    let registry = HistoryRegistry::new(storage, Arc::new(SettingsRegistry::new()));

    let first = registry.history::<String>("commands").unwrap();
    let second = registry.history::<String>("commands").unwrap();
    assert!(Arc::ptr_eq(&first, &second));

    first.add("ls", "ls -la".to_string());
    assert_eq!(
        second.entries(),
        vec![("ls".to_string(), "ls -la".to_string())]
    );

    let error = registry.history::<i64>("commands").unwrap_err();
    assert!(matches!(error, HistoryError::DomainTypeMismatch(_)));
}

#[test]
fn settings_file_drives_limit_and_reacts_to_changes() {
    let temp_dir = TempDir::new().unwrap();
    let settings_path = temp_dir.path().join("settings.json");
    fs::write(&settings_path, r#"{"terminal.history.limit": 2}"#).unwrap();

    let storage = Arc::new(FileStorage::open(temp_dir.path().join("storage.json")).unwrap());
    let settings = Arc::new(SettingsRegistry::from_file(&settings_path).unwrap());
    let registry = HistoryRegistry::new(storage, settings.clone());

    let history = registry.history::<i32>("commands").unwrap();
    assert_eq!(history.limit(), 2);

    history.add("a", 1);
    history.add("b", 2);
    history.add("c", 3);
    assert_eq!(
        history.entries(),
        vec![("b".to_string(), 2), ("c".to_string(), 3)]
    );

    settings.set(HISTORY_LIMIT_SETTING, json!(1));
    assert_eq!(history.limit(), 1);
    assert_eq!(history.entries(), vec![("c".to_string(), 3)]);

    // A non-numeric override falls back to the default bound.
    settings.set(HISTORY_LIMIT_SETTING, json!("lots"));
    assert_eq!(history.limit(), 100);
}

#[test]
fn global_registry_installs_once() {
    let temp_dir = TempDir::new().unwrap();
    let storage = Arc::new(FileStorage::open(temp_dir.path().join("storage.json")).unwrap());
    let registry = HistoryRegistry::new(storage, Arc::new(SettingsRegistry::new()));

    let installed = init_global(registry);
    installed.history::<String>("commands").unwrap();

    let looked_up = global().expect("global registry should be installed");
    assert!(std::ptr::eq(installed, looked_up));
    assert_eq!(looked_up.len(), 1);
}
