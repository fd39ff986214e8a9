use hubsync::config::ConfigLoader;
use std::{
    env, fs,
    sync::{Mutex, MutexGuard, OnceLock},
};
use tempfile::TempDir;

fn env_lock() -> &'static Mutex<()> {
    static LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    LOCK.get_or_init(|| Mutex::new(()))
}

fn env_guard() -> MutexGuard<'static, ()> {
    env_lock()
        .lock()
        .unwrap_or_else(|poison| poison.into_inner())
}

fn clear_env() {
    unsafe {
        env::remove_var("HUBSYNC_PROFILE");
        env::remove_var("HUBSYNC_LOG_LEVEL");
        env::remove_var("HUBSYNC_DATABASE_URL");
        env::remove_var("HUBSYNC_NUM_WORKERS");
        env::remove_var("HUBSYNC_GITHUB_API_BASE");
    }
}

fn write_env_file(dir: &TempDir, name: &str, contents: &str) {
    let path = dir.path().join(name);
    fs::write(path, contents).unwrap();
}

#[test]
fn loads_defaults_when_no_env_present() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads with defaults");

    assert_eq!(cfg.profile, "dev");
    assert_eq!(cfg.log_level, "info");
    assert_eq!(cfg.github_api_base, "https://api.github.com");
    assert_eq!(cfg.worker.num_workers, 4);
    assert_eq!(cfg.worker.max_attempts, 5);
    clear_env();
}

#[test]
fn layered_env_files_apply_in_order() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "HUBSYNC_LOG_LEVEL=warn\n");
    write_env_file(
        &temp_dir,
        ".env.local",
        "HUBSYNC_PROFILE=test\nHUBSYNC_LOG_LEVEL=error\n",
    );
    write_env_file(&temp_dir, ".env.test", "HUBSYNC_LOG_LEVEL=debug\n");
    write_env_file(&temp_dir, ".env.test.local", "HUBSYNC_LOG_LEVEL=trace\n");

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("layered config loads");

    assert_eq!(cfg.profile, "test");
    assert_eq!(cfg.log_level, "trace");
    clear_env();
}

#[test]
fn process_env_wins_over_files() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(
        &temp_dir,
        ".env",
        "HUBSYNC_DATABASE_URL=postgres://file-host/db\nHUBSYNC_NUM_WORKERS=2\n",
    );

    unsafe {
        env::set_var("HUBSYNC_DATABASE_URL", "postgres://env-host/db");
    }

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    assert_eq!(cfg.database_url, "postgres://env-host/db");
    assert_eq!(cfg.worker.num_workers, 2);
    clear_env();
}

#[test]
fn invalid_numeric_values_are_rejected() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    write_env_file(&temp_dir, ".env", "HUBSYNC_NUM_WORKERS=plenty\n");

    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let err = loader.load().expect_err("garbage numbers must not parse");
    assert!(err.to_string().contains("NUM_WORKERS"));
    clear_env();
}

#[test]
fn redacted_json_round_trips() {
    let _guard = env_guard();
    clear_env();

    let temp_dir = TempDir::new().unwrap();
    let loader = ConfigLoader::with_base_dir(temp_dir.path().to_path_buf());
    let cfg = loader.load().expect("config loads");

    let rendered = cfg.redacted_json().expect("config serializes");
    assert!(rendered.contains("PROFILE"));
    clear_env();
}
