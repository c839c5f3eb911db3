use serial_test::serial;
use session_gate::{
    AppConfig,
    config::{DemoIdentity, Env},
    error::ConfigError,
};
use std::{env, panic, time::Duration};

const CONFIG_VARS: [&str; 9] = [
    "APP_ENV",
    "SUPABASE_URL",
    "SUPABASE_ANON_KEY",
    "SUPABASE_JWT_SECRET",
    "DATABASE_URL",
    "SESSION_FILE",
    "DEMO_IDENTITY",
    "RESOLUTION_TIMEOUT_SECS",
    "BIND_ADDR",
];

// --- Setup/Teardown Utilities ---

/// Runs `test` with exactly `vars` set (every other config variable cleared), then restores
/// the original environment.
fn run_with_env<T, R>(vars: &[(&str, &str)], test: T) -> R
where
    T: FnOnce() -> R + panic::UnwindSafe,
{
    let originals: Vec<(&str, Option<String>)> = CONFIG_VARS
        .iter()
        .map(|&var| (var, env::var(var).ok()))
        .collect();

    unsafe {
        for var in CONFIG_VARS {
            env::remove_var(var);
        }
        for (key, value) in vars {
            env::set_var(key, value);
        }
    }

    let result = panic::catch_unwind(test);

    for (key, original_value) in originals {
        unsafe {
            match original_value {
                Some(val) => env::set_var(key, val),
                None => env::remove_var(key),
            }
        }
    }

    match result {
        Ok(value) => value,
        Err(e) => panic::resume_unwind(e),
    }
}

// --- Tests ---

#[test]
#[serial]
fn test_local_defaults_fall_back_to_demo() {
    let config = run_with_env(&[], AppConfig::load).expect("local config must load");

    assert_eq!(config.env, Env::Local);
    assert!(!config.backend_configured());
    assert_eq!(config.demo_identity, DemoIdentity::Customer);
    assert_eq!(config.jwt_secret, "super-secure-test-secret-value-local");
    assert_eq!(config.resolution_timeout, Duration::from_secs(10));
    assert_eq!(config.bind_addr, "0.0.0.0:3000");
}

#[test]
#[serial]
fn test_configured_backend_is_detected() {
    let config = run_with_env(
        &[
            ("SUPABASE_URL", "https://abc.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon-key-value"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert!(config.backend_configured());
    assert_eq!(config.supabase_url.as_deref(), Some("https://abc.supabase.co"));
}

#[test]
#[serial]
fn test_placeholder_backend_counts_as_unconfigured() {
    let config = run_with_env(
        &[
            ("SUPABASE_URL", "https://your-project.supabase.co"),
            ("SUPABASE_ANON_KEY", "your-anon-key"),
        ],
        AppConfig::load,
    )
    .unwrap();

    assert!(!config.backend_configured());
}

#[test]
#[serial]
fn test_production_requires_backend() {
    let result = run_with_env(
        &[("APP_ENV", "production"), ("SUPABASE_JWT_SECRET", "prod-secret")],
        AppConfig::load,
    );

    assert!(matches!(result, Err(ConfigError::BackendRequired)));
}

#[test]
#[serial]
fn test_production_fail_fast_on_missing_jwt_secret() {
    let result = run_with_env(
        &[
            ("APP_ENV", "production"),
            ("SUPABASE_URL", "https://abc.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon-key-value"),
        ],
        AppConfig::load,
    );

    assert!(matches!(result, Err(ConfigError::Missing("SUPABASE_JWT_SECRET"))));
}

#[test]
#[serial]
fn test_demo_identity_selection() {
    let admin = run_with_env(&[("DEMO_IDENTITY", "admin")], AppConfig::load).unwrap();
    assert_eq!(admin.demo_identity, DemoIdentity::Admin);

    let anonymous = run_with_env(&[("DEMO_IDENTITY", "none")], AppConfig::load).unwrap();
    assert_eq!(anonymous.demo_identity, DemoIdentity::Anonymous);
    assert_eq!(anonymous.demo_identity.role(), None);

    let invalid = run_with_env(&[("DEMO_IDENTITY", "superuser")], AppConfig::load);
    assert!(matches!(
        invalid,
        Err(ConfigError::Invalid { name: "DEMO_IDENTITY", .. })
    ));
}

#[test]
#[serial]
fn test_resolution_timeout_parsing() {
    let config = run_with_env(&[("RESOLUTION_TIMEOUT_SECS", "3")], AppConfig::load).unwrap();
    assert_eq!(config.resolution_timeout, Duration::from_secs(3));

    let zero = run_with_env(&[("RESOLUTION_TIMEOUT_SECS", "0")], AppConfig::load);
    assert!(matches!(
        zero,
        Err(ConfigError::Invalid { name: "RESOLUTION_TIMEOUT_SECS", .. })
    ));
}

#[test]
fn test_default_config_is_demo_mode() {
    let config = AppConfig::default();
    assert_eq!(config.env, Env::Local);
    assert!(!config.backend_configured());
}
