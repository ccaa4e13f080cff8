//! Settings loading from YAML files

use std::io::Write;

use circuitbreaker::Error;
use circuitbreaker::config::{BreakerConfig, BreakerSettings, HealthConfig};
use circuitbreaker::failsafe::{BreakerStatus, CircuitBreaker};
use pretty_assertions::assert_eq;

fn write_config(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

#[test]
fn test_load_full_file() {
    let file = write_config(
        r"
name: inventory
breaker:
  sleep_window_millis: 2500
health:
  window_size_seconds: 30
  error_rate_threshold: 0.25
",
    );

    let settings = BreakerSettings::load(Some(file.path())).unwrap();

    assert_eq!(
        settings,
        BreakerSettings {
            name: "inventory".to_string(),
            breaker: BreakerConfig {
                sleep_window_millis: 2500,
            },
            health: HealthConfig {
                window_size_seconds: 30,
                error_rate_threshold: 0.25,
            },
        }
    );
}

#[test]
fn test_load_rejects_invalid_values() {
    let file = write_config("health:\n  window_size_seconds: -5\n");

    let err = BreakerSettings::load(Some(file.path())).unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("window_size_seconds")));
}

#[test]
fn test_load_rejects_malformed_yaml() {
    let file = write_config("breaker:\n  sleep_window_millis: soon\n");

    assert!(matches!(
        BreakerSettings::load(Some(file.path())),
        Err(Error::Config(_))
    ));
}

#[test]
fn test_loaded_settings_build_a_breaker() {
    let file = write_config("name: search\nbreaker:\n  sleep_window_millis: 10\n");
    let settings = BreakerSettings::load(Some(file.path())).unwrap();

    let breaker: CircuitBreaker<()> = CircuitBreaker::from_settings(settings);

    assert_eq!(breaker.name(), "search");
    assert_eq!(breaker.config().sleep_window_millis, 10);
    assert_eq!(breaker.status(), BreakerStatus::Closed);
}
