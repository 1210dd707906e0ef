use crate::domain::models::{Policy, PolicyOverride};
use crate::infrastructure::error::InfraError;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

const APP_JSON: &str = "app.json";
const POLICIES_JSON: &str = "policies.json";
const OVERRIDES_JSON: &str = "overrides.json";
const CONFIG_SCHEMA: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
pub struct ConfigBundle {
    pub app: serde_json::Value,
    pub policies: serde_json::Value,
    pub overrides: serde_json::Value,
}

fn default_files() -> HashMap<&'static str, serde_json::Value> {
    HashMap::from([
        (
            APP_JSON,
            serde_json::json!({
                "schema": 1,
                "appName": "Cadence",
                "timezone": "UTC"
            }),
        ),
        (
            POLICIES_JSON,
            serde_json::json!({
                "schema": 1,
                "dayWindow": { "start": "00:00", "end": "24:00" },
                "workHours": { "start": "09:00", "end": "17:00" },
                "slotMinutes": 15,
                "nudgeMinutes": 5,
                "estimate": {
                    "defaultMinutes": 30,
                    "minMinutes": 5,
                    "maxMinutes": 180
                },
                "microTaskMinutes": 15
            }),
        ),
        (
            OVERRIDES_JSON,
            serde_json::json!({
                "schema": 1
            }),
        ),
    ])
}

pub fn ensure_default_configs(config_dir: &Path) -> Result<(), InfraError> {
    for (name, value) in default_files() {
        let path = config_dir.join(name);
        if !path.exists() {
            let formatted = serde_json::to_string_pretty(&value)?;
            fs::write(path, format!("{formatted}\n"))?;
        }
    }
    Ok(())
}

fn read_config(path: &Path) -> Result<serde_json::Value, InfraError> {
    let raw = fs::read_to_string(path)?;
    let parsed: serde_json::Value = serde_json::from_str(&raw)?;
    let schema = parsed
        .get("schema")
        .and_then(serde_json::Value::as_u64)
        .ok_or_else(|| InfraError::InvalidConfig(format!("missing schema in {}", path.display())))?;
    if schema != CONFIG_SCHEMA {
        return Err(InfraError::InvalidConfig(format!(
            "unsupported schema {} in {}",
            schema,
            path.display()
        )));
    }
    Ok(parsed)
}

pub fn load_configs(config_dir: &Path) -> Result<ConfigBundle, InfraError> {
    Ok(ConfigBundle {
        app: read_config(&config_dir.join(APP_JSON))?,
        policies: read_config(&config_dir.join(POLICIES_JSON))?,
        overrides: read_config(&config_dir.join(OVERRIDES_JSON))?,
    })
}

/// Policy from `policies.json` with `overrides.json` applied on top.
pub fn load_policy(config_dir: &Path) -> Result<Policy, InfraError> {
    let policies = read_config(&config_dir.join(POLICIES_JSON))?;
    let base: Policy = serde_json::from_value(policies)?;

    let overrides_path = config_dir.join(OVERRIDES_JSON);
    let policy = if overrides_path.exists() {
        let overrides: PolicyOverride = serde_json::from_value(read_config(&overrides_path)?)?;
        base.apply_override(&overrides)
    } else {
        base
    };

    policy.validate().map_err(InfraError::InvalidConfig)?;
    Ok(policy)
}

pub fn read_timezone(config_dir: &Path) -> Result<Option<String>, InfraError> {
    let app = read_config(&config_dir.join(APP_JSON))?;
    Ok(app
        .get("timezone")
        .and_then(serde_json::Value::as_str)
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned))
}

/// Configured IANA timezone, falling back to UTC when unset.
pub fn load_timezone(config_dir: &Path) -> Result<Tz, InfraError> {
    let Some(name) = read_timezone(config_dir)? else {
        return Ok(Tz::UTC);
    };
    name.parse::<Tz>()
        .map_err(|error| InfraError::InvalidConfig(format!("invalid timezone '{name}': {error}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_dir() -> TempDir {
        let dir = tempfile::tempdir().expect("create temp dir");
        ensure_default_configs(dir.path()).expect("write default configs");
        dir
    }

    #[test]
    fn defaults_load_as_default_policy() {
        let dir = config_dir();
        let bundle = load_configs(dir.path()).expect("load configs");
        assert_eq!(bundle.app["appName"], "Cadence");
        assert_eq!(load_policy(dir.path()).expect("load policy"), Policy::default());
        assert_eq!(load_timezone(dir.path()).expect("load timezone"), Tz::UTC);
    }

    #[test]
    fn existing_files_are_not_overwritten() {
        let dir = config_dir();
        fs::write(
            dir.path().join(APP_JSON),
            r#"{"schema":1,"appName":"Mine","timezone":"Asia/Tokyo"}"#,
        )
        .expect("write app config");
        ensure_default_configs(dir.path()).expect("ensure defaults again");
        assert_eq!(
            load_timezone(dir.path()).expect("load timezone"),
            chrono_tz::Asia::Tokyo
        );
    }

    #[test]
    fn overrides_take_precedence() {
        let dir = config_dir();
        fs::write(
            dir.path().join(OVERRIDES_JSON),
            r#"{"schema":1,"slotMinutes":30,"workHours":{"start":"08:00","end":"12:00"}}"#,
        )
        .expect("write overrides");
        let policy = load_policy(dir.path()).expect("load policy");
        assert_eq!(policy.slot_minutes, 30);
        assert_eq!(policy.work_hours.start, "08:00");
        assert_eq!(policy.nudge_minutes, 5);
    }

    #[test]
    fn unsupported_schema_is_rejected() {
        let dir = config_dir();
        fs::write(dir.path().join(POLICIES_JSON), r#"{"schema":2}"#).expect("write policies");
        assert!(matches!(
            load_policy(dir.path()),
            Err(InfraError::InvalidConfig(message)) if message.contains("unsupported schema 2")
        ));
    }

    #[test]
    fn invalid_policy_values_are_rejected() {
        let dir = config_dir();
        fs::write(
            dir.path().join(OVERRIDES_JSON),
            r#"{"schema":1,"dayWindow":{"start":"18:00","end":"09:00"}}"#,
        )
        .expect("write overrides");
        assert!(matches!(load_policy(dir.path()), Err(InfraError::InvalidConfig(_))));
    }

    #[test]
    fn unknown_timezone_is_rejected() {
        let dir = config_dir();
        fs::write(
            dir.path().join(APP_JSON),
            r#"{"schema":1,"timezone":"Mars/Olympus"}"#,
        )
        .expect("write app config");
        assert!(matches!(load_timezone(dir.path()), Err(InfraError::InvalidConfig(_))));
    }
}
