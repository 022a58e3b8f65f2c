use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::Settings;
use super::validation::validate_config;
use crate::core::errors::ApiError;

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("LEXRAG_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        let user_config = self.paths.user_data_dir.join("config.yml");
        if user_config.exists() {
            return user_config;
        }

        self.paths.project_root.join("config.yml")
    }

    /// Raw config as found on disk, or an empty object.
    pub fn load_config(&self) -> Result<Value, ApiError> {
        load_yaml_file(&self.config_path())
    }

    /// Built-in defaults overlaid with the config file, validated and decoded.
    pub fn load_settings(&self) -> Result<Settings, ApiError> {
        let file_config = self.load_config()?;
        let mut settings = settings_from_value(&file_config)?;

        if let Some(port) = env::var("PORT").ok().and_then(|v| v.parse::<u16>().ok()) {
            settings.server.port = port;
        }

        Ok(settings)
    }

    pub fn index_dir(&self, settings: &Settings) -> PathBuf {
        settings
            .storage
            .index_dir
            .clone()
            .unwrap_or_else(|| self.paths.index_dir.clone())
    }

    pub fn upload_dir(&self, settings: &Settings) -> PathBuf {
        settings
            .storage
            .upload_dir
            .clone()
            .unwrap_or_else(|| self.paths.upload_dir.clone())
    }
}

pub fn settings_from_value(file_config: &Value) -> Result<Settings, ApiError> {
    let defaults = serde_json::to_value(Settings::default()).map_err(ApiError::internal)?;
    let merged = deep_merge(&defaults, file_config);
    validate_config(&merged)?;
    serde_json::from_value(merged).map_err(|e| ApiError::BadRequest(format!("Invalid config: {}", e)))
}

fn load_yaml_file(path: &Path) -> Result<Value, ApiError> {
    if !path.exists() {
        return Ok(Value::Object(Map::new()));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        ApiError::Internal(format!("Failed to read {}: {}", path.display(), e))
    })?;
    let value = serde_yaml::from_str::<Value>(&contents).map_err(|e| {
        ApiError::BadRequest(format!("Invalid YAML in {}: {}", path.display(), e))
    })?;

    match value {
        Value::Object(_) => Ok(value),
        Value::Null => Ok(Value::Object(Map::new())),
        _ => Err(ApiError::BadRequest(format!(
            "Invalid config in {}: expected a mapping at the top level",
            path.display()
        ))),
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        (_, Value::Null) => base.clone(),
        _ => override_value.clone(),
    }
}
