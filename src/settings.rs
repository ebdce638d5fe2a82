use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::committer::{CommitStrategy, DEFAULT_CHUNK_SIZE};
use crate::error::{ExtratoError, Result};
use crate::importer::DEFAULT_MAX_FILE_SIZE;
use crate::models::TenantScope;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default)]
    pub branch_id: Option<String>,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    #[serde(default)]
    pub commit_strategy: CommitStrategy,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            tenant_id: String::new(),
            branch_id: None,
            max_file_size: default_max_file_size(),
            chunk_size: default_chunk_size(),
            commit_strategy: CommitStrategy::default(),
        }
    }
}

impl Settings {
    /// Tenant scope for ledger writes; an unset tenant is a setup error.
    pub fn scope(&self) -> Result<TenantScope> {
        if self.tenant_id.trim().is_empty() {
            return Err(ExtratoError::Settings(
                "No tenant configured. Run `extrato init --tenant <id>` first.".to_string(),
            ));
        }
        Ok(TenantScope {
            tenant_id: self.tenant_id.clone(),
            branch_id: self.branch_id.clone().filter(|b| !b.trim().is_empty()),
        })
    }

    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(crate::db::DB_FILE)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("extrato")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("extrato")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "unreadable settings, using defaults");
                Settings::default()
            }
        }
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| ExtratoError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roundtrip_through_json() {
        let settings = Settings {
            data_dir: "/tmp/test".to_string(),
            tenant_id: "igreja-1".to_string(),
            branch_id: Some("sede".to_string()),
            max_file_size: 1024,
            chunk_size: 50,
            commit_strategy: CommitStrategy::Transactional,
        };
        let json = serde_json::to_string_pretty(&settings).unwrap();
        assert!(json.contains("\"transactional\""));
        let loaded: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.tenant_id, "igreja-1");
        assert_eq!(loaded.chunk_size, 50);
        assert_eq!(loaded.commit_strategy, CommitStrategy::Transactional);
    }

    #[test]
    fn test_defaults() {
        let s = Settings::default();
        assert!(s.tenant_id.is_empty());
        assert_eq!(s.max_file_size, 10 * 1024 * 1024);
        assert_eq!(s.chunk_size, 200);
        assert_eq!(s.commit_strategy, CommitStrategy::Sequential);
        assert!(s.db_path().ends_with("extrato.db"));
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let json = r#"{"data_dir": "/tmp/test", "tenant_id": "igreja-1"}"#;
        let s: Settings = serde_json::from_str(json).unwrap();
        assert_eq!(s.chunk_size, 200);
        assert_eq!(s.max_file_size, 10 * 1024 * 1024);
        assert_eq!(s.branch_id, None);
    }

    #[test]
    fn test_scope_requires_tenant() {
        assert!(Settings::default().scope().is_err());
        let s = Settings {
            tenant_id: "igreja-1".to_string(),
            branch_id: Some("  ".to_string()),
            ..Settings::default()
        };
        let scope = s.scope().unwrap();
        assert_eq!(scope.tenant_id, "igreja-1");
        assert_eq!(scope.branch_id, None);
    }
}
