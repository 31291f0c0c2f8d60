//! 配置文件管理模块

use crate::core::models::GraderConfig;
use anyhow::{Context, Result};
use std::path::PathBuf;

/// 配置管理器
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// 创建配置管理器
    pub fn new(config_path: PathBuf) -> Self {
        Self { config_path }
    }

    /// 获取默认配置路径
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "ecg", "EcgGrader")
            .map(|d| d.config_dir().join("config.json"))
            .unwrap_or_else(|| PathBuf::from("config.json"))
    }

    pub fn path(&self) -> &PathBuf {
        &self.config_path
    }

    /// 加载配置，文件不存在时返回默认值
    pub fn load(&self) -> Result<GraderConfig> {
        if self.config_path.exists() {
            let content = std::fs::read_to_string(&self.config_path)
                .with_context(|| format!("读取配置失败: {}", self.config_path.display()))?;
            let config = serde_json::from_str(&content)
                .with_context(|| format!("配置格式错误: {}", self.config_path.display()))?;
            Ok(config)
        } else {
            tracing::debug!("配置文件不存在，使用默认配置: {}", self.config_path.display());
            Ok(GraderConfig::default())
        }
    }

    /// 保存配置
    pub fn save(&self, config: &GraderConfig) -> Result<()> {
        // 确保目录存在
        if let Some(parent) = self.config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(config)?;
        std::fs::write(&self.config_path, content)?;
        tracing::info!("配置已保存: {}", self.config_path.display());
        Ok(())
    }

    /// 重置为默认配置
    pub fn reset(&self) -> Result<()> {
        self.save(&GraderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::ontology::Relation;
    use tempfile::tempdir;

    #[test]
    fn test_config_save_load() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.json");

        let manager = ConfigManager::new(config_path);

        let mut config = GraderConfig::default();
        config.oracle_enabled = true;
        config.matching.extra_threshold = 25;
        config
            .extraction
            .relation_iris
            .insert("http://x/R1".to_string(), Relation::Excludes);

        manager.save(&config).unwrap();

        let loaded = manager.load().unwrap();
        assert!(loaded.oracle_enabled);
        assert_eq!(loaded.matching.extra_threshold, 25);
        assert_eq!(
            loaded.extraction.relation_iris.get("http://x/R1"),
            Some(&Relation::Excludes)
        );
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempdir().unwrap();
        let manager = ConfigManager::new(dir.path().join("absent.json"));
        let config = manager.load().unwrap();
        assert!(!config.oracle_enabled);
        assert_eq!(config.oracle.timeout_ms, 8000);
        assert_eq!(config.scoring.bonus_min_weight, 3);
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"ontology_path":"onto.owl","cache_path":null}"#).unwrap();

        let config = ConfigManager::new(path).load().unwrap();
        assert_eq!(config.ontology_path, Some(PathBuf::from("onto.owl")));
        assert_eq!(config.matching.jaccard_threshold, 0.8);
    }
}
