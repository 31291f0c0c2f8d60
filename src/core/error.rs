//! 错误类型定义
//!
//! 只有抽取阶段的格式错误会暴露给用户，评分阶段的问题一律降级处理。

use std::path::PathBuf;
use thiserror::Error;

/// 本体抽取与缓存错误
#[derive(Debug, Error)]
pub enum OntologyError {
    /// 本体文档格式错误（致命，旧缓存保持有效）
    #[error("本体文档格式错误: {0}")]
    SourceFormat(String),

    /// 文件读写失败
    #[error("读写文件失败 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 缓存内容无法解析
    #[error("缓存文件无法解析: {0}")]
    Cache(#[from] serde_json::Error),
}

impl OntologyError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        OntologyError::Io {
            path: path.into(),
            source,
        }
    }
}

/// 相似度Oracle错误，只在匹配引擎内部使用
#[derive(Debug, Error)]
pub enum OracleError {
    #[error("Oracle调用超时")]
    Timeout,

    #[error("Oracle未启用")]
    Disabled,

    #[error("Oracle请求失败: {0}")]
    Transport(String),

    #[error("Oracle响应无法解析: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for OracleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            OracleError::Timeout
        } else {
            OracleError::Transport(e.to_string())
        }
    }
}
