//! 核心数据模型定义
//!
//! 评分相关的所有数据结构：匹配记录、病例答案、评分报告与配置。

use crate::core::ontology::{Category, Relation};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

/// 匹配类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// 归一化后完全相同
    Exact,
    /// 学生答案包含期望概念，并附加了细节
    ContainsSuperset,
    /// 学生答案是期望概念的一部分（不够具体）
    ContainsSubset,
    /// 学生给出的概念蕴含期望概念
    HierarchicalChild,
    /// 学生给出的是期望概念所蕴含的征象或上位概念
    HierarchicalParent,
    /// 同级概念
    Sibling,
    /// 语义等价（Oracle或文本相似度判定）
    SemanticEquivalent,
    /// 期望概念未被提及
    Missing,
    /// 学生多给出的概念
    Extra,
    /// 与期望概念矛盾
    Contradiction,
}

impl MatchKind {
    /// 是否属于"完全命中"一类
    pub fn is_full_credit_kind(&self) -> bool {
        matches!(
            self,
            MatchKind::Exact | MatchKind::ContainsSuperset | MatchKind::SemanticEquivalent
        )
    }
}

impl std::fmt::Display for MatchKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MatchKind::Exact => "EXACT",
            MatchKind::ContainsSuperset => "CONTAINS_SUPERSET",
            MatchKind::ContainsSubset => "CONTAINS_SUBSET",
            MatchKind::HierarchicalChild => "CHILD",
            MatchKind::HierarchicalParent => "PARENT",
            MatchKind::Sibling => "SIBLING",
            MatchKind::SemanticEquivalent => "SEMANTIC_EQUIVALENT",
            MatchKind::Missing => "MISSING",
            MatchKind::Extra => "EXTRA",
            MatchKind::Contradiction => "CONTRADICTION",
        };
        write!(f, "{}", name)
    }
}

/// 匹配记录（每次评分调用内的临时数据）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    /// 学生答案片段
    pub submitted: Option<String>,
    /// 期望概念ID
    pub expected_id: Option<String>,
    /// 期望概念标签
    pub expected_label: Option<String>,
    pub kind: MatchKind,
    /// 分数 0-100
    pub score: u8,
    /// 解释
    pub explanation: String,
    /// 学生给出的区域
    #[serde(default)]
    pub submitted_territories: Vec<String>,
}

impl MatchRecord {
    /// 学生片段与期望概念的配对结果
    pub fn pair(
        submitted: &str,
        expected: &ExpectedConcept,
        kind: MatchKind,
        score: u8,
        explanation: impl Into<String>,
    ) -> Self {
        Self {
            submitted: Some(submitted.to_string()),
            expected_id: expected.concept_id.clone(),
            expected_label: Some(expected.label.clone()),
            kind,
            score: score.min(100),
            explanation: explanation.into(),
            submitted_territories: Vec::new(),
        }
    }

    /// 期望概念缺失
    pub fn missing(expected: &ExpectedConcept) -> Self {
        Self {
            submitted: None,
            expected_id: expected.concept_id.clone(),
            expected_label: Some(expected.label.clone()),
            kind: MatchKind::Missing,
            score: 0,
            explanation: format!("« {} » n'a pas été mentionné", expected.label),
            submitted_territories: Vec::new(),
        }
    }

    /// 学生多给出的概念
    pub fn extra(submitted: &str) -> Self {
        Self {
            submitted: Some(submitted.to_string()),
            expected_id: None,
            expected_label: None,
            kind: MatchKind::Extra,
            score: 0,
            explanation: format!("« {} » ne correspond à aucun élément attendu", submitted),
            submitted_territories: Vec::new(),
        }
    }

    /// 该记录是否指向给定的期望概念
    pub fn refers_to(&self, expected: &ExpectedConcept) -> bool {
        match (&self.expected_id, &expected.concept_id) {
            (Some(a), Some(b)) => a == b,
            _ => self.expected_label.as_deref() == Some(expected.label.as_str()),
        }
    }
}

/// 正常/病理分类（用于"整体正常"判定）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Normality {
    Normal,
    Pathological,
}

/// 专家给出的期望概念
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedConcept {
    /// 本体中的概念ID（可选，缺省时按标签解析）
    #[serde(default)]
    pub concept_id: Option<String>,
    pub label: String,
    /// 权重 1-4
    pub weight: u8,
    /// 是否为需要确认区域的诊断
    #[serde(default)]
    pub validates_diagnosis: bool,
    #[serde(default)]
    pub normality: Option<Normality>,
}

impl ExpectedConcept {
    pub fn new(label: &str, weight: u8) -> Self {
        Self {
            concept_id: None,
            label: label.to_string(),
            weight,
            validates_diagnosis: false,
            normality: None,
        }
    }

    pub fn category(&self) -> Option<Category> {
        Category::from_weight(self.weight)
    }

    /// 显式分类优先；否则描述项视为正常，其余视为病理
    pub fn normality(&self) -> Normality {
        match self.normality {
            Some(n) => n,
            None if self.category() == Some(Category::Descriptor) => Normality::Normal,
            None => Normality::Pathological,
        }
    }
}

/// 学生提交的概念
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmittedConcept {
    pub text: String,
    /// 学生显式选择的区域
    #[serde(default)]
    pub territories: Vec<String>,
}

impl SubmittedConcept {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            territories: Vec::new(),
        }
    }
}

/// 病例注解
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaseAnnotation {
    pub label: String,
    #[serde(default)]
    pub note: String,
    /// 严重错误标记，命中即总分为0
    #[serde(default)]
    pub exclusion: bool,
}

/// 病例标准答案
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct CaseKey {
    #[serde(default)]
    pub title: String,
    pub expected: Vec<ExpectedConcept>,
    /// 提及即视为严重错误的概念
    #[serde(default)]
    pub forbidden: Vec<String>,
    #[serde(default)]
    pub annotations: Vec<CaseAnnotation>,
}

/// 单个分类的得分
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CategoryScore {
    /// 获得的加权分
    pub earned: f32,
    /// 可能的加权分
    pub possible: f32,
    pub matched: usize,
    pub total: usize,
}

/// 各类匹配计数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MatchCounts {
    pub full: usize,
    pub partial: usize,
    pub missing: usize,
    pub extra: usize,
    pub contradiction: usize,
}

/// 评分报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ScoreReport {
    /// 最终百分比
    pub percentage: f32,
    /// 加成前的百分比
    pub raw_percentage: f32,
    pub bonus_applied: bool,
    /// 是否因严重错误被强制为0
    pub excluded: bool,
    pub breakdown: BTreeMap<Category, CategoryScore>,
    pub counts: MatchCounts,
    pub notes: Vec<String>,
}

/// 一次评分会话
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradingSession {
    pub id: String,
    pub graded_at: DateTime<Utc>,
    pub submitted: Vec<SubmittedConcept>,
    pub matches: Vec<MatchRecord>,
    pub annotations: Vec<CaseAnnotation>,
    pub report: ScoreReport,
}

impl GradingSession {
    pub fn new(
        submitted: Vec<SubmittedConcept>,
        matches: Vec<MatchRecord>,
        annotations: Vec<CaseAnnotation>,
        report: ScoreReport,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            graded_at: Utc::now(),
            submitted,
            matches,
            annotations,
            report,
        }
    }
}

/// 相似度Oracle配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OracleConfig {
    /// API端点URL
    pub api_endpoint: String,
    /// API密钥
    pub api_key: String,
    /// 模型名称
    pub model_name: String,
    /// 最大token数
    pub max_tokens: u32,
    /// 温度参数
    pub temperature: f32,
    /// 超时（毫秒）
    pub timeout_ms: u64,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            api_endpoint: "http://localhost:11434/api/generate".to_string(),
            api_key: String::new(),
            model_name: "qwen3:30b-a3b".to_string(),
            max_tokens: 512,
            temperature: 0.0,
            timeout_ms: 8000,
        }
    }
}

/// 匹配阈值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchingConfig {
    /// 低于此分数的学生概念记为多余
    pub extra_threshold: u8,
    /// 文本相似度兜底阈值
    pub jaccard_threshold: f32,
    /// 禁用概念判定为已提及的最低分数
    pub forbidden_threshold: u8,
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            extra_threshold: 30,
            jaccard_threshold: 0.8,
            forbidden_threshold: 70,
        }
    }
}

/// 评分参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// 诊断加成（相对比例）
    pub diagnostic_bonus: f32,
    /// 触发加成的最低权重
    pub bonus_min_weight: u8,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            diagnostic_bonus: 0.15,
            bonus_min_weight: 3,
        }
    }
}

/// 抽取参数
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExtractionConfig {
    /// 权重继承的最大上溯层数
    pub max_inheritance_depth: usize,
    /// 额外的关系IRI（用于不透明IRI的导出文件）
    #[serde(default)]
    pub relation_iris: HashMap<String, Relation>,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            max_inheritance_depth: 10,
            relation_iris: HashMap::new(),
        }
    }
}

/// 应用配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct GraderConfig {
    /// 本体源文件
    pub ontology_path: Option<PathBuf>,
    /// 快照缓存路径
    pub cache_path: Option<PathBuf>,
    /// 是否启用Oracle
    #[serde(default)]
    pub oracle_enabled: bool,
    #[serde(default)]
    pub oracle: OracleConfig,
    #[serde(default)]
    pub matching: MatchingConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub extraction: ExtractionConfig,
}
