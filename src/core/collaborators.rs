//! 外部协作者接口
//!
//! 自由文本抽取与反馈生成由外部系统负责，这里只定义接口，
//! 并提供命令行可用的简单本地实现。

use crate::core::models::{GradingSession, MatchKind};
use crate::core::ontology::{Category, OntologyGraph};
use crate::core::resolver::ConceptResolver;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 抽取出的概念片段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedConcept {
    pub text: String,
    pub category: Option<Category>,
    /// 0-1
    pub confidence: f32,
}

/// 自由文本 -> 概念列表
#[async_trait]
pub trait ConceptExtractor: Send + Sync {
    async fn extract(&self, text: &str) -> anyhow::Result<Vec<ExtractedConcept>>;
}

/// 按分隔符切分的本地抽取器
pub struct DelimiterExtractor {
    resolver: ConceptResolver,
}

impl DelimiterExtractor {
    pub fn new(graph: Arc<OntologyGraph>) -> Self {
        Self {
            resolver: ConceptResolver::new(graph),
        }
    }

    /// 按换行、分号、逗号、句号以及 " et " 切分
    pub fn split(text: &str) -> Vec<String> {
        text.split(['\n', '\r', ';', ',', '.'])
            .flat_map(|part| part.split(" et "))
            .map(|part| part.trim())
            .filter(|part| !part.is_empty())
            .map(|part| part.to_string())
            .collect()
    }

    pub fn extract_sync(&self, text: &str) -> Vec<ExtractedConcept> {
        Self::split(text)
            .into_iter()
            .map(|fragment| {
                let hit = self.resolver.resolve_scored(&fragment);
                ExtractedConcept {
                    category: hit.and_then(|h| h.concept.category),
                    confidence: hit.map(|h| h.score as f32 / 100.0).unwrap_or(0.0),
                    text: fragment,
                }
            })
            .collect()
    }
}

#[async_trait]
impl ConceptExtractor for DelimiterExtractor {
    async fn extract(&self, text: &str) -> anyhow::Result<Vec<ExtractedConcept>> {
        Ok(self.extract_sync(text))
    }
}

/// 评分会话 -> 文字反馈
pub trait FeedbackGenerator {
    fn generate(&self, session: &GradingSession) -> String;
}

/// 纯文本摘要
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryFeedback;

impl FeedbackGenerator for SummaryFeedback {
    fn generate(&self, session: &GradingSession) -> String {
        let report = &session.report;
        let mut lines = vec![format!("Score : {:.1} %", report.percentage)];

        if report.excluded {
            lines.push("Score annulé : erreur grave relevée".to_string());
        }

        for record in &session.matches {
            let subject = record
                .expected_label
                .as_deref()
                .or(record.submitted.as_deref())
                .unwrap_or("?");
            let marker = match record.kind {
                k if k.is_full_credit_kind() => "+",
                MatchKind::Missing | MatchKind::Contradiction => "-",
                MatchKind::Extra => "?",
                _ => "~",
            };
            lines.push(format!(
                "{} [{}] {} ({}) : {}",
                marker, record.kind, subject, record.score, record.explanation
            ));
        }

        for note in &report.notes {
            lines.push(format!("* {}", note));
        }

        lines.join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::tests::sample_graph;

    #[test]
    fn test_split_on_delimiters() {
        let parts = DelimiterExtractor::split("Rythme sinusal, BAV 1er degré et PR allongé.\nQRS fins");
        assert_eq!(parts, vec!["Rythme sinusal", "BAV 1er degré", "PR allongé", "QRS fins"]);
    }

    #[tokio::test]
    async fn test_extract_tags_categories() {
        let extractor = DelimiterExtractor::new(Arc::new(sample_graph()));
        let concepts = extractor.extract("Fibrillation atriale; onde bizarre").await.unwrap();
        assert_eq!(concepts.len(), 2);
        assert_eq!(concepts[0].category, Some(Category::Major));
        assert_eq!(concepts[0].confidence, 1.0);
        assert_eq!(concepts[1].category, None);
    }
}
