//! 评分会话入口
//!
//! 一次评分调用：抽取 -> 区域 -> 匹配 -> 禁用概念 -> 汇总。
//! 评分过程本身不返回错误，所有异常都降级为记录或注解。

use crate::core::collaborators::{ConceptExtractor, DelimiterExtractor};
use crate::core::matcher::MatchingEngine;
use crate::core::models::{
    CaseAnnotation, CaseKey, ExpectedConcept, GraderConfig, GradingSession, MatchKind,
    MatchRecord, MatchingConfig, SubmittedConcept,
};
use crate::core::ontology::OntologyGraph;
use crate::core::oracle::SimilarityOracle;
use crate::core::scoring::ScoringAggregator;
use std::sync::Arc;
use std::time::Duration;

/// 评分器
pub struct Grader {
    engine: MatchingEngine,
    aggregator: ScoringAggregator,
    extractor: Arc<dyn ConceptExtractor>,
    fallback: DelimiterExtractor,
    matching: MatchingConfig,
}

impl Grader {
    /// 使用本地分隔符抽取器创建评分器
    pub fn new(graph: Arc<OntologyGraph>, oracle: Arc<dyn SimilarityOracle>, config: &GraderConfig) -> Self {
        Self {
            engine: MatchingEngine::new(
                Arc::clone(&graph),
                oracle,
                config.matching.clone(),
                Duration::from_millis(config.oracle.timeout_ms),
            ),
            aggregator: ScoringAggregator::new(Arc::clone(&graph), config.scoring.clone()),
            extractor: Arc::new(DelimiterExtractor::new(Arc::clone(&graph))),
            fallback: DelimiterExtractor::new(graph),
            matching: config.matching.clone(),
        }
    }

    /// 替换概念抽取器
    pub fn with_extractor(mut self, extractor: Arc<dyn ConceptExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// 对自由文本评分
    pub async fn grade_text(&self, text: &str, case: &CaseKey) -> GradingSession {
        let extracted = match self.extractor.extract(text).await {
            Ok(concepts) => concepts,
            Err(e) => {
                tracing::warn!("概念抽取失败，使用分隔符切分: {}", e);
                self.fallback.extract_sync(text)
            }
        };

        let submitted = extracted
            .into_iter()
            .map(|c| SubmittedConcept::new(&c.text))
            .collect();
        self.grade_concepts(submitted, case).await
    }

    /// 对概念列表评分
    pub async fn grade_concepts(&self, mut submitted: Vec<SubmittedConcept>, case: &CaseKey) -> GradingSession {
        // 调用方未给出区域时从短语中拆解
        for concept in submitted.iter_mut() {
            if concept.territories.is_empty() {
                concept.territories = self.engine.decomposer().territories_in(&concept.text);
            }
        }

        let matches = self.engine.match_all(&submitted, &case.expected).await;

        let mut annotations = self.forbidden_mentions(&submitted, &case.forbidden);
        annotations.extend(case.annotations.iter().cloned());

        let report = self.aggregator.aggregate(&matches, &case.expected, &annotations);
        tracing::info!(
            "评分完成: {} 个学生概念, {} 条匹配记录, 得分 {:.1}%",
            submitted.len(),
            matches.len(),
            report.percentage
        );

        GradingSession::new(submitted, matches, annotations, report)
    }

    /// 被提及的禁用概念（确定性阶段完整命中且得分达到阈值）
    fn forbidden_mentions(&self, submitted: &[SubmittedConcept], forbidden: &[String]) -> Vec<CaseAnnotation> {
        let mut annotations = Vec::new();
        for label in forbidden {
            let target = ExpectedConcept::new(label, 0);
            let mention = submitted.iter().find(|s| {
                self.engine
                    .match_deterministic(&s.text, &target)
                    .map(|r| states_concept(&r, self.matching.forbidden_threshold))
                    .unwrap_or(false)
            });
            if let Some(mention) = mention {
                tracing::warn!("提及了禁用概念: {} (\"{}\")", label, mention.text);
                annotations.push(CaseAnnotation {
                    label: label.clone(),
                    note: format!("mentionné : « {} »", mention.text),
                    exclusion: true,
                });
            }
        }
        annotations
    }
}

/// 学生片段是否完整陈述了该概念；只是概念的一部分不算
fn states_concept(record: &MatchRecord, threshold: u8) -> bool {
    let asserted = record.kind.is_full_credit_kind() || record.kind == MatchKind::HierarchicalChild;
    asserted && record.score >= threshold
}
