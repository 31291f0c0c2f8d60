//! 概念解析模块
//!
//! 把一段文本映射到本体中的节点：标签 > 同义词 > 以词为边界的包含。

use crate::core::normalize::{contains_phrase, length_ratio, normalize};
use crate::core::ontology::{ConceptRecord, OntologyGraph, SearchTerms};
use std::sync::Arc;

/// 命中的阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveStage {
    Label,
    Synonym,
    Containment,
}

/// 带质量分的解析结果
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'g> {
    pub concept: &'g ConceptRecord,
    pub stage: ResolveStage,
    /// 0-100，包含匹配时为长度比
    pub score: u8,
}

/// 概念解析器
pub struct ConceptResolver {
    graph: Arc<OntologyGraph>,
}

impl ConceptResolver {
    pub fn new(graph: Arc<OntologyGraph>) -> Self {
        Self { graph }
    }

    pub fn graph(&self) -> &OntologyGraph {
        &self.graph
    }

    /// 解析文本对应的节点
    pub fn resolve(&self, text: &str) -> Option<&ConceptRecord> {
        self.resolve_scored(text).map(|r| r.concept)
    }

    /// 解析并给出命中阶段与质量分
    pub fn resolve_scored(&self, text: &str) -> Option<Resolution<'_>> {
        let input = normalize(text);
        if input.chars().count() < 2 {
            return None;
        }

        if let Some(concept) = self
            .graph
            .iter()
            .find(|c| self.terms(c).map(|t| t.label == input).unwrap_or(false))
        {
            return Some(Resolution {
                concept,
                stage: ResolveStage::Label,
                score: 100,
            });
        }

        if let Some(concept) = self.graph.iter().find(|c| {
            self.terms(c)
                .map(|t| t.synonyms.iter().any(|s| *s == input))
                .unwrap_or(false)
        }) {
            return Some(Resolution {
                concept,
                stage: ResolveStage::Synonym,
                score: 100,
            });
        }

        // 多个节点同时包含时取文档顺序中的第一个
        self.graph.iter().find_map(|concept| {
            containment_score(self.terms(concept)?, &input).map(|score| Resolution {
                concept,
                stage: ResolveStage::Containment,
                score,
            })
        })
    }

    fn terms(&self, concept: &ConceptRecord) -> Option<&SearchTerms> {
        self.graph.search_terms(&concept.id)
    }
}

/// 包含匹配的质量分：短/长 长度比的最大值
fn containment_score(terms: &SearchTerms, input: &str) -> Option<u8> {
    let best = std::iter::once(&terms.label)
        .chain(terms.synonyms.iter())
        .filter(|term| contains_phrase(term, input) || contains_phrase(input, term))
        .map(|term| length_ratio(term, input))
        .fold(None, |best: Option<f32>, ratio| Some(best.map_or(ratio, |b| b.max(ratio))))
        .or_else(|| {
            contains_phrase(&terms.joined, input).then(|| length_ratio(&terms.joined, input))
        });

    best.map(|ratio| (ratio * 100.0).round().clamp(0.0, 100.0) as u8)
}
