//! 评分聚合模块
//!
//! 负责把匹配记录汇总为加权百分比。
//!
//! 计算顺序：
//! - 严重错误注解直接判0
//! - 每个期望概念取指向它的最高分记录
//! - 需要区域却未给出区域的诊断分数减半
//! - 加权平均，命中重要诊断时加成，封顶100

use crate::core::models::{
    CaseAnnotation, CategoryScore, ExpectedConcept, MatchCounts, MatchKind, MatchRecord,
    ScoreReport, ScoringConfig,
};
use crate::core::ontology::{Category, OntologyGraph};
use crate::core::resolver::ConceptResolver;
use crate::core::territory::TerritoryResolver;
use std::collections::BTreeMap;
use std::sync::Arc;

/// 评分聚合器
pub struct ScoringAggregator {
    graph: Arc<OntologyGraph>,
    resolver: ConceptResolver,
    territories: TerritoryResolver,
    config: ScoringConfig,
}

impl ScoringAggregator {
    pub fn new(graph: Arc<OntologyGraph>, config: ScoringConfig) -> Self {
        Self {
            resolver: ConceptResolver::new(Arc::clone(&graph)),
            territories: TerritoryResolver::new(Arc::clone(&graph)),
            graph,
            config,
        }
    }

    /// 汇总评分
    pub fn aggregate(
        &self,
        matches: &[MatchRecord],
        expected: &[ExpectedConcept],
        annotations: &[CaseAnnotation],
    ) -> ScoreReport {
        let counts = count_matches(matches);

        // 严重错误优先，直接判0
        let exclusions: Vec<&CaseAnnotation> = annotations.iter().filter(|a| a.exclusion).collect();
        if !exclusions.is_empty() {
            let notes = exclusions
                .iter()
                .map(|a| {
                    if a.note.is_empty() {
                        format!("Erreur grave : {}", a.label)
                    } else {
                        format!("Erreur grave : {} ({})", a.label, a.note)
                    }
                })
                .collect();
            tracing::info!("存在严重错误注解，总分判为0");
            return ScoreReport {
                excluded: true,
                counts,
                notes,
                ..Default::default()
            };
        }

        let mut notes = Vec::new();
        let mut breakdown: BTreeMap<Category, CategoryScore> = BTreeMap::new();
        let mut earned = 0.0f32;
        let mut possible = 0.0f32;
        let mut bonus_eligible = false;

        for concept in expected {
            let best = matches
                .iter()
                .filter(|r| r.refers_to(concept))
                .max_by_key(|r| effective_score(r));

            let mut score = best.map(effective_score).unwrap_or(0) as f32;

            if let Some(record) = best {
                if score > 0.0 && self.territory_missing(concept, record) {
                    score /= 2.0;
                    notes.push(format!(
                        "Territoire non précisé pour « {} » : score divisé par deux",
                        concept.label
                    ));
                }
            }

            let weight = concept.weight as f32;
            let contribution = weight * score / 100.0;
            earned += contribution;
            possible += weight;

            if concept.weight >= self.config.bonus_min_weight && score >= 100.0 {
                bonus_eligible = true;
            }

            if let Some(category) = concept.category() {
                let entry = breakdown.entry(category).or_default();
                entry.earned += contribution;
                entry.possible += weight;
                entry.total += 1;
                if score > 0.0 {
                    entry.matched += 1;
                }
            }
        }

        let raw_percentage = if possible > 0.0 {
            earned / possible * 100.0
        } else {
            0.0
        };

        let mut percentage = raw_percentage;
        if bonus_eligible {
            percentage = (raw_percentage * (1.0 + self.config.diagnostic_bonus)).min(100.0);
            notes.push(format!(
                "Bonus diagnostique de {:.0}% appliqué",
                self.config.diagnostic_bonus * 100.0
            ));
        }

        ScoreReport {
            percentage,
            raw_percentage,
            bonus_applied: bonus_eligible,
            excluded: false,
            breakdown,
            counts,
            notes,
        }
    }

    /// 需要区域的诊断是否缺少学生给出的区域
    fn territory_missing(&self, concept: &ExpectedConcept, record: &MatchRecord) -> bool {
        if !concept.validates_diagnosis || !record.submitted_territories.is_empty() {
            return false;
        }
        let node = match &concept.concept_id {
            Some(id) if self.graph.get(id).is_some() => Some(id.clone()),
            _ => self
                .resolver
                .resolve_scored(&concept.label)
                .filter(|hit| hit.score >= 95)
                .map(|hit| hit.concept.id.clone()),
        };
        node.map(|id| self.territories.should_show_selector(&id).required)
            .unwrap_or(false)
    }
}

/// 矛盾和缺失一律按0计
fn effective_score(record: &MatchRecord) -> u8 {
    match record.kind {
        MatchKind::Missing | MatchKind::Contradiction | MatchKind::Extra => 0,
        _ => record.score,
    }
}

fn count_matches(matches: &[MatchRecord]) -> MatchCounts {
    let mut counts = MatchCounts::default();
    for record in matches {
        match record.kind {
            MatchKind::Missing => counts.missing += 1,
            MatchKind::Extra => counts.extra += 1,
            MatchKind::Contradiction => counts.contradiction += 1,
            _ if record.score >= 100 => counts.full += 1,
            _ if record.score > 0 => counts.partial += 1,
            _ => counts.missing += 1,
        }
    }
    counts
}
