//! 复合短语拆解模块
//!
//! "STEMI antérieur" -> [(STEMI, 主概念), (Antérieur, 区域)]

use crate::core::normalize::significant_tokens;
use crate::core::ontology::{ConceptRecord, OntologyGraph};
use crate::core::resolver::ConceptResolver;
use crate::core::territory::TerritoryResolver;
use serde::Serialize;
use std::sync::Arc;

/// 整句命中即直接返回的分数
const WHOLE_PHRASE_SCORE: u8 = 95;
/// 候选保留的最低分数
const CANDIDATE_SCORE: u8 = 60;
/// 相关概念的最低分数
const RELATED_SCORE: u8 = 70;
/// 区域角色的置信度加成
const TERRITORY_BOOST: u8 = 5;

/// 组件角色
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComponentRole {
    Main,
    Territory,
    Subtype,
    Related,
}

/// 拆解出的组件
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Component {
    pub concept_id: String,
    pub label: String,
    pub role: ComponentRole,
    /// 0-100
    pub confidence: u8,
}

/// 概念拆解器
pub struct ConceptDecomposer {
    resolver: ConceptResolver,
    territories: TerritoryResolver,
}

impl ConceptDecomposer {
    pub fn new(graph: Arc<OntologyGraph>) -> Self {
        Self {
            resolver: ConceptResolver::new(Arc::clone(&graph)),
            territories: TerritoryResolver::new(graph),
        }
    }

    pub fn resolver(&self) -> &ConceptResolver {
        &self.resolver
    }

    /// 拆解短语
    pub fn decompose(&self, phrase: &str) -> Vec<Component> {
        let whole = self.resolver.resolve_scored(phrase);
        if let Some(hit) = whole.filter(|h| h.score >= WHOLE_PHRASE_SCORE) {
            return vec![component(hit.concept, ComponentRole::Main, hit.score)];
        }

        let candidates = self.candidates(phrase);

        let Some(main_index) = pick_main(&candidates) else {
            // 没有候选时退回整句的部分匹配
            return whole
                .filter(|h| h.score >= CANDIDATE_SCORE)
                .map(|h| vec![component(h.concept, ComponentRole::Main, h.score)])
                .unwrap_or_default();
        };

        let (main, main_score) = candidates[main_index];
        let main_territories = self.territories.resolve(&main.id);
        let mut components = vec![component(main, ComponentRole::Main, main_score)];

        for (index, (concept, score)) in candidates.iter().enumerate() {
            if index == main_index {
                continue;
            }
            if main_territories.contains(&concept.label) {
                components.push(component(
                    concept,
                    ComponentRole::Territory,
                    score.saturating_add(TERRITORY_BOOST).min(100),
                ));
            } else if concept.category.is_some() && concept.category == main.category {
                components.push(component(concept, ComponentRole::Subtype, *score));
            } else if *score >= RELATED_SCORE {
                components.push(component(concept, ComponentRole::Related, *score));
            }
        }

        tracing::debug!("拆解 \"{}\" -> {} 个组件", phrase, components.len());
        components
    }

    /// 主概念节点
    pub fn primary_concept(&self, phrase: &str) -> Option<&ConceptRecord> {
        self.decompose(phrase)
            .into_iter()
            .find(|c| c.role == ComponentRole::Main)
            .and_then(|c| self.resolver.graph().get(&c.concept_id))
    }

    /// 短语中的区域标签
    pub fn territories_in(&self, phrase: &str) -> Vec<String> {
        self.decompose(phrase)
            .into_iter()
            .filter(|c| c.role == ComponentRole::Territory)
            .map(|c| c.label)
            .collect()
    }

    /// 逐词以及两两组合解析，每个节点保留最高分，按发现顺序排列
    fn candidates(&self, phrase: &str) -> Vec<(&ConceptRecord, u8)> {
        let words = significant_tokens(phrase);
        let mut probes: Vec<String> = words.clone();
        for i in 0..words.len() {
            for j in (i + 1)..words.len() {
                probes.push(format!("{} {}", words[i], words[j]));
            }
        }

        let mut found: Vec<(&ConceptRecord, u8)> = Vec::new();
        for probe in &probes {
            let Some(hit) = self.resolver.resolve_scored(probe) else {
                continue;
            };
            if hit.score < CANDIDATE_SCORE {
                continue;
            }
            match found.iter_mut().find(|(c, _)| c.id == hit.concept.id) {
                Some(entry) => entry.1 = entry.1.max(hit.score),
                None => found.push((hit.concept, hit.score)),
            }
        }
        found
    }
}

fn component(concept: &ConceptRecord, role: ComponentRole, confidence: u8) -> Component {
    Component {
        concept_id: concept.id.clone(),
        label: concept.label.clone(),
        role,
        confidence,
    }
}

/// 严重程度最高者为主概念；同级比分数，再比发现顺序
fn pick_main(candidates: &[(&ConceptRecord, u8)]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (index, (concept, score)) in candidates.iter().enumerate() {
        let better = match best {
            None => true,
            Some(b) => {
                let (current, current_score) = candidates[b];
                (concept.severity(), *score) > (current.severity(), current_score)
            }
        };
        if better {
            best = Some(index);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::tests::sample_graph;
    use crate::core::ontology::stable_id;

    fn decomposer() -> ConceptDecomposer {
        ConceptDecomposer::new(Arc::new(sample_graph()))
    }

    #[test]
    fn test_whole_phrase_is_single_main() {
        let components = decomposer().decompose("Bloc auriculo-ventriculaire du premier degré");
        assert_eq!(components.len(), 1);
        assert_eq!(components[0].label, "BAV 1er degré");
        assert_eq!(components[0].role, ComponentRole::Main);
        assert_eq!(components[0].confidence, 100);
    }

    #[test]
    fn test_stemi_with_territory() {
        let components = decomposer().decompose("STEMI antérieur");
        assert_eq!(
            components,
            vec![
                Component {
                    concept_id: stable_id("STEMI"),
                    label: "STEMI".to_string(),
                    role: ComponentRole::Main,
                    confidence: 100,
                },
                Component {
                    concept_id: stable_id("Antérieur"),
                    label: "Antérieur".to_string(),
                    role: ComponentRole::Territory,
                    confidence: 100,
                },
            ]
        );
    }

    #[test]
    fn test_main_is_most_severe() {
        let decomposer = decomposer();
        let components = decomposer.decompose("PR allongé avec fibrillation atriale");
        let main = components.iter().find(|c| c.role == ComponentRole::Main).unwrap();
        assert_eq!(main.label, "Fibrillation atriale");

        let primary = decomposer.primary_concept("PR allongé avec fibrillation atriale").unwrap();
        assert_eq!(primary.label, "Fibrillation atriale");
    }

    #[test]
    fn test_territories_in_phrase() {
        let decomposer = decomposer();
        assert_eq!(decomposer.territories_in("STEMI inférieur"), vec!["Inférieur"]);
        assert!(decomposer.territories_in("Rythme sinusal").is_empty());
    }

    #[test]
    fn test_unknown_phrase_is_empty() {
        assert!(decomposer().decompose("tracé de bonne qualité").is_empty());
    }
}
