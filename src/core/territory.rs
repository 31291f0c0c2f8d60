//! 区域解析模块
//!
//! 把概念的区域边向下展开到具体的叶子位置，并决定是否需要区域选择器。

use crate::core::ontology::{Importance, OntologyGraph};
use serde::Serialize;
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

/// 区域集合（已排序去重的叶子标签）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct TerritorySet {
    /// 主要区域
    pub principal: Vec<String>,
    /// 镜像区域
    pub mirror: Vec<String>,
}

impl TerritorySet {
    pub fn is_empty(&self) -> bool {
        self.principal.is_empty() && self.mirror.is_empty()
    }

    /// 标签是否属于主要或镜像区域
    pub fn contains(&self, label: &str) -> bool {
        self.principal.iter().chain(self.mirror.iter()).any(|l| l == label)
    }
}

/// 区域选择器决策
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SelectorDecision {
    pub show: bool,
    /// 仅当重要性为 Critical
    pub required: bool,
    pub show_mirror: bool,
    pub importance: Importance,
}

/// 区域解析器
pub struct TerritoryResolver {
    graph: Arc<OntologyGraph>,
}

impl TerritoryResolver {
    pub fn new(graph: Arc<OntologyGraph>) -> Self {
        Self { graph }
    }

    /// 解析概念的叶子区域
    pub fn resolve(&self, concept_id: &str) -> TerritorySet {
        let Some(concept) = self.graph.get(concept_id) else {
            return TerritorySet::default();
        };

        let mut principal = BTreeSet::new();
        let mut mirror = BTreeSet::new();

        for target in &concept.territories {
            let is_mirror = self.graph.get(target).map(|t| t.is_mirror()).unwrap_or(false);
            if is_mirror {
                self.collect_mirror(target, &mut mirror);
            } else {
                let mut visited = HashSet::new();
                self.collect_leaves(target, &mut visited, &mut principal);
            }
        }

        TerritorySet {
            principal: principal.into_iter().collect(),
            mirror: mirror.into_iter().collect(),
        }
    }

    /// 镜像节点自身的区域优先，否则取其叶子后代
    fn collect_mirror(&self, mirror_id: &str, out: &mut BTreeSet<String>) {
        let mut visited = HashSet::new();
        visited.insert(mirror_id.to_string());

        let targets = self
            .graph
            .get(mirror_id)
            .map(|m| m.territories.clone())
            .unwrap_or_default();

        if targets.is_empty() {
            for child in self.graph.children(mirror_id) {
                self.collect_leaves(child, &mut visited, out);
            }
        } else {
            for target in &targets {
                self.collect_leaves(target, &mut visited, out);
            }
        }
    }

    /// 深度优先下降到叶子，visited 防环
    fn collect_leaves(&self, id: &str, visited: &mut HashSet<String>, out: &mut BTreeSet<String>) {
        if !visited.insert(id.to_string()) {
            return;
        }
        let children = self.graph.children(id);
        if children.is_empty() {
            if let Some(label) = self.graph.label_of(id) {
                out.insert(label.to_string());
            }
            return;
        }
        for child in children {
            self.collect_leaves(child, visited, out);
        }
    }

    /// 是否展示区域选择器
    pub fn should_show_selector(&self, concept_id: &str) -> SelectorDecision {
        let concept = self.graph.get(concept_id);
        let meta = concept.and_then(|c| c.territory_meta.clone());
        let has_edges = concept.map(|c| !c.territories.is_empty()).unwrap_or(false);
        let has_mirror_edge = concept
            .map(|c| {
                c.territories
                    .iter()
                    .any(|t| self.graph.get(t).map(|n| n.is_mirror()).unwrap_or(false))
            })
            .unwrap_or(false);

        match meta {
            Some(meta) => SelectorDecision {
                show: meta.may_have_territory,
                required: meta.importance == Importance::Critical,
                show_mirror: meta.may_have_mirror,
                importance: meta.importance,
            },
            None => SelectorDecision {
                show: has_edges,
                required: false,
                show_mirror: has_mirror_edge,
                importance: Importance::Optional,
            },
        }
    }

    /// 主要叶子区域对应的电极并集
    pub fn electrodes(&self, concept_id: &str) -> Vec<String> {
        let territories = self.resolve(concept_id);
        let electrodes: BTreeSet<String> = territories
            .principal
            .iter()
            .flat_map(|label| self.graph.electrodes_for(label).iter().cloned())
            .collect();
        electrodes.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::tests::sample_graph;
    use crate::core::ontology::stable_id;

    fn resolver() -> TerritoryResolver {
        TerritoryResolver::new(Arc::new(sample_graph()))
    }

    #[test]
    fn test_resolve_returns_only_leaves() {
        let set = resolver().resolve(&stable_id("STEMI"));
        assert_eq!(set.principal, vec!["Antérieur", "Inférieur", "Latéral"]);
        assert_eq!(set.mirror, vec!["Postérieur", "Postéro-basal"]);
        assert!(!set.contains("Territoire ventriculaire gauche"));
        assert!(!set.contains("Miroir"));
    }

    #[test]
    fn test_concept_without_territories() {
        let resolver = resolver();
        let set = resolver.resolve(&stable_id("Rythme sinusal"));
        assert!(set.is_empty());
        assert!(resolver.resolve("inconnu").is_empty());
    }

    #[test]
    fn test_selector_decision() {
        let resolver = resolver();

        let stemi = resolver.should_show_selector(&stable_id("STEMI"));
        assert!(stemi.show);
        assert!(stemi.required);
        assert!(stemi.show_mirror);
        assert_eq!(stemi.importance, Importance::Critical);

        // 有元数据但没有 mayHaveTerritory
        let pericardite = resolver.should_show_selector(&stable_id("Péricardite"));
        assert!(!pericardite.show);
        assert!(!pericardite.required);

        let rs = resolver.should_show_selector(&stable_id("Rythme sinusal"));
        assert!(!rs.show);
        assert_eq!(rs.importance, Importance::Optional);
    }

    #[test]
    fn test_electrodes_union() {
        let electrodes = resolver().electrodes(&stable_id("STEMI"));
        assert_eq!(electrodes, vec!["DII", "DIII", "V1", "V2", "V3", "aVF"]);
    }
}
