//! 概念匹配引擎
//!
//! 把学生给出的概念与专家的期望概念逐对比较，输出带类型的匹配记录。
//! 确定性阶段（文本、包含、蕴含）优先于Oracle，Oracle失败时退回文本相似度。

use crate::core::decomposer::ConceptDecomposer;
use crate::core::models::{ExpectedConcept, MatchKind, MatchRecord, MatchingConfig, Normality, SubmittedConcept};
use crate::core::normalize::{contains_phrase, normalize, token_jaccard, tokens};
use crate::core::ontology::OntologyGraph;
use crate::core::oracle::{OracleContext, OracleVerdict, Relationship, SimilarityOracle};
use std::sync::Arc;
use std::time::Duration;

/// "整体正常"的固定表述（归一化后）
const NORMAL_PHRASES: [&str; 8] = [
    "ecg normal",
    "ecg strictement normal",
    "ecg sans anomalie",
    "ecg sans particularite",
    "electrocardiogramme normal",
    "trace normal",
    "trace sans anomalie",
    "ecg dans les limites de la normale",
];

/// 可以忽略的修饰词
const FILLER_WORDS: [&str; 8] = [
    "globalement", "parfaitement", "totalement", "tout", "a", "fait", "au", "total",
];

/// 预处理后的学生概念
struct SubmittedView<'a> {
    source: &'a SubmittedConcept,
    normalized: String,
    node: Option<String>,
}

/// 预处理后的期望概念
struct ExpectedView<'a> {
    concept: &'a ExpectedConcept,
    label: String,
    /// 标签与同义词（归一化）
    terms: Vec<String>,
    node: Option<String>,
}

/// 匹配引擎
pub struct MatchingEngine {
    graph: Arc<OntologyGraph>,
    decomposer: ConceptDecomposer,
    oracle: Arc<dyn SimilarityOracle>,
    config: MatchingConfig,
    oracle_timeout: Duration,
}

impl MatchingEngine {
    pub fn new(
        graph: Arc<OntologyGraph>,
        oracle: Arc<dyn SimilarityOracle>,
        config: MatchingConfig,
        oracle_timeout: Duration,
    ) -> Self {
        Self {
            decomposer: ConceptDecomposer::new(Arc::clone(&graph)),
            graph,
            oracle,
            config,
            oracle_timeout,
        }
    }

    pub fn decomposer(&self) -> &ConceptDecomposer {
        &self.decomposer
    }

    /// 单对匹配：确定性阶段，之后Oracle，最后文本相似度
    pub async fn match_concept(&self, submitted: &str, expected: &ExpectedConcept) -> MatchRecord {
        let source = SubmittedConcept::new(submitted);
        let view = self.submitted_view(&source);
        let target = self.expected_view(expected);

        match self.deterministic(&view, &target) {
            Some(record) => record,
            None => self.semantic(&view, &target).await,
        }
    }

    /// 只运行确定性阶段（1-4）
    pub fn match_deterministic(&self, submitted: &str, expected: &ExpectedConcept) -> Option<MatchRecord> {
        let source = SubmittedConcept::new(submitted);
        self.deterministic(&self.submitted_view(&source), &self.expected_view(expected))
    }

    /// 全局分配
    ///
    /// 输出按期望概念的声明顺序排列，之后是剩余的学生概念。
    pub async fn match_all(
        &self,
        submitted: &[SubmittedConcept],
        expected: &[ExpectedConcept],
    ) -> Vec<MatchRecord> {
        if let Some(records) = self.global_normal(submitted, expected) {
            return records;
        }

        let submitted: Vec<SubmittedView<'_>> =
            submitted.iter().map(|s| self.submitted_view(s)).collect();
        let targets: Vec<ExpectedView<'_>> =
            expected.iter().map(|e| self.expected_view(e)).collect();

        let mut assigned: Vec<Option<MatchRecord>> = vec![None; targets.len()];
        let mut leftovers: Vec<&SubmittedView<'_>> = Vec::new();

        for view in &submitted {
            let open: Vec<usize> = (0..targets.len()).filter(|i| assigned[*i].is_none()).collect();

            let mut best: Option<(usize, MatchRecord)> = None;
            let mut undecided = Vec::new();
            for &index in &open {
                match self.deterministic(view, &targets[index]) {
                    Some(record) => keep_better(&mut best, index, record),
                    None => undecided.push(index),
                }
            }

            let best_score = best.as_ref().map(|(_, r)| r.score).unwrap_or(0);
            if best_score < 100 {
                for index in undecided {
                    let record = self.semantic(view, &targets[index]).await;
                    keep_better(&mut best, index, record);
                }
            }

            match best {
                Some((index, mut record)) if record.score >= self.config.extra_threshold => {
                    tracing::debug!(
                        "分配: \"{}\" -> \"{}\" {} ({})",
                        view.source.text,
                        targets[index].concept.label,
                        record.kind,
                        record.score
                    );
                    record.submitted_territories = view.source.territories.clone();
                    assigned[index] = Some(record);
                }
                _ => leftovers.push(view),
            }
        }

        // 剩余的学生概念若蕴含某个未分配的期望概念，仍然记为 CHILD
        let mut covered = vec![false; leftovers.len()];
        for (index, target) in targets.iter().enumerate() {
            if assigned[index].is_some() {
                continue;
            }
            let Some(expected_node) = target.node.as_deref() else {
                continue;
            };
            let hit = leftovers.iter().position(|l| {
                l.node
                    .as_deref()
                    .map(|n| self.graph.implies(n, expected_node))
                    .unwrap_or(false)
            });
            if let Some(position) = hit {
                let leftover = leftovers[position];
                let mut record = MatchRecord::pair(
                    &leftover.source.text,
                    target.concept,
                    MatchKind::HierarchicalChild,
                    100,
                    format!("« {} » implique « {} »", leftover.source.text, target.concept.label),
                );
                record.submitted_territories = leftover.source.territories.clone();
                assigned[index] = Some(record);
                covered[position] = true;
            }
        }

        let mut records: Vec<MatchRecord> = assigned
            .into_iter()
            .zip(targets.iter())
            .map(|(record, target)| record.unwrap_or_else(|| MatchRecord::missing(target.concept)))
            .collect();

        for (leftover, covered) in leftovers.iter().zip(covered) {
            if covered {
                continue;
            }
            let contradictions = self.contradictions(leftover, &targets);
            if contradictions.is_empty() {
                let mut record = MatchRecord::extra(&leftover.source.text);
                record.submitted_territories = leftover.source.territories.clone();
                records.push(record);
            } else {
                records.extend(contradictions);
            }
        }

        records
    }

    /// 与期望概念互斥的剩余学生概念
    fn contradictions(&self, leftover: &SubmittedView<'_>, targets: &[ExpectedView<'_>]) -> Vec<MatchRecord> {
        let Some(node) = leftover.node.as_deref() else {
            return Vec::new();
        };
        targets
            .iter()
            .filter(|t| t.node.as_deref().map(|e| self.graph.excludes(node, e)).unwrap_or(false))
            .map(|t| {
                tracing::debug!("矛盾: \"{}\" 与 \"{}\" 互斥", leftover.source.text, t.concept.label);
                let mut record = MatchRecord::pair(
                    &leftover.source.text,
                    t.concept,
                    MatchKind::Contradiction,
                    0,
                    format!(
                        "« {} » est incompatible avec « {} »",
                        leftover.source.text, t.concept.label
                    ),
                );
                record.submitted_territories = leftover.source.territories.clone();
                record
            })
            .collect()
    }

    /// "ECG normal" 整体判定
    fn global_normal(
        &self,
        submitted: &[SubmittedConcept],
        expected: &[ExpectedConcept],
    ) -> Option<Vec<MatchRecord>> {
        let [only] = submitted else {
            return None;
        };
        if !is_global_normal(&only.text) {
            return None;
        }

        tracing::debug!("整体正常表述: \"{}\"", only.text);
        let records = expected
            .iter()
            .map(|e| match e.normality() {
                Normality::Normal => MatchRecord::pair(
                    &only.text,
                    e,
                    MatchKind::HierarchicalParent,
                    100,
                    format!("ECG normal : « {} » est couvert", e.label),
                ),
                Normality::Pathological => MatchRecord::pair(
                    &only.text,
                    e,
                    MatchKind::Contradiction,
                    0,
                    format!("ECG déclaré normal alors que « {} » est attendu", e.label),
                ),
            })
            .collect();
        Some(records)
    }

    fn submitted_view<'a>(&self, source: &'a SubmittedConcept) -> SubmittedView<'a> {
        SubmittedView {
            source,
            normalized: normalize(&source.text),
            node: self
                .decomposer
                .primary_concept(&source.text)
                .map(|c| c.id.clone()),
        }
    }

    fn expected_view<'a>(&self, concept: &'a ExpectedConcept) -> ExpectedView<'a> {
        let node = match &concept.concept_id {
            Some(id) if self.graph.get(id).is_some() => Some(id.clone()),
            _ => self
                .decomposer
                .resolver()
                .resolve_scored(&concept.label)
                .filter(|hit| hit.score >= 95)
                .map(|hit| hit.concept.id.clone()),
        };

        let label = normalize(&concept.label);
        let mut terms = vec![label.clone()];
        if let Some(record) = node.as_deref().and_then(|id| self.graph.get(id)) {
            for term in std::iter::once(&record.label).chain(record.synonyms.iter()) {
                let term = normalize(term);
                if !term.is_empty() && !terms.contains(&term) {
                    terms.push(term);
                }
            }
        }

        ExpectedView {
            concept,
            label,
            terms,
            node,
        }
    }

    /// 阶段 1-4
    fn deterministic(&self, submitted: &SubmittedView<'_>, expected: &ExpectedView<'_>) -> Option<MatchRecord> {
        let text = &submitted.source.text;
        let concept = expected.concept;

        if submitted.normalized.is_empty() {
            return None;
        }

        // 1. 完全相同
        if expected.terms.iter().any(|t| *t == submitted.normalized) {
            return Some(MatchRecord::pair(
                text,
                concept,
                MatchKind::Exact,
                100,
                format!("Correspondance exacte avec « {} »", concept.label),
            ));
        }

        // 2. 学生答案包含期望概念
        if expected
            .terms
            .iter()
            .any(|t| contains_phrase(&submitted.normalized, t))
        {
            return Some(MatchRecord::pair(
                text,
                concept,
                MatchKind::ContainsSuperset,
                100,
                format!("« {} » est mentionné avec des précisions", concept.label),
            ));
        }

        // 3. 学生答案只是期望概念的一部分
        if contains_phrase(&expected.label, &submitted.normalized) {
            return Some(MatchRecord::pair(
                text,
                concept,
                MatchKind::ContainsSubset,
                70,
                format!("Réponse incomplète : « {} » fait partie de « {} »", text, concept.label),
            ));
        }

        // 4. 蕴含方向
        let (Some(sub_node), Some(exp_node)) = (submitted.node.as_deref(), expected.node.as_deref())
        else {
            return None;
        };

        if sub_node == exp_node {
            return Some(MatchRecord::pair(
                text,
                concept,
                MatchKind::SemanticEquivalent,
                100,
                format!("« {} » désigne le même concept que « {} »", text, concept.label),
            ));
        }
        if self.graph.implies(sub_node, exp_node) {
            return Some(MatchRecord::pair(
                text,
                concept,
                MatchKind::HierarchicalChild,
                100,
                format!("« {} » implique « {} »", text, concept.label),
            ));
        }
        if self.graph.implies(exp_node, sub_node) {
            return Some(MatchRecord::pair(
                text,
                concept,
                MatchKind::HierarchicalParent,
                40,
                format!(
                    "« {} » est un signe ou une forme plus générale de « {} »",
                    text, concept.label
                ),
            ));
        }

        None
    }

    /// 阶段 5-6：Oracle（带超时），失败时退回文本相似度
    async fn semantic(&self, submitted: &SubmittedView<'_>, expected: &ExpectedView<'_>) -> MatchRecord {
        let text = &submitted.source.text;
        let context = self.context_for(expected);

        let call = self.oracle.compare(text, &expected.concept.label, context.as_ref());
        match tokio::time::timeout(self.oracle_timeout, call).await {
            Ok(Ok(verdict)) => map_verdict(text, expected.concept, &verdict),
            Ok(Err(e)) => {
                tracing::warn!("Oracle调用失败，使用文本相似度: {}", e);
                self.fallback(submitted, expected)
            }
            Err(_) => {
                tracing::warn!(
                    "Oracle超时（{} ms），使用文本相似度",
                    self.oracle_timeout.as_millis()
                );
                self.fallback(submitted, expected)
            }
        }
    }

    fn fallback(&self, submitted: &SubmittedView<'_>, expected: &ExpectedView<'_>) -> MatchRecord {
        let text = &submitted.source.text;
        let similarity = expected
            .terms
            .iter()
            .map(|t| token_jaccard(&submitted.normalized, t))
            .fold(0.0f32, f32::max);

        if similarity > self.config.jaccard_threshold {
            MatchRecord::pair(
                text,
                expected.concept,
                MatchKind::SemanticEquivalent,
                95,
                format!("Similarité textuelle {:.2} avec « {} »", similarity, expected.concept.label),
            )
        } else {
            no_match(text, expected.concept)
        }
    }

    /// 期望概念的本体上下文
    fn context_for(&self, expected: &ExpectedView<'_>) -> Option<OracleContext> {
        let id = expected.node.as_deref()?;
        let record = self.graph.get(id)?;
        let profile = self.graph.morphology_profile(id);
        let has_morphology = !profile.origin_structures.is_empty() || !profile.ecg_morphologies.is_empty();

        Some(OracleContext {
            synonyms: record.synonyms.clone(),
            parent: self.graph.parent(id).map(|p| p.label.clone()),
            children: self.graph.labels(self.graph.children(id)),
            implications: self.graph.labels(&record.implications),
            neighbors: self.graph.labels(self.graph.neighbors(id)),
            morphology: has_morphology.then_some(profile),
        })
    }
}

/// 严格阈值下把Oracle判断映射为匹配记录
fn map_verdict(submitted: &str, expected: &ExpectedConcept, verdict: &OracleVerdict) -> MatchRecord {
    let (kind, score) = match verdict.relationship {
        Relationship::Equivalent if verdict.confidence > 0.7 => (MatchKind::SemanticEquivalent, 100),
        Relationship::Child if verdict.confidence > 0.6 => (MatchKind::HierarchicalChild, 90),
        Relationship::Parent if verdict.confidence > 0.6 => (MatchKind::HierarchicalParent, 40),
        Relationship::Sibling if verdict.confidence > 0.6 => (MatchKind::Sibling, 50),
        _ => return no_match(submitted, expected),
    };
    MatchRecord::pair(
        submitted,
        expected,
        kind,
        score,
        format!("Jugement sémantique : {}", verdict.explanation),
    )
}

fn no_match(submitted: &str, expected: &ExpectedConcept) -> MatchRecord {
    MatchRecord::pair(
        submitted,
        expected,
        MatchKind::Missing,
        0,
        format!("« {} » ne correspond pas à « {} »", submitted, expected.label),
    )
}

/// 分数更高才替换；平分时取流水线中更靠前的阶段，再平分则保留声明顺序靠前的
fn keep_better(best: &mut Option<(usize, MatchRecord)>, index: usize, record: MatchRecord) {
    let better = match best {
        None => true,
        Some((_, current)) => {
            record.score > current.score
                || (record.score == current.score
                    && stage_rank(record.kind) < stage_rank(current.kind))
        }
    };
    if better {
        *best = Some((index, record));
    }
}

/// 阶段顺序：字面命中优先于推理得出的命中
fn stage_rank(kind: MatchKind) -> u8 {
    match kind {
        MatchKind::Exact => 0,
        MatchKind::ContainsSuperset => 1,
        MatchKind::SemanticEquivalent => 2,
        MatchKind::ContainsSubset => 3,
        MatchKind::HierarchicalChild => 4,
        MatchKind::HierarchicalParent => 5,
        MatchKind::Sibling => 6,
        MatchKind::Missing | MatchKind::Extra | MatchKind::Contradiction => 7,
    }
}

/// 唯一片段是否为"整体正常"表述
///
/// 去掉修饰词后必须与固定表述完全一致，附加任何内容都不算。
pub fn is_global_normal(text: &str) -> bool {
    let reduced = tokens(text)
        .into_iter()
        .filter(|t| !FILLER_WORDS.contains(&t.as_str()))
        .collect::<Vec<_>>()
        .join(" ");
    NORMAL_PHRASES.contains(&reduced.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::tests::sample_graph;
    use crate::core::oracle::{OfflineOracle, ScriptedOracle};

    fn engine_with(oracle: Arc<dyn SimilarityOracle>, timeout_ms: u64) -> MatchingEngine {
        MatchingEngine::new(
            Arc::new(sample_graph()),
            oracle,
            MatchingConfig::default(),
            Duration::from_millis(timeout_ms),
        )
    }

    fn offline() -> MatchingEngine {
        engine_with(Arc::new(OfflineOracle), 100)
    }

    #[tokio::test]
    async fn test_exact_and_synonym() {
        let engine = offline();
        let expected = ExpectedConcept::new("Fibrillation atriale", 3);

        let record = engine.match_concept("fibrillation  ATRIALE", &expected).await;
        assert_eq!((record.kind, record.score), (MatchKind::Exact, 100));

        let record = engine.match_concept("ACFA", &expected).await;
        assert_eq!((record.kind, record.score), (MatchKind::Exact, 100));
    }

    #[tokio::test]
    async fn test_containment_is_full_credit() {
        let engine = offline();
        let record = engine
            .match_concept("péricardite sus-décalage inférieur", &ExpectedConcept::new("Péricardite", 3))
            .await;
        assert_eq!(record.kind, MatchKind::ContainsSuperset);
        assert_eq!(record.score, 100);
        assert!(record.kind.is_full_credit_kind());

        let record = engine
            .match_concept("Trouble", &ExpectedConcept::new("Trouble de conduction", 3))
            .await;
        assert_eq!((record.kind, record.score), (MatchKind::ContainsSubset, 70));
    }

    #[tokio::test]
    async fn test_implication_direction() {
        let engine = offline();

        let record = engine
            .match_concept("BAV 1er degré", &ExpectedConcept::new("PR allongé", 2))
            .await;
        assert_eq!((record.kind, record.score), (MatchKind::HierarchicalChild, 100));

        let record = engine
            .match_concept("PR allongé", &ExpectedConcept::new("BAV 1er degré", 3))
            .await;
        assert_eq!((record.kind, record.score), (MatchKind::HierarchicalParent, 40));

        // 子类蕴含祖先
        let record = engine
            .match_concept("BAV 1er degré", &ExpectedConcept::new("Trouble de conduction", 3))
            .await;
        assert_eq!(record.kind, MatchKind::HierarchicalChild);
    }

    #[tokio::test]
    async fn test_oracle_gates() {
        let oracle = ScriptedOracle::new()
            .with_verdict("ESV", "Extrasystole ventriculaire", OracleVerdict::new(Relationship::Equivalent, 0.9, "abréviation"))
            .with_verdict("ischémie", "STEMI", OracleVerdict::new(Relationship::Parent, 0.8, "plus général"))
            .with_verdict("flutter", "Fibrillation atriale", OracleVerdict::new(Relationship::Sibling, 0.65, "arythmies atriales"))
            .with_verdict("tachycardie", "Fibrillation atriale", OracleVerdict::new(Relationship::Equivalent, 0.7, "incertain"));
        let engine = engine_with(Arc::new(oracle), 500);

        let record = engine
            .match_concept("ESV", &ExpectedConcept::new("Extrasystole ventriculaire", 2))
            .await;
        assert_eq!((record.kind, record.score), (MatchKind::SemanticEquivalent, 100));

        let record = engine.match_concept("ischémie", &ExpectedConcept::new("STEMI", 4)).await;
        assert_eq!((record.kind, record.score), (MatchKind::HierarchicalParent, 40));

        let record = engine
            .match_concept("flutter", &ExpectedConcept::new("Fibrillation atriale", 3))
            .await;
        assert_eq!((record.kind, record.score), (MatchKind::Sibling, 50));

        // 0.7 不超过阈值
        let record = engine
            .match_concept("tachycardie", &ExpectedConcept::new("Fibrillation atriale", 3))
            .await;
        assert_eq!((record.kind, record.score), (MatchKind::Missing, 0));
    }

    #[tokio::test]
    async fn test_timeout_falls_back_to_jaccard() {
        let oracle = ScriptedOracle::new()
            .with_default(OracleVerdict::new(Relationship::Different, 1.0, ""))
            .with_delay(Duration::from_millis(500));
        let engine = engine_with(Arc::new(oracle), 20);
        let expected = ExpectedConcept::new("Bloc de branche droit complet", 2);

        let record = engine.match_concept("bloc de branche complet droit", &expected).await;
        assert_eq!((record.kind, record.score), (MatchKind::SemanticEquivalent, 95));

        let record = engine.match_concept("bloc de branche gauche", &expected).await;
        assert_eq!((record.kind, record.score), (MatchKind::Missing, 0));
    }

    #[tokio::test]
    async fn test_oracle_failure_falls_back() {
        let engine = engine_with(Arc::new(ScriptedOracle::new().failing()), 100);
        let record = engine
            .match_concept("onde T négative profonde", &ExpectedConcept::new("Onde T profonde négative", 2))
            .await;
        assert_eq!((record.kind, record.score), (MatchKind::SemanticEquivalent, 95));
    }

    #[tokio::test]
    async fn test_match_all_assignment_and_leftovers() {
        let engine = offline();
        let expected = vec![
            ExpectedConcept::new("Rythme sinusal", 1),
            ExpectedConcept::new("BAV 1er degré", 3),
            ExpectedConcept::new("PR allongé", 2),
        ];
        let submitted = vec![
            SubmittedConcept::new("BAV 1er degré"),
            SubmittedConcept::new("rythme sinusal"),
            SubmittedConcept::new("hypertrophie ventriculaire gauche"),
        ];

        let records = engine.match_all(&submitted, &expected).await;
        assert_eq!(records.len(), 4);
        assert_eq!(records[0].kind, MatchKind::Exact);
        assert_eq!(records[1].kind, MatchKind::Exact);
        assert_eq!(records[1].submitted.as_deref(), Some("BAV 1er degré"));
        assert_eq!(records[2].kind, MatchKind::Missing);
        assert_eq!(records[3].kind, MatchKind::Extra);
    }

    #[tokio::test]
    async fn test_later_mention_implying_expected_is_child() {
        let engine = offline();
        let expected = vec![
            ExpectedConcept::new("BAV 1er degré", 3),
            ExpectedConcept::new("PR allongé", 2),
        ];
        let submitted = vec![
            SubmittedConcept::new("BAV 1er degré"),
            SubmittedConcept::new("Bloc auriculo-ventriculaire du premier degré"),
        ];

        let records = engine.match_all(&submitted, &expected).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, MatchKind::Exact);
        assert_eq!(records[1].kind, MatchKind::HierarchicalChild);
        assert_eq!(records[1].score, 100);
    }

    #[tokio::test]
    async fn test_excluded_leftover_is_contradiction() {
        let engine = offline();
        let expected = vec![ExpectedConcept::new("Rythme sinusal", 1)];
        let submitted = vec![
            SubmittedConcept::new("Rythme sinusal"),
            SubmittedConcept::new("fibrillation atriale"),
        ];

        let records = engine.match_all(&submitted, &expected).await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].kind, MatchKind::Contradiction);
        assert_eq!(records[1].expected_label.as_deref(), Some("Rythme sinusal"));
    }

    #[tokio::test]
    async fn test_global_normal() {
        let engine = offline();
        let mut explicit = ExpectedConcept::new("PR normal", 2);
        explicit.normality = Some(Normality::Normal);
        let expected = vec![
            ExpectedConcept::new("Rythme sinusal", 1),
            explicit,
            ExpectedConcept::new("BAV 1er degré", 3),
        ];

        let records = engine
            .match_all(&[SubmittedConcept::new("ECG strictement normal")], &expected)
            .await;
        assert_eq!(records.len(), 3);
        assert_eq!((records[0].kind, records[0].score), (MatchKind::HierarchicalParent, 100));
        assert_eq!((records[1].kind, records[1].score), (MatchKind::HierarchicalParent, 100));
        assert_eq!(records[2].kind, MatchKind::Contradiction);
    }

    #[test]
    fn test_global_normal_phrasing() {
        assert!(is_global_normal("ECG normal"));
        assert!(is_global_normal("Électrocardiogramme normal."));
        assert!(!is_global_normal("QRS normal"));
        assert!(!is_global_normal("ECG normal, axe dévié"));
        assert!(!is_global_normal("Rythme sinusal"));
        assert!(is_global_normal("ECG tout à fait normal"));
        assert!(is_global_normal("ECG globalement normal"));
    }

    #[test]
    fn test_normal_phrase_with_trailing_finding_is_not_global() {
        assert!(!is_global_normal("ECG normal hormis une fibrillation atriale"));
        assert!(!is_global_normal("ECG normal sauf BAV 1er degré"));
        assert!(!is_global_normal("Tracé normal avec ESV"));
    }

    #[tokio::test]
    async fn test_named_diagnosis_after_normal_phrase_is_graded() {
        let engine = offline();
        let expected = vec![
            ExpectedConcept::new("Rythme sinusal", 1),
            ExpectedConcept::new("Fibrillation atriale", 3),
        ];

        let records = engine
            .match_all(
                &[SubmittedConcept::new("ECG normal hormis une fibrillation atriale")],
                &expected,
            )
            .await;
        assert!(records.iter().all(|r| r.kind != MatchKind::Contradiction));
        let fa = records
            .iter()
            .find(|r| r.expected_label.as_deref() == Some("Fibrillation atriale"))
            .unwrap();
        assert_eq!((fa.kind, fa.score), (MatchKind::ContainsSuperset, 100));
    }

    #[tokio::test]
    async fn test_literal_match_beats_implication_on_tie() {
        let engine = offline();
        let expected = vec![
            ExpectedConcept::new("PR allongé", 2),
            ExpectedConcept::new("BAV 1er degré", 3),
        ];

        let records = engine
            .match_all(&[SubmittedConcept::new("BAV 1er degré")], &expected)
            .await;
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].kind, MatchKind::Missing);
        assert_eq!((records[1].kind, records[1].score), (MatchKind::Exact, 100));
    }

    #[test]
    fn test_stage_rank_orders_literal_before_inferred() {
        assert!(stage_rank(MatchKind::Exact) < stage_rank(MatchKind::ContainsSuperset));
        assert!(stage_rank(MatchKind::ContainsSuperset) < stage_rank(MatchKind::HierarchicalChild));
        assert!(stage_rank(MatchKind::HierarchicalChild) < stage_rank(MatchKind::Missing));
    }
}
