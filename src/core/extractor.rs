//! OWL/RDF 抽取模块
//!
//! 一次性批处理：把导出的 OWL/RDF-XML 文档转换为本体图快照。
//!
//! 处理流程：
//! - 事件驱动解析 XML，收集原始类声明
//! - 第一遍：标签、同义词、is-a 边、注解
//! - 第二遍：扫描 is-a 限制表达式，识别八种关系
//! - 权重继承：向上最多10层，遇环即停

use crate::core::error::OntologyError;
use crate::core::models::ExtractionConfig;
use crate::core::normalize::normalize;
use crate::core::ontology::{
    stable_id, Category, ConceptRecord, Importance, OntologyGraph, Relation, TerritoryMeta,
};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

/// 权重类的保留标签（归一化后精确匹配）
pub const WEIGHT_KEYWORDS: [(&str, u8); 4] = [
    ("urgent", 4),
    ("majeur", 3),
    ("signe pathologique", 2),
    ("descripteur", 1),
];

/// 抽取统计
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Default)]
pub struct ExtractionStats {
    /// 文档中声明的类数量
    pub classes_seen: usize,
    /// 图中的节点数
    pub nodes: usize,
    /// 各分类的概念数
    pub per_category: BTreeMap<Category, usize>,
    /// 区域节点数（区域目标及其后代）
    pub territories: usize,
    /// 各关系的边数
    pub edges: BTreeMap<Relation, usize>,
    /// 被丢弃的悬空边
    pub dropped_edges: usize,
    /// 无法解析权重的节点
    pub unweighted: usize,
    /// 标签重复而被合并的类
    pub merged_duplicates: usize,
}

/// 抽取结果
#[derive(Debug, Clone)]
pub struct Extraction {
    pub graph: OntologyGraph,
    pub stats: ExtractionStats,
}

/// 原始类声明
#[derive(Debug, Default, Clone)]
struct RawClass {
    iri: String,
    /// (语言, 文本)
    labels: Vec<(Option<String>, String)>,
    alt_labels: Vec<String>,
    parents: Vec<String>,
    /// (属性IRI, 目标IRI)
    restrictions: Vec<(String, String)>,
    /// (属性本地名, 值)
    annotations: Vec<(String, String)>,
}

/// 当前文本要写入的位置
#[derive(Debug, Clone)]
enum TextTarget {
    Label(Option<String>),
    AltLabel,
    Annotation(String),
}

#[derive(Debug, Default)]
struct PendingRestriction {
    property: Option<String>,
    target: Option<String>,
}

/// RDF/XML 状态机
struct OwlParser {
    classes: Vec<RawClass>,
    current: Option<RawClass>,
    depth: usize,
    class_depth: usize,
    seen_root: bool,
    restriction: Option<PendingRestriction>,
    text_target: Option<TextTarget>,
    text: String,
}

impl OwlParser {
    fn new() -> Self {
        Self {
            classes: Vec::new(),
            current: None,
            depth: 0,
            class_depth: 0,
            seen_root: false,
            restriction: None,
            text_target: None,
            text: String::new(),
        }
    }

    fn handle_start(&mut self, e: &BytesStart<'_>) -> Result<(), OntologyError> {
        self.depth += 1;
        let name = local_name(e);

        if self.depth == 1 {
            if name != "RDF" {
                return Err(OntologyError::SourceFormat(format!(
                    "根元素应为 rdf:RDF，实际为 {}",
                    name
                )));
            }
            self.seen_root = true;
            return Ok(());
        }

        if self.current.is_none() {
            if name == "Class" {
                if let Some(iri) = attr(e, b"about")? {
                    self.current = Some(RawClass {
                        iri,
                        ..Default::default()
                    });
                    self.class_depth = self.depth;
                }
            }
            return Ok(());
        }

        let direct_child = self.depth == self.class_depth + 1;
        match name.as_str() {
            "subClassOf" if direct_child => {
                if let Some(parent) = attr(e, b"resource")? {
                    if let Some(class) = self.current.as_mut() {
                        class.parents.push(parent);
                    }
                }
            }
            "Restriction" => {
                self.restriction = Some(PendingRestriction::default());
            }
            "onProperty" | "someValuesFrom" | "hasValue" => {
                self.restriction_ref(&name, e)?;
            }
            "label" if direct_child => {
                self.text_target = Some(TextTarget::Label(attr(e, b"lang")?));
                self.text.clear();
            }
            "altLabel" if direct_child => {
                self.text_target = Some(TextTarget::AltLabel);
                self.text.clear();
            }
            _ if direct_child => {
                self.text_target = Some(TextTarget::Annotation(name));
                self.text.clear();
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_empty(&mut self, e: &BytesStart<'_>) -> Result<(), OntologyError> {
        let name = local_name(e);
        if self.current.is_none() {
            // 只有声明、没有内容的类
            if name == "Class" && self.depth == 1 {
                if let Some(iri) = attr(e, b"about")? {
                    self.classes.push(RawClass {
                        iri,
                        ..Default::default()
                    });
                }
            }
            return Ok(());
        }

        let direct_child = self.depth == self.class_depth;
        match name.as_str() {
            "subClassOf" if direct_child => {
                if let Some(parent) = attr(e, b"resource")? {
                    if let Some(class) = self.current.as_mut() {
                        class.parents.push(parent);
                    }
                }
            }
            "onProperty" | "someValuesFrom" | "hasValue" => {
                self.restriction_ref(&name, e)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn restriction_ref(&mut self, name: &str, e: &BytesStart<'_>) -> Result<(), OntologyError> {
        let Some(restriction) = self.restriction.as_mut() else {
            return Ok(());
        };
        let Some(value) = attr(e, b"resource")? else {
            return Ok(());
        };
        if name == "onProperty" {
            restriction.property = Some(value);
        } else {
            restriction.target = Some(value);
        }
        Ok(())
    }

    fn handle_text(&mut self, text: &str) {
        if self.text_target.is_some() {
            self.text.push_str(text);
        }
    }

    fn handle_end(&mut self, name: &str) {
        if let Some(class) = self.current.as_mut() {
            if self.depth == self.class_depth + 1 {
                if let Some(target) = self.text_target.take() {
                    let value = self.text.trim().to_string();
                    if !value.is_empty() {
                        match target {
                            TextTarget::Label(lang) => class.labels.push((lang, value)),
                            TextTarget::AltLabel => class.alt_labels.push(value),
                            TextTarget::Annotation(key) => class.annotations.push((key, value)),
                        }
                    }
                    self.text.clear();
                }
            }

            if name == "Restriction" {
                if let Some(pending) = self.restriction.take() {
                    if let (Some(property), Some(target)) = (pending.property, pending.target) {
                        class.restrictions.push((property, target));
                    }
                }
            }

            if name == "Class" && self.depth == self.class_depth {
                if let Some(finished) = self.current.take() {
                    self.classes.push(finished);
                }
            }
        }
        self.depth = self.depth.saturating_sub(1);
    }
}

fn local_name(e: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(e.local_name().as_ref()).to_string()
}

/// 按本地名读取属性值（rdf:about / rdf:resource / xml:lang）
fn attr(e: &BytesStart<'_>, wanted: &[u8]) -> Result<Option<String>, OntologyError> {
    for attribute in e.attributes() {
        let attribute =
            attribute.map_err(|err| OntologyError::SourceFormat(format!("属性错误: {}", err)))?;
        if attribute.key.local_name().as_ref() == wanted {
            let value = attribute
                .unescape_value()
                .map_err(|err| OntologyError::SourceFormat(format!("属性值错误: {}", err)))?;
            return Ok(Some(value.into_owned()));
        }
    }
    Ok(None)
}

/// IRI 的本地名（# 或最后一个 / 之后的部分）
fn iri_local_name(iri: &str) -> &str {
    iri.rsplit(['#', '/']).next().unwrap_or(iri)
}

/// 选择规范标签：fr > 无语言标记 > en > 第一个
fn pick_label(labels: &[(Option<String>, String)]) -> Option<(usize, &str)> {
    let by_lang = |wanted: Option<&str>| {
        labels
            .iter()
            .position(|(lang, _)| lang.as_deref().map(|l| l.to_lowercase()).as_deref() == wanted)
    };
    by_lang(Some("fr"))
        .or_else(|| by_lang(None))
        .or_else(|| by_lang(Some("en")))
        .or(if labels.is_empty() { None } else { Some(0) })
        .map(|i| (i, labels[i].1.as_str()))
}

fn weight_keyword(label: &str) -> Option<u8> {
    let normalized = normalize(label);
    WEIGHT_KEYWORDS
        .iter()
        .find(|(keyword, _)| *keyword == normalized)
        .map(|(_, weight)| *weight)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        normalize(value).as_str(),
        "true" | "1" | "yes" | "oui" | "vrai"
    )
}

/// 沿父链向上继承最近祖先的显式权重
fn inherit_weight(
    id: &str,
    parents: &HashMap<String, String>,
    explicit: &HashMap<String, u8>,
    max_depth: usize,
) -> Option<u8> {
    let mut visited: HashSet<&str> = HashSet::new();
    visited.insert(id);
    let mut current = parents.get(id);
    let mut hops = 0;

    while let Some(parent) = current {
        hops += 1;
        if hops > max_depth || !visited.insert(parent.as_str()) {
            return None;
        }
        if let Some(weight) = explicit.get(parent) {
            return Some(*weight);
        }
        current = parents.get(parent);
    }
    None
}

/// OWL 抽取器
pub struct OwlExtractor {
    config: ExtractionConfig,
}

impl Default for OwlExtractor {
    fn default() -> Self {
        Self::new(ExtractionConfig::default())
    }
}

impl OwlExtractor {
    pub fn new(config: ExtractionConfig) -> Self {
        Self { config }
    }

    /// 从文件抽取
    pub fn extract_file(&self, path: &Path) -> Result<Extraction, OntologyError> {
        let content = std::fs::read_to_string(path).map_err(|e| OntologyError::io(path, e))?;
        tracing::info!("开始抽取本体: {}", path.display());
        self.extract_str(&content)
    }

    /// 从字符串抽取
    pub fn extract_str(&self, xml: &str) -> Result<Extraction, OntologyError> {
        let classes = parse_classes(xml)?;
        let mut stats = ExtractionStats {
            classes_seen: classes.len(),
            ..Default::default()
        };

        // 第一遍：标签、同义词、注解
        let mut records: Vec<ConceptRecord> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut iri_to_id: HashMap<String, String> = HashMap::new();
        let mut weight_classes: HashMap<String, u8> = HashMap::new();

        for class in &classes {
            let Some((label_index, label)) = pick_label(&class.labels) else {
                tracing::debug!("跳过无标签的类: {}", class.iri);
                continue;
            };

            if let Some(weight) = weight_keyword(label) {
                weight_classes.insert(class.iri.clone(), weight);
                continue;
            }

            let id = stable_id(label);
            iri_to_id.insert(class.iri.clone(), id.clone());

            let position = match index.get(&id) {
                Some(position) => {
                    tracing::warn!("标签重复，合并到同一概念: {} ({})", label, class.iri);
                    stats.merged_duplicates += 1;
                    *position
                }
                None => {
                    records.push(ConceptRecord::new(label));
                    index.insert(id.clone(), records.len() - 1);
                    records.len() - 1
                }
            };
            let record = &mut records[position];

            let other_labels = class
                .labels
                .iter()
                .enumerate()
                .filter(|(i, _)| *i != label_index)
                .map(|(_, (_, text))| text);
            for synonym in other_labels.chain(class.alt_labels.iter()) {
                push_synonym(record, synonym);
            }

            apply_annotations(record, &class.annotations);
        }

        // 第一遍（续）：is-a 边，每个概念只有一个父节点
        let mut parents: HashMap<String, String> = HashMap::new();
        for class in &classes {
            let Some(id) = iri_to_id.get(&class.iri) else {
                continue;
            };
            for parent_iri in &class.parents {
                match iri_to_id.get(parent_iri) {
                    Some(parent_id) if parent_id != id => {
                        if parents.contains_key(id) {
                            tracing::debug!("忽略多余的父节点: {} -> {}", class.iri, parent_iri);
                            continue;
                        }
                        parents.insert(id.clone(), parent_id.clone());
                    }
                    Some(_) => {}
                    None if weight_classes.contains_key(parent_iri) => {}
                    None => {
                        tracing::warn!("父节点不存在，丢弃 is-a 边: {} -> {}", class.iri, parent_iri);
                        stats.dropped_edges += 1;
                    }
                }
            }
        }

        // 第二遍：限制表达式中的类型化关系
        let mut explicit_weights: HashMap<String, u8> = HashMap::new();
        let mut electrodes: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for relation in Relation::all() {
            stats.edges.insert(relation, 0);
        }

        for class in &classes {
            let Some(&position) = iri_to_id.get(&class.iri).and_then(|id| index.get(id)) else {
                continue;
            };
            let id = records[position].id.clone();

            for (property, target_iri) in &class.restrictions {
                let Some(relation) = self.relation_for(property) else {
                    tracing::debug!("未知属性，忽略: {}", property);
                    continue;
                };

                if relation == Relation::HasWeight {
                    match weight_classes.get(target_iri) {
                        Some(weight) => {
                            explicit_weights.insert(id.clone(), *weight);
                            *stats.edges.entry(relation).or_default() += 1;
                        }
                        None => {
                            tracing::warn!("权重目标不是权重类，丢弃: {} -> {}", class.iri, target_iri);
                            stats.dropped_edges += 1;
                        }
                    }
                    continue;
                }

                let Some(target_id) = iri_to_id.get(target_iri) else {
                    tracing::warn!(
                        "{} 的目标不存在，丢弃: {} -> {}",
                        relation.local_name(),
                        class.iri,
                        target_iri
                    );
                    stats.dropped_edges += 1;
                    continue;
                };

                if relation == Relation::HasElectrode {
                    let territory = records[position].label.clone();
                    let Some(electrode) = index.get(target_id).map(|i| records[*i].label.clone())
                    else {
                        continue;
                    };
                    let list = electrodes.entry(territory).or_default();
                    if !list.contains(&electrode) {
                        list.push(electrode);
                        *stats.edges.entry(relation).or_default() += 1;
                    }
                    continue;
                }

                let record = &mut records[position];
                let edges = match relation {
                    Relation::HasTerritory => &mut record.territories,
                    Relation::RequiresFinding => &mut record.implications,
                    Relation::Excludes => &mut record.exclusions,
                    Relation::HasNeighbor => &mut record.neighbors,
                    Relation::HasOriginStructure => &mut record.origin_structures,
                    Relation::HasEcgMorphology => &mut record.ecg_morphologies,
                    Relation::HasWeight | Relation::HasElectrode => continue,
                };
                if !edges.contains(target_id) {
                    edges.push(target_id.clone());
                    *stats.edges.entry(relation).or_default() += 1;
                }
            }
        }

        for (relation, count) in &stats.edges {
            if *count == 0 {
                tracing::warn!("未找到关系: {}", relation.local_name());
            }
        }

        // 权重解析：显式优先，否则继承
        for record in records.iter_mut() {
            record.parent = parents.get(&record.id).cloned();
            let weight = explicit_weights.get(&record.id).copied().or_else(|| {
                inherit_weight(
                    &record.id,
                    &parents,
                    &explicit_weights,
                    self.config.max_inheritance_depth,
                )
            });
            match weight {
                Some(w) => record.set_weight(w),
                None => stats.unweighted += 1,
            }
        }

        let (graph, dropped) = OntologyGraph::from_records(records, electrodes);
        stats.dropped_edges += dropped;
        stats.nodes = graph.len();
        for category in Category::all() {
            stats
                .per_category
                .insert(category, graph.by_category(category).len());
        }
        stats.territories = count_territory_nodes(&graph);

        tracing::info!(
            "本体抽取完成: {} 个类, {} 个节点, {} 个目录概念, 丢弃 {} 条边",
            stats.classes_seen,
            stats.nodes,
            graph.catalog().count(),
            stats.dropped_edges
        );

        Ok(Extraction { graph, stats })
    }

    /// 识别属性IRI对应的关系：先查配置中的完整IRI，再按本地名
    fn relation_for(&self, property_iri: &str) -> Option<Relation> {
        if let Some(relation) = self.config.relation_iris.get(property_iri) {
            return Some(*relation);
        }
        Relation::from_local_name(iri_local_name(property_iri))
    }
}

fn push_synonym(record: &mut ConceptRecord, synonym: &str) {
    let normalized = normalize(synonym);
    if normalized.is_empty() || normalized == normalize(&record.label) {
        return;
    }
    if record.synonyms.iter().any(|s| normalize(s) == normalized) {
        return;
    }
    record.synonyms.push(synonym.trim().to_string());
}

/// 注解按键值对读取，不作为关系
fn apply_annotations(record: &mut ConceptRecord, annotations: &[(String, String)]) {
    for (key, value) in annotations {
        match key.to_lowercase().as_str() {
            "importance" | "territoryimportance" => match Importance::parse(value) {
                Some(importance) => {
                    record.territory_meta.get_or_insert_with(TerritoryMeta::default).importance =
                        importance;
                }
                None => tracing::warn!("无法识别的重要性: {} ({})", value, record.label),
            },
            "mayhaveterritory" => {
                record
                    .territory_meta
                    .get_or_insert_with(TerritoryMeta::default)
                    .may_have_territory = parse_flag(value);
            }
            "mayhavemirror" => {
                record
                    .territory_meta
                    .get_or_insert_with(TerritoryMeta::default)
                    .may_have_mirror = parse_flag(value);
            }
            "morphologyinverted" => {
                record.morphology_inverted = parse_flag(value);
            }
            _ => {}
        }
    }
}

/// 区域目标及其所有后代
fn count_territory_nodes(graph: &OntologyGraph) -> usize {
    let mut seen: HashSet<String> = HashSet::new();
    let mut stack: Vec<String> = graph
        .iter()
        .flat_map(|c| c.territories.iter().cloned())
        .collect();

    while let Some(id) = stack.pop() {
        if seen.insert(id.clone()) {
            stack.extend(graph.children(&id).iter().cloned());
        }
    }
    seen.len()
}

/// 解析XML，收集原始类声明；格式错误是致命的
fn parse_classes(xml: &str) -> Result<Vec<RawClass>, OntologyError> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);
    let mut parser = OwlParser::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(ref e)) => parser.handle_start(e)?,
            Ok(Event::Empty(ref e)) => parser.handle_empty(e)?,
            Ok(Event::Text(ref e)) => {
                let text = e.unescape().map_err(|err| {
                    OntologyError::SourceFormat(format!(
                        "文本解码失败（位置 {}）: {}",
                        reader.buffer_position(),
                        err
                    ))
                })?;
                parser.handle_text(&text);
            }
            Ok(Event::CData(ref e)) => {
                let text = String::from_utf8_lossy(e).to_string();
                parser.handle_text(&text);
            }
            Ok(Event::End(ref e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                parser.handle_end(&name);
            }
            Ok(Event::Eof) => break,
            Err(err) => {
                return Err(OntologyError::SourceFormat(format!(
                    "XML解析失败（位置 {}）: {}",
                    reader.buffer_position(),
                    err
                )));
            }
            _ => {}
        }
    }

    if !parser.seen_root {
        return Err(OntologyError::SourceFormat("文档中没有 rdf:RDF 根元素".to_string()));
    }
    if parser.depth != 0 || parser.current.is_some() {
        return Err(OntologyError::SourceFormat("文档意外结束，存在未闭合的元素".to_string()));
    }

    Ok(parser.classes)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const SAMPLE_OWL: &str = include_str!("../../fixtures/ecg_sample.owl");

    pub(crate) fn sample_graph() -> OntologyGraph {
        OwlExtractor::default()
            .extract_str(SAMPLE_OWL)
            .unwrap()
            .graph
    }

    #[test]
    fn test_labels_synonyms_and_hierarchy() {
        let graph = sample_graph();

        let rs = graph.find_by_label("Rythme sinusal").unwrap();
        assert_eq!(rs.id, stable_id("Rythme sinusal"));
        assert!(rs.synonyms.contains(&"Sinus rhythm".to_string()));
        assert!(rs.synonyms.contains(&"RS".to_string()));
        assert_eq!(rs.parent.as_deref(), Some(stable_id("Rythme").as_str()));

        // 权重类不是概念
        assert!(graph.find_by_label("Majeur").is_none());
        // 无语言标记的标签
        assert!(graph.find_by_label("aVF").is_some());
    }

    #[test]
    fn test_explicit_and_inherited_weights() {
        let graph = sample_graph();

        let weight = |label: &str| graph.find_by_label(label).and_then(|c| c.weight);
        assert_eq!(weight("BAV 1er degré"), Some(3));
        assert_eq!(weight("PR allongé"), Some(2));
        // owl:hasValue 形式
        assert_eq!(weight("Trouble de conduction"), Some(3));
        // 继承
        assert_eq!(weight("BAV"), Some(3));
        assert_eq!(weight("STEMI"), Some(4));
        assert_eq!(
            graph.find_by_label("STEMI").unwrap().category,
            Some(Category::Urgent)
        );
    }

    #[test]
    fn test_inheritance_is_bounded_and_cycle_safe() {
        let graph = sample_graph();
        let weight = |label: &str| graph.find_by_label(label).and_then(|c| c.weight);

        assert_eq!(weight("Niveau 10"), Some(2));
        assert_eq!(weight("Niveau 11"), None);
        assert_eq!(weight("Cycle A"), None);
        assert_eq!(weight("Cycle B"), None);
        assert!(graph.catalog().all(|c| c.label != "Niveau 11"));
    }

    #[test]
    fn test_relations_and_annotations() {
        let graph = sample_graph();

        let bav1 = graph.find_by_label("BAV 1er degré").unwrap();
        assert_eq!(bav1.implications, vec![stable_id("PR allongé")]);
        // 悬空的邻近边被丢弃
        assert!(bav1.neighbors.is_empty());

        let stemi = graph.find_by_label("STEMI").unwrap();
        assert_eq!(stemi.territories.len(), 2);
        let meta = stemi.territory_meta.clone().unwrap();
        assert_eq!(meta.importance, Importance::Critical);
        assert!(meta.may_have_territory);
        assert!(meta.may_have_mirror);

        let esv = graph.find_by_label("Extrasystole ventriculaire").unwrap();
        assert!(esv.morphology_inverted);
        let profile = graph.morphology_profile(&esv.id);
        assert_eq!(profile.origin_structures, vec!["Ventricule droit"]);
        assert_eq!(profile.ecg_morphologies, vec!["Aspect de retard gauche"]);

        assert_eq!(graph.electrodes_for("Inférieur"), &["DII", "DIII", "aVF"]);
        assert!(graph.excludes(&stable_id("Fibrillation atriale"), &stable_id("Rythme sinusal")));
    }

    #[test]
    fn test_stats() {
        let extraction = OwlExtractor::default().extract_str(SAMPLE_OWL).unwrap();
        let stats = extraction.stats;

        assert_eq!(stats.classes_seen, 51);
        assert_eq!(stats.nodes, 47);
        assert_eq!(stats.per_category[&Category::Urgent], 2);
        assert_eq!(stats.per_category[&Category::Major], 5);
        assert_eq!(stats.per_category[&Category::PathologicalSign], 14);
        assert_eq!(stats.per_category[&Category::Descriptor], 4);
        assert_eq!(stats.unweighted, 22);
        assert_eq!(stats.dropped_edges, 1);
        assert_eq!(stats.edges[&Relation::HasElectrode], 6);
        assert_eq!(stats.edges[&Relation::HasTerritory], 3);
    }

    #[test]
    fn test_extraction_is_idempotent() {
        let extractor = OwlExtractor::default();
        let first = extractor.extract_str(SAMPLE_OWL).unwrap();
        let second = extractor.extract_str(SAMPLE_OWL).unwrap();

        let a: Vec<_> = first.graph.iter().cloned().collect();
        let b: Vec<_> = second.graph.iter().cloned().collect();
        assert_eq!(a, b);
        assert_eq!(first.graph.hierarchy(), second.graph.hierarchy());
        assert_eq!(first.stats, second.stats);
    }

    #[test]
    fn test_malformed_xml_is_fatal() {
        let broken = r#"<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
            xmlns:owl="http://www.w3.org/2002/07/owl#">
            <owl:Class rdf:about="http://x#A"><rdfs:label>A</rdfs:comment>
        </rdf:RDF>"#;
        let result = OwlExtractor::default().extract_str(broken);
        assert!(matches!(result, Err(OntologyError::SourceFormat(_))));

        let not_rdf = "<html><body/></html>";
        assert!(matches!(
            OwlExtractor::default().extract_str(not_rdf),
            Err(OntologyError::SourceFormat(_))
        ));
    }

    #[test]
    fn test_missing_relation_is_not_fatal() {
        let minimal = r#"<?xml version="1.0"?>
        <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                 xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
                 xmlns:owl="http://www.w3.org/2002/07/owl#">
            <owl:Class rdf:about="http://x#A"><rdfs:label>Onde T négative</rdfs:label></owl:Class>
        </rdf:RDF>"#;
        let extraction = OwlExtractor::default().extract_str(minimal).unwrap();
        assert_eq!(extraction.stats.nodes, 1);
        assert!(extraction.stats.edges.values().all(|c| *c == 0));
        assert_eq!(extraction.stats.unweighted, 1);
    }

    #[test]
    fn test_configured_relation_iri() {
        let opaque = r#"<?xml version="1.0"?>
        <rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
                 xmlns:rdfs="http://www.w3.org/2000/01/rdf-schema#"
                 xmlns:owl="http://www.w3.org/2002/07/owl#">
            <owl:Class rdf:about="http://x#W"><rdfs:label>Urgent</rdfs:label></owl:Class>
            <owl:Class rdf:about="http://x#A">
                <rdfs:label>Hyperkaliémie</rdfs:label>
                <rdfs:subClassOf>
                    <owl:Restriction>
                        <owl:onProperty rdf:resource="http://webprotege.stanford.edu/R9abc"/>
                        <owl:someValuesFrom rdf:resource="http://x#W"/>
                    </owl:Restriction>
                </rdfs:subClassOf>
            </owl:Class>
        </rdf:RDF>"#;
        let mut config = ExtractionConfig::default();
        config.relation_iris.insert(
            "http://webprotege.stanford.edu/R9abc".to_string(),
            Relation::HasWeight,
        );
        let graph = OwlExtractor::new(config).extract_str(opaque).unwrap().graph;
        assert_eq!(graph.find_by_label("Hyperkaliémie").unwrap().weight, Some(4));
    }
}
