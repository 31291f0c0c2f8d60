//! 本体图模块
//!
//! 概念以稳定ID为键存放在一个只读的"竞技场"中，所有边都只是ID列表，
//! 不持有活引用。图在一次抽取中构建，之后只读；重新抽取时整体替换。

use crate::core::normalize::normalize;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap, HashSet, VecDeque};
use std::sync::{Arc, RwLock};

/// 保留的"镜像"节点标签（归一化后）
pub const MIRROR_LABELS: [&str; 2] = ["miroir", "mirror"];

/// 根据规范标签生成稳定ID
///
/// 只依赖归一化后的标签，不依赖源本体的IRI，因此重新导出后ID不变。
pub fn stable_id(label: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(normalize(label).as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// 严重程度分类，由权重唯一决定
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 4 - 急症
    Urgent,
    /// 3 - 主要诊断
    Major,
    /// 2 - 病理征象
    PathologicalSign,
    /// 1 - 描述项
    Descriptor,
}

impl Category {
    pub fn from_weight(weight: u8) -> Option<Self> {
        match weight {
            4 => Some(Category::Urgent),
            3 => Some(Category::Major),
            2 => Some(Category::PathologicalSign),
            1 => Some(Category::Descriptor),
            _ => None,
        }
    }

    pub fn weight(&self) -> u8 {
        match self {
            Category::Urgent => 4,
            Category::Major => 3,
            Category::PathologicalSign => 2,
            Category::Descriptor => 1,
        }
    }

    pub fn all() -> [Category; 4] {
        [
            Category::Urgent,
            Category::Major,
            Category::PathologicalSign,
            Category::Descriptor,
        ]
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Category::Urgent => write!(f, "urgent"),
            Category::Major => write!(f, "majeur"),
            Category::PathologicalSign => write!(f, "signe pathologique"),
            Category::Descriptor => write!(f, "descripteur"),
        }
    }
}

/// 八种类型化关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Relation {
    HasWeight,
    HasElectrode,
    HasTerritory,
    RequiresFinding,
    Excludes,
    HasNeighbor,
    HasOriginStructure,
    HasEcgMorphology,
}

impl Relation {
    pub fn all() -> [Relation; 8] {
        [
            Relation::HasWeight,
            Relation::HasElectrode,
            Relation::HasTerritory,
            Relation::RequiresFinding,
            Relation::Excludes,
            Relation::HasNeighbor,
            Relation::HasOriginStructure,
            Relation::HasEcgMorphology,
        ]
    }

    /// 属性IRI的本地名
    pub fn local_name(&self) -> &'static str {
        match self {
            Relation::HasWeight => "hasWeight",
            Relation::HasElectrode => "hasElectrode",
            Relation::HasTerritory => "hasTerritory",
            Relation::RequiresFinding => "requiresFinding",
            Relation::Excludes => "excludes",
            Relation::HasNeighbor => "hasNeighbor",
            Relation::HasOriginStructure => "hasOriginStructure",
            Relation::HasEcgMorphology => "hasEcgMorphology",
        }
    }

    /// 按本地名识别关系
    pub fn from_local_name(name: &str) -> Option<Self> {
        Relation::all()
            .into_iter()
            .find(|r| r.local_name().eq_ignore_ascii_case(name))
    }
}

/// 区域重要性
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Importance {
    /// 必须给出区域
    Critical,
    Important,
    #[default]
    Optional,
}

impl Importance {
    /// 解析注解值（兼容法语写法）
    pub fn parse(value: &str) -> Option<Self> {
        match normalize(value).as_str() {
            "critical" | "critique" => Some(Importance::Critical),
            "important" | "importante" => Some(Importance::Important),
            "optional" | "optionnel" | "optionnelle" => Some(Importance::Optional),
            _ => None,
        }
    }
}

/// 区域注解元数据
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TerritoryMeta {
    pub importance: Importance,
    pub may_have_territory: bool,
    pub may_have_mirror: bool,
}

/// 概念节点
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptRecord {
    /// 稳定ID（标签哈希）
    pub id: String,
    /// 规范标签
    pub label: String,
    /// 同义词
    #[serde(default)]
    pub synonyms: Vec<String>,
    /// 权重 1-4；无法解析的节点为 None，不进入目录
    pub weight: Option<u8>,
    pub category: Option<Category>,
    /// is-a 父节点，缓存中由 hierarchy 表单独保存
    #[serde(skip)]
    pub parent: Option<String>,
    /// 必然伴随的发现
    #[serde(default)]
    pub implications: Vec<String>,
    /// 可能的区域（抽象或具体位置，可含"镜像"节点）
    #[serde(default)]
    pub territories: Vec<String>,
    /// 互斥概念
    #[serde(default)]
    pub exclusions: Vec<String>,
    /// 邻近概念（仅评分使用）
    #[serde(default)]
    pub neighbors: Vec<String>,
    #[serde(default)]
    pub origin_structures: Vec<String>,
    #[serde(default)]
    pub ecg_morphologies: Vec<String>,
    #[serde(default)]
    pub morphology_inverted: bool,
    #[serde(default)]
    pub territory_meta: Option<TerritoryMeta>,
}

impl ConceptRecord {
    /// 由标签创建空节点
    pub fn new(label: &str) -> Self {
        Self {
            id: stable_id(label),
            label: label.trim().to_string(),
            synonyms: Vec::new(),
            weight: None,
            category: None,
            parent: None,
            implications: Vec::new(),
            territories: Vec::new(),
            exclusions: Vec::new(),
            neighbors: Vec::new(),
            origin_structures: Vec::new(),
            ecg_morphologies: Vec::new(),
            morphology_inverted: false,
            territory_meta: None,
        }
    }

    /// 设置权重并同步分类
    pub fn set_weight(&mut self, weight: u8) {
        self.weight = Some(weight);
        self.category = Category::from_weight(weight);
    }

    /// 严重程度，未加权节点为0
    pub fn severity(&self) -> u8 {
        self.weight.unwrap_or(0)
    }

    pub fn is_mirror(&self) -> bool {
        MIRROR_LABELS.contains(&normalize(&self.label).as_str())
    }
}

/// 预先归一化的检索词
#[derive(Debug, Clone, Default)]
pub struct SearchTerms {
    pub label: String,
    pub synonyms: Vec<String>,
    /// 标签+同义词拼接
    pub joined: String,
}

/// 形态学画像（取决于解剖起源的概念使用）
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct MorphologyProfile {
    pub origin_structures: Vec<String>,
    pub ecg_morphologies: Vec<String>,
    pub inverted: bool,
}

/// 只读本体图
#[derive(Debug, Clone, Default)]
pub struct OntologyGraph {
    concepts: HashMap<String, ConceptRecord>,
    /// 文档顺序
    order: Vec<String>,
    children: HashMap<String, Vec<String>>,
    neighbor_index: HashMap<String, Vec<String>>,
    territory_electrodes: BTreeMap<String, Vec<String>>,
    terms: HashMap<String, SearchTerms>,
}

impl OntologyGraph {
    /// 从节点列表构建图
    ///
    /// 悬空的边目标会被丢弃并记录日志，返回被丢弃的边数。
    pub fn from_records(
        records: Vec<ConceptRecord>,
        territory_electrodes: BTreeMap<String, Vec<String>>,
    ) -> (Self, usize) {
        let known: HashSet<String> = records.iter().map(|r| r.id.clone()).collect();
        let mut dropped = 0usize;

        let mut graph = OntologyGraph {
            territory_electrodes,
            ..Default::default()
        };

        for mut record in records {
            if graph.concepts.contains_key(&record.id) {
                tracing::warn!("重复的概念ID，忽略: {} ({})", record.label, record.id);
                continue;
            }

            if let Some(parent) = &record.parent {
                if !known.contains(parent) || parent == &record.id {
                    tracing::warn!("丢弃悬空的父节点引用: {} -> {}", record.label, parent);
                    record.parent = None;
                    dropped += 1;
                }
            }

            for (relation, edges) in [
                ("requiresFinding", &mut record.implications),
                ("hasTerritory", &mut record.territories),
                ("excludes", &mut record.exclusions),
                ("hasNeighbor", &mut record.neighbors),
                ("hasOriginStructure", &mut record.origin_structures),
                ("hasEcgMorphology", &mut record.ecg_morphologies),
            ] {
                edges.retain(|target| {
                    let keep = known.contains(target);
                    if !keep {
                        tracing::warn!("丢弃悬空的{}边: {} -> {}", relation, record.label, target);
                        dropped += 1;
                    }
                    keep
                });
                let mut seen = HashSet::new();
                edges.retain(|target| seen.insert(target.clone()));
            }

            graph.order.push(record.id.clone());
            graph.concepts.insert(record.id.clone(), record);
        }

        for id in &graph.order {
            let record = &graph.concepts[id];
            if let Some(parent) = &record.parent {
                graph
                    .children
                    .entry(parent.clone())
                    .or_default()
                    .push(id.clone());
            }
            for neighbor in &record.neighbors {
                graph
                    .neighbor_index
                    .entry(id.clone())
                    .or_default()
                    .push(neighbor.clone());
                graph
                    .neighbor_index
                    .entry(neighbor.clone())
                    .or_default()
                    .push(id.clone());
            }

            let label = normalize(&record.label);
            let synonyms: Vec<String> = record
                .synonyms
                .iter()
                .map(|s| normalize(s))
                .filter(|s| !s.is_empty())
                .collect();
            let mut joined = label.clone();
            for s in &synonyms {
                joined.push(' ');
                joined.push_str(s);
            }
            graph.terms.insert(
                id.clone(),
                SearchTerms {
                    label,
                    synonyms,
                    joined,
                },
            );
        }

        for list in graph.neighbor_index.values_mut() {
            let mut seen = HashSet::new();
            list.retain(|n| seen.insert(n.clone()));
        }

        if dropped > 0 {
            tracing::warn!("构建本体图时共丢弃 {} 条悬空边", dropped);
        }

        (graph, dropped)
    }

    pub fn len(&self) -> usize {
        self.concepts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.concepts.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&ConceptRecord> {
        self.concepts.get(id)
    }

    /// 按文档顺序遍历所有节点
    pub fn iter(&self) -> impl Iterator<Item = &ConceptRecord> {
        self.order.iter().filter_map(|id| self.concepts.get(id))
    }

    /// 目录：已解析权重的概念
    pub fn catalog(&self) -> impl Iterator<Item = &ConceptRecord> {
        self.iter().filter(|c| c.weight.is_some())
    }

    pub fn by_category(&self, category: Category) -> Vec<&ConceptRecord> {
        self.catalog()
            .filter(|c| c.category == Some(category))
            .collect()
    }

    /// 按规范标签查找（归一化后完全相等）
    pub fn find_by_label(&self, label: &str) -> Option<&ConceptRecord> {
        let wanted = normalize(label);
        self.order
            .iter()
            .find(|id| self.terms.get(*id).map(|t| t.label == wanted).unwrap_or(false))
            .and_then(|id| self.concepts.get(id))
    }

    pub fn search_terms(&self, id: &str) -> Option<&SearchTerms> {
        self.terms.get(id)
    }

    pub fn label_of(&self, id: &str) -> Option<&str> {
        self.concepts.get(id).map(|c| c.label.as_str())
    }

    pub fn parent(&self, id: &str) -> Option<&ConceptRecord> {
        self.concepts
            .get(id)
            .and_then(|c| c.parent.as_deref())
            .and_then(|p| self.concepts.get(p))
    }

    pub fn children(&self, id: &str) -> &[String] {
        self.children.get(id).map(|v| v.as_slice()).unwrap_or(&[])
    }

    /// 邻近关系（对称）
    pub fn neighbors(&self, id: &str) -> &[String] {
        self.neighbor_index
            .get(id)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// 蕴含闭包
    ///
    /// 沿 requires-finding 边传递，并沿 is-a 边从子到父上溯：
    /// 概念蕴含其祖先，并继承祖先的必然发现。不含起点自身。
    pub fn implication_closure(&self, id: &str) -> HashSet<String> {
        let mut visited: HashSet<String> = HashSet::new();
        let mut queue: VecDeque<String> = VecDeque::new();
        visited.insert(id.to_string());
        queue.push_back(id.to_string());

        while let Some(current) = queue.pop_front() {
            let Some(record) = self.concepts.get(&current) else {
                continue;
            };
            let next = record.parent.iter().chain(record.implications.iter());
            for target in next {
                if visited.insert(target.clone()) {
                    queue.push_back(target.clone());
                }
            }
        }

        visited.remove(id);
        visited
    }

    /// source 是否蕴含 target
    pub fn implies(&self, source: &str, target: &str) -> bool {
        source != target && self.implication_closure(source).contains(target)
    }

    /// 两个概念是否互斥（任一方向）
    pub fn excludes(&self, a: &str, b: &str) -> bool {
        let forward = self
            .concepts
            .get(a)
            .map(|c| c.exclusions.iter().any(|e| e == b))
            .unwrap_or(false);
        let backward = self
            .concepts
            .get(b)
            .map(|c| c.exclusions.iter().any(|e| e == a))
            .unwrap_or(false);
        forward || backward
    }

    /// 区域标签 -> 电极集合
    pub fn territory_electrodes(&self) -> &BTreeMap<String, Vec<String>> {
        &self.territory_electrodes
    }

    pub fn electrodes_for(&self, territory_label: &str) -> &[String] {
        self.territory_electrodes
            .get(territory_label)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// 子节点ID -> 父节点ID
    pub fn hierarchy(&self) -> BTreeMap<String, String> {
        self.iter()
            .filter_map(|c| c.parent.as_ref().map(|p| (c.id.clone(), p.clone())))
            .collect()
    }

    pub fn morphology_profile(&self, id: &str) -> MorphologyProfile {
        let Some(record) = self.concepts.get(id) else {
            return MorphologyProfile::default();
        };
        let labels = |ids: &[String]| -> Vec<String> {
            ids.iter()
                .filter_map(|i| self.label_of(i).map(|s| s.to_string()))
                .collect()
        };
        MorphologyProfile {
            origin_structures: labels(&record.origin_structures),
            ecg_morphologies: labels(&record.ecg_morphologies),
            inverted: record.morphology_inverted,
        }
    }

    /// 将ID列表转换为标签列表
    pub fn labels(&self, ids: &[String]) -> Vec<String> {
        ids.iter()
            .filter_map(|i| self.label_of(i).map(|s| s.to_string()))
            .collect()
    }
}

/// 本体存储：持有当前快照，支持原子替换
///
/// 读者拿到的是 `Arc` 克隆，重新抽取期间旧快照始终可用。
pub struct OntologyStore {
    current: RwLock<Arc<OntologyGraph>>,
}

impl OntologyStore {
    pub fn new(graph: OntologyGraph) -> Self {
        Self {
            current: RwLock::new(Arc::new(graph)),
        }
    }

    /// 获取当前快照
    pub fn snapshot(&self) -> Arc<OntologyGraph> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    /// 整体替换快照，返回旧快照
    pub fn replace(&self, graph: OntologyGraph) -> Arc<OntologyGraph> {
        let next = Arc::new(graph);
        let mut guard = match self.current.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let previous = std::mem::replace(&mut *guard, next);
        tracing::info!("本体快照已替换，共 {} 个节点", guard.len());
        previous
    }
}
