//! 本体快照缓存
//!
//! 抽取结果以单个JSON文档持久化。保存时先写临时文件再重命名，
//! 读者永远不会看到写了一半的缓存。

use crate::core::error::OntologyError;
use crate::core::extractor::{ExtractionStats, OwlExtractor};
use crate::core::ontology::{Category, ConceptRecord, OntologyGraph, OntologyStore};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// 缓存格式版本
pub const CACHE_VERSION: u32 = 1;

/// 分类桶中的条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogEntry {
    pub id: String,
    pub label: String,
}

/// 四个严重程度分类桶
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CategoryBuckets {
    #[serde(default)]
    pub urgent: Vec<CatalogEntry>,
    #[serde(default)]
    pub major: Vec<CatalogEntry>,
    #[serde(default)]
    pub pathological_sign: Vec<CatalogEntry>,
    #[serde(default)]
    pub descriptor: Vec<CatalogEntry>,
}

impl CategoryBuckets {
    fn bucket_mut(&mut self, category: Category) -> &mut Vec<CatalogEntry> {
        match category {
            Category::Urgent => &mut self.urgent,
            Category::Major => &mut self.major,
            Category::PathologicalSign => &mut self.pathological_sign,
            Category::Descriptor => &mut self.descriptor,
        }
    }

    pub fn total(&self) -> usize {
        self.urgent.len() + self.major.len() + self.pathological_sign.len() + self.descriptor.len()
    }
}

/// 缓存文档
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheDocument {
    pub version: u32,
    pub extracted_at: DateTime<Utc>,
    /// 本体源文件
    #[serde(default)]
    pub source: Option<String>,
    pub categories: CategoryBuckets,
    /// 按ID排序的概念表
    pub concepts: BTreeMap<String, ConceptRecord>,
    #[serde(default)]
    pub territory_electrodes: BTreeMap<String, Vec<String>>,
    /// 子ID -> 父ID
    #[serde(default)]
    pub hierarchy: BTreeMap<String, String>,
}

impl CacheDocument {
    /// 由本体图生成缓存文档
    pub fn from_graph(graph: &OntologyGraph, source: Option<&Path>) -> Self {
        let mut categories = CategoryBuckets::default();
        for concept in graph.catalog() {
            if let Some(category) = concept.category {
                categories.bucket_mut(category).push(CatalogEntry {
                    id: concept.id.clone(),
                    label: concept.label.clone(),
                });
            }
        }

        Self {
            version: CACHE_VERSION,
            extracted_at: Utc::now(),
            source: source.map(|p| p.display().to_string()),
            categories,
            concepts: graph.iter().map(|c| (c.id.clone(), c.clone())).collect(),
            territory_electrodes: graph.territory_electrodes().clone(),
            hierarchy: graph.hierarchy(),
        }
    }

    /// 重建本体图，悬空边在此丢弃
    pub fn into_graph(self) -> (OntologyGraph, usize) {
        let hierarchy = self.hierarchy;
        let records: Vec<ConceptRecord> = self
            .concepts
            .into_values()
            .map(|mut record| {
                record.parent = hierarchy.get(&record.id).cloned();
                record
            })
            .collect();
        OntologyGraph::from_records(records, self.territory_electrodes)
    }
}

/// 缓存文件管理器
pub struct OntologyCache {
    path: PathBuf,
}

impl OntologyCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// 获取默认缓存路径
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "ecg", "EcgGrader")
            .map(|d| d.cache_dir().join("ontology.json"))
            .unwrap_or_else(|| PathBuf::from("ontology.json"))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// 原子保存
    pub fn save(&self, document: &CacheDocument) -> Result<(), OntologyError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| OntologyError::io(parent, e))?;
            }
        }

        let content = serde_json::to_string_pretty(document)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(|e| OntologyError::io(&tmp, e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| OntologyError::io(&self.path, e))?;

        tracing::info!(
            "本体缓存已保存: {} ({} 个概念，其中 {} 个已分类)",
            self.path.display(),
            document.concepts.len(),
            document.categories.total()
        );
        Ok(())
    }

    /// 读取缓存文档
    pub fn load_document(&self) -> Result<CacheDocument, OntologyError> {
        let content =
            std::fs::read_to_string(&self.path).map_err(|e| OntologyError::io(&self.path, e))?;
        let document: CacheDocument = serde_json::from_str(&content)?;
        if document.version != CACHE_VERSION {
            tracing::warn!(
                "缓存版本不一致: 期望 {}，实际 {}",
                CACHE_VERSION,
                document.version
            );
        }
        Ok(document)
    }

    /// 读取缓存并重建本体图
    pub fn load(&self) -> Result<OntologyGraph, OntologyError> {
        let document = self.load_document()?;
        let (graph, dropped) = document.into_graph();
        tracing::info!(
            "本体缓存已加载: {} ({} 个节点，丢弃 {} 条边)",
            self.path.display(),
            graph.len(),
            dropped
        );
        Ok(graph)
    }
}

/// 离线重建：抽取 -> 保存缓存 -> 替换快照
///
/// 任何一步失败都不会触碰现有缓存和快照。
pub fn rebuild(
    store: &OntologyStore,
    extractor: &OwlExtractor,
    source: &Path,
    cache: &OntologyCache,
) -> Result<ExtractionStats, OntologyError> {
    let extraction = extractor.extract_file(source)?;
    let document = CacheDocument::from_graph(&extraction.graph, Some(source));
    cache.save(&document)?;
    store.replace(extraction.graph);
    Ok(extraction.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::tests::{sample_graph, SAMPLE_OWL};
    use crate::core::ontology::stable_id;
    use tempfile::tempdir;

    #[test]
    fn test_cache_save_load_preserves_graph() {
        let dir = tempdir().unwrap();
        let cache = OntologyCache::new(dir.path().join("nested").join("ontology.json"));
        let graph = sample_graph();

        cache.save(&CacheDocument::from_graph(&graph, None)).unwrap();
        assert!(cache.exists());
        assert!(!cache.path().with_extension("json.tmp").exists());

        let loaded = cache.load().unwrap();
        assert_eq!(loaded.len(), graph.len());
        assert_eq!(loaded.hierarchy(), graph.hierarchy());
        assert_eq!(loaded.territory_electrodes(), graph.territory_electrodes());

        let bav1 = stable_id("BAV 1er degré");
        assert_eq!(loaded.get(&bav1), graph.get(&bav1));
        assert!(loaded.implies(&bav1, &stable_id("Trouble de conduction")));
    }

    #[test]
    fn test_cache_document_buckets() {
        let document = CacheDocument::from_graph(&sample_graph(), None);
        assert_eq!(document.categories.urgent.len(), 2);
        assert_eq!(document.categories.descriptor.len(), 4);
        assert_eq!(document.categories.total(), 25);
        assert_eq!(document.concepts.len(), 47);

        let json = serde_json::to_value(&document).unwrap();
        assert!(json["categories"]["pathological_sign"].is_array());
        assert!(json["extracted_at"].is_string());
    }

    #[test]
    fn test_loading_drops_dangling_edges() {
        let dir = tempdir().unwrap();
        let cache = OntologyCache::new(dir.path().join("ontology.json"));

        let mut document = CacheDocument::from_graph(&sample_graph(), None);
        let rs = stable_id("Rythme sinusal");
        if let Some(record) = document.concepts.get_mut(&rs) {
            record.exclusions.push("deadbeef".to_string());
        }
        document.hierarchy.insert(rs.clone(), "inconnu".to_string());
        cache.save(&document).unwrap();

        let (graph, dropped) = cache.load_document().unwrap().into_graph();
        assert_eq!(dropped, 2);
        assert!(graph.get(&rs).unwrap().exclusions.is_empty());
        assert!(graph.parent(&rs).is_none());
    }

    #[test]
    fn test_rebuild_is_all_or_nothing() {
        let dir = tempdir().unwrap();
        let source = dir.path().join("onto.owl");
        let cache = OntologyCache::new(dir.path().join("ontology.json"));
        let store = OntologyStore::new(OntologyGraph::default());
        let extractor = OwlExtractor::default();

        std::fs::write(&source, SAMPLE_OWL).unwrap();
        let stats = rebuild(&store, &extractor, &source, &cache).unwrap();
        assert_eq!(stats.nodes, 47);
        assert_eq!(store.snapshot().len(), 47);

        // 格式错误：缓存与快照保持不变
        let saved = std::fs::read_to_string(cache.path()).unwrap();
        std::fs::write(&source, "<rdf:RDF><owl:Class></rdf:RDF>").unwrap();
        let result = rebuild(&store, &extractor, &source, &cache);
        assert!(matches!(result, Err(OntologyError::SourceFormat(_))));
        assert_eq!(store.snapshot().len(), 47);
        assert_eq!(std::fs::read_to_string(cache.path()).unwrap(), saved);
    }
}
