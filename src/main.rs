//! ECG Grader - 基于本体的心电图判读评分工具
//!
//! 命令行入口：抽取本体、评分、以及调试用的解析/拆解/区域查询。

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use ecg_grader::core::collaborators::{FeedbackGenerator, SummaryFeedback};
use ecg_grader::core::decomposer::ConceptDecomposer;
use ecg_grader::core::extractor::OwlExtractor;
use ecg_grader::core::grader::Grader;
use ecg_grader::core::models::{CaseKey, GraderConfig};
use ecg_grader::core::ontology::{OntologyGraph, OntologyStore};
use ecg_grader::core::oracle::{LlmOracle, OfflineOracle, SimilarityOracle};
use ecg_grader::core::territory::TerritoryResolver;
use ecg_grader::storage::cache::{self, CacheDocument, OntologyCache};
use ecg_grader::storage::config::ConfigManager;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser, Debug)]
#[command(name = "ecg-grader", version, about = "Évaluation d'interprétations ECG à partir d'une ontologie")]
struct Cli {
    /// 配置文件路径
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 从 OWL 文件重建快照缓存
    Extract {
        /// OWL/RDF-XML 源文件（缺省使用配置中的路径）
        #[arg(short, long)]
        source: Option<PathBuf>,
    },
    /// 对一份判读评分
    Grade {
        /// 病例标准答案（JSON）
        #[arg(short, long)]
        case: PathBuf,
        /// 判读文本
        #[arg(short, long, conflicts_with = "file")]
        text: Option<String>,
        /// 从文件读取判读文本
        #[arg(short, long)]
        file: Option<PathBuf>,
        /// 输出完整的 JSON 会话
        #[arg(long)]
        json: bool,
    },
    /// 查找文本对应的概念
    Resolve { text: String },
    /// 拆解复合短语
    Decompose { phrase: String },
    /// 查询概念的区域与电极
    Territories { concept: String },
    /// 配置管理
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// 显示当前配置
    Show,
    /// 显示配置文件路径
    Path,
    /// 重置为默认配置
    Reset,
}

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let manager = ConfigManager::new(cli.config.clone().unwrap_or_else(ConfigManager::default_path));
    let config = manager.load()?;

    match cli.command {
        Command::Extract { source } => run_extract(&config, source),
        Command::Grade { case, text, file, json } => run_grade(&config, case, text, file, json).await,
        Command::Resolve { text } => run_resolve(&config, &text),
        Command::Decompose { phrase } => run_decompose(&config, &phrase),
        Command::Territories { concept } => run_territories(&config, &concept),
        Command::Config { action } => run_config(&manager, &config, action),
    }
}

fn cache_for(config: &GraderConfig) -> OntologyCache {
    OntologyCache::new(config.cache_path.clone().unwrap_or_else(OntologyCache::default_path))
}

/// 读取快照：优先缓存，其次现场抽取并写入缓存
fn load_graph(config: &GraderConfig) -> Result<Arc<OntologyGraph>> {
    let cache = cache_for(config);
    if cache.exists() {
        let graph = cache.load()?;
        return Ok(Arc::new(graph));
    }

    let Some(source) = config.ontology_path.as_deref() else {
        bail!(
            "aucun cache à {} et aucune ontologie configurée (ontology_path)",
            cache.path().display()
        );
    };

    tracing::info!("缓存不存在，从源文件抽取: {}", source.display());
    let extraction = OwlExtractor::new(config.extraction.clone()).extract_file(source)?;
    cache.save(&CacheDocument::from_graph(&extraction.graph, Some(source)))?;
    Ok(Arc::new(extraction.graph))
}

fn run_extract(config: &GraderConfig, source: Option<PathBuf>) -> Result<()> {
    let Some(source) = source.or_else(|| config.ontology_path.clone()) else {
        bail!("aucune source OWL indiquée (--source ou ontology_path)");
    };

    let cache = cache_for(config);
    let store = OntologyStore::new(OntologyGraph::default());
    let extractor = OwlExtractor::new(config.extraction.clone());
    let stats = cache::rebuild(&store, &extractor, &source, &cache)?;

    println!("{}", serde_json::to_string_pretty(&stats)?);
    println!("Cache écrit : {}", cache.path().display());
    Ok(())
}

async fn run_grade(
    config: &GraderConfig,
    case: PathBuf,
    text: Option<String>,
    file: Option<PathBuf>,
    json: bool,
) -> Result<()> {
    let content = std::fs::read_to_string(&case)
        .with_context(|| format!("lecture du cas impossible: {}", case.display()))?;
    let case: CaseKey = serde_json::from_str(&content)
        .with_context(|| format!("cas invalide: {}", case.display()))?;

    let text = match (text, file) {
        (Some(text), _) => text,
        (None, Some(path)) => std::fs::read_to_string(&path)
            .with_context(|| format!("lecture de l'interprétation impossible: {}", path.display()))?,
        (None, None) => bail!("indiquer --text ou --file"),
    };

    let graph = load_graph(config)?;
    let oracle: Arc<dyn SimilarityOracle> = if config.oracle_enabled {
        Arc::new(LlmOracle::new(config.oracle.clone())?)
    } else {
        Arc::new(OfflineOracle)
    };

    let grader = Grader::new(graph, oracle, config);
    let session = grader.grade_text(&text, &case).await;

    if json {
        println!("{}", serde_json::to_string_pretty(&session)?);
    } else {
        println!("{}", SummaryFeedback.generate(&session));
    }
    Ok(())
}

fn run_resolve(config: &GraderConfig, text: &str) -> Result<()> {
    let graph = load_graph(config)?;
    let decomposer = ConceptDecomposer::new(graph);
    match decomposer.resolver().resolve_scored(text) {
        Some(hit) => println!(
            "{} [{}] {:?} ({}) catégorie={:?}",
            hit.concept.label, hit.concept.id, hit.stage, hit.score, hit.concept.category
        ),
        None => println!("Aucun concept trouvé pour « {} »", text),
    }
    Ok(())
}

fn run_decompose(config: &GraderConfig, phrase: &str) -> Result<()> {
    let graph = load_graph(config)?;
    let components = ConceptDecomposer::new(graph).decompose(phrase);
    println!("{}", serde_json::to_string_pretty(&components)?);
    Ok(())
}

fn run_territories(config: &GraderConfig, concept: &str) -> Result<()> {
    let graph = load_graph(config)?;
    let decomposer = ConceptDecomposer::new(Arc::clone(&graph));
    let Some(record) = decomposer.resolver().resolve(concept) else {
        bail!("concept inconnu: {}", concept);
    };

    let territories = TerritoryResolver::new(graph);
    let output = serde_json::json!({
        "concept": record.label,
        "territories": territories.resolve(&record.id),
        "selector": territories.should_show_selector(&record.id),
        "electrodes": territories.electrodes(&record.id),
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn run_config(manager: &ConfigManager, config: &GraderConfig, action: ConfigAction) -> Result<()> {
    match action {
        ConfigAction::Show => println!("{}", serde_json::to_string_pretty(config)?),
        ConfigAction::Path => println!("{}", manager.path().display()),
        ConfigAction::Reset => {
            manager.reset()?;
            println!("Configuration réinitialisée : {}", manager.path().display());
        }
    }
    Ok(())
}
