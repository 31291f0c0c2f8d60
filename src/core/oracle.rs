//! 语义相似度Oracle模块
//!
//! 负责与AI模型交互，判断两个医学概念之间的关系。
//!
//! 设计原则：
//! - Oracle只给出关系判断，分数由匹配引擎决定
//! - 输入只包含两段短文本和本体上下文
//! - 输出必须是结构化JSON
//! - 任何失败都交给确定性的兜底阶段处理

use crate::core::error::OracleError;
use crate::core::models::OracleConfig;
use crate::core::normalize::normalize;
use crate::core::ontology::MorphologyProfile;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// Oracle判断的关系
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Relationship {
    Equivalent,
    Child,
    Parent,
    Sibling,
    Different,
}

impl Relationship {
    /// 宽松解析（大小写、法语写法）
    pub fn parse(value: &str) -> Option<Self> {
        match normalize(value).as_str() {
            "equivalent" | "equivalence" | "same" => Some(Relationship::Equivalent),
            "child" | "enfant" | "fils" => Some(Relationship::Child),
            "parent" => Some(Relationship::Parent),
            "sibling" | "frere" | "soeur" => Some(Relationship::Sibling),
            "different" | "none" | "aucune" => Some(Relationship::Different),
            _ => None,
        }
    }
}

/// Oracle判断结果
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OracleVerdict {
    pub relationship: Relationship,
    /// 0-1
    pub confidence: f32,
    pub explanation: String,
}

impl OracleVerdict {
    pub fn new(relationship: Relationship, confidence: f32, explanation: impl Into<String>) -> Self {
        Self {
            relationship,
            confidence: confidence.clamp(0.0, 1.0),
            explanation: explanation.into(),
        }
    }
}

/// 期望概念的本体上下文
#[derive(Debug, Clone, Default, Serialize)]
pub struct OracleContext {
    pub synonyms: Vec<String>,
    pub parent: Option<String>,
    pub children: Vec<String>,
    pub implications: Vec<String>,
    pub neighbors: Vec<String>,
    pub morphology: Option<MorphologyProfile>,
}

impl OracleContext {
    /// 渲染为提示词中的一段文本
    fn render(&self) -> String {
        let mut lines = Vec::new();
        let join = |items: &[String]| items.join(", ");

        if !self.synonyms.is_empty() {
            lines.push(format!("- Synonymes : {}", join(&self.synonyms)));
        }
        if let Some(parent) = &self.parent {
            lines.push(format!("- Concept parent : {}", parent));
        }
        if !self.children.is_empty() {
            lines.push(format!("- Sous-types : {}", join(&self.children)));
        }
        if !self.implications.is_empty() {
            lines.push(format!("- Signes impliqués : {}", join(&self.implications)));
        }
        if !self.neighbors.is_empty() {
            lines.push(format!("- Concepts voisins : {}", join(&self.neighbors)));
        }
        if let Some(morphology) = &self.morphology {
            if !morphology.origin_structures.is_empty() || !morphology.ecg_morphologies.is_empty() {
                lines.push(format!(
                    "- Origine : {} ; morphologie ECG : {}{}",
                    join(&morphology.origin_structures),
                    join(&morphology.ecg_morphologies),
                    if morphology.inverted { " (inversée)" } else { "" }
                ));
            }
        }
        lines.join("\n")
    }
}

/// 语义相似度Oracle
#[async_trait]
pub trait SimilarityOracle: Send + Sync {
    async fn compare(
        &self,
        submitted: &str,
        expected: &str,
        context: Option<&OracleContext>,
    ) -> Result<OracleVerdict, OracleError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AiApiKind {
    OllamaGenerate,
    OpenAIChatCompletions,
    OpenAIResponses,
}

/// AI关系判断响应
#[derive(Debug, Deserialize)]
struct VerdictResponse {
    relationship: String,
    confidence: f32,
    #[serde(default)]
    explanation: String,
}

/// 远程模型Oracle
pub struct LlmOracle {
    /// AI配置
    config: OracleConfig,
    /// HTTP客户端
    client: reqwest::Client,
}

impl LlmOracle {
    /// 创建Oracle，客户端带请求超时
    pub fn new(config: OracleConfig) -> Result<Self, OracleError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { config, client })
    }

    /// 构建关系判断提示词
    fn build_prompt(&self, submitted: &str, expected: &str, context: Option<&OracleContext>) -> String {
        let context_block = context
            .map(|c| c.render())
            .filter(|s| !s.is_empty())
            .map(|s| format!("\nContexte ontologique du concept attendu :\n{}\n", s))
            .unwrap_or_default();

        format!(
            r#"Tu es un cardiologue qui corrige des interprétations d'ECG.
Compare le concept donné par l'étudiant au concept attendu.

Concept de l'étudiant : {}
Concept attendu : {}
{}
Réponds uniquement avec ce JSON (aucun autre texte) :
{{
  "relationship": "EQUIVALENT",
  "confidence": 0.85,
  "explanation": "justification courte"
}}

Règles :
1. relationship est l'une des valeurs EQUIVALENT, CHILD, PARENT, SIBLING, DIFFERENT
2. CHILD : le concept de l'étudiant est plus spécifique et implique le concept attendu
3. PARENT : le concept de l'étudiant est plus général ou n'est qu'un signe du concept attendu
4. SIBLING : même famille mais concepts distincts
5. confidence entre 0 et 1

Réponds uniquement avec le JSON."#,
            submitted, expected, context_block
        )
    }

    /// 调用AI API，返回模型输出文本
    async fn call_ai(&self, prompt: &str) -> Result<String, OracleError> {
        let (kind, endpoint) = normalize_endpoint(&self.config.api_endpoint)?;
        let body = request_body(kind, &self.config, prompt);
        let value = self.post_json(&endpoint, &body).await?;
        output_text(kind, &value).ok_or_else(|| OracleError::Parse("AI返回空响应".to_string()))
    }

    /// 发送JSON请求，配置了密钥时附带 Bearer 认证
    async fn post_json(
        &self,
        endpoint: &str,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, OracleError> {
        let mut request = self.client.post(endpoint).json(body);
        if !self.config.api_key.is_empty() {
            request = request.bearer_auth(&self.config.api_key);
        }
        Ok(request.send().await?.error_for_status()?.json().await?)
    }
}

#[async_trait]
impl SimilarityOracle for LlmOracle {
    async fn compare(
        &self,
        submitted: &str,
        expected: &str,
        context: Option<&OracleContext>,
    ) -> Result<OracleVerdict, OracleError> {
        let prompt = self.build_prompt(submitted, expected, context);
        let response = self.call_ai(&prompt).await?;
        let verdict = parse_verdict(&response)?;
        tracing::debug!(
            "Oracle判断: \"{}\" vs \"{}\" -> {:?} ({:.2})",
            submitted,
            expected,
            verdict.relationship,
            verdict.confidence
        );
        Ok(verdict)
    }
}

/// 端点归一化：允许只填主机或基地址
fn normalize_endpoint(raw: &str) -> Result<(AiApiKind, String), OracleError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(OracleError::Transport("AI API端点为空".to_string()));
    }

    // 统一去掉尾部斜杠，避免后续拼接出现双斜杠
    let endpoint = raw.trim_end_matches('/').to_string();

    // Ollama: 只填 host 时自动补齐到 /api/generate
    if endpoint.contains("11434") || endpoint.contains("ollama") {
        if endpoint.contains("/api/generate") {
            return Ok((AiApiKind::OllamaGenerate, endpoint));
        }
        return Ok((AiApiKind::OllamaGenerate, format!("{}/api/generate", endpoint)));
    }

    if endpoint.contains("/v1/responses") {
        return Ok((AiApiKind::OpenAIResponses, endpoint));
    }
    if endpoint.contains("/chat/completions") {
        return Ok((AiApiKind::OpenAIChatCompletions, endpoint));
    }

    // 常见的 OpenAI 兼容基地址（.../v1）
    if endpoint.ends_with("/v1") {
        return Ok((
            AiApiKind::OpenAIChatCompletions,
            format!("{}/chat/completions", endpoint),
        ));
    }

    if endpoint.contains("api.openai.com") && !endpoint.contains("/v1") {
        return Ok((
            AiApiKind::OpenAIChatCompletions,
            format!("{}/v1/chat/completions", endpoint),
        ));
    }

    // 兜底：认为填写的是完整接口路径
    Ok((AiApiKind::OpenAIChatCompletions, endpoint))
}

/// 各类接口的请求体
fn request_body(kind: AiApiKind, config: &OracleConfig, prompt: &str) -> serde_json::Value {
    match kind {
        AiApiKind::OllamaGenerate => serde_json::json!({
            "model": config.model_name,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": config.temperature,
                "num_predict": config.max_tokens,
            },
        }),
        AiApiKind::OpenAIChatCompletions => serde_json::json!({
            "model": config.model_name,
            "messages": [{ "role": "user", "content": prompt }],
            "temperature": config.temperature,
            "max_tokens": config.max_tokens,
        }),
        AiApiKind::OpenAIResponses => serde_json::json!({
            "model": config.model_name,
            "input": prompt,
            "temperature": config.temperature,
            "max_output_tokens": config.max_tokens,
        }),
    }
}

/// 从各类接口的响应中取出模型输出
fn output_text(kind: AiApiKind, value: &serde_json::Value) -> Option<String> {
    match kind {
        AiApiKind::OllamaGenerate => value.get("response").and_then(|v| v.as_str()).map(str::to_string),
        AiApiKind::OpenAIChatCompletions => value
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .map(str::to_string),
        AiApiKind::OpenAIResponses => responses_output_text(value),
    }
}

/// 兼容不同实现：优先 output_text，其次 output->content->text
fn responses_output_text(value: &serde_json::Value) -> Option<String> {
    if let Some(s) = value.get("output_text").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }

    value
        .get("output")
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.first())
        .and_then(|item| item.get("content"))
        .and_then(|v| v.as_array())
        .and_then(|arr| arr.iter().find_map(|c| c.get("text").and_then(|t| t.as_str())))
        .map(|s| s.to_string())
}

/// 从响应中提取JSON
fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find('{') {
        if let Some(end) = response.rfind('}') {
            if end > start {
                return &response[start..=end];
            }
        }
    }
    response
}

/// 解析关系判断响应
fn parse_verdict(response: &str) -> Result<OracleVerdict, OracleError> {
    let parsed: VerdictResponse = serde_json::from_str(extract_json(response))
        .map_err(|e| OracleError::Parse(format!("{}, 响应内容: {}", e, response)))?;

    let relationship = Relationship::parse(&parsed.relationship)
        .ok_or_else(|| OracleError::Parse(format!("未知关系: {}", parsed.relationship)))?;

    Ok(OracleVerdict::new(
        relationship,
        parsed.confidence,
        parsed.explanation,
    ))
}

/// 离线Oracle：永远不可用，迫使匹配引擎走文本相似度兜底
#[derive(Debug, Default, Clone, Copy)]
pub struct OfflineOracle;

#[async_trait]
impl SimilarityOracle for OfflineOracle {
    async fn compare(
        &self,
        _submitted: &str,
        _expected: &str,
        _context: Option<&OracleContext>,
    ) -> Result<OracleVerdict, OracleError> {
        Err(OracleError::Disabled)
    }
}

/// 脚本化Oracle（用于测试或演示）
///
/// 按归一化后的 (学生, 期望) 文本对查表。
#[derive(Debug, Default)]
pub struct ScriptedOracle {
    verdicts: HashMap<(String, String), OracleVerdict>,
    default_verdict: Option<OracleVerdict>,
    fail: bool,
    delay: Option<Duration>,
}

impl ScriptedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_verdict(mut self, submitted: &str, expected: &str, verdict: OracleVerdict) -> Self {
        self.verdicts
            .insert((normalize(submitted), normalize(expected)), verdict);
        self
    }

    pub fn with_default(mut self, verdict: OracleVerdict) -> Self {
        self.default_verdict = Some(verdict);
        self
    }

    /// 每次调用都返回传输错误
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    /// 每次调用前等待
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl SimilarityOracle for ScriptedOracle {
    async fn compare(
        &self,
        submitted: &str,
        expected: &str,
        _context: Option<&OracleContext>,
    ) -> Result<OracleVerdict, OracleError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail {
            return Err(OracleError::Transport("scripted failure".to_string()));
        }

        let key = (normalize(submitted), normalize(expected));
        Ok(self
            .verdicts
            .get(&key)
            .or(self.default_verdict.as_ref())
            .cloned()
            .unwrap_or_else(|| OracleVerdict::new(Relationship::Different, 1.0, "")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body_per_api() {
        let config = OracleConfig::default();
        let ollama = request_body(AiApiKind::OllamaGenerate, &config, "q");
        assert_eq!(ollama["prompt"], "q");
        assert_eq!(ollama["stream"], false);
        assert_eq!(ollama["options"]["num_predict"], 512);

        let chat = request_body(AiApiKind::OpenAIChatCompletions, &config, "q");
        assert_eq!(chat["messages"][0]["role"], "user");
        assert_eq!(chat["max_tokens"], 512);

        let responses = request_body(AiApiKind::OpenAIResponses, &config, "q");
        assert_eq!(responses["input"], "q");
        assert_eq!(responses["max_output_tokens"], 512);
    }

    #[test]
    fn test_output_text_per_api() {
        let ollama = serde_json::json!({ "response": "{}" });
        assert_eq!(output_text(AiApiKind::OllamaGenerate, &ollama).as_deref(), Some("{}"));

        let chat = serde_json::json!({ "choices": [{ "message": { "content": "ok" } }] });
        assert_eq!(output_text(AiApiKind::OpenAIChatCompletions, &chat).as_deref(), Some("ok"));
        assert_eq!(output_text(AiApiKind::OpenAIChatCompletions, &serde_json::json!({ "choices": [] })), None);

        let responses = serde_json::json!({ "output_text": "fin" });
        assert_eq!(output_text(AiApiKind::OpenAIResponses, &responses).as_deref(), Some("fin"));
    }

    #[test]
    fn test_extract_json() {
        let response = "Voici ma réponse :\n{\"relationship\": \"CHILD\", \"confidence\": 0.9}\nMerci";
        assert_eq!(
            extract_json(response),
            "{\"relationship\": \"CHILD\", \"confidence\": 0.9}"
        );
        assert_eq!(extract_json("pas de json"), "pas de json");
    }

    #[test]
    fn test_parse_verdict() {
        let verdict = parse_verdict(
            r#"<think>...</think>{"relationship":"equivalent","confidence":1.4,"explanation":"même entité"}"#,
        )
        .unwrap();
        assert_eq!(verdict.relationship, Relationship::Equivalent);
        assert_eq!(verdict.confidence, 1.0);

        assert!(matches!(
            parse_verdict(r#"{"relationship":"COUSIN","confidence":0.9}"#),
            Err(OracleError::Parse(_))
        ));
        assert!(matches!(parse_verdict("rien"), Err(OracleError::Parse(_))));
    }

    #[test]
    fn test_normalize_endpoint() {
        let (kind, url) = normalize_endpoint("http://localhost:11434/").unwrap();
        assert_eq!(kind, AiApiKind::OllamaGenerate);
        assert_eq!(url, "http://localhost:11434/api/generate");

        let (kind, url) = normalize_endpoint("https://api.openai.com").unwrap();
        assert_eq!(kind, AiApiKind::OpenAIChatCompletions);
        assert_eq!(url, "https://api.openai.com/v1/chat/completions");

        let (kind, _) = normalize_endpoint("https://example.org/v1/responses").unwrap();
        assert_eq!(kind, AiApiKind::OpenAIResponses);

        assert!(normalize_endpoint("  ").is_err());
    }

    #[test]
    fn test_responses_output_text() {
        let value = serde_json::json!({
            "output": [{"content": [{"type": "output_text", "text": "{}"}]}]
        });
        assert_eq!(responses_output_text(&value).as_deref(), Some("{}"));
    }

    #[test]
    fn test_context_render() {
        let context = OracleContext {
            synonyms: vec!["PR long".to_string()],
            parent: Some("Trouble de conduction".to_string()),
            ..Default::default()
        };
        let text = context.render();
        assert!(text.contains("Synonymes : PR long"));
        assert!(text.contains("Concept parent : Trouble de conduction"));
        assert!(!text.contains("Sous-types"));
    }

    #[tokio::test]
    async fn test_scripted_oracle() {
        let oracle = ScriptedOracle::new()
            .with_verdict("ACFA", "Fibrillation atriale", OracleVerdict::new(Relationship::Equivalent, 0.95, ""));

        let verdict = oracle.compare("acfa", "fibrillation atriale", None).await.unwrap();
        assert_eq!(verdict.relationship, Relationship::Equivalent);

        let verdict = oracle.compare("autre", "chose", None).await.unwrap();
        assert_eq!(verdict.relationship, Relationship::Different);

        let failing = ScriptedOracle::new().failing();
        assert!(failing.compare("a", "b", None).await.is_err());
        assert!(matches!(
            OfflineOracle.compare("a", "b", None).await,
            Err(OracleError::Disabled)
        ));
    }
}
