//! Core模块 - 本体、匹配与评分的核心逻辑

pub mod normalize;
pub mod error;
pub mod ontology;
pub mod models;
pub mod extractor;
pub mod resolver;
pub mod territory;
pub mod decomposer;
pub mod oracle;
pub mod matcher;
pub mod scoring;
pub mod collaborators;
pub mod grader;
