//! ECG Grader - 基于本体的心电图判读评分
//!
//! 核心设计原则：
//! - 本体负责知识，评分只读快照
//! - 确定性匹配优先，Oracle只做补充
//! - 每一分都能给出解释

pub mod core;
pub mod storage;
