//! 文本归一化模块
//!
//! 所有比较都在归一化后的文本上进行：小写、去除变音符号、标点转空格。

use std::collections::HashSet;
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// 归一化文本
///
/// "Sus-décalage  ST" -> "sus decalage st"
pub fn normalize(text: &str) -> String {
    let folded: String = text
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(|c| c.to_lowercase())
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    folded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// 切分为归一化后的词
pub fn tokens(text: &str) -> Vec<String> {
    normalize(text)
        .split(' ')
        .filter(|t| !t.is_empty())
        .map(|t| t.to_string())
        .collect()
}

/// 有意义的词（长度 >= 2）
pub fn significant_tokens(text: &str) -> Vec<String> {
    tokens(text)
        .into_iter()
        .filter(|t| t.chars().count() >= 2)
        .collect()
}

/// 以词为边界的包含判断，两侧都必须是已归一化的文本
pub fn contains_phrase(haystack: &str, needle: &str) -> bool {
    if needle.is_empty() || haystack.is_empty() {
        return false;
    }
    let padded_haystack = format!(" {} ", haystack);
    let padded_needle = format!(" {} ", needle);
    padded_haystack.contains(&padded_needle)
}

/// 词集合的 Jaccard 相似度
pub fn token_jaccard(a: &str, b: &str) -> f32 {
    let set_a: HashSet<String> = tokens(a).into_iter().collect();
    let set_b: HashSet<String> = tokens(b).into_iter().collect();

    if set_a.is_empty() && set_b.is_empty() {
        return 0.0;
    }

    let intersection = set_a.intersection(&set_b).count();
    let union = set_a.union(&set_b).count();
    intersection as f32 / union as f32
}

/// 两段归一化文本的长度比（短/长），用于包含匹配的质量评分
pub fn length_ratio(a: &str, b: &str) -> f32 {
    let la = a.chars().count();
    let lb = b.chars().count();
    if la == 0 || lb == 0 {
        return 0.0;
    }
    la.min(lb) as f32 / la.max(lb) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_strips_diacritics_and_punctuation() {
        assert_eq!(normalize("  Sus-décalage  ST "), "sus decalage st");
        assert_eq!(normalize("BAV 1er degré"), "bav 1er degre");
        assert_eq!(normalize("Électrode aVF"), "electrode avf");
    }

    #[test]
    fn test_contains_phrase_respects_word_boundaries() {
        assert!(contains_phrase("pericardite sus decalage inferieur", "pericardite"));
        assert!(!contains_phrase("diffuse", "di"));
        assert!(!contains_phrase("", "st"));
    }

    #[test]
    fn test_token_jaccard() {
        assert_eq!(token_jaccard("onde T negative", "onde T négative"), 1.0);
        let sim = token_jaccard("bloc de branche droit", "bloc de branche gauche");
        assert!((sim - 0.6).abs() < 1e-6);
        assert_eq!(token_jaccard("", ""), 0.0);
    }

    #[test]
    fn test_significant_tokens_drops_single_chars() {
        assert_eq!(significant_tokens("Onde T ample"), vec!["onde", "ample"]);
    }
}
