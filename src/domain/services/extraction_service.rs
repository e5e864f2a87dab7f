// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use metrics::counter;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::services::llm_service::TextGenerator;

/// 提取层级
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionTier {
    /// 第一层：确定性模式匹配
    Pattern,
    /// 第二层：AI 辅助解析
    Ai,
    /// 两层均未得到结果，降级为零值
    Fallback,
}

impl fmt::Display for ExtractionTier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ExtractionTier::Pattern => write!(f, "pattern"),
            ExtractionTier::Ai => write!(f, "ai"),
            ExtractionTier::Fallback => write!(f, "fallback"),
        }
    }
}

/// AI 结果置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Some(Confidence::Low),
            "medium" | "med" => Some(Confidence::Medium),
            "high" => Some(Confidence::High),
            _ => None,
        }
    }
}

/// 提取配置
#[derive(Debug, Clone)]
pub struct ExtractionConfig {
    /// 送入第二层的片段数量上限
    pub top_k_fragments: usize,
    /// 提示词总长度上限（字符）
    pub max_prompt_chars: usize,
    /// 低于该置信度的 AI 结果被丢弃
    pub min_confidence: Confidence,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            top_k_fragments: 5,
            max_prompt_chars: 8_000,
            min_confidence: Confidence::Medium,
        }
    }
}

/// 提取结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionOutcome {
    pub total_active_ads: u32,
    pub advertiser_name: Option<String>,
    pub tier: ExtractionTier,
}

impl ExtractionOutcome {
    /// 零值结果
    pub fn empty() -> Self {
        Self {
            total_active_ads: 0,
            advertiser_name: None,
            tier: ExtractionTier::Fallback,
        }
    }
}

/// 第一层匹配结果
#[derive(Debug, Clone, PartialEq)]
pub struct PatternMatch {
    pub total_active_ads: u32,
    pub advertiser_name: Option<String>,
    /// 命中的模式名称
    pub pattern: &'static str,
}

/// 经过校验的 AI 输出
#[derive(Debug, Clone, PartialEq)]
pub struct AiExtraction {
    pub total_active_ads: u32,
    pub advertiser_name: Option<String>,
    pub confidence: Option<Confidence>,
}

impl AiExtraction {
    pub fn zero() -> Self {
        Self {
            total_active_ads: 0,
            advertiser_name: None,
            confidence: None,
        }
    }
}

/// AI 输出校验错误，只在模块内部流转，不会抛给调用方
#[derive(Error, Debug, PartialEq)]
pub enum ExtractionError {
    #[error("no JSON object found in model output")]
    NoJsonObject,
    #[error("field `{0}` is missing or has the wrong type")]
    InvalidField(&'static str),
    #[error("confidence {actual:?} is below the required {required:?}")]
    LowConfidence {
        actual: Confidence,
        required: Confidence,
    },
}

struct CountPattern {
    name: &'static str,
    /// 若设置，只在该标记之后的窗口内搜索
    anchor: Option<&'static str>,
    regex: Regex,
}

const ANCHOR_WINDOW: usize = 20_000;
const MAX_FRAGMENT_CHARS: usize = 1_500;

const RELEVANCE_KEYWORDS: &[&str] = &[
    "totalcount",
    "total_count",
    "search_results_count",
    "active",
    "results",
    "ads",
    "ad_library",
    "page_name",
    "pagename",
    "count",
    "library",
];

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(regex) => Some(regex),
        Err(e) => {
            warn!("Invalid extraction pattern {}: {}", pattern, e);
            None
        }
    }
}

static COUNT_PATTERNS: Lazy<Vec<CountPattern>> = Lazy::new(|| {
    let specs: [(&'static str, Option<&'static str>, &str); 5] = [
        (
            "ad_library_total_count",
            Some("\"ad_library_main\""),
            r#""totalCount"\s*:\s*(?P<n>\d+)"#,
        ),
        (
            "search_results_count",
            None,
            r#""search_results_count"\s*:\s*(?P<n>\d+)"#,
        ),
        ("total_count", None, r#""total_count"\s*:\s*(?P<n>\d+)"#),
        (
            "results_text",
            None,
            r"(?i)~?\s*(?P<n>\d[\d,.]*\s?[km]?)\s+results?\b",
        ),
        (
            "ads_text",
            None,
            r"(?i)(?P<n>\d[\d,.]*\s?[km]?)\s+(?:active\s+)?ads\b",
        ),
    ];

    specs
        .into_iter()
        .filter_map(|(name, anchor, pattern)| {
            compile(pattern).map(|regex| CountPattern {
                name,
                anchor,
                regex,
            })
        })
        .collect()
});

static NAME_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r#""page_name"\s*:\s*"(?P<v>(?:[^"\\]|\\.)*)""#,
        r#""pageName"\s*:\s*"(?P<v>(?:[^"\\]|\\.)*)""#,
        r"(?is)<title[^>]*>(?P<v>[^<]+)</title>",
    ]
    .into_iter()
    .filter_map(compile)
    .collect()
});

/// 提取服务
///
/// 第一层按优先级顺序运行结构化模式，命中即返回；
/// 只有第一层失败且配置了文本生成器时才调用第二层。
pub struct ExtractionService {
    generator: Option<Arc<dyn TextGenerator>>,
    config: ExtractionConfig,
}

impl ExtractionService {
    pub fn new(generator: Option<Arc<dyn TextGenerator>>, config: ExtractionConfig) -> Self {
        Self { generator, config }
    }

    /// 仅使用第一层模式匹配
    pub fn pattern_only(config: ExtractionConfig) -> Self {
        Self::new(None, config)
    }

    /// 从原始页面中提取活跃广告数和广告主名称
    ///
    /// 永远不会返回错误：所有失败都降级为零值结果。
    pub async fn extract(&self, target_id: &str, payload: &str) -> ExtractionOutcome {
        if let Some(found) = extract_with_patterns(payload) {
            debug!(
                target_id,
                pattern = found.pattern,
                count = found.total_active_ads,
                "Tier-1 extraction matched"
            );
            return ExtractionOutcome {
                total_active_ads: found.total_active_ads,
                advertiser_name: found.advertiser_name,
                tier: ExtractionTier::Pattern,
            };
        }

        let Some(generator) = &self.generator else {
            debug!(target_id, "No tier-1 match and tier-2 is disabled");
            return ExtractionOutcome::empty();
        };

        // Html is not Send, so fragment selection must finish before the await below.
        let fragments = select_fragments(payload, self.config.top_k_fragments, target_id);
        if fragments.is_empty() {
            return ExtractionOutcome::empty();
        }
        let prompt = build_prompt(target_id, &fragments, self.config.max_prompt_chars);

        counter!("adpulse_tier2_invocations_total").increment(1);
        let text = match generator.complete(&prompt).await {
            Ok(text) => text,
            Err(e) => {
                warn!(target_id, "Tier-2 extraction call failed: {}", e);
                return ExtractionOutcome::empty();
            }
        };

        match parse_ai_response(&text, self.config.min_confidence) {
            Ok(ai) => ExtractionOutcome {
                total_active_ads: ai.total_active_ads,
                advertiser_name: ai.advertiser_name,
                tier: ExtractionTier::Ai,
            },
            Err(e) => {
                warn!(target_id, "Discarding tier-2 output: {}", e);
                ExtractionOutcome::empty()
            }
        }
    }
}

/// 第一层：按优先级运行结构化模式，返回第一个命中
pub fn extract_with_patterns(payload: &str) -> Option<PatternMatch> {
    for pattern in COUNT_PATTERNS.iter() {
        let haystack = match pattern.anchor {
            Some(anchor) => match payload.find(anchor) {
                Some(idx) => window(payload, idx, ANCHOR_WINDOW),
                None => continue,
            },
            None => payload,
        };

        let count = pattern
            .regex
            .captures_iter(haystack)
            .filter_map(|caps| caps.name("n"))
            .find_map(|m| parse_compact_count(m.as_str()));

        if let Some(total_active_ads) = count {
            return Some(PatternMatch {
                total_active_ads,
                advertiser_name: extract_name(payload),
                pattern: pattern.name,
            });
        }
    }
    None
}

/// 提取广告主名称
pub fn extract_name(payload: &str) -> Option<String> {
    for regex in NAME_PATTERNS.iter() {
        let Some(raw) = regex
            .captures(payload)
            .and_then(|caps| caps.name("v"))
            .map(|m| m.as_str())
        else {
            continue;
        };

        let decoded = serde_json::from_str::<String>(&format!("\"{}\"", raw))
            .unwrap_or_else(|_| raw.to_string());
        let name = decoded.trim();
        if name.is_empty() || is_generic_title(name) {
            continue;
        }
        return Some(name.to_string());
    }
    None
}

fn is_generic_title(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower == "ad library" || lower == "meta ad library" || lower.starts_with("log in")
}

/// 解析带千分位或 K/M 后缀的数字，如 `3,400`、`1.2K`
pub fn parse_compact_count(raw: &str) -> Option<u32> {
    let compact: String = raw.chars().filter(|c| !c.is_whitespace()).collect();
    if compact.is_empty() {
        return None;
    }

    let (number, multiplier) = match compact.chars().last() {
        Some('k') | Some('K') => (&compact[..compact.len() - 1], 1_000.0),
        Some('m') | Some('M') => (&compact[..compact.len() - 1], 1_000_000.0),
        _ => (compact.as_str(), 1.0),
    };

    let normalized = if multiplier > 1.0 {
        number.replace(',', ".")
    } else {
        let without_commas = number.replace(',', "");
        // "3.400" reads as a thousands separator, "2.5" does not
        match without_commas.split_once('.') {
            Some((_, frac)) if frac.len() == 3 && frac.chars().all(|c| c.is_ascii_digit()) => {
                without_commas.replace('.', "")
            }
            _ => without_commas,
        }
    };

    let value: f64 = normalized.trim_end_matches('.').parse().ok()?;
    if !value.is_finite() || value < 0.0 {
        return None;
    }
    Some((value * multiplier).floor().min(u32::MAX as f64) as u32)
}

/// 第二层：按关键词相关度挑选最有希望的原始片段
pub fn select_fragments(payload: &str, top_k: usize, target_id: &str) -> Vec<String> {
    if top_k == 0 {
        return Vec::new();
    }

    let document = Html::parse_document(payload);
    let mut raw_fragments: Vec<String> = Vec::new();

    if let Ok(selector) = Selector::parse("script") {
        for script in document.select(&selector) {
            let text: String = script.text().collect();
            if !text.trim().is_empty() {
                raw_fragments.push(text);
            }
        }
    }

    if let Ok(selector) = Selector::parse("body") {
        if let Some(body) = document.select(&selector).next() {
            let mut visible = String::new();
            for node in body.descendants() {
                let Some(text) = node.value().as_text() else {
                    continue;
                };
                let hidden = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| e.name()))
                    .is_some_and(|name| name == "script" || name == "style");
                let trimmed = text.trim();
                if !hidden && !trimmed.is_empty() {
                    visible.push_str(trimmed);
                    visible.push('\n');
                }
            }
            if !visible.is_empty() {
                raw_fragments.push(visible);
            }
        }
    }

    let mut scored: Vec<(usize, usize, String)> = raw_fragments
        .iter()
        .flat_map(|fragment| chunk(fragment, MAX_FRAGMENT_CHARS))
        .enumerate()
        .map(|(order, piece)| (relevance(piece, target_id), order, piece.to_string()))
        .filter(|(score, _, _)| *score > 0)
        .collect();

    // Highest score first, original order breaks ties
    scored.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    scored
        .into_iter()
        .take(top_k)
        .map(|(_, _, piece)| piece)
        .collect()
}

fn relevance(fragment: &str, target_id: &str) -> usize {
    let lower = fragment.to_ascii_lowercase();
    let keyword_hits: usize = RELEVANCE_KEYWORDS
        .iter()
        .map(|k| lower.matches(k).count())
        .sum();
    let target_hits = if target_id.is_empty() {
        0
    } else {
        fragment.matches(target_id).count() * 3
    };
    keyword_hits + target_hits
}

/// 组装长度受限的提示词
pub fn build_prompt(target_id: &str, fragments: &[String], max_chars: usize) -> String {
    let mut prompt = format!(
        "The following fragments come from an ad library page for advertiser page id {}.\n\
         Determine how many ads are currently active and the advertiser's display name.\n\
         Respond with exactly one JSON object of the form \
         {{\"totalActiveAds\": <integer>, \"advertiserName\": <string or null>, \"confidence\": \"low\"|\"medium\"|\"high\"}}.\n\
         Fragments:\n",
        target_id
    );

    for fragment in fragments {
        let used = prompt.chars().count();
        // separator is 5 chars
        if used + 5 >= max_chars {
            break;
        }
        prompt.push_str("---\n");
        prompt.push_str(truncate_chars(fragment, max_chars - used - 5));
        prompt.push('\n');
    }

    if prompt.chars().count() > max_chars {
        prompt = truncate_chars(&prompt, max_chars).to_string();
    }
    prompt
}

/// 解析并校验模型输出
pub fn parse_ai_response(
    text: &str,
    min_confidence: Confidence,
) -> Result<AiExtraction, ExtractionError> {
    let object = first_json_object(text).ok_or(ExtractionError::NoJsonObject)?;

    let total_active_ads = object
        .get("totalActiveAds")
        .and_then(coerce_count)
        .ok_or(ExtractionError::InvalidField("totalActiveAds"))?;

    let advertiser_name = match object.get("advertiserName") {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    };

    let confidence = object
        .get("confidence")
        .and_then(coerce_confidence)
        .ok_or(ExtractionError::InvalidField("confidence"))?;

    if confidence < min_confidence {
        return Err(ExtractionError::LowConfidence {
            actual: confidence,
            required: min_confidence,
        });
    }

    Ok(AiExtraction {
        total_active_ads,
        advertiser_name,
        confidence: Some(confidence),
    })
}

/// 校验模型输出，任何失败都返回零值
pub fn validate_ai_response(text: &str, min_confidence: Confidence) -> AiExtraction {
    parse_ai_response(text, min_confidence).unwrap_or_else(|_| AiExtraction::zero())
}

fn coerce_count(value: &Value) -> Option<u32> {
    match value {
        Value::Number(n) => {
            if let Some(v) = n.as_u64() {
                Some(v.min(u32::MAX as u64) as u32)
            } else if n.as_i64().is_some() {
                // negative integers
                Some(0)
            } else {
                n.as_f64()
                    .filter(|v| v.is_finite())
                    .map(|v| v.max(0.0).min(u32::MAX as f64) as u32)
            }
        }
        Value::String(s) => parse_compact_count(s),
        _ => None,
    }
}

fn coerce_confidence(value: &Value) -> Option<Confidence> {
    match value {
        Value::String(s) => Confidence::parse(s),
        Value::Number(n) => n.as_f64().filter(|v| (0.0..=1.0).contains(v)).map(|v| {
            if v >= 0.8 {
                Confidence::High
            } else if v >= 0.5 {
                Confidence::Medium
            } else {
                Confidence::Low
            }
        }),
        _ => None,
    }
}

/// 返回文本中第一个能完整解析的 JSON 对象
pub fn first_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut search_from = 0;
    while let Some(rel) = text[search_from..].find('{') {
        let start = search_from + rel;
        if let Some(candidate) = balanced_object(text, start) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                return Some(map);
            }
        }
        search_from = start + 1;
    }
    None
}

fn balanced_object(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_str = false;
    let mut escape = false;
    for (offset, ch) in text[start..].char_indices() {
        if in_str {
            if escape {
                escape = false;
            } else if ch == '\\' {
                escape = true;
            } else if ch == '"' {
                in_str = false;
            }
            continue;
        }
        match ch {
            '"' => in_str = true,
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn window(text: &str, start: usize, len: usize) -> &str {
    let mut end = (start + len).min(text.len());
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[start..end]
}

fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn chunk(text: &str, max_chars: usize) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut rest = text.trim();
    while !rest.is_empty() {
        let piece = truncate_chars(rest, max_chars);
        pieces.push(piece);
        rest = rest[piece.len()..].trim_start();
    }
    pieces
}

#[cfg(test)]
#[path = "extraction_service_test.rs"]
mod tests;
