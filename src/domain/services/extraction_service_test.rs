// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use super::*;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};

struct CountingGenerator {
    calls: AtomicUsize,
    reply: String,
}

impl CountingGenerator {
    fn new(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicUsize::new(0),
            reply: reply.to_string(),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for CountingGenerator {
    async fn complete(&self, _prompt: &str) -> anyhow::Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.reply.clone())
    }
}

fn service_with(generator: Arc<CountingGenerator>) -> ExtractionService {
    ExtractionService::new(Some(generator), ExtractionConfig::default())
}

#[test]
fn test_pattern_prefers_ad_library_total_count() {
    let payload = r#"<script>{"ad_library_main":{"page_name":"Acme Shoes","totalCount":42}}</script>
        <div>7 results</div>"#;
    let found = extract_with_patterns(payload).unwrap();
    assert_eq!(found.total_active_ads, 42);
    assert_eq!(found.pattern, "ad_library_total_count");
    assert_eq!(found.advertiser_name.as_deref(), Some("Acme Shoes"));
}

#[test]
fn test_pattern_falls_through_to_results_text() {
    let payload = "<html><title>Acme | Meta</title><body><span>~1.2K results</span></body></html>";
    let found = extract_with_patterns(payload).unwrap();
    assert_eq!(found.total_active_ads, 1200);
    assert_eq!(found.pattern, "results_text");
    assert_eq!(found.advertiser_name.as_deref(), Some("Acme | Meta"));
}

#[test]
fn test_pattern_ignores_generic_title() {
    let payload = "<title>Meta Ad Library</title><body>3 ads</body>";
    let found = extract_with_patterns(payload).unwrap();
    assert_eq!(found.total_active_ads, 3);
    assert!(found.advertiser_name.is_none());
}

#[test]
fn test_pattern_no_match() {
    assert!(extract_with_patterns("<html><body>nothing to see</body></html>").is_none());
}

#[test]
fn test_parse_compact_count() {
    assert_eq!(parse_compact_count("3,400"), Some(3400));
    assert_eq!(parse_compact_count("3.400"), Some(3400));
    assert_eq!(parse_compact_count("1.2K"), Some(1200));
    assert_eq!(parse_compact_count("2 M"), Some(2_000_000));
    assert_eq!(parse_compact_count("17"), Some(17));
    assert_eq!(parse_compact_count("abc"), None);
    assert_eq!(parse_compact_count(""), None);
}

#[tokio::test]
async fn test_tier_two_not_invoked_when_pattern_matches() {
    let generator = CountingGenerator::new(r#"{"totalActiveAds": 99, "confidence": "high"}"#);
    let service = service_with(generator.clone());

    let outcome = service
        .extract("123", r#"{"search_results_count": 8, "pageName": "Acme"}"#)
        .await;

    assert_eq!(outcome.total_active_ads, 8);
    assert_eq!(outcome.tier, ExtractionTier::Pattern);
    assert_eq!(generator.calls(), 0);
}

#[tokio::test]
async fn test_tier_two_used_when_patterns_fail() {
    let generator = CountingGenerator::new(
        "Sure! Here it is:\n```json\n{\"totalActiveAds\": \"14\", \"advertiserName\": \"Acme\", \"confidence\": \"HIGH\"}\n```",
    );
    let service = service_with(generator.clone());
    let payload = r#"<html><body><script>window.__data = {"activeCount": "fourteen", "library": true};</script></body></html>"#;

    let outcome = service.extract("123", payload).await;

    assert_eq!(generator.calls(), 1);
    assert_eq!(outcome.tier, ExtractionTier::Ai);
    assert_eq!(outcome.total_active_ads, 14);
    assert_eq!(outcome.advertiser_name.as_deref(), Some("Acme"));
}

#[tokio::test]
async fn test_low_confidence_discarded() {
    let generator = CountingGenerator::new(r#"{"totalActiveAds": 5, "confidence": "low"}"#);
    let service = service_with(generator.clone());
    let payload = "<html><body><script>var library = {active: 'unknown'};</script></body></html>";

    let outcome = service.extract("123", payload).await;

    assert_eq!(generator.calls(), 1);
    assert_eq!(outcome, ExtractionOutcome::empty());
}

#[tokio::test]
async fn test_no_generator_returns_zero() {
    let service = ExtractionService::pattern_only(ExtractionConfig::default());
    let outcome = service.extract("123", "<html></html>").await;
    assert_eq!(outcome, ExtractionOutcome::empty());
}

#[test]
fn test_parse_ai_response_variants() {
    let ok = parse_ai_response(
        r#"{"totalActiveAds": 12.7, "advertiserName": "  Acme  ", "confidence": 0.9}"#,
        Confidence::Medium,
    )
    .unwrap();
    assert_eq!(ok.total_active_ads, 12);
    assert_eq!(ok.advertiser_name.as_deref(), Some("Acme"));
    assert_eq!(ok.confidence, Some(Confidence::High));

    let negative =
        parse_ai_response(r#"{"totalActiveAds": -4, "confidence": "medium"}"#, Confidence::Low)
            .unwrap();
    assert_eq!(negative.total_active_ads, 0);

    assert_eq!(
        parse_ai_response("no json here", Confidence::Low),
        Err(ExtractionError::NoJsonObject)
    );
    assert_eq!(
        parse_ai_response(r#"{"totalActiveAds": 3}"#, Confidence::Low),
        Err(ExtractionError::InvalidField("confidence"))
    );
    assert_eq!(
        parse_ai_response(r#"{"advertiserName": "x", "confidence": "high"}"#, Confidence::Low),
        Err(ExtractionError::InvalidField("totalActiveAds"))
    );
    assert_eq!(
        validate_ai_response(r#"{"totalActiveAds": 3, "confidence": "low"}"#, Confidence::High),
        AiExtraction::zero()
    );
}

#[test]
fn test_first_json_object_skips_braces_in_strings() {
    let text = r#"prefix {not json} then {"a": "}{", "b": {"c": 1}} trailing"#;
    let map = first_json_object(text).unwrap();
    assert_eq!(map.get("a").and_then(|v| v.as_str()), Some("}{"));
    assert!(map.get("b").unwrap().is_object());
}

#[test]
fn test_select_fragments_ranks_relevant_text() {
    let payload = r#"<html><body>
        <script>var analytics = 1;</script>
        <script>{"ad_library": {"results": [], "active": true}}</script>
        <p>About us</p>
        </body></html>"#;
    let fragments = select_fragments(payload, 1, "123");
    assert_eq!(fragments.len(), 1);
    assert!(fragments[0].contains("ad_library"));

    assert!(select_fragments(payload, 0, "123").is_empty());
}

#[test]
fn test_build_prompt_respects_budget() {
    let fragments = vec!["x".repeat(5_000), "y".repeat(5_000)];
    let prompt = build_prompt("123", &fragments, 1_000);
    assert!(prompt.chars().count() <= 1_000);
    assert!(prompt.contains("123"));
    assert!(prompt.contains("totalActiveAds"));
}
