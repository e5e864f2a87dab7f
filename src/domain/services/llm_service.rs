// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::settings::LlmSettings;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 文本生成接口
///
/// 单次补全调用，返回模型的原始文本输出。调用方负责校验输出格式。
#[async_trait]
pub trait TextGenerator: Send + Sync {
    async fn complete(&self, prompt: &str) -> Result<String>;
}

/// LLM服务 - 通过 OpenAI 兼容的 `/chat/completions` 接口生成文本
pub struct OpenAiTextGenerator {
    api_key: String,
    model: String,
    api_base_url: String,
    client: reqwest::Client,
}

impl OpenAiTextGenerator {
    pub fn new(api_key: String, model: String, api_base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .context("Failed to build LLM HTTP client")?;
        Ok(Self {
            api_key,
            model,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// 根据配置创建；未配置 API 密钥时返回 `None`，此时第二层提取被禁用
    pub fn from_settings(settings: &LlmSettings) -> Result<Option<Self>> {
        match settings.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(Some(Self::new(
                key.to_string(),
                settings.model.clone(),
                settings.api_base_url.clone(),
            )?)),
            _ => Ok(None),
        }
    }

    /// 调用接口并返回内容与令牌用量
    pub async fn complete_with_usage(&self, prompt: &str) -> Result<(String, TokenUsage)> {
        let request_body = json!({
            "model": self.model,
            "messages": [
                {
                    "role": "system",
                    "content": "You extract advertising statistics from raw page fragments. You output exactly one JSON object and nothing else."
                },
                {
                    "role": "user",
                    "content": prompt
                }
            ],
            "temperature": 0.0,
            "max_tokens": 200
        });

        let url = format!("{}/chat/completions", self.api_base_url);
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request_body)
            .send()
            .await
            .context("Failed to send request to LLM API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!(
                "LLM API returned error: {} - {}",
                status,
                error_text
            ));
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse LLM API response")?;

        let usage = if let Some(usage_val) = body.get("usage") {
            TokenUsage {
                prompt_tokens: usage_val["prompt_tokens"].as_u64().unwrap_or(0) as u32,
                completion_tokens: usage_val["completion_tokens"].as_u64().unwrap_or(0) as u32,
                total_tokens: usage_val["total_tokens"].as_u64().unwrap_or(0) as u32,
            }
        } else {
            TokenUsage::default()
        };

        let content = body["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid response format from LLM API"))?;

        Ok((content.to_string(), usage))
    }
}

#[async_trait]
impl TextGenerator for OpenAiTextGenerator {
    async fn complete(&self, prompt: &str) -> Result<String> {
        let (content, usage) = self.complete_with_usage(prompt).await?;
        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            "LLM completion finished"
        );
        Ok(content)
    }
}
