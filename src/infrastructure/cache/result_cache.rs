// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use metrics::counter;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::utils::clock::Clock;

/// 缓存统计信息
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub stores: u64,
    pub entries: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// 缓存条目
#[derive(Clone)]
struct CacheEntry<V> {
    value: V,
    inserted_at: DateTime<Utc>,
    ttl: Duration,
    access_count: u64,
}

impl<V> CacheEntry<V> {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let age = now.signed_duration_since(self.inserted_at);
        // Entries from the future (clock set backwards) are treated as fresh
        age.to_std().map(|age| age > self.ttl).unwrap_or(false)
    }
}

/// 进程内结果缓存
///
/// 以目标+地区为键，按 TTL 过期；容量满时淘汰访问次数最少的条目。
pub struct ResultCache<V> {
    entries: DashMap<String, CacheEntry<V>>,
    default_ttl: Duration,
    max_entries: usize,
    clock: Arc<dyn Clock>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    stores: AtomicU64,
}

impl<V: Clone> ResultCache<V> {
    pub fn new(default_ttl: Duration, max_entries: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
            max_entries: max_entries.max(1),
            clock,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            stores: AtomicU64::new(0),
        }
    }

    /// 缓存键
    pub fn key(target_id: &str, region: &str) -> String {
        format!("{}:{}", target_id, region.to_ascii_uppercase())
    }

    /// 获取缓存值，过期条目视为未命中并被移除
    pub fn get(&self, key: &str) -> Option<V> {
        let now = self.clock.now();
        let mut expired = false;
        let hit = self.entries.get_mut(key).and_then(|mut entry| {
            if entry.is_expired(now) {
                expired = true;
                None
            } else {
                entry.access_count += 1;
                Some(entry.value.clone())
            }
        });
        // the shard guard is released before removal; a concurrent set may have replaced the entry
        if expired {
            self.entries.remove_if(key, |_, entry| entry.is_expired(now));
        }

        if hit.is_some() {
            self.hits.fetch_add(1, Ordering::Relaxed);
            counter!("adpulse_cache_hits_total").increment(1);
        } else {
            self.misses.fetch_add(1, Ordering::Relaxed);
            counter!("adpulse_cache_misses_total").increment(1);
        }
        hit
    }

    /// 写入缓存，`ttl` 为空时使用默认 TTL
    pub fn set(&self, key: &str, value: V, ttl: Option<Duration>) {
        if !self.entries.contains_key(key) && self.entries.len() >= self.max_entries {
            self.purge_expired();
            if self.entries.len() >= self.max_entries {
                self.evict_least_used();
            }
        }

        self.entries.insert(
            key.to_string(),
            CacheEntry {
                value,
                inserted_at: self.clock.now(),
                ttl: ttl.unwrap_or(self.default_ttl),
                access_count: 0,
            },
        );
        self.stores.fetch_add(1, Ordering::Relaxed);
    }

    pub fn delete(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
        debug!("Cleared result cache");
    }

    /// 清理所有过期条目，返回清理数量
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.entries.len())
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            stores: self.stores.load(Ordering::Relaxed),
            entries: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_least_used(&self) {
        let victim = self
            .entries
            .iter()
            .min_by_key(|entry| (entry.value().access_count, entry.value().inserted_at))
            .map(|entry| entry.key().clone());

        if let Some(key) = victim {
            self.entries.remove(&key);
            self.evictions.fetch_add(1, Ordering::Relaxed);
            debug!("Evicted cache entry {}", key);
        }
    }
}
