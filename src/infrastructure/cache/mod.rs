// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 缓存模块
///
/// 进程内、短 TTL 的抓取结果缓存
pub mod result_cache;
