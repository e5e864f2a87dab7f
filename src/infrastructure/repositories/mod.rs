// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

/// 仓库实现模块
///
/// 进程内存储，目标列表可从 JSON 文件加载
pub mod memory_batch_repo;
pub mod memory_target_repo;
