// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod blocking_monitor;
pub mod circuit_breaker;
pub mod guard;
pub mod reqwest_engine;
pub mod traits;
