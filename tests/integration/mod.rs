// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

pub mod helpers;
pub mod manager_test;
pub mod orchestrator_test;
pub mod rate_limiter_test;
pub mod robots_resolver_test;
