// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # test-genie core
//!
//! Coordinator for concurrently running code-modification agents: admission
//! with scope locks, duplicate and idempotency protection, subprocess
//! supervision and crash recovery.
//!
//! # Architecture
//!
//! | Layer | Module |
//! |-------|--------|
//! | Domain | [`domain`] |
//! | Application | [`application`] |
//! | Infrastructure | [`infrastructure`] |
//! | Presentation | [`presentation`] |

pub mod application;
pub mod domain;
pub mod infrastructure;
pub mod presentation;
