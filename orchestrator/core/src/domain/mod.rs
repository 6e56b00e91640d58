// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Aggregates, value types, policies and the repository and host seams the
//! coordinator is built on.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure coordination model, no I/O

pub mod agent;
pub mod config;
pub mod containment;
pub mod degradation;
pub mod error;
pub mod execution;
pub mod failure;
pub mod file_operation;
pub mod host;
pub mod path_sanitizer;
pub mod provider;
pub mod repository;
pub mod scope;
pub mod security;
pub mod spawn_intent;
pub mod spawn_session;
pub mod validation;
