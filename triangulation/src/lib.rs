//! Triangulation Library
//!
//! Deterministic building blocks for multi-provider race summaries:
//! - Corpus store with checksum deduplication and similarity retrieval
//! - Provider contract, error taxonomy, and local confidence scoring
//! - Pairwise agreement and the triangulation arbiter
//! - Retry/backoff schedule and process-wide usage counters
//!
//! # Data Flow
//!
//! ```text
//! CorpusStore::query ──► RetrievedContext ──► prompts ──► SummaryProvider::call (×N)
//!                                                              │
//!                         ConsensusResult ◄── arbitrate ◄──────┘
//! ```
//!
//! The networked half (HTTP providers, engine, orchestrator) lives in the
//! `race-agents` crate.

#![allow(clippy::uninlined_format_args)]

pub mod agreement;
pub mod arbiter;
pub mod confidence;
pub mod corpus;
pub mod issues;
pub mod otel;
pub mod provider;
pub mod resilience;
pub mod usage;

// Re-export key corpus types
pub use corpus::{
    ContentFragment, CorpusQuery, CorpusStore, Embedder, HashingEmbedder, IngestOutcome,
    JsonlCorpusStore, MemoryCorpusStore, RetrievedContext, SharedCorpusStore, SourceType,
    StorageError, StorageResult,
};

// Re-export key provider types
pub use provider::{
    Completion, MockProvider, MockStep, ModelParams, ModelTier, ProviderError, ProviderErrorKind,
    ProviderId, ProviderRequest, ProviderResponse, SummaryProvider, TokenUsage,
};

// Re-export arbitration types
pub use agreement::{StancePolarity, DEFAULT_AGREEMENT_THRESHOLD};
pub use arbiter::{arbitrate, AgreementMethod, ArbiterPolicy, ConsensusResult};
pub use confidence::{score_response, ConfidenceLevel};
pub use issues::{CanonicalIssue, TaskType, UnitKey};

// Re-export resilience and usage types
pub use resilience::{RetryOutcome, RetryPolicy, MAX_ATTEMPTS};
pub use usage::{ProviderUsage, SharedUsageTracker, UsageSnapshot, UsageTracker};
