//! # Vitalink Core Library
//!
//! This library provides the core business logic for the Vitalink
//! conversational engagement engine. It implements a CLI-first
//! philosophy where all operations are available via a standalone CLI
//! binary, with the delivery webhook being a thin layer over the same
//! core library.
//!
//! ## Architecture
//!
//! - **Engine**: Request-triggered inbound message handling (routing,
//!   check-in advancement, escalation) with the store as the only
//!   shared state
//! - **Gamification**: Streak, points, weekly-goal, and badge
//!   progression applied as one atomic ledger action
//! - **Dispatch**: Periodic sweep over the scheduled outbound queue
//! - **Storage**: SQLite-based persistence and TOML-based configuration
//!
//! ## Key Components
//!
//! - [`EngagementEngine`]: Inbound message orchestrator
//! - [`GamificationLedger`]: Points/streak/badge state transitions
//! - [`MessageDispatcher`]: Outbound queue processor
//! - [`Store`]: Persistence layer
//! - [`Config`]: Engine configuration management

pub mod badges;
pub mod checkin;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod gamification;
pub mod message;
pub mod patient;
pub mod protocol;
pub mod router;
pub mod services;
pub mod stats;
pub mod storage;
pub mod streak;
pub mod summary;

pub use badges::{BadgeCriteria, BadgeDefinition, CommunityKind, CATALOG};
pub use checkin::{CheckinState, CheckinStep, Choice};
pub use config::Config;
pub use dispatch::{DispatchReport, MessageDispatcher};
pub use engine::{EngagementEngine, HandleOutcome};
pub use error::{ConfigError, EngineError, StoreError, ValidationError};
pub use gamification::{ActionResult, GamificationLedger};
pub use message::{Message, MessageSource, ScheduledMessage, ScheduledStatus, Sender};
pub use patient::{GamificationState, Patient, PatientStatus, Perspective, PlanTier};
pub use protocol::{kickoff_cadence, schedule_protocol_messages, ProtocolAssignment};
pub use router::RouteAction;
pub use services::{
    Classification, HttpNlpService, HttpOutboundSender, Intent, NlpService, OutboundSender,
};
pub use stats::{StatsAggregator, StatsSnapshot};
pub use storage::Store;
pub use streak::{StreakOutcome, StreakUpdate};
pub use summary::{BadgeProgress, GamificationSummary, SummaryService};
