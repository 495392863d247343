//! Scripted reaction engine (C7): evaluates a bot's active logic
//! templates against an incoming event and produces zero or more
//! outbound LINE messages, or defers to the RAG/LLM pipeline per the
//! AI-takeover override rule. Pure functions over data assembled by the
//! orchestrator — no I/O, no storage of its own.

pub mod action;
pub mod engine;
pub mod error;
pub mod flex;
pub mod types;

pub use engine::evaluate;
pub use error::{LogicError, Result};
pub use types::{
    Block, BlockType, EvalOutcome, EventBlockData, FlexMessageLookup, LogicEvent, LogicTemplate,
    NoFlexMessages, OutboundMessage, ReplyBlockData,
};
