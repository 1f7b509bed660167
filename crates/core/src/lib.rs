//! Bandforge core: the agentic reading-passage pipeline and the text
//! diagnostics shared with the feedback endpoints.
//!
//! The pipeline is Architect -> Author -> Critic with self-correction: the
//! planner produces an outline once, then the controller loops the author
//! and auditor until a draft passes or the retry bound is reached. External
//! services (completion, grammar) sit behind traits so the loop is testable
//! without network access.

pub mod audit;
pub mod author;
pub mod backoff;
pub mod controller;
pub mod grammar;
pub mod llm;
pub mod passage;
pub mod planner;
pub mod readability;
