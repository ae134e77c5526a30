//! Research Memory
//!
//! Deduplicated, capacity-bounded knowledge accumulated during one
//! research session

pub mod store;

pub use store::{format_fact_list, ResearchMemory, DEFAULT_RELEVANT_FACTS};
