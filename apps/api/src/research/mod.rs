//! Company research: a DAG of report sections generated by the LLM, executed
//! by a background queue and assembled into a report.

pub mod generator;
pub mod handlers;
pub mod job;
pub mod lifecycle;
pub mod orchestrator;
pub mod plan;
pub mod prompts;
pub mod queue;
pub mod report;
pub mod sections;
pub mod status;
pub mod store;
