//! Application services: agents, gate, trackers, retrieval, routing and
//! the runner that drives them.

pub mod architect;
pub mod chapter_writer;
pub mod cost;
pub mod critic;
pub mod llm;
pub mod memory;
pub mod quality_gate;
pub mod rag;
pub mod runner;
pub mod scheduler;
pub mod style;
pub mod title;
pub mod trackers;
pub mod writer;

pub use architect::Architect;
pub use chapter_writer::{CancelFlag, ChapterWriter, PipelineOutcome, ProgressSink};
pub use cost::{CostGovernor, ProceedDecision};
pub use critic::{Critic, CriticReport};
pub use llm::AgentLlm;
pub use memory::MemoryManager;
pub use quality_gate::{GateOutcome, GateSeverity, GateThresholds, QualityGate};
pub use rag::RagService;
pub use runner::{BatchResult, ProjectSetup, Runner};
pub use scheduler::{Scheduler, TickResult};
pub use style::StyleRegistry;
pub use title::TitleChecker;
pub use writer::Writer;
