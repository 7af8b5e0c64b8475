//! Batch orchestration of EnergyPlus simulations over building archetypes,
//! climate zones and climate-change weather scenarios.
//!
//! A run enumerates every (vintage, climate zone, scenario year, building)
//! combination from the input files on disk, drops the ones whose outputs are
//! already complete, splits the rest round-robin across workers and executes
//! each partition in order, isolating per-job failures.

pub mod completion;
pub mod config;
pub mod dispatch;
pub mod jobs;
pub mod plan;
pub mod report;
pub mod transition;
pub mod weather;

pub use completion::{CompletionOracle, CompletionPolicy, CompletionVerdict};
pub use config::{ConfigError, RunConfig};
pub use dispatch::worker::{run_batch, run_single, JobRecord, JobStatus};
pub use dispatch::{Dispatcher, EnergyPlusCli, JobExecutionFailed, SimulationEngine};
pub use jobs::{JobCodec, JobKey, SimulationJob};
pub use plan::{build_plan, Plan, PlanError};
pub use report::{PlanReport, Report, ReportFormat, RunReport};
pub use weather::WeatherResolver;
