//! The histopathology laboratory model: configuration, entities, the
//! nine-stage pipeline, and KPI extraction, built on `hpath-kernel`'s
//! discrete-event machinery (spec §2, components 7-10: "Entities",
//! "Pipeline stages", "KPI extraction", "Job/run orchestration").

pub mod arrivals;
pub mod capacity_sched;
pub mod config;
pub mod entity;
pub mod job;
pub mod kpis;
pub mod model;
pub mod operators;
pub mod pipeline;

pub use config::Config;
pub use entity::{Block, BlockId, Slide, SlideId, Specimen, SpecimenId};
pub use job::{InMemoryJobStore, JobHandle, JobStatus, JobStore};
pub use kpis::Report;
pub use model::Model;
