//! # Optimizer Module
//!
//! Il motore di ottimizzazione, separato in sottomoduli:
//! - `plan`: calcolo del piano di elaborazione di un'immagine
//! - `engine`: orchestratore di una singola immagine (resize, strategie, conversione, commit)
//! - `batch`: elaborazione concorrente di molte immagini
//! - `locks`: serializzazione per identità

pub mod batch;
pub mod engine;
pub mod locks;
pub mod plan;

pub use batch::BatchReport;
pub use engine::{
    Artifact, OptimizationReport, OptimizationResult, Optimizer, ProcessedImage, Strategy, StrategyOutcome,
};
pub use locks::KeyedLocks;
pub use plan::ProcessingPlan;
