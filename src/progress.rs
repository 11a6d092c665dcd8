//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il progress tracking e le statistiche di un batch.
//!
//! ## Responsabilità:
//! - Progress bar visual con `indicatif` per feedback real-time
//! - Tracking statistiche del batch (immagini processate, ottimizzate, fallite)
//! - Calcolo byte risparmiati e percentuale di riduzione complessiva
//!
//! ## Statistiche tracciate:
//! - **processed**: Totale immagini elaborate
//! - **optimized**: Immagini sostituite con la versione ottimizzata
//! - **failed**: Immagini lasciate intatte per un errore
//! - **total_original_size** / **total_new_size**: Somme delle dimensioni
//!
//! ## Visual feedback:
//! ```text
//! ⠋ [00:00:12] [========================>---------------] 42/70 (60%) 2024/05/cat.jpg: 38.12% saved
//! ```

use crate::file_manager::FileManager;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// Manages progress reporting for a batch
#[derive(Clone)]
pub struct ProgressManager {
    bar: ProgressBar,
}

impl ProgressManager {
    /// Create a new progress manager
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);

        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        bar.set_style(style);
        bar.enable_steady_tick(Duration::from_millis(100));

        Self { bar }
    }

    /// Hidden bar, for library callers without a terminal
    pub fn hidden() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Update progress with a message
    pub fn update(&self, message: &str) {
        self.bar.inc(1);
        self.bar.set_message(message.to_string());
    }

    /// Finish with a final message
    pub fn finish(&self, message: &str) {
        self.bar.finish_with_message(message.to_string());
    }

    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        if let Ok(style) = ProgressStyle::default_spinner().template("{spinner:.green} {msg}") {
            spinner.set_style(style);
        }

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Counters for a batch run
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BatchStats {
    pub processed: usize,
    pub optimized: usize,
    pub failed: usize,
    pub total_original_size: u64,
    pub total_new_size: u64,
}

impl BatchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_optimized(&mut self, original_size: u64, new_size: u64) {
        self.processed += 1;
        self.optimized += 1;
        self.total_original_size += original_size;
        self.total_new_size += new_size;
    }

    pub fn add_failed(&mut self) {
        self.processed += 1;
        self.failed += 1;
    }

    pub fn bytes_saved(&self) -> i64 {
        self.total_original_size as i64 - self.total_new_size as i64
    }

    pub fn overall_reduction_percent(&self) -> f64 {
        FileManager::savings_percent(self.total_original_size, self.total_new_size)
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Processed: {} images | Optimized: {} | Failed: {} | Total saved: {} ({:.2}%)",
            self.processed,
            self.optimized,
            self.failed,
            FileManager::format_signed_size(self.bytes_saved()),
            self.overall_reduction_percent()
        )
    }
}
