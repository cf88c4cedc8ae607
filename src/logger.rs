use std::io::{self, Write};
use std::sync::Arc;
use chrono::Local;
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::RwLock;

use crate::orchestrator::RunSummary;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Silent = 0,    // Only the final summary
    Summary = 1,   // Phase milestones (default)
    Detailed = 2,  // Per-organization results and warnings
    Debug = 3,     // Everything
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }

    /// Matching `tracing` filter directive for library events
    pub fn tracing_directive(&self) -> &'static str {
        match self {
            VerbosityLevel::Silent => "error",
            VerbosityLevel::Summary => "warn",
            VerbosityLevel::Detailed => "info",
            VerbosityLevel::Debug => "debug",
        }
    }
}

/// Console reporter for a run: timestamped lines routed through the progress
/// bar so they never tear it.
#[derive(Clone)]
pub struct RunLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
}

impl RunLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
        }
    }

    /// Logger that prints nothing but errors; used by tests
    pub fn silent() -> Self {
        Self::new(VerbosityLevel::Silent)
    }

    pub fn verbosity(&self) -> VerbosityLevel {
        self.verbosity
    }

    pub fn info(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Summary {
            self.print_message("INFO", message);
        }
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", Local::now().format("%H:%M:%S%.3f"), level, message);

        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    pub async fn start_progress(&self, total_steps: u64, message: &str) {
        if self.verbosity == VerbosityLevel::Silent {
            return;
        }

        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message(message.to_string());

        let mut progress_guard = self.progress_bar.write().await;
        *progress_guard = Some(pb);
    }

    pub async fn update_progress(&self, message: &str) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.set_message(message.to_string());
        }
    }

    pub async fn advance_progress(&self, steps: u64) {
        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(steps);
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        let mut progress_guard = self.progress_bar.write().await;
        if let Some(pb) = progress_guard.take() {
            pb.finish_and_clear();
        }
        drop(progress_guard);

        self.info(final_message);
    }

    /// Always printed, whatever the verbosity
    pub fn print_final_summary(&self, summary: &RunSummary, output_file: &str) {
        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!("\n=== GTM DISCOVERY SUMMARY ===");
        println!("Duration: {:.2}s", summary.duration_secs);
        println!("Organizations: {}", summary.total);
        println!("  skipped (already tagged): {}", summary.skipped_existing);
        println!("  without website: {}", summary.no_website);
        println!("  processed: {}", summary.processed);
        println!("  found in main pass: {}", summary.found_in_main_pass);
        println!("  recovered by rescue pass: {}", summary.rescued);
        println!(
            "Still missing a tag ID: {} after main pass, {} after rescue",
            summary.missing_after_main.len(),
            summary.missing_after_rescue.len()
        );

        if !summary.missing_after_rescue.is_empty() {
            println!("\nOrganizations without a tag ID:");
            for label in &summary.missing_after_rescue {
                println!("  - {}", label);
            }
        }

        if !summary.multiple_containers.is_empty() {
            println!("\nOrganizations with more than one container ID (review recommended):");
            for entry in &summary.multiple_containers {
                println!("  - {} [{}]: {}", entry.label, entry.count, entry.tag_ids.join(", "));
            }
        }

        println!("\nOutput written to: {}", output_file);
    }
}
