//! Program command implementation

use std::path::Path;

use hkflasher_core::halfkay::{ProgramProgress, ProgramStats};
use hkflasher_core::mcu::McuGeometry;
use hkflasher_core::session::{Session, SessionError, SessionOptions, SessionReport};
use hkflasher_core::transport::DeviceProvider;
use indicatif::{ProgressBar, ProgressStyle};

/// Progress reporter using an indicatif progress bar
struct IndicatifProgress {
    visible: bool,
    bar: Option<ProgressBar>,
}

impl IndicatifProgress {
    fn new(visible: bool) -> Self {
        Self { visible, bar: None }
    }
}

impl ProgramProgress for IndicatifProgress {
    fn programming(&mut self, total_blocks: usize) {
        let pb = if self.visible {
            ProgressBar::new(total_blocks as u64)
        } else {
            ProgressBar::hidden()
        };
        pb.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} blocks {msg}",
                )
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("#>-"),
        );
        pb.set_message("Programming");
        self.bar = Some(pb);
    }

    fn block_written(&mut self, index: usize, addr: u32) {
        if let Some(pb) = &self.bar {
            pb.set_position(index as u64 + 1);
            pb.set_message(format!("0x{:06X}", addr));
        }
    }

    fn complete(&mut self, stats: &ProgramStats) {
        if let Some(pb) = self.bar.take() {
            pb.finish_with_message("done");
        }
        log::info!(
            "Programmed {} blocks ({} skipped, {} bytes sent)",
            stats.blocks_written,
            stats.blocks_skipped,
            stats.bytes_sent
        );
    }
}

impl Drop for IndicatifProgress {
    fn drop(&mut self) {
        if let Some(pb) = self.bar.take() {
            pb.abandon_with_message("failed");
        }
    }
}

/// Run a programming session against `provider`
pub fn run_program<D: DeviceProvider>(
    provider: &mut D,
    geometry: McuGeometry,
    options: SessionOptions,
    file: Option<&Path>,
    show_progress: bool,
) -> Result<SessionReport, SessionError> {
    let mut progress = IndicatifProgress::new(show_progress);
    let report = Session::new(provider, geometry, options).run(file, &mut progress)?;

    log::debug!("Session finished: {:?}", report);
    Ok(report)
}
