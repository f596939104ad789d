//! Progress reporting with indicatif spinners

use indicatif::{ProgressBar, ProgressStyle};
use pdkprog_core::calibration::{CalibrationMeasurement, CalibrationPlan};
use pdkprog_core::session::Progress;
use pdkprog_core::{Error, Operation};
use std::time::Duration;

/// Progress reporter showing one spinner per device operation
///
/// Blank check and verify only show up in the debug log, the other steps
/// leave a "... done." line behind.
#[derive(Default)]
pub struct SpinnerProgress {
    current_bar: Option<ProgressBar>,
    calibration: Option<String>,
}

impl SpinnerProgress {
    pub fn new() -> Self {
        Self::default()
    }

    fn label(&self, operation: Operation) -> String {
        match operation {
            Operation::Probe => "Probing IC...".into(),
            Operation::Read => "Reading IC...".into(),
            Operation::Erase => "Erasing IC...".into(),
            Operation::BlankCheck => "Blank check IC...".into(),
            Operation::Write => "Writing IC...".into(),
            Operation::Verify => "Verifying IC...".into(),
            Operation::WriteFuse => "Writing IC Fuse...".into(),
            Operation::Calibrate => self
                .calibration
                .clone()
                .unwrap_or_else(|| "Calibrating IC...".into()),
            Operation::WriteCalibration => "Writing calibration...".into(),
        }
    }

    fn create_spinner(&mut self, message: String) {
        let pb = ProgressBar::new_spinner();
        pb.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        pb.set_message(message);
        pb.enable_steady_tick(Duration::from_millis(100));
        self.current_bar = Some(pb);
    }

    fn finish(&mut self, message: String) {
        if let Some(pb) = self.current_bar.take() {
            pb.set_style(
                ProgressStyle::default_spinner()
                    .template("{msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_spinner()),
            );
            pb.finish_with_message(message);
        }
    }
}

/// Result line of a calibration; band-gap tuning has no frequency to show
fn calibration_result(plan: &CalibrationPlan, measurement: &CalibrationMeasurement) -> Option<String> {
    if plan.target.is_oscillator() {
        Some(format!("calibration result: {}", measurement))
    } else {
        log::debug!("band gap calibrated (0x{:02X})", measurement.value);
        None
    }
}

fn log_only(operation: Operation) -> bool {
    matches!(operation, Operation::BlankCheck | Operation::Verify)
}

impl Progress for SpinnerProgress {
    fn started(&mut self, operation: Operation) {
        if log_only(operation) {
            log::debug!("{}", self.label(operation));
        } else {
            self.create_spinner(self.label(operation));
        }
    }

    fn finished(&mut self, operation: Operation) {
        let message = format!("{} done.", self.label(operation));
        if log_only(operation) {
            log::debug!("{}", message);
        } else {
            self.finish(message);
        }
    }

    fn failed(&mut self, operation: Operation, _error: &Error) {
        let message = format!("{} failed.", self.label(operation));
        if log_only(operation) {
            log::debug!("{}", message);
        } else {
            self.finish(message);
        }
    }

    fn calibrating(&mut self, plan: &CalibrationPlan) {
        self.calibration = Some(format!("Calibrating IC ({})...", plan));
    }

    fn calibrated(&mut self, plan: &CalibrationPlan, measurement: &CalibrationMeasurement) {
        if let Some(line) = calibration_result(plan, measurement) {
            println!("{}", line);
        }
        self.calibration = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdkprog_core::calibration::CalibrationTarget;

    fn plan(target: CalibrationTarget) -> CalibrationPlan {
        CalibrationPlan {
            target,
            frequency_hz: 8_000_000,
            millivolt: 4000,
            algorithm: 0,
            position: 0,
            loop_cycles: 0,
        }
    }

    #[test]
    fn test_calibration_result() {
        let measurement = CalibrationMeasurement {
            value: 0x84,
            frequency_hz: 7_999_820,
            bandgap_value: 0x55,
        };
        assert_eq!(
            calibration_result(&plan(CalibrationTarget::InternalHighSpeed), &measurement).as_deref(),
            Some("calibration result: 7999820Hz (0x84)")
        );
        assert_eq!(
            calibration_result(&plan(CalibrationTarget::HighSpeedAndBandGap), &measurement).as_deref(),
            Some("calibration result: 7999820Hz (0x84)")
        );
        assert_eq!(
            calibration_result(&plan(CalibrationTarget::BandGap), &measurement),
            None
        );
    }

    #[test]
    fn test_labels() {
        let mut progress = SpinnerProgress::new();
        assert_eq!(progress.label(Operation::Erase), "Erasing IC...");
        assert_eq!(progress.label(Operation::Calibrate), "Calibrating IC...");

        progress.calibrating(&plan(CalibrationTarget::BandGap));
        assert_eq!(progress.label(Operation::Calibrate), "Calibrating IC (@4.00V BG)...");
    }

    #[test]
    fn test_log_only_steps() {
        assert!(log_only(Operation::BlankCheck));
        assert!(log_only(Operation::Verify));
        assert!(!log_only(Operation::Write));
    }
}
