//! Calibration coordination
//!
//! Firmware may carry a small stub that measures the internal oscillator or
//! band-gap trim when run on the IC. Such an image is written with the stub
//! in place, the programmer runs it live, and the measured value is patched
//! back into the image, which is then written again.
//!
//! Locating and rewriting the stub is the job of a [`CalibrationPatcher`].
//! This module only sequences the two calls around the live measurement.

use core::fmt;

use crate::chip::ChipDescriptor;
use crate::error::{Error, Result};
use crate::image::ProgramImage;

/// What a calibration stub tunes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CalibrationTarget {
    /// Internal high speed RC oscillator (IHRC)
    InternalHighSpeed,
    /// Internal low speed RC oscillator (ILRC)
    InternalLowSpeed,
    /// Band-gap reference (BG)
    BandGap,
    /// Band-gap followed by the IHRC
    HighSpeedAndBandGap,
    /// Band-gap followed by the ILRC
    LowSpeedAndBandGap,
}

impl CalibrationTarget {
    /// Whether an oscillator frequency is tuned (and measured)
    pub fn is_oscillator(&self) -> bool {
        !matches!(self, Self::BandGap)
    }

    /// Whether the band-gap reference is tuned
    pub fn includes_bandgap(&self) -> bool {
        matches!(
            self,
            Self::BandGap | Self::HighSpeedAndBandGap | Self::LowSpeedAndBandGap
        )
    }
}

/// Calibration found in an image, produced by [`CalibrationPatcher::insert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CalibrationPlan {
    /// What is calibrated
    pub target: CalibrationTarget,
    /// Target system clock in Hz (oscillator targets only)
    pub frequency_hz: u32,
    /// Supply voltage the calibration runs at, in millivolts
    pub millivolt: u16,
    /// Patch algorithm, interpreted by the patcher only
    pub algorithm: u8,
    /// Patch location, interpreted by the patcher only
    pub position: u16,
    /// Cycles of the stub's measurement loop
    pub loop_cycles: u32,
}

impl fmt::Display for CalibrationPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{:.2}V ", f32::from(self.millivolt) / 1000.0)?;
        match self.target {
            CalibrationTarget::InternalHighSpeed => {
                write!(f, "IHRC SYSCLK={}Hz", self.frequency_hz)
            }
            CalibrationTarget::InternalLowSpeed => {
                write!(f, "ILRC SYSCLK={}Hz", self.frequency_hz)
            }
            CalibrationTarget::BandGap => f.write_str("BG"),
            CalibrationTarget::HighSpeedAndBandGap => {
                write!(f, "BG / IHRC SYSCLK={}Hz", self.frequency_hz)
            }
            CalibrationTarget::LowSpeedAndBandGap => {
                write!(f, "BG / ILRC SYSCLK={}Hz", self.frequency_hz)
            }
        }
    }
}

/// Result of a live calibration run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CalibrationMeasurement {
    /// Trim value to patch into the image
    pub value: u8,
    /// Frequency measured with that trim, in Hz
    pub frequency_hz: u32,
    /// Band-gap trim value
    pub bandgap_value: u8,
}

impl fmt::Display for CalibrationMeasurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}Hz (0x{:02X})", self.frequency_hz, self.value)
    }
}

/// Locates and rewrites calibration stubs inside a firmware image
pub trait CalibrationPatcher {
    /// Search the image for a calibration stub
    ///
    /// When one is found the measurement code is inserted into `image`
    /// before the plan is returned.
    fn insert(&self, chip: &ChipDescriptor, image: &mut ProgramImage) -> Option<CalibrationPlan>;

    /// Replace the measurement code with the calibrated value
    ///
    /// Returns false if the plan no longer matches the image.
    fn remove(&self, plan: &CalibrationPlan, value: u8, image: &mut ProgramImage) -> bool;
}

/// Patcher that never finds a calibration stub
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCalibration;

impl CalibrationPatcher for NoCalibration {
    fn insert(&self, _chip: &ChipDescriptor, _image: &mut ProgramImage) -> Option<CalibrationPlan> {
        None
    }

    fn remove(&self, _plan: &CalibrationPlan, _value: u8, _image: &mut ProgramImage) -> bool {
        false
    }
}

/// Ask the patcher for a calibration plan
///
/// The image is already modified when a plan is returned.
pub fn plan(
    patcher: &dyn CalibrationPatcher,
    chip: &ChipDescriptor,
    image: &mut ProgramImage,
) -> Option<CalibrationPlan> {
    let plan = patcher.insert(chip, image);
    if let Some(plan) = &plan {
        log::debug!(
            "calibration stub found: {:?} algorithm {} at 0x{:04X}",
            plan.target,
            plan.algorithm,
            plan.position
        );
    }
    plan
}

/// Patch a measured value into the image
///
/// Fails with [`Error::CalibrationRemoval`] when the plan is stale; the
/// image must not be written again in that case.
pub fn apply(
    patcher: &dyn CalibrationPatcher,
    plan: &CalibrationPlan,
    measurement: &CalibrationMeasurement,
    image: &mut ProgramImage,
) -> Result<()> {
    if patcher.remove(plan, measurement.value, image) {
        Ok(())
    } else {
        Err(Error::CalibrationRemoval)
    }
}
