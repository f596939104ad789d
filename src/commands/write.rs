//! Write command implementation

use crate::commands::SpinnerProgress;
use crate::hexfile::read_image;
use pdkprog_core::calibration::CalibrationPatcher;
use pdkprog_core::programmer::Programmer;
use pdkprog_core::session::{Session, WriteOptions};
use std::path::Path;

/// Write an image file to the IC
///
/// The file is read before the IC is touched, so an unreadable file
/// leaves the IC as it was.
pub fn run_write<P: Programmer>(
    session: &mut Session<P>,
    input: &Path,
    options: &WriteOptions,
    patcher: &dyn CalibrationPatcher,
) -> Result<(), Box<dyn std::error::Error>> {
    let cells = read_image(input)?;

    let report = session.write(&cells, options, patcher, &mut SpinnerProgress::new())?;
    log::info!(
        "Wrote {} words ({} bytes){}",
        report.words,
        report.bytes,
        if report.fuse_written { " and fuse" } else { "" }
    );
    Ok(())
}

#[cfg(all(test, feature = "dummy"))]
mod tests {
    use super::*;
    use crate::hexfile::{write_image, FileFormat};
    use pdkprog_core::calibration::NoCalibration;
    use pdkprog_core::chip::ChipDatabase;
    use pdkprog_dummy::DummyPdk;

    #[test]
    fn test_write_file_to_emulator() {
        let db = ChipDatabase::builtin().unwrap();
        let chip = db.find_by_name("PFS173").unwrap().clone();
        let path = std::env::temp_dir().join(format!("pdkprog-{}-write.ihx", std::process::id()));
        write_image(&path, &[0x70, 0x00, 0x82, 0x01], FileFormat::Hex).unwrap();

        let mut session = Session::open(DummyPdk::with_chip(chip.clone())).unwrap();
        session.select_chip(chip);
        let options = WriteOptions::default().with_fuse(0x7FFD);
        let result = run_write(&mut session, &path, &options, &NoCalibration);
        std::fs::remove_file(&path).unwrap();
        result.unwrap();

        let pdk = session.into_programmer();
        assert_eq!(&pdk.memory()[..3], &[0x0070, 0x0182, 0x7FFF]);
        assert_eq!(pdk.memory()[0xBFF], 0x7FFD);
    }

    #[test]
    fn test_unreadable_file_leaves_ic_alone() {
        let db = ChipDatabase::builtin().unwrap();
        let chip = db.find_by_name("PFS154").unwrap().clone();
        let mut pdk = DummyPdk::with_chip(chip.clone());
        pdk.memory_mut()[0] = 0x1234;

        let mut session = Session::open(pdk).unwrap();
        session.select_chip(chip);
        let result = run_write(
            &mut session,
            Path::new("/nonexistent/pdkprog/fw.ihx"),
            &WriteOptions::default(),
            &NoCalibration,
        );
        assert!(result.is_err());
        assert_eq!(session.into_programmer().memory()[0], 0x1234);
    }
}
