//! Probe command implementation

use pdkprog_core::chip::ChipDatabase;
use pdkprog_core::programmer::{ProbeResponse, Programmer};
use pdkprog_core::session::{ProbeOutcome, Session};
use std::io::{self, Write};

/// Probe for an attached IC and print what was found
pub fn run_probe<P: Programmer>(
    session: &mut Session<P>,
    db: &ChipDatabase,
) -> Result<(), Box<dyn std::error::Error>> {
    print!("Probing IC... ");
    io::stdout().flush()?;
    let outcome = session.probe(db)?;
    println!("{}", describe(&outcome));
    Ok(())
}

fn describe(outcome: &ProbeOutcome<'_>) -> String {
    match outcome {
        ProbeOutcome::NothingFound => "Nothing found.".to_string(),
        ProbeOutcome::Error(error) => format!("ERROR: {}", error.message()),
        ProbeOutcome::Found { response, chip } => {
            let mut text = format!("found.\n{}\n", response_line(response));
            match chip {
                Some(chip) => {
                    text.push_str("IC is supported: ");
                    text.push_str(&chip.names().collect::<Vec<_>>().join(" / "));
                    text.push_str(&format!(" ICID:0x{:03X}", chip.id12()));
                }
                None => text.push_str("Unsupported IC"),
            }
            text
        }
    }
}

fn response_line(response: &ProbeResponse) -> String {
    format!(
        "TYPE:{} RSP:0x{:X} VPP={:.2} VDD={:.2}",
        response.memory_kind.label(),
        response.raw,
        f32::from(response.vpp_mv) / 1000.0,
        f32::from(response.vdd_mv) / 1000.0
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pdkprog_core::chip::MemoryKind;
    use pdkprog_core::error::DeviceError;

    fn response(memory_kind: MemoryKind, raw: u32) -> ProbeResponse {
        ProbeResponse {
            vpp_mv: 4980,
            vdd_mv: 5020,
            memory_kind,
            raw,
        }
    }

    #[test]
    fn test_describe_supported() {
        let db = ChipDatabase::builtin().unwrap();
        let outcome = ProbeOutcome::Found {
            response: response(MemoryKind::Otp, 0xE06 << 4),
            chip: db.find_by_name("PMS154B"),
        };
        assert_eq!(
            describe(&outcome),
            "found.\nTYPE:OTP RSP:0xE060 VPP=4.98 VDD=5.02\nIC is supported: PMS154B / PMS154C ICID:0xE06"
        );
    }

    #[test]
    fn test_describe_unsupported() {
        let outcome = ProbeOutcome::Found {
            response: response(MemoryKind::Flash, 0x123),
            chip: None,
        };
        assert!(describe(&outcome).ends_with("Unsupported IC"));
    }

    #[test]
    fn test_describe_nothing_and_error() {
        assert_eq!(describe(&ProbeOutcome::NothingFound), "Nothing found.");
        let error = DeviceError::from_index(5);
        assert_eq!(
            describe(&ProbeOutcome::Error(error)),
            "ERROR: IC not responding"
        );
    }
}
