//! Marlin output patterns.
//!
//! The fixed set of firmware output lines the router dispatches on, compiled
//! once on first use. Anchored `^...$` patterns: the serial layer hands over
//! whole lines with the terminator stripped.
//!
//! These match the Prusa flavor of Marlin. If the firmware's wording
//! changes, this table is the one place to update.

use std::sync::LazyLock;

use regex::Regex;

/// Instruction confirmation, e.g. `ok` or `ok T:215`.
pub static CONFIRMATION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^ok.*$").unwrap());

/// Firmware is busy processing, e.g. `echo:busy: processing`.
pub static BUSY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^echo:busy:\s*processing.*$").unwrap());

/// Firmware waits for the user, e.g. `echo:busy: paused for user`.
pub static ATTENTION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^echo:busy:\s*paused for user.*$").unwrap());

/// Print paused, e.g. `// action:paused`.
pub static PAUSED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^// action:paused.*$").unwrap());

/// Print resumed, e.g. `// action:resumed`.
pub static RESUMED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^// action:resumed.*$").unwrap());

/// Print cancelled, e.g. `// action:cancel`.
pub static CANCEL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^// action:cancel.*$").unwrap());

/// A print was started, e.g. `echo:enqueing "M24"`. Older firmware spells
/// it `enqueing`, newer `enqueueing`; accept both.
pub static START_PRINT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"^echo:enqu(?:e|eue)ing "M24".*$"#).unwrap());

/// The print ran to completion: `Done printing file`.
pub static PRINT_DONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^Done printing file.*$").unwrap());

/// A firmware error report, e.g. `Error:Printer halted. kill() called!`.
pub static ERROR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^Error:.*$").unwrap());

/// Progress report, e.g. `NORMAL MODE: Percent done: 42; print time
/// remaining in mins: 118`. Group 1 is the percentage; the firmware reports
/// `-1` before it knows.
pub static PRINT_INFO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^NORMAL MODE: Percent done: (-?\d+);.*$").unwrap());

/// M27 poll answer. Group 1 is present on `Not SD printing`; groups 2 and 3
/// carry the byte position on `SD printing byte 2134/12345`.
pub static SD_STATUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:(Not SD printing)|SD printing byte (\d+)/(\d+))$").unwrap());

#[cfg(test)]
mod tests {
    use super::*;

    /// Real firmware output samples, and which pattern (if any) each should
    /// hit.
    const FIRMWARE_SAMPLES: &[(&str, Option<&str>)] = &[
        ("ok", Some("confirmation")),
        ("ok T:215.0 /215.0 B:60.1 /60.0", Some("confirmation")),
        ("echo:busy: processing", Some("busy")),
        ("echo:busy: paused for user", Some("attention")),
        ("// action:paused", Some("paused")),
        ("// action:resumed", Some("resumed")),
        ("// action:cancel", Some("cancel")),
        ("echo:enqueing \"M24\"", Some("start")),
        ("echo:enqueueing \"M24\"", Some("start")),
        ("Done printing file", Some("done")),
        ("Error:Printer halted. kill() called!", Some("error")),
        (
            "NORMAL MODE: Percent done: 42; print time remaining in mins: 118",
            Some("progress"),
        ),
        ("Not SD printing", Some("sd")),
        ("SD printing byte 2134/12345", Some("sd")),
        // Plain telemetry and noise match nothing here
        ("T:215.0 /215.0 B:60.1 /60.0", None),
        ("echo:Now fresh file: /usr/gcodes/tower.gcode", None),
        ("", None),
    ];

    fn classify(line: &str) -> Option<&'static str> {
        // Confirmation first, mirroring its routing priority
        if CONFIRMATION.is_match(line) {
            Some("confirmation")
        } else if ATTENTION.is_match(line) {
            Some("attention")
        } else if BUSY.is_match(line) {
            Some("busy")
        } else if PAUSED.is_match(line) {
            Some("paused")
        } else if RESUMED.is_match(line) {
            Some("resumed")
        } else if CANCEL.is_match(line) {
            Some("cancel")
        } else if START_PRINT.is_match(line) {
            Some("start")
        } else if PRINT_DONE.is_match(line) {
            Some("done")
        } else if ERROR.is_match(line) {
            Some("error")
        } else if PRINT_INFO.is_match(line) {
            Some("progress")
        } else if SD_STATUS.is_match(line) {
            Some("sd")
        } else {
            None
        }
    }

    #[test]
    fn test_patterns_against_real_samples() {
        for (line, expected) in FIRMWARE_SAMPLES {
            assert_eq!(
                classify(line),
                *expected,
                "pattern mismatch for line {:?}",
                line
            );
        }
    }

    #[test]
    fn test_progress_captures_percentage() {
        let captures = PRINT_INFO
            .captures("NORMAL MODE: Percent done: 42; print time remaining in mins: 118")
            .unwrap();
        assert_eq!(&captures[1], "42");

        let captures = PRINT_INFO
            .captures("NORMAL MODE: Percent done: -1; print time remaining in mins: -1")
            .unwrap();
        assert_eq!(&captures[1], "-1");
    }

    #[test]
    fn test_sd_status_groups() {
        let captures = SD_STATUS.captures("Not SD printing").unwrap();
        assert!(captures.get(1).is_some());

        let captures = SD_STATUS.captures("SD printing byte 2134/12345").unwrap();
        assert!(captures.get(1).is_none());
        assert_eq!(&captures[2], "2134");
        assert_eq!(&captures[3], "12345");
    }

    #[test]
    fn test_busy_and_attention_do_not_overlap() {
        assert!(!BUSY.is_match("echo:busy: paused for user"));
        assert!(!ATTENTION.is_match("echo:busy: processing"));
    }
}
