//! Status classification of instrument replies.
//!
//! The instrument signals errors two ways. With the status query appended it
//! usually answers with a labelled line:
//!
//! ```text
//! Error Code: "-200, "Execution error"
//! ```
//!
//! but it also emits bare codes at the start of a line:
//!
//! ```text
//! \n-113, "Undefined header; could not find"
//! ```
//!
//! Both forms are checked independently. A match is recorded as a `warn`
//! tracing event and returned as an [`InstrumentFault`]; it never turns into an
//! `Err`, since the instrument often flags informational queries that still
//! return usable data.

use super::reply::Reply;
use std::fmt;

/// Label the instrument puts in front of an error.
pub const ERROR_CODE_MARKER: &str = "Error Code";

/// Known SCPI error codes.
pub const ERROR_CATALOGUE: [&str; 19] = [
    "-100", "-102", "-103", "-108", "-109", "-113", "-120", "-121", "-138", "-141", "-144",
    "-150", "-151", "-200", "-220", "-221", "-222", "-224", "-231",
];

/// An error reported by the instrument inside an otherwise normal reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstrumentFault {
    /// Operation whose transaction produced the reply.
    pub operation: String,
    /// Catalogue code found in the reply, if any.
    pub code: Option<&'static str>,
    /// Whether the `Error Code` label was present.
    pub labelled: bool,
    /// Reply with newlines removed.
    pub reply: String,
}

impl fmt::Display for InstrumentFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {:?}", self.operation, self.reply)
    }
}

/// First catalogue code contained in `text`.
pub fn find_error_code(text: &str) -> Option<&'static str> {
    ERROR_CATALOGUE
        .iter()
        .copied()
        .find(|code| text.contains(code))
}

/// Inspect a reply without logging.
pub fn inspect(reply: &Reply, operation: &str) -> Option<InstrumentFault> {
    let labelled = reply.contains(ERROR_CODE_MARKER);
    let code = find_error_code(reply.as_str());
    if !labelled && code.is_none() {
        return None;
    }
    Some(InstrumentFault {
        operation: operation.to_string(),
        code,
        labelled,
        reply: reply.flattened(),
    })
}

/// Inspect a reply and record one diagnostic event when it carries an error.
pub fn classify(reply: &Reply, operation: &str) -> Option<InstrumentFault> {
    let fault = inspect(reply, operation)?;
    tracing::warn!(
        operation = %fault.operation,
        code = fault.code.unwrap_or("-"),
        labelled = fault.labelled,
        reply = ?fault.reply,
        "Instrument reported an error"
    );
    Some(fault)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_test::traced_test;

    fn count_fault_records(lines: &[&str]) -> usize {
        lines
            .iter()
            .filter(|line| line.contains("Instrument reported an error"))
            .count()
    }

    #[test]
    fn labelled_error_is_detected() {
        let reply = Reply::from_bytes(b"Error Code: \"-200, \"Execution error\"\n");
        let fault = inspect(&reply, "laser_toggle").expect("fault");
        assert!(fault.labelled);
        assert_eq!(fault.code, Some("-200"));
    }

    #[test]
    fn bare_code_is_detected_without_label() {
        let reply = Reply::from_bytes(b"\n-113, \"Undefined header; could not find\"");
        let fault = inspect(&reply, "select_application").expect("fault");
        assert!(!fault.labelled);
        assert_eq!(fault.code, Some("-113"));
        assert!(!fault.reply.contains('\n'));
    }

    #[test]
    fn clean_reply_is_not_a_fault() {
        let reply = Reply::from_bytes(b"ON\n0, \"No error\"");
        assert_eq!(inspect(&reply, "laser_status"), None);
    }

    #[test]
    #[traced_test]
    fn one_record_per_faulty_reply() {
        // Both the label and a catalogue code are present: still one record.
        let reply = Reply::from_bytes(b"Error Code: \"-200, \"Execution error\"");
        assert!(classify(&reply, "test_start").is_some());
        logs_assert(|lines: &[&str]| match count_fault_records(lines) {
            1 => Ok(()),
            n => Err(format!("expected 1 record, found {n}")),
        });
    }

    #[test]
    #[traced_test]
    fn clean_reply_logs_nothing() {
        let reply = Reply::from_bytes(b"0, \"No error\"");
        assert!(classify(&reply, "test_stop").is_none());
        logs_assert(|lines: &[&str]| match count_fault_records(lines) {
            0 => Ok(()),
            n => Err(format!("expected no records, found {n}")),
        });
    }
}
