// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Human-readable error messages for the command-line front end.
//
// Every technical error is mapped to plain English with a clear suggestion.

use crate::error::ScanwerkError;

/// Severity of an error from the user's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// Network blip or busy scanner. Trying the whole scan again may work.
    Transient,
    /// User must do something (load paper, pick another source).
    ActionRequired,
    /// Cannot be fixed by retrying: unsupported feature or broken device reply.
    Permanent,
}

/// A human-readable error with plain English message and actionable suggestion.
#[derive(Debug, Clone)]
pub struct HumanError {
    /// Plain English summary.
    pub message: String,
    /// What the user should try.
    pub suggestion: String,
    /// Whether starting the scan over could succeed.
    pub retriable: bool,
    pub severity: Severity,
}

impl HumanError {
    fn new(message: &str, suggestion: impl Into<String>, severity: Severity) -> Self {
        Self {
            message: message.into(),
            suggestion: suggestion.into(),
            retriable: severity == Severity::Transient,
            severity,
        }
    }
}

/// Convert a `ScanwerkError` into a `HumanError`.
pub fn humanize_error(err: &ScanwerkError) -> HumanError {
    match err {
        // -- Transport --
        ScanwerkError::NoCandidates => HumanError::new(
            "We don't know how to reach this scanner.",
            "Pass --host with the scanner's name or IP address, or run `scanwerk discover` first.",
            Severity::ActionRequired,
        ),

        ScanwerkError::Connect { source, .. } => humanize_io(source),

        ScanwerkError::ConnectTimeout { .. } | ScanwerkError::DeadlineExceeded => HumanError::new(
            "The scanner didn't respond in time.",
            "Check that it is switched on and on the same network, then try again.",
            Severity::Transient,
        ),

        ScanwerkError::Cancelled => HumanError::new(
            "The operation was cancelled.",
            "Start the scan again when you're ready.",
            Severity::Transient,
        ),

        ScanwerkError::Tls(detail) => HumanError::new(
            "A secure connection to the scanner could not be set up.",
            format!("Scanners often use self-signed certificates; try --skip-cert-verify. ({detail})"),
            Severity::ActionRequired,
        ),

        ScanwerkError::Http(_) => HumanError::new(
            "The connection to the scanner was interrupted.",
            "This sometimes happens with Wi-Fi. Try the scan again.",
            Severity::Transient,
        ),

        // -- Protocol --
        ScanwerkError::UnexpectedStatus { code, message, .. } => match code {
            409 | 503 => HumanError::new(
                "The scanner is busy.",
                "Wait for the current job to finish, then try again.",
                Severity::Transient,
            ),
            400 | 422 => HumanError::new(
                "The scanner rejected these scan settings.",
                format!("Try a different source, size, format or colour mode. ({message})"),
                Severity::ActionRequired,
            ),
            _ => HumanError::new(
                "The scanner reported an error.",
                format!("Try switching the scanner off and on again. ({message})"),
                Severity::Transient,
            ),
        },

        ScanwerkError::InvalidUrl { .. } => HumanError::new(
            "The scanner address doesn't look right.",
            "Check the address and try again. It should look like 192.168.1.100:80.",
            Severity::ActionRequired,
        ),

        ScanwerkError::MissingLocation(_) | ScanwerkError::Decode { .. } => HumanError::new(
            "The scanner sent a reply we don't understand.",
            "Run again with --debug and report the output; this device may not follow the eSCL standard.",
            Severity::Permanent,
        ),

        ScanwerkError::Encode(_) | ScanwerkError::InvalidSettings(_) => HumanError::new(
            "These scan settings are not valid.",
            format!("Check the size, resolution and format options. ({err})"),
            Severity::ActionRequired,
        ),

        // -- Negotiation --
        ScanwerkError::NotReady { got, .. } => HumanError::new(
            "The scanner is not ready.",
            format!("It reports state \"{got}\". Wait until it is idle, then try again."),
            Severity::Transient,
        ),

        ScanwerkError::FeederEmpty { .. } => HumanError::new(
            "The document feeder is empty.",
            "Put your pages into the feeder, or use --source platen to scan from the glass.",
            Severity::ActionRequired,
        ),

        ScanwerkError::NoFeeder => HumanError::new(
            "This scanner has no document feeder.",
            "Use --source platen to scan from the glass.",
            Severity::ActionRequired,
        ),

        ScanwerkError::DuplexUnsupported => HumanError::new(
            "This scanner can't scan both sides of a page.",
            "Scan without --duplex.",
            Severity::ActionRequired,
        ),

        ScanwerkError::SimplexUnsupported => HumanError::new(
            "This scanner's feeder only scans both sides.",
            "Scan with --duplex.",
            Severity::ActionRequired,
        ),

        // -- Job --
        ScanwerkError::RetryLimit(_) => HumanError::new(
            "The scanner kept saying it wasn't ready.",
            "Check the scanner's display for a paper jam or an open cover, then try again.",
            Severity::Transient,
        ),

        ScanwerkError::JobClosed(_) => HumanError::new(
            "The scan job had already finished.",
            "Start a new scan.",
            Severity::Permanent,
        ),

        ScanwerkError::Discovery(_) => HumanError::new(
            "We can't search for scanners right now.",
            "Make sure you're connected to the network and multicast DNS is not blocked.",
            Severity::Transient,
        ),

        // -- Local --
        ScanwerkError::Io(io_err) => humanize_io(io_err),

        ScanwerkError::Serialization(_) => HumanError::new(
            "We had an internal data problem.",
            "Try again. If this keeps happening, please report it.",
            Severity::Transient,
        ),
    }
}

fn humanize_io(err: &std::io::Error) -> HumanError {
    match err.kind() {
        std::io::ErrorKind::ConnectionRefused => HumanError::new(
            "The scanner refused our connection.",
            "The scanner may be asleep or its web services disabled. Wake it up and try again.",
            Severity::Transient,
        ),
        std::io::ErrorKind::TimedOut => HumanError::new(
            "The scanner didn't respond in time.",
            "Check that it is switched on and on the same network, then try again.",
            Severity::Transient,
        ),
        std::io::ErrorKind::PermissionDenied => HumanError::new(
            "We don't have permission to do that.",
            "Check the permissions of the output directory.",
            Severity::ActionRequired,
        ),
        std::io::ErrorKind::NotFound => HumanError::new(
            "Something we needed could not be found.",
            "Check the scanner name and the output directory.",
            Severity::ActionRequired,
        ),
        _ => HumanError::new(
            "There was a problem talking to the network or the disk.",
            format!("Try again. ({err})"),
            Severity::Transient,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_feeder_is_action_required() {
        let human = humanize_error(&ScanwerkError::FeederEmpty {
            got: "ScannerAdfEmpty".into(),
            want: "ScannerAdfLoaded".into(),
        });
        assert_eq!(human.severity, Severity::ActionRequired);
        assert!(!human.retriable);
    }

    #[test]
    fn refused_connection_is_transient() {
        let err = ScanwerkError::Connect {
            candidate: "scanner:80".into(),
            attempts: 2,
            source: std::io::Error::from(std::io::ErrorKind::ConnectionRefused),
        };
        let human = humanize_error(&err);
        assert_eq!(human.severity, Severity::Transient);
        assert!(human.retriable);
    }

    #[test]
    fn busy_status_is_transient() {
        let err = ScanwerkError::UnexpectedStatus {
            url: "http://scanner/eSCL/ScanJobs".into(),
            code: 503,
            status: "503 Service Unavailable".into(),
            message: "".into(),
            want: "201".into(),
        };
        assert_eq!(humanize_error(&err).severity, Severity::Transient);
    }

    #[test]
    fn garbled_reply_is_permanent() {
        let err = ScanwerkError::Decode {
            reason: "unexpected end".into(),
            payload: "<scan:".into(),
        };
        assert_eq!(humanize_error(&err).severity, Severity::Permanent);
    }
}
