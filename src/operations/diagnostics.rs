//! Telemetry and transceiver readings.
//!
//! The three telemetry reads used by the poll loop are silence-delimited and
//! drain stale input first, since the instrument sometimes sends late
//! acknowledgements that would otherwise be mistaken for the value. Their
//! replies are returned raw, e.g. `"\n3600"` for the elapsed time.

use crate::error::{AppResult, MpaError};
use crate::protocol::{Command, Reply, Scpi};
use crate::session::{Session, Transaction};
use crate::transport::Transport;
use std::fmt;
use tracing::{info, warn};

/// Transceiver form factor for power readings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransceiverKind {
    /// QSFP module (summed lanes).
    Qsfp,
    /// SFP module.
    Sfp,
}

impl TransceiverKind {
    const fn tx_power_command(self) -> Scpi {
        match self {
            TransceiverKind::Qsfp => Scpi::TxPowerQsfp,
            TransceiverKind::Sfp => Scpi::TxPowerSfp,
        }
    }
}

impl std::str::FromStr for TransceiverKind {
    type Err = MpaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qsfp" => Ok(TransceiverKind::Qsfp),
            "sfp" => Ok(TransceiverKind::Sfp),
            other => Err(MpaError::InvalidArgument(format!(
                "Expected 'sfp' or 'qsfp' transceiver type, got '{other}'"
            ))),
        }
    }
}

/// SFP cage whose optical overload is reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SfpPort {
    /// Cage 1.
    One,
    /// Cage 2.
    Two,
}

impl SfpPort {
    const fn reset_command(self) -> Scpi {
        match self {
            SfpPort::One => Scpi::ResetOverloadSfp1,
            SfpPort::Two => Scpi::ResetOverloadSfp2,
        }
    }
}

impl TryFrom<u8> for SfpPort {
    type Error = MpaError;

    fn try_from(port: u8) -> Result<Self, Self::Error> {
        match port {
            1 => Ok(SfpPort::One),
            2 => Ok(SfpPort::Two),
            other => Err(MpaError::InvalidArgument(format!(
                "Expected port 1 or 2, got {other}"
            ))),
        }
    }
}

impl fmt::Display for SfpPort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SfpPort::One => f.write_str("SFP1"),
            SfpPort::Two => f.write_str("SFP2"),
        }
    }
}

/// Pass/fail reading of an event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// No test result entries were logged.
    Passed,
    /// The log mentions a result.
    Failed,
}

/// Event log of the running test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventLog {
    /// `Failed` when the log contains `result`.
    pub verdict: Verdict,
    /// Raw log text.
    pub log: String,
}

impl EventLog {
    /// Interpret an event-log reply.
    pub fn from_reply(reply: Reply) -> Self {
        let verdict = if reply.contains("result") {
            Verdict::Failed
        } else {
            Verdict::Passed
        };
        Self {
            verdict,
            log: reply.into_string(),
        }
    }

    /// Whether the verdict is `Passed`.
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }
}

impl<T: Transport> Session<T> {
    async fn telemetry_read(&mut self, operation: &'static str, scpi: Scpi) -> AppResult<Reply> {
        let drain = self.timing().drain_timeout;
        self.transact(&Transaction::silent(operation, scpi).with_drain(drain))
            .await
    }

    /// Elapsed test time in seconds, raw.
    pub async fn elapsed_test_time(&mut self) -> AppResult<Reply> {
        self.telemetry_read("test_time", Scpi::ElapsedTime).await
    }

    /// QSFP receive power, raw.
    pub async fn read_rx_power(&mut self) -> AppResult<Reply> {
        self.telemetry_read("read_rx_power", Scpi::RxPowerQsfp)
            .await
    }

    /// Errored seconds counter, raw.
    pub async fn error_seconds(&mut self) -> AppResult<Reply> {
        self.telemetry_read("error_present", Scpi::ErrorSeconds)
            .await
    }

    /// Transmit power for a QSFP or SFP module, raw.
    pub async fn read_tx_power(&mut self, kind: TransceiverKind) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            "read_tx_power",
            kind.tx_power_command(),
        ))
        .await
    }

    /// Whether an SFP is seated in cage 1, raw. Cage 2 has no equivalent query.
    pub async fn sfp1_present(&mut self) -> AppResult<Reply> {
        self.transact(&Transaction::checked("sfp1_present", Scpi::Sfp1Present))
            .await
    }

    /// Optical overload status, raw (`"\n1\n..."` when overloaded).
    pub async fn overload(&mut self) -> AppResult<Reply> {
        self.transact(&Transaction::checked("overload", Scpi::Overload))
            .await
    }

    /// Clear an optical overload and wait for the receiver to recover.
    pub async fn overload_reset(&mut self, port: SfpPort) -> AppResult<Reply> {
        if port == SfpPort::Two {
            warn!("SFP2 overload reset sends the SFP1 reset command");
        }
        let reply = self
            .transact(&Transaction::checked(
                "overload_reset_sfp",
                Command::new(port.reset_command()),
            ))
            .await?;
        info!(%port, "Overload reset");
        self.settle(self.timing().overload_reset_settle).await;
        Ok(reply)
    }

    /// Event log of the running test.
    pub async fn event_log(&mut self) -> AppResult<EventLog> {
        let reply = self
            .transact(&Transaction::checked("event_log", Scpi::EventLog))
            .await?;
        Ok(EventLog::from_reply(reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Timing;
    use crate::transport::MockTransport;
    use tracing_test::traced_test;

    #[test]
    fn event_log_verdict() {
        let passed = EventLog::from_reply(Reply::from_bytes(b"\"\"\n0, \"No error"));
        assert!(passed.passed());
        let failed =
            EventLog::from_reply(Reply::from_bytes(b"\"LOS result: 12:00:01\"\n0, \"No error"));
        assert_eq!(failed.verdict, Verdict::Failed);
        assert!(failed.log.contains("LOS"));
    }

    #[test]
    fn sfp_port_from_number() {
        assert_eq!(SfpPort::try_from(1).unwrap(), SfpPort::One);
        assert_eq!(SfpPort::try_from(2).unwrap(), SfpPort::Two);
        assert!(SfpPort::try_from(3).is_err());
    }

    #[test]
    fn transceiver_kind_parses_case_insensitively() {
        assert_eq!("QSFP".parse::<TransceiverKind>().unwrap(), TransceiverKind::Qsfp);
        assert_eq!("sfp".parse::<TransceiverKind>().unwrap(), TransceiverKind::Sfp);
        assert!("cfp".parse::<TransceiverKind>().is_err());
    }

    #[tokio::test]
    async fn both_overload_resets_send_the_same_command() {
        let transport = MockTransport::new(|_| Some("0, \"No error\"\n".to_string()));
        let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());
        session.overload_reset(SfpPort::One).await.unwrap();
        session.overload_reset(SfpPort::Two).await.unwrap();
        let sent = session.transport().sent_lines();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], ":INPUT:SFP1:OVERLOAD:OPTIC:RESET ;:SYSTem:ERRor?");
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test]
    async fn telemetry_reads_are_bare_commands() {
        let transport = MockTransport::new(|line: &str| match line {
            ":SENSe:DATA? SECOND:TEST:ELAPSED" => Some("\n3600\n".to_string()),
            ":sense:data? FLOAT:PHYSICAL:QSFP:RX:POWER:LEVEL:SUM" => Some("\n-2.35\n".to_string()),
            ":SENSe:DATA? ESECOND:PERFORMANCE:Ethernet:G826:NE:OOS" => Some("\n0\n".to_string()),
            _ => None,
        });
        let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());
        assert_eq!(session.elapsed_test_time().await.unwrap().as_str(), "\n3600");
        assert_eq!(session.read_rx_power().await.unwrap().as_str(), "\n-2.35");
        assert_eq!(session.error_seconds().await.unwrap().first_value(), Some("0"));
    }

    #[tokio::test]
    async fn transceiver_queries_are_checked() {
        let transport = MockTransport::new(|line: &str| match line {
            ":sense:data? CSTATUS:PHYSICAL:SFP1:PRESENT ;:SYSTem:ERRor?" => {
                Some("\n1\n0, \"No error\"\n".to_string())
            }
            ":SENSe:DATA? CSTatus:PHYSical:OVRLd ;:SYSTem:ERRor?" => {
                Some("\n0\n0, \"No error\"\n".to_string())
            }
            _ => None,
        });
        let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());
        assert_eq!(session.sfp1_present().await.unwrap().first_value(), Some("1"));
        assert_eq!(session.overload().await.unwrap().first_value(), Some("0"));
        assert_eq!(session.transport().sent_lines().len(), 2);
    }

    #[tokio::test]
    #[traced_test]
    async fn event_log_over_session() {
        let transport = MockTransport::new(|line: &str| {
            (line == ":sense:data? STRING:TEST:EVENT:LOG ;:SYSTem:ERRor?").then(|| {
                "\"LOS result: 12:00:01\"\n0, \"No error\"\n".to_string()
            })
        });
        let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());
        let log = session.event_log().await.unwrap();
        assert_eq!(log.verdict, Verdict::Failed);
        assert!(log.log.starts_with("\"LOS result"));
        assert!(!logs_contain("Instrument reported an error"));
    }

    #[tokio::test]
    #[traced_test]
    async fn overload_error_reply_is_reported() {
        let transport = MockTransport::new(|line: &str| {
            line.starts_with(":SENSe:DATA? CSTatus:PHYSical:OVRLd")
                .then(|| "\n-113, \"Undefined header\"\n".to_string())
        });
        let mut session = Session::from_transport(transport, "bert", 8006, Timing::immediate());
        let reply = session.overload().await.unwrap();
        assert!(reply.contains("-113"));
        assert!(logs_contain("Instrument reported an error"));
    }
}
