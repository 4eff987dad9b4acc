//! SCPI command vocabulary.
//!
//! Every instruction the crate sends is a literal from [`Scpi`]. Commands that
//! take an argument (an application name, a register page) are built with
//! [`Command::with_argument`], and commands whose outcome should be confirmed by
//! the instrument get the system-error query appended with
//! [`Command::with_status_query`]:
//!
//! ```text
//! :OUTPUT:OPTIC? ;:SYSTem:ERRor?
//! ```
//!
//! The instrument then answers with the value line followed by an error line,
//! e.g. `ON\n0, "No error"`.

use std::borrow::Cow;
use std::fmt;

/// Joins a command with a trailing clause on the same line.
pub const MULTIPLE_COMMAND_SEPARATOR: &str = " ;";

/// Line terminator appended to every command on the wire.
pub const LINE_TERMINATOR: &str = "\n";

/// Literal instrument commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scpi {
    /// `*REM`, plain remote mode used during bootstrap.
    RemoteMode,
    /// `*REM VISIBLE FULL`, remote operation with the front panel mirrored.
    RemoteVisible,
    /// Module port query sent on the base port.
    ModulePortQuery,
    /// System port query sent on the module port.
    SystemPortQuery,
    /// `:SYSTem:ERRor?`
    SystemError,
    /// Lists applications that can be (or are) running.
    ApplicationCapabilities,
    /// Selects a running application by name.
    SelectApplication,
    /// Launches an application by name.
    LaunchApplication,
    /// Asks which applications are launched.
    VerifyApplicationLaunched,
    /// Closes the selected application.
    ExitApplication,
    /// Creates a remote session on the selected application.
    CreateSession,
    /// Starts a remote session.
    StartSession,
    /// Ends the remote session.
    EndSession,
    /// Event log of the running test (100G applications).
    EventLog,
    /// Errored seconds counter.
    ErrorSeconds,
    /// Elapsed test time in seconds.
    ElapsedTime,
    /// QSFP transmit power.
    TxPowerQsfp,
    /// QSFP receive power.
    RxPowerQsfp,
    /// SFP transmit level.
    TxPowerSfp,
    /// Whether an SFP is seated in slot 1.
    Sfp1Present,
    /// Optical overload status.
    Overload,
    /// Clears an optical overload on SFP port 1.
    ResetOverloadSfp1,
    /// Clears an optical overload on SFP port 2.
    ResetOverloadSfp2,
    /// PCS link-active status.
    LinkStatus,
    /// Toggles the laser.
    ToggleLaser,
    /// Laser state, `ON` or `OFF`.
    LaserStatus,
    /// Toggles Ethernet MAC traffic generation.
    ToggleMacTraffic,
    /// Toggles Fibre-Channel traffic generation.
    ToggleFcTraffic,
    /// Ethernet MAC traffic state, `ON` or `OFF`.
    MacTrafficStatus,
    /// Fibre-Channel traffic state, `ON` or `OFF`.
    FcTrafficStatus,
    /// Stops the running test.
    StopTest,
    /// Starts the test.
    StartTest,
    /// Injects a single PCS code error.
    InsertCodeError,
    /// Reboots the instrument.
    Reboot,
    /// Register peek: select page.
    PeekPageSelect,
    /// Register peek: select register address.
    PeekRegisterAddress,
    /// Register peek: perform the read.
    PeekTrigger,
    /// Register peek: fetch the byte read by the trigger.
    PeekRegisterData,
}

impl Scpi {
    /// The literal text sent to the instrument.
    pub const fn as_str(self) -> &'static str {
        match self {
            Scpi::RemoteMode => "*REM",
            Scpi::RemoteVisible => "*REM VISIBLE FULL",
            Scpi::ModulePortQuery => "MOD:FUNC:PORT? BOTH, BASE, \"BERT\"",
            Scpi::SystemPortQuery => ":SYST:FUNC:PORT? BOTH,BASE,\"BERT\"",
            Scpi::SystemError => ":SYSTem:ERRor?",
            Scpi::ApplicationCapabilities => ":SYST:APPL:CAPP?",
            Scpi::SelectApplication => ":SYSTem:APPLication:SELect",
            Scpi::LaunchApplication => ":SYSTem:APPLication:LAUNch",
            Scpi::VerifyApplicationLaunched => ":SYST:APPL:LAUN?",
            Scpi::ExitApplication => ":EXIT",
            Scpi::CreateSession => ":SESSion:CREate",
            Scpi::StartSession => ":SESSion:STARt",
            Scpi::EndSession => ":SESS:END",
            Scpi::EventLog => ":sense:data? STRING:TEST:EVENT:LOG",
            Scpi::ErrorSeconds => ":SENSe:DATA? ESECOND:PERFORMANCE:Ethernet:G826:NE:OOS",
            Scpi::ElapsedTime => ":SENSe:DATA? SECOND:TEST:ELAPSED",
            Scpi::TxPowerQsfp => ":sense:data? FLOAT:PHYSICAL:QSFP:TX:POWER:LEVEL:SUM",
            Scpi::RxPowerQsfp => ":sense:data? FLOAT:PHYSICAL:QSFP:RX:POWER:LEVEL:SUM",
            Scpi::TxPowerSfp => ":sense:data? INTEGER:PHYSICAL:TX:LEVEL:DBM",
            Scpi::Sfp1Present => ":sense:data? CSTATUS:PHYSICAL:SFP1:PRESENT",
            Scpi::Overload => ":SENSe:DATA? CSTatus:PHYSical:OVRLd",
            Scpi::ResetOverloadSfp1 => ":INPUT:SFP1:OVERLOAD:OPTIC:RESET",
            // NOTE: same text as ResetOverloadSfp1. Unverified whether port 2 needs
            // `:INPUT:SFP2:...`; see `overload_reset`.
            Scpi::ResetOverloadSfp2 => ":INPUT:SFP1:OVERLOAD:OPTIC:RESET",
            Scpi::LinkStatus => ":SENSE:DATA? CSTATUS:PCS:PHY:LINK:ACTIVE",
            Scpi::ToggleLaser => ":OUTPUT:OPTIC",
            Scpi::LaserStatus => ":OUTPUT:OPTIC?",
            Scpi::ToggleMacTraffic => ":SOURCE:MAC:TRAFFIC",
            Scpi::ToggleFcTraffic => ":SOURCE:FCHANNEL:TRAFFIC",
            Scpi::MacTrafficStatus => ":SOURCE:MAC:TRAFFIC?",
            Scpi::FcTrafficStatus => ":SOURCE:FCHANNEL:TRAFFIC?",
            Scpi::StopTest => ":ABORt",
            Scpi::StartTest => ":INITiate",
            Scpi::InsertCodeError => ":SOURCE:PCS:PHY:INSERT:CODE",
            Scpi::Reboot => ":SYSTem:REBoot",
            Scpi::PeekPageSelect => ":SENSE:EXPERT:I2C:PEEK:PAGESEL",
            Scpi::PeekRegisterAddress => ":SENSE:EXPERT:I2C:PEEK:REGADDR",
            Scpi::PeekTrigger => ":SENSE:EXPERT:I2C:PEEK:Trigger",
            Scpi::PeekRegisterData => ":SENSe:DATA? :SENSE:EXPERT:I2C:PEEK:REGDATA",
        }
    }
}

impl fmt::Display for Scpi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One instruction as it will appear on the wire, minus the line terminator.
///
/// Commands are plain values; building one has no effect on the instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    text: Cow<'static, str>,
    status_query: bool,
}

impl Command {
    /// A bare command with no argument and no status query.
    pub const fn new(scpi: Scpi) -> Self {
        Self {
            text: Cow::Borrowed(scpi.as_str()),
            status_query: false,
        }
    }

    /// Append a space-separated argument, e.g. an application name.
    pub fn with_argument(self, argument: impl fmt::Display) -> Self {
        Self {
            text: Cow::Owned(format!("{} {}", self.text, argument)),
            status_query: self.status_query,
        }
    }

    /// Append `" ;:SYSTem:ERRor?"` so the instrument reports the outcome.
    pub fn with_status_query(mut self) -> Self {
        self.status_query = true;
        self
    }

    /// Drop the system-error query.
    pub fn without_status_query(mut self) -> Self {
        self.status_query = false;
        self
    }

    /// Whether the system-error query is appended.
    pub fn has_status_query(&self) -> bool {
        self.status_query
    }

    /// The command text without the status clause.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Full line as written to the transport (without the trailing newline).
    pub fn wire(&self) -> String {
        if self.status_query {
            format!(
                "{}{}{}",
                self.text,
                MULTIPLE_COMMAND_SEPARATOR,
                Scpi::SystemError.as_str()
            )
        } else {
            self.text.to_string()
        }
    }
}

impl From<Scpi> for Command {
    fn from(scpi: Scpi) -> Self {
        Command::new(scpi)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.wire())
    }
}
