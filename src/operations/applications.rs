//! Test application management.
//!
//! Applications are named after the test and the port they run on, e.g.
//! `TermEth100GL2Traffic_101` (port 1) or `TermEth10GL2Traffic_102` (port 2).

use crate::error::{AppResult, MpaError};
use crate::protocol::{Command, Reply, Scpi};
use crate::session::{Session, Transaction};
use crate::transport::Transport;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

static PORT1_APPLICATION: Lazy<Regex> = Lazy::new(|| port_pattern(1));
static PORT2_APPLICATION: Lazy<Regex> = Lazy::new(|| port_pattern(2));

#[allow(clippy::expect_used)]
fn port_pattern(port: u8) -> Regex {
    Regex::new(&format!(r"\w+_10{port}")).expect("application pattern is valid")
}

/// Applications found in a capabilities reply, one per port at most.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunningApplications {
    /// First `*_101` application.
    pub port1: Option<String>,
    /// First `*_102` application.
    pub port2: Option<String>,
}

impl RunningApplications {
    /// Extract application names from a capabilities reply.
    pub fn parse(reply: &Reply) -> Self {
        let first = |pattern: &Regex| {
            pattern
                .find(reply.as_str())
                .map(|found| found.as_str().to_string())
        };
        Self {
            port1: first(&PORT1_APPLICATION),
            port2: first(&PORT2_APPLICATION),
        }
    }

    /// Application on `port` (1 or 2).
    pub fn for_port(&self, port: u8) -> Option<&str> {
        match port {
            1 => self.port1.as_deref(),
            2 => self.port2.as_deref(),
            _ => None,
        }
    }

    /// Names in port order, skipping ports without an application.
    pub fn to_vec(&self) -> Vec<String> {
        self.port1.iter().chain(self.port2.iter()).cloned().collect()
    }

    /// Whether no application was found.
    pub fn is_empty(&self) -> bool {
        self.port1.is_none() && self.port2.is_none()
    }
}

impl<T: Transport> Session<T> {
    /// Which applications are running on ports 1 and 2.
    ///
    /// The capabilities reply routinely carries error codes, so it is not
    /// classified.
    pub async fn list_running_applications(&mut self) -> AppResult<RunningApplications> {
        let reply = self
            .transact(
                &Transaction::checked("show_running_applications", Scpi::ApplicationCapabilities)
                    .with_classification(false),
            )
            .await?;
        let running = RunningApplications::parse(&reply);
        debug!(?running, "Running applications");
        Ok(running)
    }

    /// Applications the instrument reports as launched.
    pub async fn launched_applications(&mut self) -> AppResult<RunningApplications> {
        let reply = self
            .transact(&Transaction::checked(
                "verify_application_launched",
                Scpi::VerifyApplicationLaunched,
            ))
            .await?;
        Ok(RunningApplications::parse(&reply))
    }

    /// Make `application` the target of subsequent commands.
    pub async fn select_application(&mut self, application: &str) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            "select_application",
            Command::new(Scpi::SelectApplication).with_argument(application),
        ))
        .await
    }

    /// Select whichever application is running on `port`.
    pub async fn select_running_config(&mut self, port: u8) -> AppResult<String> {
        if !(1..=2).contains(&port) {
            return Err(MpaError::InvalidArgument(format!(
                "Expected port 1 or 2, got {port}"
            )));
        }
        let reply = self
            .transact(&Transaction::checked(
                "select_running_config",
                Scpi::ApplicationCapabilities,
            ))
            .await?;
        let running = RunningApplications::parse(&reply);
        let application = running
            .for_port(port)
            .ok_or_else(|| MpaError::UnexpectedReply {
                operation: "select_running_config",
                reply: reply.as_str().to_string(),
            })?
            .to_string();
        self.select_application(&application).await?;
        info!(port, application = %application, "Selected running application");
        Ok(application)
    }

    /// Launch `application`.
    ///
    /// The instrument's acknowledgement is unreliable, so the launch is read
    /// until silence and not classified.
    pub async fn launch_application(&mut self, application: &str) -> AppResult<Reply> {
        let window = self.timing().launch_timeout;
        let reply = self
            .transact(
                &Transaction::silent(
                    "launch_system_application",
                    Command::new(Scpi::LaunchApplication)
                        .with_argument(application)
                        .with_status_query(),
                )
                .with_drain(window)
                .with_timeout(window),
            )
            .await?;
        info!(application = %application, "Launch requested");
        Ok(reply)
    }

    /// Close `application`: select it, toggle the laser (assumed on), exit,
    /// then wait for the instrument to unload it.
    pub async fn close_application(&mut self, application: &str) -> AppResult<()> {
        self.select_application(application).await?;
        self.transact(&Transaction::checked("close_running_application", Scpi::ToggleLaser))
            .await?;
        self.transact(&Transaction::checked(
            "close_running_application",
            Scpi::ExitApplication,
        ))
        .await?;
        info!(application = %application, "Application closing");
        self.settle(self.timing().application_settle).await;
        Ok(())
    }
}
