//! Toggle setters and direct test/session control.
//!
//! The instrument only offers *toggle* commands for the laser and the traffic
//! generators, so setting a state means reading it first:
//!
//! ```text
//! :OUTPUT:OPTIC? ;:SYSTem:ERRor?   ->  "OFF\n0, \"No error\""
//! :OUTPUT:OPTIC ;:SYSTem:ERRor?    (sent only because the reply said OFF)
//! ```
//!
//! When the status reply contains neither `ON` nor `OFF` nothing is sent and
//! the outcome is [`ToggleOutcome::Indeterminate`].

use crate::error::AppResult;
use crate::protocol::{LinkState, Reply, Scpi, ToggleState};
use crate::session::{Session, Transaction};
use crate::transport::Transport;
use std::fmt;
use tracing::{info, warn};

/// What a toggle setter did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleOutcome {
    /// The instrument already reported the desired state; nothing was sent.
    AlreadySet,
    /// One toggle command was sent.
    Toggled,
    /// The status reply contained neither literal; nothing was sent.
    Indeterminate,
}

/// Something the instrument can only toggle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleTarget {
    /// Optical output.
    Laser,
    /// Ethernet MAC traffic generator.
    MacTraffic,
    /// Fibre-Channel traffic generator.
    FcTraffic,
}

impl ToggleTarget {
    /// Query returning `ON` or `OFF`.
    pub const fn status_command(self) -> Scpi {
        match self {
            ToggleTarget::Laser => Scpi::LaserStatus,
            ToggleTarget::MacTraffic => Scpi::MacTrafficStatus,
            ToggleTarget::FcTraffic => Scpi::FcTrafficStatus,
        }
    }

    /// Command flipping the state.
    pub const fn toggle_command(self) -> Scpi {
        match self {
            ToggleTarget::Laser => Scpi::ToggleLaser,
            ToggleTarget::MacTraffic => Scpi::ToggleMacTraffic,
            ToggleTarget::FcTraffic => Scpi::ToggleFcTraffic,
        }
    }

    const fn status_operation(self) -> &'static str {
        match self {
            ToggleTarget::Laser => "laser_status",
            ToggleTarget::MacTraffic => "traffic_mac_status",
            ToggleTarget::FcTraffic => "traffic_fc_status",
        }
    }

    const fn toggle_operation(self) -> &'static str {
        match self {
            ToggleTarget::Laser => "laser_toggle",
            ToggleTarget::MacTraffic => "traffic_mac_toggle",
            ToggleTarget::FcTraffic => "traffic_fc_toggle",
        }
    }
}

impl fmt::Display for ToggleTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ToggleTarget::Laser => "laser",
            ToggleTarget::MacTraffic => "MAC traffic",
            ToggleTarget::FcTraffic => "FC traffic",
        };
        f.write_str(name)
    }
}

impl<T: Transport> Session<T> {
    /// Raw status reply for a toggle target.
    pub async fn toggle_status(&mut self, target: ToggleTarget) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            target.status_operation(),
            target.status_command(),
        ))
        .await
    }

    /// Status reply scanned for `ON` / `OFF`.
    pub async fn toggle_state(&mut self, target: ToggleTarget) -> AppResult<Option<ToggleState>> {
        let reply = self.toggle_status(target).await?;
        Ok(ToggleState::scan(&reply))
    }

    /// Flip a target unconditionally.
    pub async fn toggle(&mut self, target: ToggleTarget) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            target.toggle_operation(),
            target.toggle_command(),
        ))
        .await
    }

    /// Bring a target to `desired`, toggling at most once.
    pub async fn set_toggle(
        &mut self,
        target: ToggleTarget,
        desired: ToggleState,
    ) -> AppResult<ToggleOutcome> {
        let status = self.toggle_status(target).await?;

        if status.contains(desired.opposite().literal()) {
            self.toggle(target).await?;
            info!(%target, state = %desired, "Toggled");
            Ok(ToggleOutcome::Toggled)
        } else if status.contains(desired.literal()) {
            Ok(ToggleOutcome::AlreadySet)
        } else {
            warn!(
                %target,
                desired = %desired,
                reply = ?status.as_str(),
                "Status reply shows neither ON nor OFF; not toggling"
            );
            Ok(ToggleOutcome::Indeterminate)
        }
    }

    /// Turn the laser on.
    pub async fn laser_on(&mut self) -> AppResult<ToggleOutcome> {
        self.set_toggle(ToggleTarget::Laser, ToggleState::On).await
    }

    /// Turn the laser off.
    pub async fn laser_off(&mut self) -> AppResult<ToggleOutcome> {
        self.set_toggle(ToggleTarget::Laser, ToggleState::Off).await
    }

    /// Start Ethernet MAC traffic.
    pub async fn traffic_mac_start(&mut self) -> AppResult<ToggleOutcome> {
        self.set_toggle(ToggleTarget::MacTraffic, ToggleState::On).await
    }

    /// Stop Ethernet MAC traffic.
    pub async fn traffic_mac_stop(&mut self) -> AppResult<ToggleOutcome> {
        self.set_toggle(ToggleTarget::MacTraffic, ToggleState::Off).await
    }

    /// Start Fibre-Channel traffic.
    pub async fn traffic_fc_start(&mut self) -> AppResult<ToggleOutcome> {
        self.set_toggle(ToggleTarget::FcTraffic, ToggleState::On).await
    }

    /// Stop Fibre-Channel traffic.
    pub async fn traffic_fc_stop(&mut self) -> AppResult<ToggleOutcome> {
        self.set_toggle(ToggleTarget::FcTraffic, ToggleState::Off).await
    }

    /// PCS link state.
    pub async fn link_status(&mut self) -> AppResult<LinkState> {
        let reply = self
            .transact(&Transaction::checked("link_status", Scpi::LinkStatus))
            .await?;
        let state = LinkState::scan(&reply);
        if state == LinkState::Unknown {
            warn!(reply = ?reply.as_str(), "Link status not recognised");
        }
        Ok(state)
    }

    /// Start the test and wait for the link to come up.
    pub async fn test_start(&mut self) -> AppResult<Reply> {
        let reply = self
            .transact(&Transaction::checked("test_start", Scpi::StartTest))
            .await?;
        self.settle(self.timing().test_start_settle).await;
        Ok(reply)
    }

    /// Stop the running test.
    pub async fn test_stop(&mut self) -> AppResult<Reply> {
        self.transact(&Transaction::checked("test_stop", Scpi::StopTest))
            .await
    }

    /// Stop, then start the test.
    pub async fn test_restart(&mut self) -> AppResult<Reply> {
        self.test_stop().await?;
        self.test_start().await
    }

    /// Create a remote session on the selected application.
    pub async fn create_session(&mut self) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            "remote_session_start",
            Scpi::CreateSession,
        ))
        .await
    }

    /// Start the remote session created by [`Session::create_session`].
    pub async fn start_session(&mut self) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            "remote_session_run",
            Scpi::StartSession,
        ))
        .await
    }

    /// End the remote session. Not classified: the instrument reports spurious
    /// errors here when no session is open.
    pub async fn end_session(&mut self) -> AppResult<Reply> {
        self.transact(
            &Transaction::checked("remote_session_end", Scpi::EndSession)
                .with_classification(false),
        )
        .await
    }

    /// Remote mode with the front panel mirrored.
    pub async fn remote_operational_mode(&mut self) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            "remote_operational_mode",
            Scpi::RemoteVisible,
        ))
        .await
    }

    /// Inject one PCS code error.
    pub async fn insert_single_code_error(&mut self) -> AppResult<Reply> {
        self.transact(&Transaction::checked(
            "insert_single_code_error",
            Scpi::InsertCodeError,
        ))
        .await
    }

    /// Reboot the instrument. The connection is unusable afterwards.
    pub async fn reboot(&mut self) -> AppResult<Reply> {
        let reply = self
            .transact(&Transaction::checked("reboot", Scpi::Reboot).without_status_query())
            .await?;
        info!(host = %self.host(), "Reboot requested");
        Ok(reply)
    }
}
