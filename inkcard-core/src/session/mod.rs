//! The card protocol state machine.
//!
//! A [`ProtocolSession`] owns one [`Transceiver`] and drives it strictly
//! request by request: authenticate, stream every fragment of every
//! block, cycle the link and re-authenticate, trigger the refresh, then
//! poll until the panel reports completion.
//!
//! The card's radio session dies roughly 20 seconds after it is
//! established, and a refresh can outlast what is left of it. The link is
//! therefore always cycled between the last fragment and the refresh
//! trigger, whether or not anything went wrong.

pub mod config;
pub mod state;
pub mod transport;

pub use config::{PollPolicy, SessionConfig};
pub use state::SessionState;
pub use transport::Transceiver;

use std::time::Duration;

use bytes::Bytes;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, info, warn};

use crate::apdu::{Apdu, CommandKind, Response, refresh_complete};
use crate::device::{DeviceInfo, DeviceProfile};
use crate::encoder::{Block, Fragment};
use crate::error::{HexBytes, InkError, TransportError};

// ── TransferReport ───────────────────────────────────────────────

/// Summary of a finished transfer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransferReport {
    pub blocks: usize,
    /// Fragment commands acknowledged, including resends.
    pub fragments_sent: usize,
    /// Blocks that needed their one resend.
    pub retried_blocks: Vec<u8>,
    pub polls: u32,
    pub elapsed: Duration,
}

/// Why one pass over a block's fragments stopped.
enum BlockFailure {
    /// Transient; the block may be resent from fragment 0.
    Transport { frag_no: u8, source: TransportError },
    /// Terminal.
    Fatal(InkError),
}

// ── ProtocolSession ──────────────────────────────────────────────

pub struct ProtocolSession<T: Transceiver> {
    transport: T,
    config: SessionConfig,
    state: SessionState,
    info: Option<DeviceInfo>,
}

impl<T: Transceiver> ProtocolSession<T> {
    pub fn new(transport: T, config: SessionConfig) -> Self {
        Self {
            transport,
            config,
            state: SessionState::Idle,
            info: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn device_info(&self) -> Option<&DeviceInfo> {
        self.info.as_ref()
    }

    pub fn profile(&self) -> Option<&DeviceProfile> {
        self.info.as_ref().map(|i| &i.profile)
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    pub fn into_transport(self) -> T {
        self.transport
    }

    // ── Exchange ─────────────────────────────────────────────────

    /// One exchange under the command deadline. Does not touch state.
    async fn exchange(&mut self, apdu: &Apdu) -> Result<Response, TransportError> {
        let raw = apdu.to_bytes();
        let deadline = self.config.command_timeout;
        match timeout(deadline, self.transport.transceive(&raw)).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(deadline)),
        }
    }

    /// Exchange and require a success status word; failures are terminal.
    async fn command(&mut self, kind: CommandKind, apdu: Apdu) -> Result<Response, InkError> {
        let response = match self.exchange(&apdu).await {
            Ok(r) => r,
            Err(source) => {
                self.state.fail();
                return Err(InkError::Transport {
                    command: kind,
                    source,
                });
            }
        };
        if !response.status.is_success() {
            warn!(
                command = %kind,
                status = %response.status,
                class = ?response.status.class(),
                "card rejected command"
            );
            self.state.fail();
            return Err(InkError::Protocol {
                command: kind,
                status: response.status,
                apdu: HexBytes(apdu.to_bytes().to_vec()),
            });
        }
        Ok(response)
    }

    fn guard(&self, ok: bool, reason: &'static str) -> Result<(), InkError> {
        if ok {
            Ok(())
        } else {
            Err(InkError::InvalidTransition(reason))
        }
    }

    // ── Operations ───────────────────────────────────────────────

    /// Unlock the card for writes.
    pub async fn authenticate(&mut self) -> Result<(), InkError> {
        self.guard(
            matches!(
                self.state,
                SessionState::Idle | SessionState::Authenticated | SessionState::Reconnecting
            ),
            "cannot authenticate: not Idle, Authenticated or Reconnecting",
        )?;
        self.command(CommandKind::Authenticate, Apdu::authenticate())
            .await?;
        self.state.authenticated()?;
        info!("card authenticated");
        Ok(())
    }

    /// Query and decode the device-info TLV.
    pub async fn read_device_info(&mut self) -> Result<&DeviceInfo, InkError> {
        self.guard(
            matches!(self.state, SessionState::Idle | SessionState::Authenticated),
            "cannot read device info: not Idle or Authenticated",
        )?;
        let response = self
            .command(CommandKind::DeviceInfo, Apdu::device_info())
            .await?;
        let info = DeviceInfo::parse(&response.data).inspect_err(|_| self.state.fail())?;
        info!(serial = %info.serial, profile = %info.profile, "device info read");
        Ok(self.info.insert(info))
    }

    /// Authenticate and read device info, as a freshly tapped card needs.
    pub async fn connect(&mut self) -> Result<&DeviceInfo, InkError> {
        self.authenticate().await?;
        self.read_device_info().await
    }

    /// Optional capability probe announcing the block count.
    pub async fn query_panel_type(&mut self, block_count: u8) -> Result<Bytes, InkError> {
        self.guard(
            self.state == SessionState::Authenticated,
            "cannot query panel type: not Authenticated",
        )?;
        let response = self
            .command(CommandKind::PanelType, Apdu::panel_type(block_count))
            .await?;
        Ok(response.data)
    }

    /// Stream every block in order.
    ///
    /// A transport failure inside a block cycles the link, re-authenticates
    /// and resends that block from fragment 0, once. Rejections by status
    /// word are never retried.
    pub async fn send_blocks(&mut self, blocks: &[Block]) -> Result<TransferReport, InkError> {
        self.state.begin_transfer()?;
        let started = Instant::now();
        info!(blocks = blocks.len(), "image transfer started");

        let mut report = TransferReport {
            blocks: blocks.len(),
            ..TransferReport::default()
        };
        for block in blocks {
            self.send_block(block, &mut report).await?;
        }

        report.elapsed = started.elapsed();
        info!(
            fragments = report.fragments_sent,
            retried = report.retried_blocks.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "image transfer finished"
        );
        Ok(report)
    }

    async fn send_block(
        &mut self,
        block: &Block,
        report: &mut TransferReport,
    ) -> Result<(), InkError> {
        let fragments = block.fragments().inspect_err(|_| self.state.fail())?;
        debug!(
            block_no = block.block_no,
            fragments = fragments.len(),
            "sending block"
        );

        let mut retried = false;
        loop {
            match self.send_fragments(&fragments, report).await {
                Ok(()) => return Ok(()),
                Err(BlockFailure::Fatal(e)) => {
                    self.state.fail();
                    return Err(e);
                }
                Err(BlockFailure::Transport { frag_no, source }) if retried => {
                    self.state.fail();
                    return Err(InkError::TransferFailed {
                        block_no: block.block_no,
                        frag_no,
                        source,
                    });
                }
                Err(BlockFailure::Transport { frag_no, source }) => {
                    warn!(
                        block_no = block.block_no,
                        frag_no,
                        error = %source,
                        "fragment failed, reconnecting to resend block"
                    );
                    retried = true;
                    report.retried_blocks.push(block.block_no);
                    self.state.begin_reconnect()?;
                    if let Err(source) = self.cycle_link().await {
                        self.state.fail();
                        return Err(InkError::TransferFailed {
                            block_no: block.block_no,
                            frag_no,
                            source,
                        });
                    }
                    self.authenticate().await?;
                    self.state.begin_transfer()?;
                }
            }
        }
    }

    async fn send_fragments(
        &mut self,
        fragments: &[Fragment],
        report: &mut TransferReport,
    ) -> Result<(), BlockFailure> {
        for frag in fragments {
            let apdu = frag.to_apdu();
            let response = self
                .exchange(&apdu)
                .await
                .map_err(|source| BlockFailure::Transport {
                    frag_no: frag.frag_no,
                    source,
                })?;
            if !response.status.is_success() {
                warn!(
                    block_no = frag.block_no,
                    frag_no = frag.frag_no,
                    status = %response.status,
                    class = ?response.status.class(),
                    "card rejected fragment"
                );
                return Err(BlockFailure::Fatal(InkError::Protocol {
                    command: CommandKind::ImageFragment,
                    status: response.status,
                    apdu: HexBytes(apdu.to_bytes().to_vec()),
                }));
            }
            report.fragments_sent += 1;
            debug!(
                block_no = frag.block_no,
                frag_no = frag.frag_no,
                len = frag.payload.len(),
                is_final = frag.is_final,
                "fragment acknowledged"
            );
        }
        Ok(())
    }

    /// Drop and re-establish the physical link under the reconnect deadline.
    async fn cycle_link(&mut self) -> Result<(), TransportError> {
        let deadline = self.config.reconnect_timeout;
        match timeout(deadline, self.transport.reconnect()).await {
            Ok(result) => result,
            Err(_) => Err(TransportError::Timeout(deadline)),
        }
    }

    /// Cycle the link and re-authenticate so the refresh starts with a
    /// full session lifetime ahead of it.
    pub async fn reconnect_safeguard(&mut self) -> Result<(), InkError> {
        self.guard(
            self.state.is_authenticated(),
            "cannot reconnect: not Transferring or Authenticated",
        )?;
        info!("cycling link before refresh");
        self.state.begin_reconnect()?;
        if let Err(source) = self.cycle_link().await {
            self.state.fail();
            return Err(InkError::Transport {
                command: CommandKind::Authenticate,
                source,
            });
        }
        self.authenticate().await
    }

    /// Trigger the refresh and poll until the panel finishes.
    ///
    /// Returns the number of polls issued.
    pub async fn refresh(&mut self) -> Result<u32, InkError> {
        self.guard(
            self.state == SessionState::Authenticated,
            "cannot refresh: not Authenticated",
        )?;
        self.command(CommandKind::StartRefresh, Apdu::start_refresh())
            .await?;
        self.state.refresh_requested()?;
        info!("refresh started");

        self.state.begin_polling()?;
        let policy = self.config.poll.clone();
        let max_attempts = policy.effective_attempts();
        let started = Instant::now();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            let response = self
                .command(CommandKind::PollRefresh, Apdu::poll_refresh())
                .await?;
            match refresh_complete(&response.data) {
                Some(true) => {
                    self.state.complete()?;
                    info!(
                        polls = attempts,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        "refresh complete"
                    );
                    return Ok(attempts);
                }
                Some(false) => {
                    debug!(attempt = attempts, "refresh in progress");
                    if attempts >= max_attempts || started.elapsed() >= policy.timeout {
                        self.state.fail();
                        return Err(InkError::RefreshTimeout {
                            attempts,
                            elapsed: started.elapsed(),
                        });
                    }
                    sleep(policy.interval).await;
                }
                None => {
                    self.state.fail();
                    return Err(InkError::UnexpectedResponse {
                        command: CommandKind::PollRefresh,
                        reason: "poll body is neither 00 nor 01",
                        response: HexBytes(response.to_bytes().to_vec()),
                    });
                }
            }
        }
    }

    /// The full sequence: authenticate if needed, send, safeguard, refresh.
    pub async fn run_transfer(&mut self, blocks: &[Block]) -> Result<TransferReport, InkError> {
        if self.state == SessionState::Idle {
            self.authenticate().await?;
        }
        let mut report = self.send_blocks(blocks).await?;
        self.reconnect_safeguard().await?;
        report.polls = self.refresh().await?;
        Ok(report)
    }
}

/// Drive `session` through a complete transfer of `blocks`.
pub async fn run_transfer<T: Transceiver>(
    session: &mut ProtocolSession<T>,
    blocks: &[Block],
) -> Result<TransferReport, InkError> {
    session.run_transfer(blocks).await
}
