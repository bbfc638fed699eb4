//! A receiver-side model of the card, for tests and dry runs.
//!
//! [`SimulatedCard`] answers every command the way the hardware does:
//! it checks the unlock key, reassembles and decompresses image blocks,
//! reports refresh progress, and drops its link once a command budget
//! is spent, just like the real radio session expiring. Faults can be
//! injected to exercise the session's recovery paths.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::apdu::{AUTH_KEY, Apdu, CommandKind, FragmentCommand, Response, StatusWord};
use crate::device::{DeviceInfo, DeviceProfile};
use crate::encoder::{BlockAssembler, BlockEncoder, Fragment, decode_block};
use crate::error::{InkError, TransportError};
use crate::grid::{IndexGrid, NativeGrid};
use crate::layout;
use crate::session::Transceiver;

/// `6982`: security status not satisfied.
pub const NOT_AUTHENTICATED: StatusWord = StatusWord(0x6982);

pub struct SimulatedCard {
    profile: DeviceProfile,
    serial: String,

    connected: bool,
    authenticated: bool,
    /// Commands allowed per link before it drops; `None` is unlimited.
    command_budget: Option<u32>,
    commands_on_link: u32,

    assembler: BlockAssembler,
    received: BTreeMap<u8, Bytes>,
    corrupt_blocks: Vec<u8>,

    busy_polls: u32,
    polls_left: u32,
    refresh_started: bool,
    refreshes: u32,

    disconnect_at: Vec<(u8, u8)>,
    status_overrides: HashMap<CommandKind, StatusWord>,
    failing_reconnects: u32,

    reconnects: u32,
    log: Vec<Apdu>,
}

impl SimulatedCard {
    pub fn new(profile: DeviceProfile) -> Self {
        Self {
            profile,
            serial: "SIM0000001".to_string(),
            connected: true,
            authenticated: false,
            command_budget: None,
            commands_on_link: 0,
            assembler: BlockAssembler::new(),
            received: BTreeMap::new(),
            corrupt_blocks: Vec::new(),
            busy_polls: 2,
            polls_left: 0,
            refresh_started: false,
            refreshes: 0,
            disconnect_at: Vec::new(),
            status_overrides: HashMap::new(),
            failing_reconnects: 0,
            reconnects: 0,
            log: Vec::new(),
        }
    }

    // ── Builders ─────────────────────────────────────────────────

    pub fn with_serial(mut self, serial: impl Into<String>) -> Self {
        self.serial = serial.into();
        self
    }

    /// Number of "still refreshing" answers before "done".
    pub fn with_busy_polls(mut self, polls: u32) -> Self {
        self.busy_polls = polls;
        self
    }

    /// Drop the link after `commands` exchanges on one connection.
    pub fn with_command_budget(mut self, commands: u32) -> Self {
        self.command_budget = Some(commands);
        self
    }

    /// Drop the link when this fragment arrives, once.
    pub fn inject_disconnect(&mut self, block_no: u8, frag_no: u8) {
        self.disconnect_at.push((block_no, frag_no));
    }

    /// Answer the next command of `kind` with `status`, once.
    pub fn inject_status(&mut self, kind: CommandKind, status: StatusWord) {
        self.status_overrides.insert(kind, status);
    }

    /// Make the next `count` reconnect attempts fail.
    pub fn fail_reconnects(&mut self, count: u32) {
        self.failing_reconnects = count;
    }

    // ── Inspection ───────────────────────────────────────────────

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    pub fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    pub fn reconnects(&self) -> u32 {
        self.reconnects
    }

    pub fn refreshes(&self) -> u32 {
        self.refreshes
    }

    /// Every command received, in order.
    pub fn command_log(&self) -> &[Apdu] {
        &self.log
    }

    /// Block numbers received completely and intact.
    pub fn received_blocks(&self) -> Vec<u8> {
        self.received.keys().copied().collect()
    }

    /// Block numbers whose reassembled data failed to decode.
    pub fn corrupt_blocks(&self) -> &[u8] {
        &self.corrupt_blocks
    }

    /// The framebuffer as received.
    pub fn native_grid(&self) -> Result<NativeGrid, InkError> {
        let count = self.profile.block_count();
        let compressed = (0..count)
            .map(|i| {
                self.received
                    .get(&(i as u8))
                    .cloned()
                    .ok_or(InkError::InvalidGrid("framebuffer has missing blocks"))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let (rows, cols) = self.profile.native_dims();
        BlockEncoder::new(&self.profile).decode(&compressed, rows, cols)
    }

    /// The received framebuffer mapped back to display orientation.
    pub fn display_grid(&self) -> Result<IndexGrid, InkError> {
        Ok(layout::from_native(&self.native_grid()?, &self.profile))
    }

    // ── Command handling ─────────────────────────────────────────

    fn drop_link(&mut self) {
        self.connected = false;
        self.authenticated = false;
        self.assembler.reset();
    }

    fn handle(&mut self, apdu: &Apdu) -> Result<Response, TransportError> {
        let Some(kind) = apdu.kind() else {
            return Ok(Response::status_only(StatusWord::INS_NOT_SUPPORTED));
        };
        if let Some(status) = self.status_overrides.remove(&kind) {
            return Ok(Response::status_only(status));
        }

        let response = match kind {
            CommandKind::Authenticate => {
                if apdu.data.as_ref() == AUTH_KEY {
                    self.authenticated = true;
                    Response::success(Bytes::new())
                } else if apdu.data.len() != AUTH_KEY.len() {
                    Response::status_only(StatusWord::WRONG_LENGTH)
                } else {
                    Response::status_only(StatusWord::INCORRECT_P1P2)
                }
            }
            CommandKind::DeviceInfo => {
                Response::success(DeviceInfo::encode_response(&self.profile, &self.serial))
            }
            CommandKind::PanelType => Response::success(Bytes::new()),
            CommandKind::ImageFragment => return self.handle_fragment(apdu),
            CommandKind::StartRefresh if !self.authenticated => {
                Response::status_only(NOT_AUTHENTICATED)
            }
            CommandKind::StartRefresh => {
                self.refresh_started = true;
                self.polls_left = self.busy_polls;
                Response::success(Bytes::new())
            }
            CommandKind::PollRefresh => {
                if self.refresh_started && self.polls_left > 0 {
                    self.polls_left -= 1;
                    Response::success(vec![0x01])
                } else {
                    if self.refresh_started {
                        self.refresh_started = false;
                        self.refreshes += 1;
                    }
                    Response::success(vec![0x00])
                }
            }
        };
        Ok(response)
    }

    fn handle_fragment(&mut self, apdu: &Apdu) -> Result<Response, TransportError> {
        if !self.authenticated {
            return Ok(Response::status_only(NOT_AUTHENTICATED));
        }
        let frag = match FragmentCommand::decode(apdu) {
            Ok(cmd) => Fragment::from(cmd),
            Err(_) => return Ok(Response::status_only(StatusWord::WRONG_LENGTH)),
        };

        if let Some(pos) = self
            .disconnect_at
            .iter()
            .position(|&at| at == (frag.block_no, frag.frag_no))
        {
            self.disconnect_at.remove(pos);
            debug!(block_no = frag.block_no, frag_no = frag.frag_no, "simulated link drop");
            self.drop_link();
            return Err(TransportError::Disconnected);
        }

        let sizes = self.profile.block_sizes();
        let Some(&expected) = sizes.get(frag.block_no as usize) else {
            return Ok(Response::status_only(StatusWord::INCORRECT_P1P2));
        };

        match self.assembler.push(&frag) {
            Ok(Some((block_no, compressed))) => {
                match decode_block(block_no, &compressed, expected) {
                    Ok(_) => {
                        self.received.insert(block_no, compressed);
                    }
                    Err(e) => {
                        debug!(block_no, error = %e, "simulated card rejected block");
                        self.corrupt_blocks.push(block_no);
                        return Ok(Response::status_only(StatusWord::WRONG_LENGTH));
                    }
                }
                Ok(Response::success(Bytes::new()))
            }
            Ok(None) => Ok(Response::success(Bytes::new())),
            Err(_) => Ok(Response::status_only(StatusWord::WRONG_LENGTH)),
        }
    }
}

#[async_trait]
impl Transceiver for SimulatedCard {
    async fn transceive(&mut self, command: &[u8]) -> Result<Response, TransportError> {
        if !self.connected {
            return Err(TransportError::Disconnected);
        }
        self.commands_on_link += 1;
        if let Some(budget) = self.command_budget {
            if self.commands_on_link > budget {
                debug!(budget, "simulated session expired");
                self.drop_link();
                return Err(TransportError::Disconnected);
            }
        }

        let apdu = match Apdu::parse(command) {
            Ok(apdu) => apdu,
            Err(_) => return Ok(Response::status_only(StatusWord::WRONG_LENGTH)),
        };
        trace!(%apdu, "simulated card received");
        self.log.push(apdu.clone());
        self.handle(&apdu)
    }

    async fn reconnect(&mut self) -> Result<(), TransportError> {
        if self.failing_reconnects > 0 {
            self.failing_reconnects -= 1;
            return Err(TransportError::Io("card not found in field".into()));
        }
        self.connected = true;
        self.authenticated = false;
        self.commands_on_link = 0;
        self.assembler.reset();
        self.reconnects += 1;
        Ok(())
    }
}
