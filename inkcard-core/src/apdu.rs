//! ISO7816 command APDUs and status words spoken by the card.
//!
//! Pure construction and parsing; no I/O happens here. Every builder
//! reproduces the card's wire bytes exactly:
//!
//! ```text
//! Authenticate     00 20 00 01 04 20091210
//! Device info      00 D1 00 00 00
//! Image fragment   F0 D3 00 {00|01} Lc {blockNo}{fragNo}{payload}
//! Start refresh    F0 D4 85 80 00
//! Poll refresh     F0 DE 00 00 01
//! Panel type       F0 D8 00 00 05 00000000{blocks-1}
//! ```

use std::fmt;

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::InkError;

/// Maximum compressed payload carried by one image-fragment APDU.
pub const MAX_FRAGMENT_PAYLOAD: usize = 250;

/// Unlock key sent with the authenticate command.
pub const AUTH_KEY: [u8; 4] = [0x20, 0x09, 0x12, 0x10];

// ── StatusWord ───────────────────────────────────────────────────

/// The two trailing bytes of every response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StatusWord(pub u16);

impl StatusWord {
    pub const SUCCESS: StatusWord = StatusWord(0x9000);
    pub const WRONG_LENGTH: StatusWord = StatusWord(0x6700);
    pub const INS_NOT_SUPPORTED: StatusWord = StatusWord(0x6D00);
    pub const INCORRECT_P1P2: StatusWord = StatusWord(0x6A86);

    pub fn from_bytes(sw1: u8, sw2: u8) -> Self {
        Self(u16::from_be_bytes([sw1, sw2]))
    }

    pub fn to_bytes(self) -> [u8; 2] {
        self.0.to_be_bytes()
    }

    pub fn is_success(self) -> bool {
        self == Self::SUCCESS
    }

    pub fn class(self) -> StatusClass {
        match self {
            Self::SUCCESS => StatusClass::Success,
            Self::WRONG_LENGTH => StatusClass::WrongLength,
            Self::INS_NOT_SUPPORTED => StatusClass::UnsupportedInstruction,
            Self::INCORRECT_P1P2 => StatusClass::InvalidParameters,
            _ => StatusClass::Unrecognized,
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}", self.0)
    }
}

/// Meaning of a status word as far as the card documents it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusClass {
    Success,
    /// `6700`: bad Lc or malformed data.
    WrongLength,
    /// `6D00`: instruction unknown to this card.
    UnsupportedInstruction,
    /// `6A86`: P1/P2 out of range.
    InvalidParameters,
    Unrecognized,
}

// ── CommandKind ──────────────────────────────────────────────────

/// The commands this crate knows how to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Authenticate,
    DeviceInfo,
    ImageFragment,
    StartRefresh,
    PollRefresh,
    PanelType,
}

impl CommandKind {
    /// Identify a command from its CLA/INS pair.
    pub fn from_header(cla: u8, ins: u8) -> Option<Self> {
        match (cla, ins) {
            (0x00, 0x20) => Some(Self::Authenticate),
            (0x00, 0xD1) => Some(Self::DeviceInfo),
            (0xF0, 0xD3) => Some(Self::ImageFragment),
            (0xF0, 0xD4) => Some(Self::StartRefresh),
            (0xF0, 0xDE) => Some(Self::PollRefresh),
            (0xF0, 0xD8) => Some(Self::PanelType),
            _ => None,
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Authenticate => write!(f, "Authenticate"),
            Self::DeviceInfo => write!(f, "DeviceInfo"),
            Self::ImageFragment => write!(f, "ImageFragment"),
            Self::StartRefresh => write!(f, "StartRefresh"),
            Self::PollRefresh => write!(f, "PollRefresh"),
            Self::PanelType => write!(f, "PanelType"),
        }
    }
}

// ── Apdu ─────────────────────────────────────────────────────────

/// A command APDU: header, optional data (Lc + body) and optional Le.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    pub cla: u8,
    pub ins: u8,
    pub p1: u8,
    pub p2: u8,
    pub data: Bytes,
    pub le: Option<u8>,
}

impl Apdu {
    pub fn authenticate() -> Self {
        Self {
            cla: 0x00,
            ins: 0x20,
            p1: 0x00,
            p2: 0x01,
            data: Bytes::from_static(&AUTH_KEY),
            le: None,
        }
    }

    pub fn device_info() -> Self {
        Self::case2(0x00, 0xD1, 0x00, 0x00, 0x00)
    }

    /// Image data transfer (`F0D3`).
    ///
    /// `payload` must not exceed [`MAX_FRAGMENT_PAYLOAD`]; the encoder
    /// guarantees this for every fragment it produces.
    pub fn image_fragment(block_no: u8, frag_no: u8, payload: &[u8], is_final: bool) -> Self {
        let mut data = BytesMut::with_capacity(2 + payload.len());
        data.put_u8(block_no);
        data.put_u8(frag_no);
        data.put_slice(payload);
        Self {
            cla: 0xF0,
            ins: 0xD3,
            p1: 0x00,
            p2: u8::from(is_final),
            data: data.freeze(),
            le: None,
        }
    }

    pub fn start_refresh() -> Self {
        Self::case2(0xF0, 0xD4, 0x85, 0x80, 0x00)
    }

    pub fn poll_refresh() -> Self {
        Self::case2(0xF0, 0xDE, 0x00, 0x00, 0x01)
    }

    /// Panel-type probe announcing the highest block number.
    pub fn panel_type(block_count: u8) -> Self {
        Self {
            cla: 0xF0,
            ins: 0xD8,
            p1: 0x00,
            p2: 0x00,
            data: Bytes::from(vec![0x00, 0x00, 0x00, 0x00, block_count.saturating_sub(1)]),
            le: None,
        }
    }

    fn case2(cla: u8, ins: u8, p1: u8, p2: u8, le: u8) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data: Bytes::new(),
            le: Some(le),
        }
    }

    pub fn kind(&self) -> Option<CommandKind> {
        CommandKind::from_header(self.cla, self.ins)
    }

    /// Serialize to raw command bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(6 + self.data.len());
        buf.put_u8(self.cla);
        buf.put_u8(self.ins);
        buf.put_u8(self.p1);
        buf.put_u8(self.p2);
        if !self.data.is_empty() {
            buf.put_u8(self.data.len() as u8);
            buf.put_slice(&self.data);
        }
        if let Some(le) = self.le {
            buf.put_u8(le);
        }
        buf.freeze()
    }

    /// Parse short-form command bytes (cases 1 to 4).
    pub fn parse(raw: &[u8]) -> Result<Self, InkError> {
        if raw.len() < 4 {
            return Err(InkError::MalformedApdu("shorter than the 4-byte header"));
        }
        let (cla, ins, p1, p2) = (raw[0], raw[1], raw[2], raw[3]);
        let body = &raw[4..];

        let (data, le) = match body.len() {
            0 => (Bytes::new(), None),
            1 => (Bytes::new(), Some(body[0])),
            _ => {
                let lc = body[0] as usize;
                if lc == 0 {
                    return Err(InkError::MalformedApdu("zero Lc with trailing bytes"));
                }
                match body.len() - 1 {
                    n if n == lc => (Bytes::copy_from_slice(&body[1..]), None),
                    n if n == lc + 1 => (Bytes::copy_from_slice(&body[1..=lc]), Some(body[lc + 1])),
                    _ => return Err(InkError::MalformedApdu("Lc does not match body length")),
                }
            }
        };

        Ok(Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        })
    }
}

impl fmt::Display for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.to_bytes().iter() {
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}

// ── FragmentCommand ──────────────────────────────────────────────

/// The decoded body of an image-fragment APDU.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FragmentCommand {
    pub page: u8,
    pub block_no: u8,
    pub frag_no: u8,
    pub is_final: bool,
    pub payload: Bytes,
}

impl FragmentCommand {
    pub fn decode(apdu: &Apdu) -> Result<Self, InkError> {
        if apdu.kind() != Some(CommandKind::ImageFragment) {
            return Err(InkError::MalformedApdu("not an image-fragment command"));
        }
        let is_final = match apdu.p2 {
            0x00 => false,
            0x01 => true,
            _ => return Err(InkError::MalformedApdu("P2 must be 00 or 01")),
        };
        if apdu.data.len() < 2 {
            return Err(InkError::MalformedApdu("missing block/fragment numbers"));
        }
        let payload = apdu.data.slice(2..);
        if payload.len() > MAX_FRAGMENT_PAYLOAD {
            return Err(InkError::MalformedApdu("fragment payload over 250 bytes"));
        }
        Ok(Self {
            page: apdu.p1,
            block_no: apdu.data[0],
            frag_no: apdu.data[1],
            is_final,
            payload,
        })
    }
}

// ── Response ─────────────────────────────────────────────────────

/// A response APDU: body plus status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    pub data: Bytes,
    pub status: StatusWord,
}

impl Response {
    pub fn new(data: impl Into<Bytes>, status: StatusWord) -> Self {
        Self {
            data: data.into(),
            status,
        }
    }

    pub fn success(data: impl Into<Bytes>) -> Self {
        Self::new(data, StatusWord::SUCCESS)
    }

    pub fn status_only(status: StatusWord) -> Self {
        Self::new(Bytes::new(), status)
    }

    /// Split a raw response frame into body and trailing SW1 SW2.
    pub fn parse(raw: &[u8]) -> Result<Self, InkError> {
        if raw.len() < 2 {
            return Err(InkError::MalformedApdu("response shorter than a status word"));
        }
        let split = raw.len() - 2;
        Ok(Self {
            data: Bytes::copy_from_slice(&raw[..split]),
            status: StatusWord::from_bytes(raw[split], raw[split + 1]),
        })
    }

    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.data.len() + 2);
        buf.put_slice(&self.data);
        buf.put_slice(&self.status.to_bytes());
        buf.freeze()
    }
}

/// Interpret a poll response body: `Some(true)` once the refresh is done.
pub fn refresh_complete(body: &[u8]) -> Option<bool> {
    match body.first() {
        Some(0x00) => Some(true),
        Some(0x01) => Some(false),
        _ => None,
    }
}

/// Decode a hex string, ignoring whitespace.
pub fn parse_hex(text: &str) -> Result<Vec<u8>, InkError> {
    let digits: Vec<u8> = text.bytes().filter(|b| !b.is_ascii_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(InkError::MalformedApdu("odd number of hex digits"));
    }
    digits
        .chunks(2)
        .map(|pair| {
            let hi = (pair[0] as char).to_digit(16);
            let lo = (pair[1] as char).to_digit(16);
            match (hi, lo) {
                (Some(h), Some(l)) => Ok((h * 16 + l) as u8),
                _ => Err(InkError::MalformedApdu("non-hex character")),
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hex(s: &str) -> Vec<u8> {
        parse_hex(s).unwrap()
    }

    #[test]
    fn authenticate_bytes() {
        assert_eq!(Apdu::authenticate().to_bytes().to_vec(), hex("0020000104 20091210"));
    }

    #[test]
    fn case2_commands() {
        assert_eq!(Apdu::device_info().to_bytes().to_vec(), hex("00D1000000"));
        assert_eq!(Apdu::start_refresh().to_bytes().to_vec(), hex("F0D4858000"));
        assert_eq!(Apdu::poll_refresh().to_bytes().to_vec(), hex("F0DE000001"));
    }

    #[test]
    fn panel_type_default_and_two_color() {
        assert_eq!(Apdu::panel_type(15).to_bytes().to_vec(), hex("F0D8000005000000000E"));
        assert_eq!(Apdu::panel_type(4).data.to_vec(), vec![0, 0, 0, 0, 3]);
    }

    #[test]
    fn image_fragment_final_and_intermediate() {
        let apdu = Apdu::image_fragment(0, 0, &[0xAA, 0xBB], true);
        assert_eq!(apdu.to_bytes().to_vec(), hex("F0D3000104 0000AABB"));

        let apdu = Apdu::image_fragment(2, 0, &[0u8; 250], false);
        let raw = apdu.to_bytes();
        assert_eq!(&raw[..7], &hex("F0D30000FC0200")[..]);
        assert_eq!(raw.len(), 5 + 252);
    }

    #[test]
    fn literal_example_block_decodes() {
        let raw = hex("F0D300011600000255555555552000000000000000B10000110000");
        let apdu = Apdu::parse(&raw).unwrap();
        assert_eq!(apdu.to_bytes().to_vec(), raw);

        let frag = FragmentCommand::decode(&apdu).unwrap();
        assert!(frag.is_final);
        assert_eq!(frag.block_no, 0);
        assert_eq!(frag.frag_no, 0);
        assert_eq!(frag.payload.len(), 20);
    }

    #[test]
    fn parse_rejects_bad_lc() {
        assert!(Apdu::parse(&hex("F0D3000105 0000AABB")).is_err());
        assert!(Apdu::parse(&hex("F0D3")).is_err());
    }

    #[test]
    fn status_words() {
        assert_eq!(StatusWord::from_bytes(0x90, 0x00), StatusWord::SUCCESS);
        assert_eq!(StatusWord(0x6A86).class(), StatusClass::InvalidParameters);
        assert_eq!(StatusWord(0x6700).class(), StatusClass::WrongLength);
        assert_eq!(StatusWord(0x6D00).class(), StatusClass::UnsupportedInstruction);
        assert_eq!(StatusWord(0x6982).class(), StatusClass::Unrecognized);
        assert_eq!(StatusWord(0x6A86).to_string(), "6A86");
    }

    #[test]
    fn response_split() {
        let r = Response::parse(&[0x01, 0x90, 0x00]).unwrap();
        assert_eq!(r.data.to_vec(), vec![0x01]);
        assert!(r.status.is_success());
        assert_eq!(r.to_bytes().to_vec(), vec![0x01, 0x90, 0x00]);
        assert!(Response::parse(&[0x90]).is_err());
    }

    #[test]
    fn refresh_poll_body() {
        assert_eq!(refresh_complete(&[0x00]), Some(true));
        assert_eq!(refresh_complete(&[0x01]), Some(false));
        assert_eq!(refresh_complete(&[]), None);
        assert_eq!(refresh_complete(&[0x7F]), None);
    }
}
