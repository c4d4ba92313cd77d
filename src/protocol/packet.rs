use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::codec::{BinaryReader, ByteView};
use crate::error::{Error, Result};

/// Offset of application data within a captured segment
pub const IPC_DATA: usize = 0x20;

/// Segment type carrying IPC messages
pub const SEGMENT_IPC: u16 = 3;

/// Magic value at the start of every IPC header
pub const IPC_MAGIC: u16 = 0x14;

/// Which side of the connection sent a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Client,
    Server,
}

impl std::fmt::Display for Origin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Client => write!(f, "client"),
            Self::Server => write!(f, "server"),
        }
    }
}

/// One captured IPC message.
///
/// `data` is the whole segment, header included; `size()` is its length.
/// Heuristic offsets are relative to [`IPC_DATA`] via the `ipc_*` readers.
#[derive(Debug, Clone)]
pub struct IpcPacket {
    pub origin: Origin,
    pub source_actor: u32,
    pub target_actor: u32,
    pub segment_type: u16,
    pub opcode: u16,
    pub server_id: u16,
    pub timestamp: u32,
    pub data: Bytes,
}

impl IpcPacket {
    /// Decode the segment and IPC headers of a raw capture
    pub fn parse(origin: Origin, data: impl Into<Bytes>) -> Result<Self> {
        let data = data.into();
        if data.len() < IPC_DATA {
            return Err(Error::InvalidPacket(format!(
                "{} bytes is shorter than the {IPC_DATA}-byte header",
                data.len()
            )));
        }

        let mut reader = BinaryReader::new(&data);
        let segment_size = reader.read_u32_le()?;
        let source_actor = reader.read_u32_le()?;
        let target_actor = reader.read_u32_le()?;
        let segment_type = reader.read_u16_le()?;
        reader.skip(2)?;
        let magic = reader.read_u16_le()?;
        let opcode = reader.read_u16_le()?;
        reader.skip(2)?;
        let server_id = reader.read_u16_le()?;
        let timestamp = reader.read_u32_le()?;

        if segment_size as usize != data.len() {
            return Err(Error::InvalidPacket(format!(
                "segment header claims {segment_size} bytes, capture has {}",
                data.len()
            )));
        }
        if segment_type == SEGMENT_IPC && magic != IPC_MAGIC {
            return Err(Error::InvalidPacket(format!("bad IPC magic {magic:#06x}")));
        }

        Ok(Self {
            origin,
            source_actor,
            target_actor,
            segment_type,
            opcode,
            server_id,
            timestamp,
            data,
        })
    }

    pub fn size(&self) -> usize {
        self.data.len()
    }

    pub fn is_self_directed(&self) -> bool {
        self.source_actor == self.target_actor
    }

    /// Absolute view over the whole segment
    pub fn view(&self) -> ByteView<'_> {
        ByteView::new(&self.data)
    }

    /// Application data, empty if the segment is header-only
    pub fn ipc_data(&self) -> &[u8] {
        self.data.get(IPC_DATA..).unwrap_or_default()
    }

    pub fn ipc_u8(&self, offset: usize) -> Result<u8> {
        self.view().u8_at(IPC_DATA + offset)
    }

    pub fn ipc_u16(&self, offset: usize) -> Result<u16> {
        self.view().u16_at(IPC_DATA + offset)
    }

    pub fn ipc_i16(&self, offset: usize) -> Result<i16> {
        self.view().i16_at(IPC_DATA + offset)
    }

    pub fn ipc_u32(&self, offset: usize) -> Result<u32> {
        self.view().u32_at(IPC_DATA + offset)
    }

    pub fn ipc_u64(&self, offset: usize) -> Result<u64> {
        self.view().u64_at(IPC_DATA + offset)
    }

    pub fn ipc_f32(&self, offset: usize) -> Result<f32> {
        self.view().f32_at(IPC_DATA + offset)
    }
}

/// Build a segment for injection into tests or replays.
///
/// Payload offsets are relative to [`IPC_DATA`]; writes past the current end
/// grow the buffer.
pub struct PacketBuilder {
    origin: Origin,
    source_actor: u32,
    target_actor: u32,
    opcode: u16,
    data: Vec<u8>,
}

impl PacketBuilder {
    /// A zero-filled segment of `size` bytes (header included)
    pub fn new(origin: Origin, size: usize) -> Self {
        Self {
            origin,
            source_actor: 0,
            target_actor: 0,
            opcode: 0,
            data: vec![0; size.max(IPC_DATA)],
        }
    }

    pub fn actors(mut self, source: u32, target: u32) -> Self {
        self.source_actor = source;
        self.target_actor = target;
        self
    }

    pub fn opcode(mut self, opcode: u16) -> Self {
        self.opcode = opcode;
        self
    }

    pub fn bytes(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.put(IPC_DATA + offset, bytes);
        self
    }

    /// Write at an absolute segment offset
    pub fn raw(mut self, offset: usize, bytes: &[u8]) -> Self {
        self.put(offset, bytes);
        self
    }

    pub fn u8(self, offset: usize, value: u8) -> Self {
        self.bytes(offset, &[value])
    }

    pub fn u16(self, offset: usize, value: u16) -> Self {
        self.bytes(offset, &value.to_le_bytes())
    }

    pub fn u32(self, offset: usize, value: u32) -> Self {
        self.bytes(offset, &value.to_le_bytes())
    }

    pub fn u64(self, offset: usize, value: u64) -> Self {
        self.bytes(offset, &value.to_le_bytes())
    }

    pub fn f32(self, offset: usize, value: f32) -> Self {
        self.bytes(offset, &value.to_le_bytes())
    }

    fn put(&mut self, offset: usize, bytes: &[u8]) {
        let end = offset + bytes.len();
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[offset..end].copy_from_slice(bytes);
    }

    /// Serialize the headers and return the raw segment
    pub fn into_bytes(mut self) -> Vec<u8> {
        let size = self.data.len() as u32;
        self.data[0x00..0x04].copy_from_slice(&size.to_le_bytes());
        self.data[0x04..0x08].copy_from_slice(&self.source_actor.to_le_bytes());
        self.data[0x08..0x0C].copy_from_slice(&self.target_actor.to_le_bytes());
        self.data[0x0C..0x0E].copy_from_slice(&SEGMENT_IPC.to_le_bytes());
        self.data[0x10..0x12].copy_from_slice(&IPC_MAGIC.to_le_bytes());
        self.data[0x12..0x14].copy_from_slice(&self.opcode.to_le_bytes());
        self.data
    }

    pub fn build(self) -> IpcPacket {
        let origin = self.origin;
        let source_actor = self.source_actor;
        let target_actor = self.target_actor;
        let opcode = self.opcode;
        IpcPacket {
            origin,
            source_actor,
            target_actor,
            segment_type: SEGMENT_IPC,
            opcode,
            server_id: 0,
            timestamp: 0,
            data: Bytes::from(self.into_bytes()),
        }
    }
}
