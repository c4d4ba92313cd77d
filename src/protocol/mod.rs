pub mod packet;
pub mod capture;

pub use packet::{
    IpcPacket, PacketBuilder, Origin,
    IPC_DATA, IPC_MAGIC, SEGMENT_IPC,
};
pub use capture::{CaptureRecord, parse_line, stream_file};
