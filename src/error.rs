#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("read of {width} bytes at offset {offset} overruns {len}-byte packet")]
    OutOfBounds { offset: usize, width: usize, len: usize },

    #[error("session cell `{0}` has not been captured yet")]
    CellUnset(&'static str),

    #[error("parameter {index} for {scanner}: cannot parse {value:?} as {expected}")]
    ParameterParse {
        scanner: String,
        index: usize,
        value: String,
        expected: &'static str,
    },

    #[error("{scanner} expects {expected} parameters, got {actual}")]
    ParameterCount {
        scanner: String,
        expected: usize,
        actual: usize,
    },

    #[error("scanner name must not be empty")]
    EmptyName,

    #[error("duplicate scanner: {0}")]
    DuplicateScanner(String),

    #[error("{scanner} has {prompts} parameter prompts but its scan function takes {arity}")]
    PromptArity {
        scanner: String,
        prompts: usize,
        arity: usize,
    },

    #[error("{0} was registered without a scan function")]
    MissingScan(String),

    #[error("{scanner} reads cell `{cell}` before any earlier scanner writes it")]
    CellOrder { scanner: String, cell: &'static str },

    #[error("calibration cell `{cell}` already owned by {owner}, {scanner} cannot write it")]
    CellOwnership {
        cell: &'static str,
        owner: String,
        scanner: String,
    },

    #[error("cell `{0}` declared with conflicting kinds or value types")]
    CellConflict(&'static str),

    #[error("{scanner} touched cell `{cell}` without declaring it")]
    UndeclaredCell { scanner: String, cell: &'static str },

    #[error("cell `{cell}` is a {kind} cell and cannot be written that way")]
    CellKindMismatch { cell: &'static str, kind: &'static str },

    #[error("invalid packet: {0}")]
    InvalidPacket(String),

    #[error("invalid capture record: {0}")]
    InvalidCapture(String),

    #[error("timeout waiting for a {scanner} packet")]
    ScanTimeout { scanner: String },

    #[error("capture stream closed")]
    StreamClosed,

    #[error("io error: {0}")]
    Io(String),
}

impl Error {
    /// Errors that mean "this packet is not the one", not a fault.
    pub fn is_rejection(&self) -> bool {
        matches!(self, Self::OutOfBounds { .. } | Self::CellUnset(_))
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
