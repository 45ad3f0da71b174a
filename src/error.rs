/// Errors produced by the MDP-P906 protocol and session layers.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A request payload does not fit into a single radio packet.
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
    /// A received frame failed checksum validation.
    #[error("checksum mismatch: calculated={calculated:#04x} received={received:#04x}")]
    ChecksumMismatch { calculated: u8, received: u8 },
    /// A frame decoded cleanly but carries a different type than expected.
    #[error("unexpected message type: expected={expected} received={received}")]
    UnexpectedType { expected: u8, received: u8 },
    /// A frame of the right type violates a length or shape invariant.
    #[error("malformed response: {0}")]
    MalformedResponse(&'static str),
    /// The receive retry budget was exhausted without a valid frame.
    #[error("no valid frame received within {0} attempts")]
    Recv(usize),
    /// A caller-supplied value is outside the device's accepted domain.
    #[error("invalid parameter: {0}")]
    InvalidParameter(&'static str),
    /// An operation was attempted before the device identity (or the
    /// calibration constants it depends on) was established.
    #[error("device identity not established")]
    NotConnected,
    /// An I/O error from the underlying transport.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
