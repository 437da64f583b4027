//! Close status codes, as listed in [RFC 6455 Section 7.4](https://datatracker.ietf.org/doc/html/rfc6455#section-7.4).

/// Status code carried in the first two bytes of a Close frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseCode {
    /// Normal closure (1000).
    Normal,
    /// The endpoint is going away, e.g. a server shutting down (1001).
    Away,
    /// Protocol error (1002).
    Protocol,
    /// Received a data type it cannot accept (1003).
    Unsupported,
    /// No status code was present (1005). Must not be sent in a frame.
    Status,
    /// Connection closed without a Close frame (1006). Must not be sent in a frame.
    Abnormal,
    /// Payload inconsistent with the message type, e.g. invalid UTF-8 (1007).
    Invalid,
    /// Policy violation (1008).
    Policy,
    /// Message too big to process (1009).
    Size,
    /// Client expected an extension the server did not negotiate (1010).
    Extension,
    /// Unexpected condition on the server (1011).
    Error,
    /// Server is restarting (1012).
    Restart,
    /// Try again later (1013).
    Again,
    /// Codes reserved by the protocol with no assigned meaning.
    Reserved(u16),
    /// Codes in 3000-3999, registered with IANA.
    Iana(u16),
    /// Codes in 4000-4999, free for applications.
    Library(u16),
    /// Codes that must never appear on the wire.
    Bad(u16),
}

impl CloseCode {
    /// Returns whether the code may be sent in a Close frame.
    pub fn is_allowed(self) -> bool {
        !matches!(
            self,
            CloseCode::Bad(_) | CloseCode::Reserved(_) | CloseCode::Status | CloseCode::Abnormal
        )
    }
}

impl From<u16> for CloseCode {
    fn from(code: u16) -> Self {
        match code {
            1000 => CloseCode::Normal,
            1001 => CloseCode::Away,
            1002 => CloseCode::Protocol,
            1003 => CloseCode::Unsupported,
            1005 => CloseCode::Status,
            1006 => CloseCode::Abnormal,
            1007 => CloseCode::Invalid,
            1008 => CloseCode::Policy,
            1009 => CloseCode::Size,
            1010 => CloseCode::Extension,
            1011 => CloseCode::Error,
            1012 => CloseCode::Restart,
            1013 => CloseCode::Again,
            1004 | 1014..=2999 => CloseCode::Reserved(code),
            3000..=3999 => CloseCode::Iana(code),
            4000..=4999 => CloseCode::Library(code),
            _ => CloseCode::Bad(code),
        }
    }
}

impl From<CloseCode> for u16 {
    fn from(code: CloseCode) -> u16 {
        match code {
            CloseCode::Normal => 1000,
            CloseCode::Away => 1001,
            CloseCode::Protocol => 1002,
            CloseCode::Unsupported => 1003,
            CloseCode::Status => 1005,
            CloseCode::Abnormal => 1006,
            CloseCode::Invalid => 1007,
            CloseCode::Policy => 1008,
            CloseCode::Size => 1009,
            CloseCode::Extension => 1010,
            CloseCode::Error => 1011,
            CloseCode::Restart => 1012,
            CloseCode::Again => 1013,
            CloseCode::Reserved(code)
            | CloseCode::Iana(code)
            | CloseCode::Library(code)
            | CloseCode::Bad(code) => code,
        }
    }
}

impl std::fmt::Display for CloseCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", u16::from(*self))
    }
}
