use std::io;
use thiserror::Error;

use crate::network::TransportError;

/// Library-defined error codes.
///
/// Every public operation reports either success (`0`), a positive `errno`
/// value from the operating system, or one of these negative codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum LibraryCode {
    Unknown = -10,
    Internal = -11,
    IpAddress = -12,
    AfInet = -13,
    TooFewResponses = -14,
    BadResponses = -15,
    NoGoodResponse = -16,
    NtpInconsistency = -17,
    NtpInsanity = -18,
}

impl LibraryCode {
    /// All library codes, in numeric order from -10 downwards
    pub const ALL: [LibraryCode; 9] = [
        LibraryCode::Unknown,
        LibraryCode::Internal,
        LibraryCode::IpAddress,
        LibraryCode::AfInet,
        LibraryCode::TooFewResponses,
        LibraryCode::BadResponses,
        LibraryCode::NoGoodResponse,
        LibraryCode::NtpInconsistency,
        LibraryCode::NtpInsanity,
    ];

    /// Returns the numeric value of this code
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Looks up the library code for a negative value
    pub fn from_code(code: i32) -> Option<Self> {
        Self::ALL.iter().copied().find(|c| c.code() == code)
    }

    /// Fixed human-readable description
    pub fn description(self) -> &'static str {
        match self {
            LibraryCode::Unknown => "unknown error",
            LibraryCode::Internal => "internal error",
            LibraryCode::IpAddress => "invalid IP address",
            LibraryCode::AfInet => "the address does not seem to be an Internet one",
            LibraryCode::TooFewResponses => "too few responses from the time server",
            LibraryCode::BadResponses => "inconsistent responses from the time server",
            LibraryCode::NoGoodResponse => "no acceptable response from the time server",
            LibraryCode::NtpInconsistency => "NTP protocol inconsistency",
            LibraryCode::NtpInsanity => "NTP response failed sanity checks",
        }
    }
}

/// Custom error types for the SNTP library
#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Too few responses: {0}")]
    TooFewResponses(String),

    #[error("Bad responses: {0}")]
    BadResponses(String),

    #[error("No good response: {0}")]
    NoGoodResponse(String),

    #[error("NTP inconsistency: {0}")]
    NtpInconsistency(String),

    #[error("NTP insanity: {0}")]
    NtpInsanity(String),

    #[error("server is not listening")]
    NotListening,

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias using our custom Error type
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Creates a new too-few-responses error
    pub fn too_few_responses(msg: impl Into<String>) -> Self {
        Error::TooFewResponses(msg.into())
    }

    /// Creates a new bad-responses error
    pub fn bad_responses(msg: impl Into<String>) -> Self {
        Error::BadResponses(msg.into())
    }

    /// Creates a new no-good-response error
    pub fn no_good_response(msg: impl Into<String>) -> Self {
        Error::NoGoodResponse(msg.into())
    }

    /// Creates a new NTP inconsistency error
    pub fn ntp_inconsistency(msg: impl Into<String>) -> Self {
        Error::NtpInconsistency(msg.into())
    }

    /// Creates a new NTP insanity error
    pub fn ntp_insanity(msg: impl Into<String>) -> Self {
        Error::NtpInsanity(msg.into())
    }

    /// Creates a new configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Normalises this error into the signed code space.
    ///
    /// Positive values are `errno` magnitudes, negative values are
    /// [`LibraryCode`]s. Never returns zero.
    pub fn code(&self) -> i32 {
        match self {
            Error::Transport(e) => e.code(),
            Error::Io(e) => os_code(e),
            Error::TooFewResponses(_) => LibraryCode::TooFewResponses.code(),
            Error::BadResponses(_) => LibraryCode::BadResponses.code(),
            Error::NoGoodResponse(_) => LibraryCode::NoGoodResponse.code(),
            Error::NtpInconsistency(_) => LibraryCode::NtpInconsistency.code(),
            Error::NtpInsanity(_) => LibraryCode::NtpInsanity.code(),
            Error::NotListening | Error::Config(_) => LibraryCode::Internal.code(),
        }
    }
}

/// Code for an I/O error: its `errno` if it came from the OS, otherwise
/// [`LibraryCode::Unknown`].
pub fn os_code(err: &io::Error) -> i32 {
    match err.raw_os_error() {
        Some(code) if code > 0 => code,
        _ => LibraryCode::Unknown.code(),
    }
}

/// Renders any code of the signed code space as a non-empty string.
pub fn describe(code: i32) -> String {
    if code == 0 {
        return "success".to_string();
    }
    if code > 0 {
        return io::Error::from_raw_os_error(code).to_string();
    }
    match LibraryCode::from_code(code) {
        Some(known) => known.description().to_string(),
        None => format!("unrecognised library error {}", code),
    }
}
