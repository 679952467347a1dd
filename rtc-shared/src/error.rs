#![allow(dead_code)]

use std::io;
use std::num::ParseIntError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    // RTP errors
    #[error("RTP header size insufficient")]
    ErrHeaderSizeInsufficient,
    #[error("RTP header size insufficient for extension")]
    ErrHeaderSizeInsufficientForExtension,
    #[error("buffer too small")]
    ErrBufferTooSmall,
    #[error("extension not enabled")]
    ErrHeaderExtensionsNotEnabled,
    #[error("extension not found")]
    ErrHeaderExtensionNotFound,
    #[error("header extension id must be between 1 and 14 for RFC 5285 one-byte extensions")]
    ErrRfc8285OneByteHeaderIdRange,
    #[error("header extension payload must be 16 bytes or less for RFC 5285 one-byte extensions")]
    ErrRfc8285OneByteHeaderSize,
    #[error("header extension id must be between 1 and 255 for RFC 5285 two-byte extensions")]
    ErrRfc8285TwoByteHeaderIdRange,
    #[error(
        "header extension payload must be 255 bytes or less for RFC 5285 two-byte extensions"
    )]
    ErrRfc8285TwoByteHeaderSize,
    #[error("packet is not large enough")]
    ErrShortPacket,
    #[error("invalid nil packet")]
    ErrNilPacket,

    // RTCP errors
    #[error("wrong marshal size")]
    WrongMarshalSize,
    #[error("invalid total lost count")]
    InvalidTotalLost,
    #[error("invalid header")]
    InvalidHeader,
    #[error("empty compound packet")]
    EmptyCompound,
    #[error("packet status chunk must be 2 bytes")]
    PacketTooShort,
    #[error("wrong packet type")]
    WrongType,
    #[error("invalid packet version")]
    BadVersion,
    #[error("invalid padding value")]
    WrongPadding,
    #[error("wrong feedback message type")]
    WrongFeedbackType,
    #[error("header length is too small")]
    HeaderTooSmall,
    #[error("SSRC number and length do not match")]
    SsrcNumAndLengthMismatch,
    #[error("invalid size or start index")]
    InvalidSizeOrStartIndex,
    #[error("delta exceeds limit")]
    DeltaExceedLimit,
    #[error("too many chunks")]
    TooManyChunks,
    #[error("wrong chunk type")]
    WrongChunkType,

    // interceptor / bandwidth-estimation errors
    #[error("stream not bound")]
    ErrStreamNotBound,
    #[error("missing transport-wide CC header extension")]
    ErrMissingTwccExtension,
    #[error("invalid feedback report")]
    ErrInvalidFeedback,
    #[error("send buffer size must be a power of two")]
    ErrInvalidSendBufferSize,
    #[error("invalid protection factor")]
    ErrInvalidProtectionFactor,

    // config / persistence errors
    #[error("invalid listen address: {0}")]
    ErrInvalidAddr(String),
    #[error("config: {0}")]
    ErrConfig(String),
    #[error("json: {0}")]
    Json(String),

    #[error("parse int: {0}")]
    ParseInt(#[from] ParseIntError),
    #[error("{0}")]
    Io(#[source] IoError),
    #[error("{0}")]
    Other(String),
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(IoError(e))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Json(e.to_string())
    }
}

#[derive(Debug, Error)]
#[error("io error: {0}")]
pub struct IoError(#[from] pub io::Error);

impl PartialEq for IoError {
    fn eq(&self, other: &Self) -> bool {
        self.0.kind() == other.0.kind()
    }
}
