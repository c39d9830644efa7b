use strum_macros::Display;
use thiserror::Error;

/// Error type for this library.
#[derive(Error, Debug)]
pub enum Error {
    #[error("WebRTC error: {0}")]
    WebRTCError(#[from] webrtc::Error),
    #[error("media error: {message}, kind: {kind}")]
    MediaError {
        message: String,
        kind: MediaErrorKind,
    },
    #[error("session error: {message}, kind: {kind}")]
    SessionError {
        message: String,
        kind: SessionErrorKind,
    },
    #[error("transport error: {message}, kind: {kind}")]
    TransportError {
        message: String,
        kind: TransportErrorKind,
    },
    #[error("signaling error: {message}, kind: {kind}")]
    SignalingError {
        message: String,
        kind: SignalingErrorKind,
    },
}

/// Media-acquisition failures reported by the capture layer. They are surfaced
/// verbatim to the owner and never retried here.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum MediaErrorKind {
    PermissionDeniedError,
    UnsupportedError,
    DeviceNotFoundError,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SessionErrorKind {
    NotFoundError,
    ExpiredError,
    CodeTakenError,
    StorageUnavailableError,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    SubscribeFailedError,
    PublishFailedError,
    ClosedError,
}

#[derive(Debug, Display, Clone, Copy, PartialEq, Eq)]
pub enum SignalingErrorKind {
    InvalidStateError,
    SignalProcessingError,
    CandidateRejectedError,
}

impl Error {
    pub fn new_media(message: String, kind: MediaErrorKind) -> Error {
        Error::MediaError { message, kind }
    }

    pub fn new_session(message: String, kind: SessionErrorKind) -> Error {
        Error::SessionError { message, kind }
    }

    pub fn new_transport(message: String, kind: TransportErrorKind) -> Error {
        Error::TransportError { message, kind }
    }

    pub fn new_signaling(message: String, kind: SignalingErrorKind) -> Error {
        Error::SignalingError { message, kind }
    }

    pub fn media_kind(&self) -> Option<MediaErrorKind> {
        match self {
            Error::MediaError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn session_kind(&self) -> Option<SessionErrorKind> {
        match self {
            Error::SessionError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn transport_kind(&self) -> Option<TransportErrorKind> {
        match self {
            Error::TransportError { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    pub fn signaling_kind(&self) -> Option<SignalingErrorKind> {
        match self {
            Error::SignalingError { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_reported_by_domain() {
        let err = Error::new_media(
            "screen capture permission was denied".to_owned(),
            MediaErrorKind::PermissionDeniedError,
        );
        assert_eq!(err.media_kind(), Some(MediaErrorKind::PermissionDeniedError));
        assert_eq!(err.session_kind(), None);

        let err = Error::new_session(
            "registry unreachable".to_owned(),
            SessionErrorKind::StorageUnavailableError,
        );
        assert_eq!(
            err.session_kind(),
            Some(SessionErrorKind::StorageUnavailableError)
        );
        assert_eq!(err.transport_kind(), None);
    }

    #[test]
    fn messages_carry_the_kind() {
        let err = Error::new_transport(
            "subscription lost".to_owned(),
            TransportErrorKind::SubscribeFailedError,
        );
        assert_eq!(
            err.to_string(),
            "transport error: subscription lost, kind: SubscribeFailedError"
        );
    }
}
