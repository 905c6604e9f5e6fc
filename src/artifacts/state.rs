use std::fmt;

/// Lifecycle of one upload through the gateway.
///
/// Optional stages may be skipped, and every non-terminal state may jump to
/// `Cleanup`, which always runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestState {
    Received,
    Downloaded,
    TypeFixed,
    TransparencyChecked,
    Encoding,
    Encoded,
    EncodeFailed,
    Forwarding,
    Forwarded,
    ForwardFailed,
    Cleanup,
    Terminal,
}

impl RequestState {
    pub fn can_advance_to(self, next: RequestState) -> bool {
        use RequestState::*;

        if next == Cleanup {
            return !matches!(self, Cleanup | Terminal);
        }

        match self {
            Received => next == Downloaded,
            Downloaded => matches!(next, TypeFixed | TransparencyChecked | Encoding | Forwarding),
            TypeFixed => matches!(next, TransparencyChecked | Encoding | Forwarding),
            TransparencyChecked => matches!(next, Encoding | Forwarding),
            Encoding => matches!(next, Encoded | EncodeFailed),
            Encoded => next == Forwarding,
            Forwarding => matches!(next, Forwarded | ForwardFailed),
            EncodeFailed | Forwarded | ForwardFailed => false,
            Cleanup => next == Terminal,
            Terminal => false,
        }
    }
}

impl fmt::Display for RequestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
