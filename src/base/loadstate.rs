/// Coarse progress of one exchange.
/// A reduced form of net/base/load_states.h
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    /// Not started, or finished.
    #[default]
    Idle,

    /// Waiting for a pooled connection, or resolving and connecting a new one.
    Connecting,

    /// Waiting for the response head.
    WaitingForResponse,

    /// Reading the response body.
    ReadingResponse,
}
