use super::ConnectionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    PortAcquired,
    PortOpen,
    ClosingForReconfigure,
    DisconnectingFully,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisconnectStatus {
    /// Reader stopped and port closed, access grant kept.
    ClosedForReconfigure,
    /// Access grant released; the next connect asks again.
    Disconnected,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleEvent {
    Connected { reused_handle: bool, baud_rate: u32 },
    Disconnected(DisconnectStatus),
    Failed(ConnectionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Connect,
    Disconnect,
    AccessGranted,
    Opened { reused: bool, baud_rate: u32 },
    ReaderStopped,
    ReaderFailed(String),
    ExternalDisconnect,
    Failed(ConnectionError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    RequestAccess,
    Open { reused: bool },
    StartReader,
    StopReader,
    ClosePort,
    ReleasePort,
    Emit(LifecycleEvent),
}

#[derive(Debug, PartialEq, Eq)]
pub struct Step {
    pub next: ConnectionState,
    pub effects: Vec<Effect>,
}

fn to(next: ConnectionState, effects: Vec<Effect>) -> Step {
    Step { next, effects }
}

fn release_fully() -> Vec<Effect> {
    vec![
        Effect::ClosePort,
        Effect::ReleasePort,
        Effect::Emit(LifecycleEvent::Disconnected(DisconnectStatus::Disconnected)),
    ]
}

pub fn step(state: ConnectionState, input: &Input) -> Step {
    use ConnectionState::*;

    match (state, input) {
        (Disconnected, Input::Connect) => to(Disconnected, vec![Effect::RequestAccess]),
        (Disconnected, Input::AccessGranted) => to(PortAcquired, vec![Effect::Open { reused: false }]),

        (PortAcquired, Input::Connect) => to(PortAcquired, vec![Effect::Open { reused: true }]),
        (PortAcquired, Input::Opened { reused, baud_rate }) => to(
            PortOpen,
            vec![
                Effect::Emit(LifecycleEvent::Connected {
                    reused_handle: *reused,
                    baud_rate: *baud_rate,
                }),
                Effect::StartReader,
            ],
        ),
        (PortAcquired, Input::Disconnect) => to(Disconnected, release_fully()),
        (PortAcquired, Input::ExternalDisconnect) => {
            let mut effects = vec![Effect::Emit(LifecycleEvent::Failed(
                ConnectionError::ExternalDisconnect,
            ))];
            effects.extend(release_fully());
            to(Disconnected, effects)
        }

        (PortOpen, Input::Connect) => to(ClosingForReconfigure, vec![Effect::StopReader]),
        (PortOpen, Input::Disconnect) => to(DisconnectingFully, vec![Effect::StopReader]),
        (PortOpen, Input::ReaderFailed(reason)) => to(
            DisconnectingFully,
            vec![
                Effect::StopReader,
                Effect::Emit(LifecycleEvent::Failed(ConnectionError::ReadError(reason.clone()))),
            ],
        ),
        (PortOpen | ClosingForReconfigure, Input::ExternalDisconnect) => to(
            DisconnectingFully,
            vec![
                Effect::StopReader,
                Effect::Emit(LifecycleEvent::Failed(ConnectionError::ExternalDisconnect)),
            ],
        ),

        (ClosingForReconfigure, Input::ReaderStopped) => to(
            PortAcquired,
            vec![
                Effect::ClosePort,
                Effect::Emit(LifecycleEvent::Disconnected(DisconnectStatus::ClosedForReconfigure)),
                Effect::Open { reused: true },
            ],
        ),
        (DisconnectingFully, Input::ReaderStopped) => to(Disconnected, release_fully()),

        // Access or open failed: nothing survives.
        (Disconnected | PortAcquired, Input::Failed(err)) => to(
            Disconnected,
            vec![
                Effect::ClosePort,
                Effect::ReleasePort,
                Effect::Emit(LifecycleEvent::Failed(err.clone())),
            ],
        ),

        // Idempotent disconnects, stale reader/removal notices, and connect
        // requests arriving mid-teardown.
        (state, _) => to(state, Vec::new()),
    }
}
