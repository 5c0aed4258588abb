use plastron_remote::ControlAction;
use plastron_schema::{ContainerError, ContainerState};

/// Events dispatched against a container machine: caller actions plus the
/// synchronization events derived from reconciliation polling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Start,
    Stop,
    Pause,
    Resume,
    Restart,
    Destroy,
    RemoteStarted { url: Option<String> },
    RemoteStopped { error: Option<ContainerError> },
    RemoteCreated,
}

/// Control invocation performed on entering an auto state.
///
/// Fold targets are fixed by the table; the outcome's classified state is
/// informational only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Effect {
    pub action: ControlAction,
    pub on_success: ContainerState,
    pub on_error: ContainerState,
}

/// The transition table. Pairs absent from it are no-ops: `None` leaves
/// state and context untouched.
pub fn transition(state: ContainerState, event: &Event) -> Option<ContainerState> {
    use ContainerState as S;
    match (state, event) {
        (S::Uninitialized, Event::Start) => Some(S::Created),
        (S::Uninitialized, Event::RemoteStarted { .. }) => Some(S::Running),

        (S::Loading, Event::RemoteStarted { .. }) => Some(S::Running),
        (S::Loading, Event::RemoteStopped { .. }) => Some(S::Exited),

        (S::Running, Event::RemoteStopped { .. }) => Some(S::Exited),
        (S::Running, Event::Stop) => Some(S::Stopping),
        (S::Running, Event::Pause) => Some(S::Pausing),
        (S::Running, Event::Restart) => Some(S::Created),

        (S::Paused, Event::RemoteStopped { .. }) => Some(S::Exited),
        (S::Paused, Event::Resume) => Some(S::Resuming),

        (S::Exited, Event::RemoteStarted { .. }) => Some(S::Running),
        (S::Exited, Event::RemoteCreated) => Some(S::Loading),
        (S::Exited, Event::Destroy) => Some(S::Destroyed),
        (S::Exited, Event::Restart) => Some(S::Created),

        // Created/Pausing/Resuming/Stopping resolve through their entry
        // effect; Destroyed is terminal.
        _ => None,
    }
}

/// Side effect triggered by entering `state`, if any.
pub fn entry_effect(state: ContainerState) -> Option<Effect> {
    use ContainerState as S;
    match state {
        S::Created => Some(Effect {
            action: ControlAction::Start,
            on_success: S::Loading,
            on_error: S::Exited,
        }),
        S::Pausing => Some(Effect {
            action: ControlAction::Pause,
            on_success: S::Paused,
            on_error: S::Exited,
        }),
        S::Resuming => Some(Effect {
            action: ControlAction::Resume,
            on_success: S::Running,
            on_error: S::Exited,
        }),
        S::Stopping => Some(Effect {
            action: ControlAction::Stop,
            on_success: S::Exited,
            on_error: S::Running,
        }),
        S::Destroyed => Some(Effect {
            action: ControlAction::Destroy,
            on_success: S::Destroyed,
            on_error: S::Destroyed,
        }),
        _ => None,
    }
}
