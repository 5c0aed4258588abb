use plastron_schema::ContainerState;

/// Map the control endpoint's free-text status to a canonical state.
///
/// The endpoint reports status through container-runtime text fragments
/// ("Up 3 minutes (healthy)", "Exited (0) 2 seconds ago", ...), sometimes on
/// the stderr channel. The fragments below are the best-known current
/// contract, not a stable guarantee. Returns `None` for unmatched text.
pub fn classify(text: &str) -> Option<ContainerState> {
    if text.contains("Creating") {
        Some(ContainerState::Loading)
    } else if text.contains("Stopping") {
        Some(ContainerState::Stopping)
    } else if text.contains("Paused") {
        Some(ContainerState::Paused)
    } else if text.contains("Exited") {
        Some(ContainerState::Exited)
    } else if text.contains("starting") || text.contains("unhealthy") {
        // "unhealthy" before "healthy": containment matches both.
        Some(ContainerState::Created)
    } else if text.contains("healthy") {
        Some(ContainerState::Running)
    } else {
        None
    }
}

/// Classify both output channels; stdout wins when it matches.
///
/// The second element flags an ambiguous result: neither channel matched and
/// the state fell back to `Uninitialized`.
pub fn classify_output(stdout: &str, stderr: &str) -> (ContainerState, bool) {
    match classify(stdout).or_else(|| classify(stderr)) {
        Some(state) => (state, false),
        None => (ContainerState::Uninitialized, true),
    }
}
