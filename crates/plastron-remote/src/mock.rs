use crate::{ControlAction, ControlBackend, ControlError, ControlOutcome, ControlRequest};
use plastron_schema::ContainerState;
use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

/// Scripted control backend for tests.
///
/// Responses are consumed per container id from a queue; when the queue for
/// an id is empty its default response is used, and absent that, a plain
/// `Uninitialized` outcome. Every invocation is recorded for assertions.
pub struct MockControlBackend {
    queues: Mutex<HashMap<String, VecDeque<Result<ControlOutcome, ControlError>>>>,
    defaults: Mutex<HashMap<String, Result<ControlOutcome, ControlError>>>,
    log: Mutex<Vec<(String, ControlAction)>>,
}

impl Default for MockControlBackend {
    fn default() -> Self {
        Self {
            queues: Mutex::new(HashMap::new()),
            defaults: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
        }
    }
}

impl MockControlBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue one response for `id`, consumed before the default.
    pub fn push(&self, id: &str, response: Result<ControlOutcome, ControlError>) {
        self.queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.to_owned())
            .or_default()
            .push_back(response);
    }

    /// Set the response returned for `id` whenever its queue is empty.
    pub fn set_default(&self, id: &str, response: Result<ControlOutcome, ControlError>) {
        self.defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.to_owned(), response);
    }

    /// Shorthand: default outcome for `id` is a bare state.
    pub fn set_state(&self, id: &str, state: ContainerState) {
        self.set_default(id, Ok(ControlOutcome::with_state(state)));
    }

    pub fn invocations(&self) -> Vec<(String, ControlAction)> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_for(&self, id: &str, action: ControlAction) -> usize {
        self.invocations()
            .iter()
            .filter(|(i, a)| i == id && *a == action)
            .count()
    }
}

#[async_trait::async_trait]
impl ControlBackend for MockControlBackend {
    async fn invoke(
        &self,
        request: &ControlRequest,
        action: ControlAction,
    ) -> Result<ControlOutcome, ControlError> {
        self.log
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((request.id.clone(), action));

        if let Some(response) = self
            .queues
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(&request.id)
            .and_then(VecDeque::pop_front)
        {
            return response;
        }

        if let Some(response) = self
            .defaults
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&request.id)
        {
            return response.clone();
        }

        Ok(ControlOutcome::with_state(ContainerState::Uninitialized))
    }
}
