use strum_macros::Display;
use uuid::Uuid;

use crate::error::{Result, VersaError};
use crate::ledger::OperationKind;

/// Progress of one lifecycle request
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "lowercase")]
pub enum LifecycleState {
    Received,
    Ingested,
    Extracted,
    Computed,
    Persisted,
    Done,
    Failed,
}

impl LifecycleState {
    pub fn is_terminal(self) -> bool {
        matches!(self, LifecycleState::Done | LifecycleState::Failed)
    }
}

/// Forward-only state tracker for a single request; every transition is logged
#[derive(Debug)]
pub struct Flow {
    request_id: Uuid,
    kind: OperationKind,
    version: String,
    state: LifecycleState,
}

impl Flow {
    pub fn new(kind: OperationKind, version: &str) -> Self {
        let flow = Self {
            request_id: Uuid::new_v4(),
            kind,
            version: version.to_string(),
            state: LifecycleState::Received,
        };
        tracing::debug!(
            request_id = %flow.request_id,
            operation = %kind,
            version,
            "request received"
        );
        flow
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn request_id(&self) -> Uuid {
        self.request_id
    }

    /// Move to a later state. Skipping states is allowed, going back is not.
    pub fn advance(&mut self, next: LifecycleState) -> Result<()> {
        if self.state.is_terminal() || next <= self.state || next == LifecycleState::Failed {
            return Err(VersaError::InvalidTransition(format!(
                "{} -> {}",
                self.state, next
            )));
        }

        tracing::debug!(
            request_id = %self.request_id,
            operation = %self.kind,
            version = %self.version,
            from = %self.state,
            to = %next,
            "lifecycle transition"
        );
        self.state = next;
        Ok(())
    }

    /// Close the flow: `Done` on success, `Failed` otherwise
    pub fn conclude<T>(&mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => {
                self.advance(LifecycleState::Done)?;
                tracing::info!(
                    request_id = %self.request_id,
                    operation = %self.kind,
                    version = %self.version,
                    "request completed"
                );
            }
            Err(e) => {
                tracing::warn!(
                    request_id = %self.request_id,
                    operation = %self.kind,
                    version = %self.version,
                    state = %self.state,
                    error = %e,
                    "request failed"
                );
                self.state = LifecycleState::Failed;
            }
        }
        result
    }
}
