//! Stage machine followed by every gateway request.

use std::fmt;

use gateway_primitives::RequestId;
use thiserror::Error;
use tracing::debug;

/// Stages a request passes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStage {
    /// Request fields are being checked.
    Validating,
    /// The tool is being resolved to a backend.
    Resolving,
    /// The prompt is being rendered.
    Rendering,
    /// The backend is being invoked under the deadline.
    Dispatching,
    /// Latency and cost are being computed.
    Scoring,
    /// The record has been assembled.
    Completed,
    /// The request ended with an error.
    Failed,
}

impl ExecutionStage {
    /// Returns `true` for [`Completed`](Self::Completed) and [`Failed`](Self::Failed).
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    const fn successor(self) -> Option<Self> {
        match self {
            Self::Validating => Some(Self::Resolving),
            Self::Resolving => Some(Self::Rendering),
            Self::Rendering => Some(Self::Dispatching),
            Self::Dispatching => Some(Self::Scoring),
            Self::Scoring => Some(Self::Completed),
            Self::Completed | Self::Failed => None,
        }
    }
}

impl fmt::Display for ExecutionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Validating => "validating",
            Self::Resolving => "resolving",
            Self::Rendering => "rendering",
            Self::Dispatching => "dispatching",
            Self::Scoring => "scoring",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Tracks the stage of one request.
#[derive(Debug, Clone, Copy)]
pub struct StageTracker {
    request_id: RequestId,
    stage: ExecutionStage,
}

impl StageTracker {
    /// Starts tracking a request in [`ExecutionStage::Validating`].
    #[must_use]
    pub const fn new(request_id: RequestId) -> Self {
        Self {
            request_id,
            stage: ExecutionStage::Validating,
        }
    }

    /// Returns the request being tracked.
    #[must_use]
    pub const fn request_id(&self) -> RequestId {
        self.request_id
    }

    /// Returns the current stage.
    #[must_use]
    pub const fn stage(&self) -> ExecutionStage {
        self.stage
    }

    /// Moves to the stage following the current one.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Finished`] from a terminal stage.
    pub fn advance(&mut self) -> StageResult<ExecutionStage> {
        let next = self.stage.successor().ok_or(StageError::Finished {
            request_id: self.request_id,
            stage: self.stage,
        })?;
        self.enter(next);
        Ok(next)
    }

    /// Moves to `next`, which must directly follow the current stage.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::InvalidTransition`] when `next` skips or revisits a stage.
    pub fn advance_to(&mut self, next: ExecutionStage) -> StageResult<ExecutionStage> {
        if self.stage.successor() != Some(next) {
            return Err(StageError::InvalidTransition {
                request_id: self.request_id,
                from: self.stage,
                to: next,
            });
        }
        self.enter(next);
        Ok(next)
    }

    /// Marks the request failed. Allowed from any non-terminal stage; returns
    /// the stage the failure happened in.
    ///
    /// # Errors
    ///
    /// Returns [`StageError::Finished`] once the request is terminal.
    pub fn fail(&mut self) -> StageResult<ExecutionStage> {
        let from = self.stage;
        if from.is_terminal() {
            return Err(StageError::Finished {
                request_id: self.request_id,
                stage: from,
            });
        }
        self.enter(ExecutionStage::Failed);
        Ok(from)
    }

    fn enter(&mut self, next: ExecutionStage) {
        debug!(
            request_id = %self.request_id,
            from = %self.stage,
            to = %next,
            "request stage transition"
        );
        self.stage = next;
    }
}

/// Errors emitted by the stage tracker.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StageError {
    /// Transition is not permitted from the current stage.
    #[error("invalid stage transition from {from} to {to} for request {request_id}")]
    InvalidTransition {
        /// Request whose transition failed.
        request_id: RequestId,
        /// Stage before the attempted transition.
        from: ExecutionStage,
        /// Requested stage.
        to: ExecutionStage,
    },

    /// The request already reached a terminal stage.
    #[error("request {request_id} already {stage}")]
    Finished {
        /// Request whose transition failed.
        request_id: RequestId,
        /// Terminal stage it is in.
        stage: ExecutionStage,
    },
}

/// Result alias for stage operations.
pub type StageResult<T> = Result<T, StageError>;
