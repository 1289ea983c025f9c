use crate::backend::{AnalysisBackend, AnalysisBody, BackendReply, Endpoint};
use crate::error::{AnalysisError, TransportError};
use crate::mode::AnalysisMode;
use std::fmt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub mod payload;

use payload::AnalysisPayload;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Pending,
    Success,
    Error,
    Cancelled,
}

/// Where a mode's request goes and how its result is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Route {
    pub endpoint: Endpoint,
    pub title_line: &'static str,
    pub loading_message: &'static str,
}

pub fn route(mode: AnalysisMode) -> Route {
    match mode {
        AnalysisMode::Full => Route {
            endpoint: Endpoint::Full,
            title_line: "## Full Analysis Report",
            loading_message: "Running full analysis (chart, news and fundamentals)...",
        },
        AnalysisMode::Technical => Route {
            endpoint: Endpoint::Technical,
            title_line: "## Technical Analysis Report",
            loading_message: "Running technical analysis...",
        },
        AnalysisMode::Volume => Route {
            endpoint: Endpoint::Volume,
            title_line: "## Volume Analysis Report",
            loading_message: "Analyzing trading volume spikes...",
        },
        AnalysisMode::Market => Route {
            endpoint: Endpoint::Market,
            title_line: "## Market Analysis Report",
            loading_message: "Collecting and analyzing market news...",
        },
        AnalysisMode::Total => Route {
            endpoint: Endpoint::Total,
            title_line: "## Total Analysis Report",
            loading_message: "Combining the selected reports...",
        },
        AnalysisMode::ReresearchAuto | AnalysisMode::ReresearchManual => Route {
            endpoint: Endpoint::Reresearch,
            title_line: "## Re-research Report",
            loading_message: "Re-researching the selected reports...",
        },
    }
}

/// Everything completion needs to file a session's result, fixed when the
/// session starts.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionTicket {
    pub id: SessionId,
    pub mode: AnalysisMode,
    pub route: Route,
    pub title: String,
    pub instrument_name: Option<String>,
}

#[derive(Debug)]
pub struct PendingSession {
    ticket: SessionTicket,
    payload: AnalysisPayload,
    token: CancellationToken,
}

impl PendingSession {
    pub fn new(ticket: SessionTicket, payload: AnalysisPayload) -> Self {
        Self {
            ticket,
            payload,
            token: CancellationToken::new(),
        }
    }

    pub fn id(&self) -> SessionId {
        self.ticket.id
    }

    pub fn mode(&self) -> AnalysisMode {
        self.ticket.mode
    }

    pub fn ticket(&self) -> &SessionTicket {
        &self.ticket
    }

    pub fn payload(&self) -> &AnalysisPayload {
        &self.payload
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Sends the request and waits for it or for cancellation, whichever
    /// comes first. The token is checked once more after the reply arrives.
    pub async fn execute(self, backend: &dyn AnalysisBackend) -> CompletedSession {
        let PendingSession {
            ticket,
            payload,
            token,
        } = self;

        let t0 = std::time::Instant::now();
        let outcome = tokio::select! {
            biased;
            _ = token.cancelled() => Err(AnalysisError::Cancelled(ticket.id)),
            reply = backend.analyze(ticket.route.endpoint, &payload) => {
                classify(ticket.id, &token, reply)
            }
        };

        tracing::debug!(
            session = %ticket.id,
            mode = %ticket.mode,
            elapsed_ms = t0.elapsed().as_millis(),
            ok = outcome.is_ok(),
            "session finished"
        );

        CompletedSession { ticket, outcome }
    }
}

fn classify(
    id: SessionId,
    token: &CancellationToken,
    reply: Result<BackendReply<AnalysisBody>, TransportError>,
) -> Result<AnalysisBody, AnalysisError> {
    if token.is_cancelled() {
        return Err(AnalysisError::Cancelled(id));
    }
    match reply? {
        BackendReply::Success(body) => Ok(body),
        BackendReply::Failure { error } => Err(AnalysisError::Domain(error)),
    }
}

#[derive(Debug)]
pub struct CompletedSession {
    pub ticket: SessionTicket,
    pub outcome: Result<AnalysisBody, AnalysisError>,
}

impl CompletedSession {
    pub fn id(&self) -> SessionId {
        self.ticket.id
    }

    pub fn status(&self) -> SessionStatus {
        match &self.outcome {
            Ok(_) => SessionStatus::Success,
            Err(err) if err.is_cancelled() => SessionStatus::Cancelled,
            Err(_) => SessionStatus::Error,
        }
    }
}

/// Holds the single session allowed to be in flight.
#[derive(Debug, Default)]
pub struct ActiveSlot {
    occupant: Option<(SessionId, CancellationToken)>,
}

impl ActiveSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes `pending` the occupant, cancelling whoever held the slot.
    /// Returns the superseded session.
    pub fn install(&mut self, pending: &PendingSession) -> Option<SessionId> {
        let previous = self
            .occupant
            .replace((pending.id(), pending.token()))
            .map(|(id, token)| {
                token.cancel();
                id
            });
        if let Some(previous) = previous {
            tracing::info!(session = %previous, by = %pending.id(), "session superseded");
        }
        previous
    }

    pub fn occupant(&self) -> Option<SessionId> {
        self.occupant.as_ref().map(|(id, _)| *id)
    }

    pub fn is_occupant(&self, id: SessionId) -> bool {
        self.occupant() == Some(id)
    }

    pub fn status(&self) -> Option<SessionStatus> {
        self.occupant.as_ref().map(|_| SessionStatus::Pending)
    }

    /// Empties the slot if `id` still holds it.
    pub fn release(&mut self, id: SessionId) -> bool {
        if self.is_occupant(id) {
            self.occupant = None;
            true
        } else {
            false
        }
    }

    /// Signals the occupant's token. The occupant keeps the slot until its
    /// completion is applied.
    pub fn cancel(&self) -> Option<SessionId> {
        let (id, token) = self.occupant.as_ref()?;
        token.cancel();
        Some(*id)
    }
}
