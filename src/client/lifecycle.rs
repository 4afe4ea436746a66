//! Request lifecycles: `Idle -> InFlight -> {Completed, Cancelled} -> Idle`.
//!
//! Pure state machines with no I/O. Every started request gets a fresh
//! [`RequestId`]; input tagged with any other id belongs to a request that was
//! superseded, cancelled or already finished and is dropped without effect.

use super::error::{ClientError, Completion};
use crate::protocol::catalog;
use crate::protocol::{DecodeEvent, StreamDecoder};
use crate::provider::Provider;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(u64);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Which of the two independent lifecycles an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lane {
    Chat,
    Catalog,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientEvent {
    TextDelta(String),
    Error { lane: Lane, message: String },
    /// Exactly one per request that was not superseded.
    Done { lane: Lane },
    ModelsReceived(Vec<String>),
}

impl ClientEvent {
    fn error(lane: Lane, err: ClientError) -> Self {
        ClientEvent::Error {
            lane,
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Begin {
    pub id: RequestId,
    /// Previous in-flight request, now discarded without a terminal event.
    pub superseded: Option<RequestId>,
}

/// Owned, optional in-flight request with replace-on-begin semantics.
#[derive(Debug)]
struct Slot<T> {
    next_id: u64,
    active: Option<(RequestId, T)>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            next_id: 0,
            active: None,
        }
    }
}

impl<T> Slot<T> {
    fn begin(&mut self, state: T) -> Begin {
        self.next_id += 1;
        let id = RequestId(self.next_id);
        let superseded = self.active.replace((id, state)).map(|(old, _)| old);
        Begin { id, superseded }
    }

    fn in_flight(&self) -> Option<RequestId> {
        self.active.as_ref().map(|(id, _)| *id)
    }

    fn current(&mut self, id: RequestId) -> Option<&mut T> {
        match &mut self.active {
            Some((active, state)) if *active == id => Some(state),
            _ => None,
        }
    }

    fn take(&mut self, id: RequestId) -> Option<T> {
        if self.in_flight() == Some(id) {
            self.active.take().map(|(_, state)| state)
        } else {
            None
        }
    }

    fn take_any(&mut self) -> Option<(RequestId, T)> {
        self.active.take()
    }
}

#[derive(Debug, Default)]
pub struct ChatLifecycle {
    slot: Slot<StreamDecoder>,
}

impl ChatLifecycle {
    #[cfg(test)]
    pub fn in_flight(&self) -> Option<RequestId> {
        self.slot.in_flight()
    }

    /// Start a request, discarding any in-flight one and its stream state.
    pub fn begin(&mut self, provider: Provider) -> Begin {
        self.slot.begin(StreamDecoder::new(provider))
    }

    /// Feed body bytes. Returns `true` when the request ended because the
    /// body turned out to be a provider error.
    pub fn on_data(&mut self, id: RequestId, bytes: &[u8], out: &mut Vec<ClientEvent>) -> bool {
        let Some(decoder) = self.slot.current(id) else {
            tracing::trace!(%id, "dropping data for inactive chat request");
            return false;
        };

        for ev in decoder.write(bytes) {
            match ev {
                DecodeEvent::Delta(text) => out.push(ClientEvent::TextDelta(text)),
                DecodeEvent::Error(message) => {
                    self.slot.take(id);
                    out.push(ClientEvent::error(Lane::Chat, ClientError::Api(message)));
                    out.push(ClientEvent::Done { lane: Lane::Chat });
                    return true;
                }
            }
        }
        false
    }

    pub fn on_complete(&mut self, id: RequestId, completion: Completion, out: &mut Vec<ClientEvent>) {
        let Some(mut decoder) = self.slot.take(id) else {
            tracing::trace!(%id, "swallowing completion for inactive chat request");
            return;
        };

        let mut reported = false;
        for ev in decoder.finish() {
            match ev {
                DecodeEvent::Delta(text) => out.push(ClientEvent::TextDelta(text)),
                DecodeEvent::Error(message) => {
                    out.push(ClientEvent::error(Lane::Chat, ClientError::Api(message)));
                    reported = true;
                }
            }
        }

        if !reported {
            if let Some(err) = completion_error(completion) {
                tracing::warn!(%id, error = %err, "chat request failed");
                out.push(ClientEvent::error(Lane::Chat, err));
            }
        }
        out.push(ClientEvent::Done { lane: Lane::Chat });
    }

    /// End a request that could not be started.
    pub fn fail(&mut self, id: RequestId, err: ClientError, out: &mut Vec<ClientEvent>) {
        if self.slot.take(id).is_some() {
            out.push(ClientEvent::error(Lane::Chat, err));
            out.push(ClientEvent::Done { lane: Lane::Chat });
        }
    }

    /// Cancel the in-flight request, if any. Idempotent.
    pub fn cancel(&mut self, out: &mut Vec<ClientEvent>) -> Option<RequestId> {
        let (id, mut decoder) = self.slot.take_any()?;
        decoder.cancel();
        out.push(ClientEvent::Done { lane: Lane::Chat });
        Some(id)
    }
}

#[derive(Debug)]
struct PendingCatalog {
    provider: Provider,
    body: Vec<u8>,
}

/// Model-list fetch; collects the whole body, then parses it once.
#[derive(Debug, Default)]
pub struct CatalogLifecycle {
    slot: Slot<PendingCatalog>,
}

impl CatalogLifecycle {
    #[cfg(test)]
    pub fn in_flight(&self) -> Option<RequestId> {
        self.slot.in_flight()
    }

    pub fn begin(&mut self, provider: Provider) -> Begin {
        self.slot.begin(PendingCatalog {
            provider,
            body: Vec::new(),
        })
    }

    pub fn on_data(&mut self, id: RequestId, bytes: &[u8]) {
        if let Some(pending) = self.slot.current(id) {
            pending.body.extend_from_slice(bytes);
        }
    }

    pub fn on_complete(&mut self, id: RequestId, completion: Completion, out: &mut Vec<ClientEvent>) {
        let Some(pending) = self.slot.take(id) else {
            tracing::trace!(%id, "swallowing completion for inactive catalog request");
            return;
        };

        let event = match completion {
            Completion::Failed(ClientError::Transport) => {
                ClientEvent::error(Lane::Catalog, ClientError::CatalogTransport)
            }
            Completion::Failed(err) => ClientEvent::error(Lane::Catalog, err),
            Completion::Finished { status } => {
                let body = String::from_utf8_lossy(&pending.body);
                tracing::debug!(%id, status, bytes = body.len(), "model list received");
                if let Some(message) = catalog::api_error(&body) {
                    ClientEvent::error(Lane::Catalog, ClientError::Api(message))
                } else if !is_success(status) {
                    ClientEvent::error(Lane::Catalog, ClientError::HttpStatus(status))
                } else {
                    ClientEvent::ModelsReceived(catalog::model_ids(pending.provider, &body))
                }
            }
        };

        if let ClientEvent::Error { message, .. } = &event {
            tracing::warn!(%id, %message, "model list request failed");
        }
        out.push(event);
        out.push(ClientEvent::Done { lane: Lane::Catalog });
    }

    pub fn fail(&mut self, id: RequestId, err: ClientError, out: &mut Vec<ClientEvent>) {
        if self.slot.take(id).is_some() {
            out.push(ClientEvent::error(Lane::Catalog, err));
            out.push(ClientEvent::Done { lane: Lane::Catalog });
        }
    }
}

fn is_success(status: u16) -> bool {
    (200..300).contains(&status)
}

fn completion_error(completion: Completion) -> Option<ClientError> {
    match completion {
        Completion::Finished { status } if is_success(status) => None,
        Completion::Finished { status } => Some(ClientError::HttpStatus(status)),
        Completion::Failed(err) => Some(err),
    }
}
