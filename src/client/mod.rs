//! Streaming chat client.
//!
//! One actor task owns every piece of mutable protocol state: both request
//! lifecycles, the active stream decoder and the transport task handles.
//! Caller commands and transport callbacks share the actor's mailbox, so they
//! are processed strictly in arrival order without locks.

mod error;
mod lifecycle;
#[cfg(test)]
pub(crate) mod stub;
mod transport;

pub use error::{error_hint, ClientError, Completion};
pub use lifecycle::{ClientEvent, Lane, RequestId};
pub use transport::{ReqwestTransport, Transport};

use crate::protocol::{HttpRequest, RequestBuilder};
use crate::provider::{CatalogSpec, RequestSpec};
use bytes::Bytes;
use lifecycle::{CatalogLifecycle, ChatLifecycle};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::StreamExt;

#[derive(Debug, Clone)]
pub struct ClientSettings {
    /// `max_tokens` sent to Anthropic-compatible providers.
    pub max_tokens: u32,
    /// Deadline for the response headers to arrive.
    pub request_timeout: Duration,
    /// Deadline between two body chunks.
    pub idle_timeout: Duration,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            max_tokens: crate::protocol::request::DEFAULT_MAX_TOKENS,
            request_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(120),
        }
    }
}

enum Command {
    SendChat(RequestSpec),
    FetchModels(CatalogSpec),
    Cancel,
    Transport {
        lane: Lane,
        id: RequestId,
        msg: TransportMsg,
    },
}

enum TransportMsg {
    Data(Bytes),
    Complete(Completion),
}

/// Handle to the client actor. Cheap to clone; the actor stops once every
/// handle is dropped.
#[derive(Clone)]
pub struct LlmClient {
    tx: mpsc::UnboundedSender<Command>,
}

impl LlmClient {
    /// Start the actor on the current tokio runtime.
    pub fn spawn(
        transport: Arc<dyn Transport>,
        settings: ClientSettings,
    ) -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();

        let actor = Actor {
            transport,
            builder: RequestBuilder::new(settings.max_tokens),
            settings,
            events,
            mailbox: tx.downgrade(),
            chat: ChatLifecycle::default(),
            catalog: CatalogLifecycle::default(),
            chat_task: None,
            catalog_task: None,
        };
        tokio::spawn(actor.run(rx));

        (Self { tx }, events_rx)
    }

    /// Start a chat request, cancelling any request still in flight.
    pub fn send_chat(&self, spec: RequestSpec) -> anyhow::Result<()> {
        self.send(Command::SendChat(spec))
    }

    pub fn fetch_models(&self, spec: CatalogSpec) -> anyhow::Result<()> {
        self.send(Command::FetchModels(spec))
    }

    /// Cancel the in-flight chat request. No-op when idle.
    pub fn cancel(&self) -> anyhow::Result<()> {
        self.send(Command::Cancel)
    }

    fn send(&self, cmd: Command) -> anyhow::Result<()> {
        self.tx
            .send(cmd)
            .map_err(|_| anyhow::anyhow!("chat client has stopped"))
    }
}

struct Actor {
    transport: Arc<dyn Transport>,
    builder: RequestBuilder,
    settings: ClientSettings,
    events: mpsc::UnboundedSender<ClientEvent>,
    mailbox: mpsc::WeakUnboundedSender<Command>,
    chat: ChatLifecycle,
    catalog: CatalogLifecycle,
    chat_task: Option<(RequestId, JoinHandle<()>)>,
    catalog_task: Option<(RequestId, JoinHandle<()>)>,
}

impl Actor {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Command>) {
        while let Some(cmd) = rx.recv().await {
            let mut out = Vec::new();
            self.handle(cmd, &mut out);
            for ev in out {
                // The listener may have gone away; requests still run to completion.
                let _ = self.events.send(ev);
            }
        }

        self.abort(Lane::Chat);
        self.abort(Lane::Catalog);
        tracing::debug!("chat client stopped");
    }

    fn handle(&mut self, cmd: Command, out: &mut Vec<ClientEvent>) {
        match cmd {
            Command::SendChat(spec) => self.start_chat(spec, out),
            Command::FetchModels(spec) => self.start_catalog(spec, out),
            Command::Cancel => {
                if let Some(id) = self.chat.cancel(out) {
                    self.abort(Lane::Chat);
                    tracing::info!(%id, "chat request cancelled");
                }
            }
            Command::Transport {
                lane: Lane::Chat,
                id,
                msg,
            } => match msg {
                TransportMsg::Data(bytes) => {
                    if self.chat.on_data(id, &bytes, out) {
                        self.abort(Lane::Chat);
                    }
                }
                TransportMsg::Complete(completion) => {
                    self.chat.on_complete(id, completion, out);
                    self.release(Lane::Chat, id);
                }
            },
            Command::Transport {
                lane: Lane::Catalog,
                id,
                msg,
            } => match msg {
                TransportMsg::Data(bytes) => self.catalog.on_data(id, &bytes),
                TransportMsg::Complete(completion) => {
                    self.catalog.on_complete(id, completion, out);
                    self.release(Lane::Catalog, id);
                }
            },
        }
    }

    fn start_chat(&mut self, spec: RequestSpec, out: &mut Vec<ClientEvent>) {
        let begin = self.chat.begin(spec.provider);
        if let Some(old) = begin.superseded {
            self.abort(Lane::Chat);
            tracing::info!(%old, new = %begin.id, "superseding in-flight chat request");
        }

        match self.builder.chat(&spec) {
            Ok(req) => {
                tracing::debug!(
                    id = %begin.id,
                    provider = %spec.provider,
                    model = %spec.model,
                    url = %req.redacted_url(),
                    messages = spec.messages.len(),
                    "starting chat request"
                );
                self.launch(Lane::Chat, begin.id, req);
            }
            Err(e) => {
                let msg = format!("{e:#}");
                tracing::error!(error = %msg, "failed to build chat request");
                self.chat.fail(begin.id, ClientError::InvalidRequest(msg), out);
            }
        }
    }

    fn start_catalog(&mut self, spec: CatalogSpec, out: &mut Vec<ClientEvent>) {
        let begin = self.catalog.begin(spec.provider);
        if begin.superseded.is_some() {
            self.abort(Lane::Catalog);
        }

        match self.builder.models(&spec) {
            Ok(req) => {
                tracing::debug!(
                    id = %begin.id,
                    provider = %spec.provider,
                    url = %req.redacted_url(),
                    "fetching model list"
                );
                self.launch(Lane::Catalog, begin.id, req);
            }
            Err(e) => {
                let msg = format!("{e:#}");
                tracing::error!(error = %msg, "failed to build model list request");
                self.catalog.fail(begin.id, ClientError::InvalidRequest(msg), out);
            }
        }
    }

    fn launch(&mut self, lane: Lane, id: RequestId, req: HttpRequest) {
        let reporter = Reporter {
            mailbox: self.mailbox.clone(),
            lane,
            id,
        };
        let transport = Arc::clone(&self.transport);
        let request_timeout = self.settings.request_timeout;
        let idle_timeout = self.settings.idle_timeout;

        let handle = tokio::spawn(async move {
            let completion = pump(transport, req, request_timeout, idle_timeout, &reporter).await;
            reporter.post(TransportMsg::Complete(completion));
        });

        if let Some((_, old)) = self.task_mut(lane).replace((id, handle)) {
            old.abort();
        }
    }

    fn task_mut(&mut self, lane: Lane) -> &mut Option<(RequestId, JoinHandle<()>)> {
        match lane {
            Lane::Chat => &mut self.chat_task,
            Lane::Catalog => &mut self.catalog_task,
        }
    }

    fn abort(&mut self, lane: Lane) {
        if let Some((_, handle)) = self.task_mut(lane).take() {
            handle.abort();
        }
    }

    /// Forget the handle of a task that finished on its own.
    fn release(&mut self, lane: Lane, id: RequestId) {
        let slot = self.task_mut(lane);
        if slot.as_ref().is_some_and(|(active, _)| *active == id) {
            slot.take();
        }
    }
}

/// Posts transport callbacks for one request into the actor mailbox.
struct Reporter {
    mailbox: mpsc::WeakUnboundedSender<Command>,
    lane: Lane,
    id: RequestId,
}

impl Reporter {
    /// Returns `false` once the actor is gone.
    fn post(&self, msg: TransportMsg) -> bool {
        let Some(tx) = self.mailbox.upgrade() else {
            return false;
        };
        tx.send(Command::Transport {
            lane: self.lane,
            id: self.id,
            msg,
        })
        .is_ok()
    }
}

async fn pump(
    transport: Arc<dyn Transport>,
    req: HttpRequest,
    request_timeout: Duration,
    idle_timeout: Duration,
    reporter: &Reporter,
) -> Completion {
    let resp = match tokio::time::timeout(request_timeout, transport.execute(req)).await {
        Err(_) => {
            tracing::warn!(id = %reporter.id, "timed out waiting for response headers");
            return Completion::Failed(ClientError::Timeout);
        }
        Ok(Err(e)) => {
            tracing::warn!(id = %reporter.id, error = %format!("{e:#}"), "request failed");
            return Completion::Failed(ClientError::Transport);
        }
        Ok(Ok(resp)) => resp,
    };

    let status = resp.status;
    let mut body = resp.body;
    loop {
        match tokio::time::timeout(idle_timeout, body.next()).await {
            Err(_) => {
                tracing::warn!(id = %reporter.id, "response stream went idle");
                return Completion::Failed(ClientError::Timeout);
            }
            Ok(None) => return Completion::Finished { status },
            Ok(Some(Err(e))) => {
                tracing::warn!(id = %reporter.id, error = %format!("{e:#}"), "response stream failed");
                return Completion::Failed(ClientError::Transport);
            }
            Ok(Some(Ok(bytes))) => {
                if !reporter.post(TransportMsg::Data(bytes)) {
                    return Completion::Finished { status };
                }
            }
        }
    }
}
