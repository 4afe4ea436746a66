use super::transport::{HttpResponse, Transport};
use crate::protocol::{HttpRequest, Method};
use bytes::Bytes;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::{ReceiverStream, UnboundedReceiverStream};

pub enum Reply {
    /// Drip fixed chunks with small delays, then end the body.
    Body {
        status: u16,
        chunks: Vec<Bytes>,
    },
    /// Body driven by the test through the paired sender.
    Stream {
        status: u16,
        rx: mpsc::UnboundedReceiver<anyhow::Result<Bytes>>,
    },
    /// Fail before any response arrives.
    Refuse,
    /// Never produce response headers.
    Stall,
}

impl Reply {
    pub fn body(status: u16, chunks: &[&'static str]) -> Self {
        Reply::Body {
            status,
            chunks: chunks.iter().map(|c| Bytes::from_static(c.as_bytes())).collect(),
        }
    }
}

/// Transport answering POSTs from the chat queue and GETs from the model
/// list queue, recording every request it sees.
#[derive(Default)]
pub struct ScriptedTransport {
    chat: Mutex<VecDeque<Reply>>,
    models: Mutex<VecDeque<Reply>>,
    requests: Mutex<Vec<HttpRequest>>,
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn chat(&self, reply: Reply) {
        self.chat.lock().unwrap().push_back(reply);
    }

    pub fn models(&self, reply: Reply) {
        self.models.lock().unwrap().push_back(reply);
    }

    /// Queue a chat reply whose body stays open until the sender is dropped.
    pub fn chat_stream(&self, status: u16) -> mpsc::UnboundedSender<anyhow::Result<Bytes>> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.chat(Reply::Stream { status, rx });
        tx
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().unwrap().clone()
    }
}

impl Transport for ScriptedTransport {
    fn execute(
        &self,
        req: HttpRequest,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<HttpResponse>> + Send>> {
        let queue = match req.method {
            Method::Post => &self.chat,
            Method::Get => &self.models,
        };
        let reply = queue.lock().unwrap().pop_front();
        self.requests.lock().unwrap().push(req);

        Box::pin(async move {
            match reply {
                None | Some(Reply::Refuse) => Err(anyhow::anyhow!("connection refused")),
                Some(Reply::Stall) => std::future::pending().await,
                Some(Reply::Body { status, chunks }) => {
                    let (tx, rx) = mpsc::channel(32);
                    tokio::spawn(async move {
                        for chunk in chunks {
                            tokio::time::sleep(Duration::from_millis(5)).await;
                            if tx.send(Ok(chunk)).await.is_err() {
                                break;
                            }
                        }
                    });
                    Ok(HttpResponse {
                        status,
                        body: Box::pin(ReceiverStream::new(rx)),
                    })
                }
                Some(Reply::Stream { status, rx }) => Ok(HttpResponse {
                    status,
                    body: Box::pin(UnboundedReceiverStream::new(rx)),
                }),
            }
        })
    }
}
