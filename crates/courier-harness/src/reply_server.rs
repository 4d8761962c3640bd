//! In-process message server.
//!
//! Accepts TCP connections on a loopback port, reads one framed
//! [`RequestEnvelope`] per connection and answers with one
//! [`ResponseEnvelope`] chosen by its [`ServerBehavior`]. Every request is
//! recorded so tests can check what actually reached the wire.

use std::{io, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use courier_proto::{
    FRAME_HEADER_SIZE, RequestEnvelope, ResponseEnvelope, decode_body, encode_frame, frame_length,
};
use parking_lot::Mutex;
use tokio::{
    io::{AsyncReadExt, AsyncWriteExt},
    net::{TcpListener, TcpStream},
    task::JoinHandle,
};

/// Master token handed out with every reply.
pub const SERVER_MASTER_TOKEN: &[u8] = b"reply-server-master-token";

/// How the server answers.
#[derive(Debug, Clone)]
pub enum ServerBehavior {
    /// Reply with the request payload.
    Echo,
    /// Reply with a fixed payload.
    Payload(Bytes),
    /// Reject with a structured error.
    Reject {
        /// Error code.
        code: i32,
        /// Optional detail.
        message: Option<String>,
    },
}

impl ServerBehavior {
    fn respond(&self, request: &RequestEnvelope) -> ResponseEnvelope {
        let mut response = match self {
            Self::Echo => ResponseEnvelope::with_payload(request.message_id, request.payload.clone()),
            Self::Payload(payload) => {
                ResponseEnvelope::with_payload(request.message_id, payload.clone())
            },
            Self::Reject { code, message } => {
                ResponseEnvelope::with_error(request.message_id, *code, message.clone())
            },
        };
        response.master_token = Some(Bytes::from_static(SERVER_MASTER_TOKEN));
        response
    }
}

/// Loopback server answering one request per connection.
#[derive(Debug)]
pub struct ReplyServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<RequestEnvelope>>>,
    task: JoinHandle<()>,
}

impl ReplyServer {
    /// Bind an ephemeral loopback port and start serving.
    pub async fn start(behavior: ServerBehavior) -> io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let requests = Arc::new(Mutex::new(Vec::new()));

        let recorded = Arc::clone(&requests);
        let task = tokio::spawn(async move {
            while let Ok((stream, peer)) = listener.accept().await {
                let behavior = behavior.clone();
                let recorded = Arc::clone(&recorded);
                tokio::spawn(async move {
                    if let Err(e) = serve(stream, &behavior, &recorded).await {
                        tracing::warn!(%peer, error = %e, "reply server connection failed");
                    }
                });
            }
        });

        Ok(Self { addr, requests, task })
    }

    /// `host:port` to pass as `-url`.
    pub fn endpoint(&self) -> String {
        self.addr.to_string()
    }

    /// Every request received so far.
    pub fn requests(&self) -> Vec<RequestEnvelope> {
        self.requests.lock().clone()
    }
}

impl Drop for ReplyServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    mut stream: TcpStream,
    behavior: &ServerBehavior,
    recorded: &Mutex<Vec<RequestEnvelope>>,
) -> io::Result<()> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    stream.read_exact(&mut header).await?;
    let len = frame_length(header).map_err(io::Error::other)?;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;

    let request: RequestEnvelope = decode_body(&body).map_err(io::Error::other)?;
    let response = behavior.respond(&request);
    recorded.lock().push(request);

    let frame = encode_frame(&response).map_err(io::Error::other)?;
    stream.write_all(&frame).await?;
    stream.flush().await
}

/// Loopback address with nothing listening on it.
pub async fn unreachable_endpoint() -> io::Result<String> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);
    Ok(addr.to_string())
}
