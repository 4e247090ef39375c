//! # Connection
//!
//! TCP connection plus the dispatch loop.
//!
//! Login runs inline: every login packet is interpreted before the next frame
//! is decoded, so compression and encryption switch exactly between two
//! frames. Once login hands over, two tasks take the connection:
//!
//! - **reader**: decodes frames off the socket into a bounded queue and stops
//!   at the first link or framing error, closing the queue behind it
//! - **consumer**: interprets queued frames in arrival order and reports the
//!   queue depth to the handler when the queue drains or a batch runs long
//!
//! Both tasks stop cooperatively on the shared [`CancellationToken`].

use crate::config::ClientConfig;
use crate::core::frame::FrameCodec;
use crate::core::packet::RawPacket;
use crate::error::{ProtocolError, Result};
use crate::protocol::chat::Translations;
use crate::protocol::dispatcher::{
    ClientInformation, ClientProtocol, PacketWriter, SessionService, Transition,
};
use crate::protocol::handler::{DisconnectReason, Handler};
use crate::protocol::signing::MessageSigner;
use crate::protocol::state::ConnectionState;
use crate::utils::metrics::Metrics;
use futures::StreamExt;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncRead, AsyncWrite, ReadHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

/// Consumer batch duration after which the queue depth is reported mid-batch
pub const DEPTH_REPORT_INTERVAL: Duration = Duration::from_millis(50);

/// Collaborators and identity for a new connection
#[derive(Default)]
pub struct ConnectOptions {
    pub signer: Option<Arc<dyn MessageSigner>>,
    pub session_service: Option<Arc<dyn SessionService>>,
    pub translations: Option<Translations>,
    /// Account uuid announced in Login Start
    pub uuid: Option<Uuid>,
    pub client_information: Option<ClientInformation>,
}

impl std::fmt::Debug for ConnectOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOptions")
            .field("signed", &self.signer.is_some())
            .field("session_service", &self.session_service.is_some())
            .field("uuid", &self.uuid)
            .finish_non_exhaustive()
    }
}

impl ConnectOptions {
    fn apply(self, mut protocol: ClientProtocol) -> ClientProtocol {
        if let Some(signer) = self.signer {
            protocol = protocol.with_signer(signer);
        }
        if let Some(service) = self.session_service {
            protocol = protocol.with_session_service(service);
        }
        if let Some(translations) = self.translations {
            protocol = protocol.with_translations(translations);
        }
        if let Some(uuid) = self.uuid {
            protocol = protocol.with_uuid(uuid);
        }
        if let Some(information) = self.client_information {
            protocol = protocol.with_client_information(information);
        }
        protocol
    }
}

/// A logged-in connection with its reader and consumer tasks running
pub struct Connection {
    protocol: Arc<Mutex<ClientProtocol>>,
    writer: Arc<PacketWriter>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
    reader: Option<JoinHandle<()>>,
    consumer: Option<JoinHandle<()>>,
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish_non_exhaustive()
    }
}

impl Connection {
    /// Connect over TCP, log in and start dispatching
    #[instrument(skip(config, handler, options), fields(address = %config.connection.address()))]
    pub async fn connect(config: &ClientConfig, handler: Arc<dyn Handler>, options: ConnectOptions) -> Result<Self> {
        config.validate_strict()?;

        let address = config.connection.address();
        let stream = tokio::time::timeout(config.connection.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| ProtocolError::Io(io::Error::new(io::ErrorKind::TimedOut, "connect timed out")))??;
        stream.set_nodelay(true)?;
        info!(%address, "Connected");

        Self::run(stream, config, handler, options).await
    }

    /// Log in over an already connected stream and start dispatching
    pub async fn run<S>(
        stream: S,
        config: &ClientConfig,
        handler: Arc<dyn Handler>,
        options: ConnectOptions,
    ) -> Result<Self>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let metrics = Arc::new(Metrics::new());
        let codec = || {
            FrameCodec::new(config.transport.max_frame_size)
                .with_compression_level(config.transport.compression_level)
                .with_metrics(Arc::clone(&metrics))
        };

        let (read_half, write_half) = tokio::io::split(stream);
        let writer = Arc::new(PacketWriter::new(write_half, codec()));
        let protocol = ClientProtocol::new(config, Arc::clone(&handler), Arc::clone(&writer))?
            .with_metrics(Arc::clone(&metrics));
        let mut protocol = options.apply(protocol);

        let mut framed = FramedRead::new(read_half, codec());
        protocol.start_login().await?;
        login(&mut protocol, &mut framed, handler.as_ref()).await?;

        let cancel = CancellationToken::new();
        let (queue_tx, queue_rx) = mpsc::channel(config.connection.queue_capacity);
        let protocol = Arc::new(Mutex::new(protocol));

        let reader = tokio::spawn(read_loop(framed, queue_tx, cancel.clone()));
        let consumer = tokio::spawn(consume_loop(
            Arc::clone(&protocol),
            queue_rx,
            handler,
            Arc::clone(&metrics),
            cancel.clone(),
        ));

        Ok(Self {
            protocol,
            writer,
            metrics,
            cancel,
            reader: Some(reader),
            consumer: Some(consumer),
        })
    }

    /// Protocol state shared with the consumer task.
    ///
    /// Lock it to send chat or read registries; the consumer holds the lock
    /// for one packet at a time.
    pub fn protocol(&self) -> &Arc<Mutex<ClientProtocol>> {
        &self.protocol
    }

    pub fn metrics(&self) -> &Arc<Metrics> {
        &self.metrics
    }

    /// Whether the dispatch loop has stopped or been asked to stop
    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled() || self.consumer.as_ref().map_or(true, JoinHandle::is_finished)
    }

    /// Send a chat line, or a command when it starts with `/`
    pub async fn send_chat(&self, message: &str) -> Result<()> {
        self.protocol.lock().await.send_chat_message(message).await
    }

    /// Wait for the dispatch loop to end on its own
    pub async fn wait(&mut self) {
        if let Some(consumer) = self.consumer.take() {
            if let Err(e) = consumer.await {
                error!(error = %e, "Consumer task failed");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    /// Stop both tasks and close the socket
    #[instrument(skip(self))]
    pub async fn shutdown(mut self) -> Result<()> {
        self.cancel.cancel();
        self.wait().await;
        self.metrics.log_metrics();
        self.writer.close().await
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// Drive the login exchange until the protocol leaves the Login state
async fn login<R>(
    protocol: &mut ClientProtocol,
    framed: &mut FramedRead<ReadHalf<R>, FrameCodec>,
    handler: &dyn Handler,
) -> Result<()>
where
    R: AsyncRead,
{
    while protocol.state() == ConnectionState::Login {
        let packet = match framed.next().await {
            Some(packet) => packet?,
            None => return Err(ProtocolError::ConnectionClosed),
        };

        match protocol.handle_packet(packet).await? {
            Transition::None => {}
            Transition::Compression(threshold) => framed.decoder_mut().set_compression_threshold(threshold),
            Transition::Encryption(secret) => framed.decoder_mut().enable_encryption(&secret)?,
            Transition::Disconnect(reason, message) => {
                handler.on_connection_lost(reason, &message);
                return Err(ProtocolError::LoginRejected(message));
            }
        }
    }
    info!(state = %protocol.state(), "Login complete");
    Ok(())
}

async fn read_loop<R>(
    mut framed: FramedRead<ReadHalf<R>, FrameCodec>,
    queue: mpsc::Sender<Result<RawPacket>>,
    cancel: CancellationToken,
) where
    R: AsyncRead,
{
    loop {
        let frame = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            frame = framed.next() => frame,
        };

        match frame {
            Some(Ok(packet)) => {
                if queue.send(Ok(packet)).await.is_err() {
                    break;
                }
            }
            Some(Err(e)) => {
                debug!(error = %e, "Reader stopped on error");
                let _ = queue.send(Err(e)).await;
                break;
            }
            None => {
                let _ = queue.send(Err(ProtocolError::ConnectionClosed)).await;
                break;
            }
        }
    }
    debug!("Reader finished");
}

async fn consume_loop(
    protocol: Arc<Mutex<ClientProtocol>>,
    mut queue: mpsc::Receiver<Result<RawPacket>>,
    handler: Arc<dyn Handler>,
    metrics: Arc<Metrics>,
    cancel: CancellationToken,
) {
    let mut batch_start = Instant::now();

    loop {
        let item = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            item = queue.recv() => item,
        };

        let Some(item) = item else {
            // queue closed and drained
            if cancel.is_cancelled() {
                handler.on_connection_lost(DisconnectReason::UserLogout, "");
            }
            break;
        };

        let outcome = match item {
            Ok(packet) => protocol.lock().await.handle_packet(packet).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(Transition::None) => {}
            Ok(Transition::Disconnect(reason, message)) => {
                info!(%reason, %message, "Disconnected by server");
                handler.on_connection_lost(reason, &message);
                break;
            }
            Ok(transition) => warn!(?transition, "Framer change outside login ignored"),
            Err(e) if e.is_transport() => {
                info!(error = %e, "Connection lost");
                handler.on_connection_lost(DisconnectReason::ConnectionLost, &e.to_string());
                break;
            }
            Err(e) => {
                error!(error = %e, "Fatal protocol error");
                handler.on_connection_lost(DisconnectReason::ConnectionLost, &e.to_string());
                break;
            }
        }

        let depth = queue.len();
        if depth == 0 || batch_start.elapsed() >= DEPTH_REPORT_INTERVAL {
            metrics.queue_depth(depth);
            handler.on_queue_depth(depth);
            batch_start = Instant::now();
        }
    }

    cancel.cancel();
    debug!("Consumer finished");
}
