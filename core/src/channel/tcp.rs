/// Channel client for the TCP hub
use super::{ChannelService, EventSink, HubFrame, Listeners, SubscriptionHandle};
use crate::error::{MessagingError, Result};
use crate::messenger_types::Message;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Connection to a hub. Several local listeners may share one channel;
/// the hub sees one subscription per channel per connection.
///
/// A dropped connection is not re-established: every sink is closed and
/// later calls fail with `MessagingError::Connection`.
pub struct TcpChannel {
    hub_addr: String,
    outgoing: mpsc::UnboundedSender<HubFrame>,
    listeners: Arc<Mutex<Listeners>>,
    closed: Arc<AtomicBool>,
}

impl TcpChannel {
    /// Connect to `hub_addr` (a socket address or `host:port`)
    pub async fn connect<A>(hub_addr: A, connect_timeout: Duration) -> Result<Self>
    where
        A: ToSocketAddrs + fmt::Display,
    {
        let hub_addr_text = hub_addr.to_string();
        let stream = timeout(connect_timeout, TcpStream::connect(hub_addr))
            .await
            .map_err(|_| MessagingError::Connection(format!("Timed out connecting to hub {}", hub_addr_text)))?
            .map_err(MessagingError::Io)?;
        let (reader, writer) = stream.into_split();

        let (outgoing, rx) = mpsc::unbounded_channel();
        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let closed = Arc::new(AtomicBool::new(false));

        tokio::spawn(run_writer(writer, rx, closed.clone()));
        tokio::spawn(run_reader(reader, listeners.clone(), closed.clone()));

        info!("Connected to hub at {}", hub_addr_text);
        Ok(Self {
            hub_addr: hub_addr_text,
            outgoing,
            listeners,
            closed,
        })
    }

    pub fn hub_addr(&self) -> &str {
        &self.hub_addr
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(MessagingError::Connection(format!(
                "Hub connection to {} is closed",
                self.hub_addr
            )));
        }
        Ok(())
    }

    fn send_frame(&self, frame: HubFrame) -> Result<()> {
        self.outgoing
            .send(frame)
            .map_err(|_| MessagingError::Connection("Hub writer has stopped".to_string()))
    }

    fn lock(&self) -> MutexGuard<'_, Listeners> {
        lock_listeners(&self.listeners)
    }
}

impl ChannelService for TcpChannel {
    fn subscribe(&self, channel: &str, sink: EventSink) -> Result<SubscriptionHandle> {
        self.ensure_open()?;
        let mut listeners = self.lock();
        let first = listeners.count(channel) == 0;
        let handle = listeners.insert(channel, sink);
        if first {
            if let Err(e) = self.send_frame(HubFrame::Subscribe {
                channel: channel.to_string(),
            }) {
                listeners.remove(&handle);
                return Err(e);
            }
        }
        Ok(handle)
    }

    fn unsubscribe(&self, handle: &SubscriptionHandle) {
        let mut listeners = self.lock();
        if listeners.remove(handle) && listeners.count(&handle.channel) == 0 {
            // Best effort: a closed connection has no subscriptions anyway
            let _ = self.send_frame(HubFrame::Unsubscribe {
                channel: handle.channel.clone(),
            });
        }
    }

    fn publish(&self, channel: &str, message: &Message) -> Result<()> {
        self.ensure_open()?;
        self.send_frame(HubFrame::Publish {
            channel: channel.to_string(),
            message: message.clone(),
        })
    }
}

fn lock_listeners(listeners: &Mutex<Listeners>) -> MutexGuard<'_, Listeners> {
    listeners.lock().unwrap_or_else(|e| e.into_inner())
}

async fn run_writer(
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::UnboundedReceiver<HubFrame>,
    closed: Arc<AtomicBool>,
) {
    while let Some(frame) = rx.recv().await {
        let line = match frame.to_line() {
            Ok(line) => line,
            Err(e) => {
                warn!("Dropping unserializable frame: {}", e);
                continue;
            }
        };
        if let Err(e) = writer.write_all(line.as_bytes()).await {
            warn!("Hub write failed: {}", e);
            break;
        }
    }
    closed.store(true, Ordering::SeqCst);
}

async fn run_reader(reader: OwnedReadHalf, listeners: Arc<Mutex<Listeners>>, closed: Arc<AtomicBool>) {
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if line.trim().is_empty() {
                    continue;
                }
                match HubFrame::from_line(&line) {
                    Ok(HubFrame::Event { channel, message }) => {
                        let delivered = lock_listeners(&listeners).deliver(&channel, &message);
                        if delivered == 0 {
                            debug!("Event on {} with no local listener", channel);
                        }
                    }
                    Ok(HubFrame::Subscribed { channel }) => {
                        debug!("Hub confirmed subscription to {}", channel);
                    }
                    Ok(HubFrame::Error { reason }) => {
                        warn!("Hub rejected a frame: {}", reason);
                    }
                    Ok(other) => {
                        debug!("Ignoring unexpected frame from hub: {:?}", other);
                    }
                    Err(e) => {
                        warn!("Invalid frame from hub: {}", e);
                    }
                }
            }
            Ok(None) => {
                info!("Hub closed the connection");
                break;
            }
            Err(e) => {
                warn!("Hub read failed: {}", e);
                break;
            }
        }
    }

    closed.store(true, Ordering::SeqCst);
    // Dropping the sinks ends every consumer waiting on them
    lock_listeners(&listeners).clear();
}
