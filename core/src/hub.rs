/// Hub server: relays published messages to channel listeners over TCP
use crate::channel::HubFrame;
use crate::error::{MessagingError, Result};
use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

type ClientTx = mpsc::UnboundedSender<HubFrame>;
type ChannelTable = Arc<RwLock<HashMap<String, HashMap<Uuid, ClientTx>>>>;

pub struct HubServer {
    listener: TcpListener,
    channels: ChannelTable,
}

impl HubServer {
    pub async fn bind(addr: SocketAddr) -> Result<Self> {
        let listener = TcpListener::bind(addr).await.map_err(MessagingError::Io)?;
        Ok(Self {
            listener,
            channels: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener.local_addr().map_err(MessagingError::Io)
    }

    /// Accept clients until the task is dropped
    pub async fn run(self) -> Result<()> {
        info!("Hub listening on {}", self.local_addr()?);

        loop {
            match self.listener.accept().await {
                Ok((stream, addr)) => {
                    debug!("Hub client connected from {}", addr);
                    let channels = self.channels.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, addr, channels).await {
                            error!("Error handling hub client {}: {}", addr, e);
                        }
                    });
                }
                Err(e) => {
                    error!("Failed to accept hub connection: {}", e);
                }
            }
        }
    }
}

/// Bind and serve on `addr`
pub async fn start_hub(addr: SocketAddr) -> Result<()> {
    HubServer::bind(addr).await?.run().await
}

async fn handle_client(stream: TcpStream, addr: SocketAddr, channels: ChannelTable) -> Result<()> {
    let conn_id = Uuid::new_v4();
    let (reader, mut writer) = stream.into_split();
    let (tx, mut rx) = mpsc::unbounded_channel::<HubFrame>();

    let writer_task = tokio::spawn(async move {
        while let Some(frame) = rx.recv().await {
            let line = match frame.to_line() {
                Ok(line) => line,
                Err(e) => {
                    warn!("Dropping unserializable frame: {}", e);
                    continue;
                }
            };
            if let Err(e) = writer.write_all(line.as_bytes()).await {
                debug!("Hub write to client failed: {}", e);
                break;
            }
        }
    });

    let mut subscribed: HashSet<String> = HashSet::new();
    let mut lines = BufReader::new(reader).lines();

    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => {
                debug!("Hub client {} disconnected", addr);
                break;
            }
            Err(e) => {
                debug!("Hub read from {} failed: {}", addr, e);
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        let frame = match HubFrame::from_line(&line) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = tx.send(HubFrame::Error {
                    reason: format!("invalid frame: {}", e),
                });
                continue;
            }
        };

        match frame {
            HubFrame::Subscribe { channel } => {
                channels
                    .write()
                    .await
                    .entry(channel.clone())
                    .or_default()
                    .insert(conn_id, tx.clone());
                subscribed.insert(channel.clone());
                debug!("{} subscribed to {}", addr, channel);
                let _ = tx.send(HubFrame::Subscribed { channel });
            }
            HubFrame::Unsubscribe { channel } => {
                remove_listener(&channels, &channel, conn_id).await;
                subscribed.remove(&channel);
                debug!("{} unsubscribed from {}", addr, channel);
            }
            HubFrame::Publish { channel, message } => {
                let table = channels.read().await;
                let listeners = table.get(&channel);
                let mut delivered = 0;
                for client in listeners.into_iter().flat_map(|m| m.values()) {
                    let event = HubFrame::Event {
                        channel: channel.clone(),
                        message: message.clone(),
                    };
                    if client.send(event).is_ok() {
                        delivered += 1;
                    }
                }
                debug!("Relayed message on {} to {} listeners", channel, delivered);
            }
            other => {
                let _ = tx.send(HubFrame::Error {
                    reason: format!("unexpected frame from client: {:?}", other),
                });
            }
        }
    }

    for channel in subscribed {
        remove_listener(&channels, &channel, conn_id).await;
    }
    drop(tx);
    let _ = writer_task.await;
    Ok(())
}

async fn remove_listener(channels: &ChannelTable, channel: &str, conn_id: Uuid) {
    let mut table = channels.write().await;
    if let Some(listeners) = table.get_mut(channel) {
        listeners.remove(&conn_id);
        if listeners.is_empty() {
            table.remove(channel);
        }
    }
}
