//! WebSocket connector for the push channel.
//!
//! This module is only available with the `native` feature.

use super::{ChannelIo, Connector};
use crate::error::ChannelError;
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::connect_async;
use tungstenite::protocol::Message;

pub struct WsConnector {
    url: String,
    connect_timeout: Duration,
}

impl WsConnector {
    pub fn new(url: impl Into<String>, connect_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            connect_timeout,
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> Result<ChannelIo, ChannelError> {
        let (ws, _) = tokio::time::timeout(self.connect_timeout, connect_async(self.url.as_str()))
            .await
            .map_err(|_| {
                ChannelError::Connect(format!(
                    "{} timed out after {}ms",
                    self.url,
                    self.connect_timeout.as_millis()
                ))
            })?
            .map_err(|e| ChannelError::Connect(format!("{}: {e}", self.url)))?;
        let (mut ws_write, mut ws_read) = ws.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<String>();
        let (in_tx, in_rx) = mpsc::unbounded_channel::<String>();

        // writer: ends when the channel manager drops its sender
        tokio::spawn(async move {
            while let Some(text) = out_rx.recv().await {
                if let Err(e) = ws_write.send(Message::Text(text)).await {
                    log::debug!("push channel write failed: {e}");
                    break;
                }
            }
            let _ = ws_write.close().await;
        });

        // reader: closing `in_tx` is how the manager learns the socket is gone
        tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                let msg = match msg {
                    Ok(m) => m,
                    Err(e) => {
                        log::debug!("push channel read failed: {e}");
                        break;
                    }
                };
                match msg {
                    Message::Text(text) => {
                        if in_tx.send(text).is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
        });

        Ok(ChannelIo {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}
