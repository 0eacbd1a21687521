// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Flush coordinator: a single worker task owning the batch and the transport.
//!
//! ```text
//!   Writer (handles, Clone)
//!       │  WriterCommand via capacity-1 channel (producers wait for the worker)
//!       v
//!   ┌───────────────┐   tick every send_interval
//!   │ WriterService │ <────────────────────────── Interval
//!   └──────┬────────┘
//!          │ write / snapshot / reset
//!          v
//!       Batch ──snapshot──> Transport::send ──outcome──> Logger
//! ```
//!
//! A flush takes a snapshot of the batch, sends it unless it is empty, logs the outcome and
//! resets the batch whatever happened. Failed writes are not requeued.
//!
//! When a write is rejected for a reason selected by the [`FlushTrigger`] policy, the worker
//! flushes immediately, retries the entry once against the emptied batch and restarts the
//! interval so the next scheduled flush is a full period away. Entries rejected for any other
//! reason, or rejected again on retry, are logged and dropped.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::batch::{Batch, Snapshot};
use crate::client::{Client, Transport};
use crate::config::Config;
use crate::constants::{DEFAULT_SEND_INTERVAL, DEFAULT_SEND_TIMEOUT};
use crate::errors::{BatchError, CreationError, SendError};
use crate::logger::{Logger, TracingLogger};

/// Which write rejections force an immediate flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlushTrigger {
    /// Only a full entries count forces a flush; oversized writes are dropped until the next
    /// scheduled flush.
    #[default]
    CountExceeded,
    /// Any rejection forces a flush.
    AnyRejection,
}

impl FlushTrigger {
    #[must_use]
    pub fn forces_flush(self, error: BatchError) -> bool {
        match self {
            Self::CountExceeded => error == BatchError::CountExceeded,
            Self::AnyRejection => true,
        }
    }
}

impl FromStr for FlushTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "count_exceeded" => Ok(Self::CountExceeded),
            "any_rejection" => Ok(Self::AnyRejection),
            other => Err(format!(
                "unknown flush trigger '{other}', expected count_exceeded or any_rejection"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriterOptions {
    pub send_interval: Duration,
    /// Bound of the network call of one flush.
    pub send_timeout: Duration,
    pub flush_trigger: FlushTrigger,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            send_interval: DEFAULT_SEND_INTERVAL,
            send_timeout: DEFAULT_SEND_TIMEOUT,
            flush_trigger: FlushTrigger::default(),
        }
    }
}

#[derive(Debug)]
pub enum WriterCommand {
    Write(Vec<u8>),
    Shutdown(oneshot::Sender<()>),
}

/// Producer-facing handle. Cheap to clone; all clones share the closed state.
#[derive(Clone)]
pub struct Writer {
    tx: mpsc::Sender<WriterCommand>,
    closed: Arc<AtomicBool>,
    batch: Arc<Batch>,
    logger: Arc<dyn Logger>,
}

impl fmt::Debug for Writer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Writer")
            .field("closed", &self.closed.load(Ordering::Relaxed))
            .field("batch", &self.batch)
            .finish_non_exhaustive()
    }
}

impl Writer {
    /// Builds the HTTP client and batch from `config` and spawns the worker on the current
    /// tokio runtime. `None` logs through [`TracingLogger`].
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn new(config: &Config, logger: Option<Arc<dyn Logger>>) -> Result<Self, CreationError> {
        let client = Client::new(&config.client_options())?;
        let batch = Arc::new(Batch::new(config.batch_options()));

        Self::start(Arc::new(client), batch, logger, config.writer_options())
    }

    /// Spawns the worker with caller-provided collaborators.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    pub fn start(
        transport: Arc<dyn Transport>,
        batch: Arc<Batch>,
        logger: Option<Arc<dyn Logger>>,
        options: WriterOptions,
    ) -> Result<Self, CreationError> {
        let (service, writer) = WriterService::new(transport, batch, logger, options)?;
        tokio::spawn(service.run());
        Ok(writer)
    }

    /// Hands `entry` to the worker, waiting until it is accepted.
    pub async fn write(&self, entry: impl Into<Vec<u8>>) {
        if self.closed.load(Ordering::Acquire) {
            self.logger
                .error(format_args!("writer.write: writer is closed, entry dropped"));
            return;
        }

        if self.tx.send(WriterCommand::Write(entry.into())).await.is_err() {
            self.logger
                .error(format_args!("writer.write: writer is stopped, entry dropped"));
        }
    }

    pub async fn write_line(&self, line: &str) {
        self.write(line.as_bytes()).await;
    }

    /// Same as [`Writer::write`] for callers outside the async runtime.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_write(&self, entry: impl Into<Vec<u8>>) {
        if self.closed.load(Ordering::Acquire) {
            self.logger
                .error(format_args!("writer.write: writer is closed, entry dropped"));
            return;
        }

        if self.tx.blocking_send(WriterCommand::Write(entry.into())).is_err() {
            self.logger
                .error(format_args!("writer.write: writer is stopped, entry dropped"));
        }
    }

    /// Stops accepting entries and waits for the worker's final flush.
    ///
    /// Only the first call has an effect. Writing concurrently with `close` is a caller
    /// error: such entries are either part of the final flush or dropped.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            self.logger
                .error(format_args!("writer.close: writer is already closed"));
            return;
        }

        let (ack_tx, ack_rx) = oneshot::channel();
        if self.tx.send(WriterCommand::Shutdown(ack_tx)).await.is_err() {
            self.logger
                .error(format_args!("writer.close: writer is already stopped"));
            return;
        }

        if ack_rx.await.is_err() {
            self.logger
                .error(format_args!("writer.close: worker exited before the final flush"));
        }
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Entries accepted by the worker and not flushed yet.
    #[must_use]
    pub fn pending(&self) -> Snapshot {
        self.batch.snapshot()
    }
}

pub struct WriterService {
    transport: Arc<dyn Transport>,
    batch: Arc<Batch>,
    logger: Arc<dyn Logger>,
    options: WriterOptions,
    rx: mpsc::Receiver<WriterCommand>,
}

impl WriterService {
    pub fn new(
        transport: Arc<dyn Transport>,
        batch: Arc<Batch>,
        logger: Option<Arc<dyn Logger>>,
        options: WriterOptions,
    ) -> Result<(Self, Writer), CreationError> {
        if options.send_interval.is_zero() {
            return Err(CreationError::ZeroSendInterval);
        }

        // capacity 1: a producer waits as long as the worker has not taken the previous entry
        let (tx, rx) = mpsc::channel(1);
        let logger = logger.unwrap_or_else(|| Arc::new(TracingLogger));

        let service = Self {
            transport,
            batch: Arc::clone(&batch),
            logger: Arc::clone(&logger),
            options,
            rx,
        };

        let writer = Writer {
            tx,
            closed: Arc::new(AtomicBool::new(false)),
            batch,
            logger,
        };

        Ok((service, writer))
    }

    pub async fn run(mut self) {
        self.logger.info(format_args!("writer: started"));

        let period = self.options.send_interval;
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let ack = loop {
            tokio::select! {
                command = self.rx.recv() => match command {
                    Some(WriterCommand::Write(entry)) => self.write(&entry, &mut ticker).await,
                    Some(WriterCommand::Shutdown(ack)) => break Some(ack),
                    None => break None,
                },
                _ = ticker.tick() => self.flush().await,
            }
        };

        debug!("Writer service shutting down");

        // entries queued before the channel closed still belong to the final flush
        self.rx.close();
        while let Some(command) = self.rx.recv().await {
            if let WriterCommand::Write(entry) = command {
                self.write(&entry, &mut ticker).await;
            }
        }

        self.flush().await;
        self.logger.info(format_args!("writer: stopped"));

        if let Some(ack) = ack {
            if ack.send(()).is_err() {
                debug!("Shutdown acknowledgement dropped - close() caller went away");
            }
        }
    }

    async fn write(&self, entry: &[u8], ticker: &mut Interval) {
        let Err(error) = self.batch.write(entry) else {
            return;
        };

        if !self.options.flush_trigger.forces_flush(error) {
            self.logger.error(format_args!(
                "batch.write: {error}, entry of {} bytes dropped",
                entry.len()
            ));
            return;
        }

        self.flush().await;

        if let Err(error) = self.batch.write(entry) {
            self.logger.error(format_args!(
                "batch.write: {error}, entry of {} bytes dropped",
                entry.len()
            ));
        }

        ticker.reset();
    }

    async fn flush(&self) {
        let Snapshot {
            data,
            size,
            entries,
        } = self.batch.snapshot();

        if size > 0 || entries > 0 {
            let timeout = self.options.send_timeout;
            let result = match time::timeout(timeout, self.transport.send(data, timeout)).await {
                Ok(result) => result,
                Err(_) => Err(SendError::Timeout(timeout)),
            };

            match result {
                Ok(_) => self
                    .logger
                    .info(format_args!("flush: sent {size} bytes, {entries} entries")),
                Err(error) => self.logger.error(format_args!(
                    "client.send: {error} ({size} bytes, {entries} entries dropped)"
                )),
            }
        }

        self.batch.reset();
    }
}
