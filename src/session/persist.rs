// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Background persistence of session updates.
//!
//! Updates to existing sessions are submitted to an unbounded queue and
//! written by a single worker task. Submitting never blocks the request;
//! write failures are logged and dropped because the cache already holds
//! the newer state. Jobs still queued at shutdown are drained before the
//! worker exits. Deletes are not queued: logout flushes the queue and
//! then soft-deletes synchronously.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::Session;
use crate::storage::SessionPersistence;

enum Job {
    Update(Box<Session>),
    Flush(oneshot::Sender<()>),
}

/// Handle for submitting persistence jobs.
#[derive(Clone)]
pub struct PersistQueue {
    tx: mpsc::UnboundedSender<Job>,
}

/// Worker draining the queue into the durable store.
pub struct PersistWorker {
    rx: mpsc::UnboundedReceiver<Job>,
    store: Arc<dyn SessionPersistence>,
}

impl PersistQueue {
    /// Create a queue and the worker that must be spawned to serve it.
    pub fn new(store: Arc<dyn SessionPersistence>) -> (Self, PersistWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, PersistWorker { rx, store })
    }

    /// Queue an upsert of the session record.
    pub fn update(&self, session: Session) {
        let id = session.id;
        if self.tx.send(Job::Update(Box::new(session))).is_err() {
            warn!(session_id = %id, "Persistence worker gone, session update dropped");
        }
    }

    /// Wait until every job queued before this call has been processed.
    pub async fn flush(&self) {
        let (done, wait) = oneshot::channel();
        if self.tx.send(Job::Flush(done)).is_ok() {
            let _ = wait.await;
        }
    }
}

impl PersistWorker {
    /// Run until the cancellation token is triggered, then drain.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Session persistence worker starting");

        loop {
            tokio::select! {
                job = self.rx.recv() => match job {
                    Some(job) => self.process(job).await,
                    None => break,
                },
                _ = shutdown.cancelled() => break,
            }
        }

        // Stop accepting and write out whatever is still queued
        self.rx.close();
        let mut drained = 0usize;
        while let Some(job) = self.rx.recv().await {
            self.process(job).await;
            drained += 1;
        }
        info!(drained, "Session persistence worker shutting down");
    }

    async fn process(&self, job: Job) {
        match job {
            Job::Update(session) => {
                let store = Arc::clone(&self.store);
                let id = session.id;
                let result =
                    tokio::task::spawn_blocking(move || store.update_session(&session)).await;
                match result {
                    Ok(Ok(())) => debug!(session_id = %id, "Session persisted"),
                    Ok(Err(e)) => warn!(session_id = %id, error = %e, "Session update not persisted"),
                    Err(e) => warn!(session_id = %id, error = %e, "Session update task failed"),
                }
            }
            Job::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}
