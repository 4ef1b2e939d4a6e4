//! Owns every background task and their shared shutdown signal.

use std::{future::Future, sync::Arc};

use hat_core::{shutdown_channel, ChatOutbound};
use tokio::{sync::watch, task::JoinHandle};

use crate::{run_trigger, MessageDispatcher, ReplyDelay, Trigger};

/// Spawns trigger loops and auxiliary tasks, and stops them together.
pub struct TriggerRuntime {
    shutdown_tx: watch::Sender<bool>,
    tasks: Vec<(&'static str, JoinHandle<()>)>,
}

impl Default for TriggerRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl TriggerRuntime {
    pub fn new() -> Self {
        let (shutdown_tx, _) = shutdown_channel();
        Self {
            shutdown_tx,
            tasks: Vec::new(),
        }
    }

    pub fn shutdown_receiver(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    pub fn task_names(&self) -> Vec<&'static str> {
        self.tasks.iter().map(|(name, _)| *name).collect()
    }

    /// Subscribes `trigger` to the dispatcher and starts its evaluation loop.
    pub fn spawn_trigger<T: Trigger>(
        &mut self,
        dispatcher: &mut MessageDispatcher,
        trigger: T,
        outbound: Arc<dyn ChatOutbound>,
        delay: ReplyDelay,
    ) {
        let name = trigger.name();
        let inbox = dispatcher.subscribe(name, trigger.filter());
        let shutdown = self.shutdown_receiver();
        let handle = tokio::spawn(async move {
            run_trigger(trigger, inbox, outbound, delay, shutdown).await;
        });
        self.tasks.push((name, handle));
    }

    /// Starts an auxiliary task; it is expected to watch [`Self::shutdown_receiver`].
    pub fn spawn_task<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.tasks.push((name, tokio::spawn(task)));
    }

    /// Signals shutdown and waits for every task to finish.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for (name, handle) in self.tasks {
            if let Err(error) = handle.await {
                tracing::warn!(task = name, error = %error, "background task ended abnormally");
            }
        }
        tracing::info!("background tasks stopped");
    }
}
