//! A single-worker task queue that owns mutable state.
//!
//! Every task runs on the same background thread, in submission order, with exclusive access to
//! the state. This is the only synchronization the event logger needs: the stores are never
//! touched from anywhere else.
use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::mpsc,
    thread::JoinHandle,
};

use crate::{Error, Result};

type Task<S> = Box<dyn FnOnce(&mut S, &QueueHandle<S>) + Send>;

enum Message<S> {
    Run(Task<S>),
    Stop,
}

/// Submits tasks to a [`DeliveryQueue`]. Cheap to clone and usable from any thread.
pub(crate) struct QueueHandle<S> {
    sender: mpsc::Sender<Message<S>>,
}

impl<S> Clone for QueueHandle<S> {
    fn clone(&self) -> Self {
        QueueHandle {
            sender: self.sender.clone(),
        }
    }
}

impl<S: 'static> QueueHandle<S> {
    /// Enqueues `task` without waiting for it to run.
    ///
    /// # Errors
    ///
    /// [`Error::QueueClosed`] if the worker has stopped.
    pub fn execute(&self, task: impl FnOnce(&mut S, &QueueHandle<S>) + Send + 'static) -> Result<()> {
        self.sender
            .send(Message::Run(Box::new(task)))
            .map_err(|_| Error::QueueClosed)
    }

    /// Like [`QueueHandle::execute`] but logs instead of returning the failure.
    pub fn execute_or_log(&self, task: impl FnOnce(&mut S, &QueueHandle<S>) + Send + 'static) {
        if let Err(err) = self.execute(task) {
            log::warn!(target: "event_logger", "failed to enqueue task: {}", err);
        }
    }

    /// Blocks until every task enqueued before this call has run.
    pub fn wait_until_idle(&self) {
        let (done_sender, done_receiver) = mpsc::sync_channel::<()>(1);
        let enqueued = self.execute(move |_, _| {
            let _ = done_sender.send(());
        });
        if enqueued.is_ok() {
            // Error means the worker stopped before reaching our task; nothing left to wait for.
            let _ = done_receiver.recv();
        }
    }
}

/// The worker thread of the queue.
pub(crate) struct DeliveryQueue<S> {
    handle: QueueHandle<S>,
    join_handle: JoinHandle<()>,
}

impl<S: Send + 'static> DeliveryQueue<S> {
    /// Starts the worker thread with `state`.
    ///
    /// # Errors
    ///
    /// IO Error if the worker thread failed to start.
    pub fn start(name: &str, mut state: S) -> std::io::Result<DeliveryQueue<S>> {
        let (sender, receiver) = mpsc::channel::<Message<S>>();
        let handle = QueueHandle { sender };

        let join_handle = {
            // Tasks may enqueue follow-up work.
            let handle = handle.clone();
            std::thread::Builder::new()
                .name(name.to_owned())
                .spawn(move || {
                    // Ends once Stop is received. The channel never disconnects on its own as we
                    // hold a sender here.
                    while let Ok(Message::Run(task)) = receiver.recv() {
                        let result =
                            catch_unwind(AssertUnwindSafe(|| task(&mut state, &handle)));
                        if result.is_err() {
                            log::error!(target: "event_logger", "delivery task panicked");
                        }
                    }
                    log::debug!(target: "event_logger", "delivery queue received stop command");
                })?
        };

        Ok(DeliveryQueue {
            handle,
            join_handle,
        })
    }

    /// Returns a handle for submitting tasks.
    pub fn handle(&self) -> &QueueHandle<S> {
        &self.handle
    }

    /// Stops the worker after all previously enqueued tasks and waits for it to exit.
    ///
    /// Tasks submitted afterwards are rejected with [`Error::QueueClosed`].
    pub fn shutdown(self) -> Result<()> {
        // Error means the worker already exited.
        let _ = self.handle.sender.send(Message::Stop);
        drop(self.handle);

        self.join_handle
            .join()
            .map_err(|_| Error::Io(std::sync::Arc::new(std::io::Error::other("delivery queue panicked"))))?;

        Ok(())
    }
}
