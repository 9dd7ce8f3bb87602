//! Serial task queue
//!
//! Each connection runs its mutations one at a time on a dedicated Tokio
//! task that owns the mutable state. Submitting never blocks; the returned
//! [`TaskHandle`] resolves once the task ran (or was skipped).
// Copyright 2025 Francisco F. Pinochet
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


use std::future::Future;
use std::pin::Pin;
use std::sync::Weak;
use std::task::{Context, Poll};
use tokio::sync::{mpsc, oneshot};
use tracing::{trace, Instrument, Span};

type Task<T> = Box<dyn FnOnce(&mut T) + Send>;

struct Job<T> {
    task: Task<T>,
    done: oneshot::Sender<()>,
}

/// Sending side of a serial queue over state `T`
pub struct SerialQueue<T> {
    sender: mpsc::UnboundedSender<Job<T>>,
}

impl<T: Send + 'static> SerialQueue<T> {
    /// Spawn the worker owning `state`, running every task inside `span`
    ///
    /// Tasks only run while `owner` is alive; once it is gone queued tasks
    /// are skipped and their handles resolve. Must be called from within a
    /// Tokio runtime.
    pub fn spawn<O: Send + Sync + 'static>(mut state: T, owner: Weak<O>, span: Span) -> Self {
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job<T>>();

        tokio::spawn(async move {
            while let Some(job) = receiver.recv().await {
                if owner.strong_count() > 0 {
                    (job.task)(&mut state);
                } else {
                    trace!("Owner gone, skipping queued task");
                }
                let _ = job.done.send(());
            }
        }
        .instrument(span));

        SerialQueue { sender }
    }

    /// Queue `task` after everything submitted before it
    pub fn submit(&self, task: impl FnOnce(&mut T) + Send + 'static) -> TaskHandle {
        let (done, receiver) = oneshot::channel();
        let job = Job {
            task: Box::new(task),
            done,
        };
        // A stopped worker drops the job, which resolves the handle
        let _ = self.sender.send(job);
        TaskHandle { receiver }
    }
}

/// Completion of a queued task
#[derive(Debug)]
#[must_use = "a TaskHandle does nothing unless awaited; drop it to fire and forget"]
pub struct TaskHandle {
    receiver: oneshot::Receiver<()>,
}

impl Future for TaskHandle {
    type Output = ();

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<()> {
        Pin::new(&mut self.receiver).poll(cx).map(|_| ())
    }
}
