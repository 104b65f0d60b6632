use crossbeam_channel::{Receiver, Sender, unbounded};
use tokio::sync::mpsc;

use super::record::ResultRecord;
use super::template::RequestTemplate;

/// Unbounded multi-producer multi-consumer queue of pending templates.
///
/// The orchestrator owns the `WorkQueue`; workers only ever see a
/// [`DequeueHandle`], so nothing but the orchestrator can enqueue or clear.
#[derive(Debug)]
pub struct WorkQueue {
    tx: Sender<RequestTemplate>,
    rx: Receiver<RequestTemplate>,
}

impl Default for WorkQueue {
    fn default() -> Self {
        let (tx, rx) = unbounded();
        Self { tx, rx }
    }
}

impl WorkQueue {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, template: RequestTemplate) -> bool {
        self.tx.send(template).is_ok()
    }

    /// Returns how many templates were accepted.
    pub fn enqueue_many<I>(&self, templates: I) -> usize
    where
        I: IntoIterator<Item = RequestTemplate>,
    {
        let mut accepted: usize = 0;
        for template in templates {
            if self.tx.send(template).is_err() {
                break;
            }
            accepted = accepted.saturating_add(1);
        }
        accepted
    }

    #[must_use]
    pub fn try_dequeue(&self) -> Option<RequestTemplate> {
        self.rx.try_recv().ok()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Discards every pending template and returns how many were dropped.
    pub fn clear(&self) -> usize {
        self.rx.try_iter().count()
    }

    #[must_use]
    pub fn reader(&self) -> DequeueHandle {
        DequeueHandle {
            rx: self.rx.clone(),
        }
    }
}

/// Worker-side view of the work queue: dequeue only.
#[derive(Debug, Clone)]
pub struct DequeueHandle {
    rx: Receiver<RequestTemplate>,
}

impl DequeueHandle {
    #[must_use]
    pub fn try_dequeue(&self) -> Option<RequestTemplate> {
        self.rx.try_recv().ok()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

/// Producer half of the result queue, one clone per worker.
///
/// When every clone has been dropped the orchestrator's receiver yields
/// `None`, which is how it learns that all workers have exited.
#[derive(Debug, Clone)]
pub(crate) struct ResultSender {
    tx: mpsc::UnboundedSender<ResultRecord>,
}

impl ResultSender {
    pub(crate) fn push(&self, record: ResultRecord) -> bool {
        self.tx.send(record).is_ok()
    }
}

pub(crate) fn result_queue() -> (ResultSender, mpsc::UnboundedReceiver<ResultRecord>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (ResultSender { tx }, rx)
}
