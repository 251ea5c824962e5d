use std::future::Future;
use std::pin::Pin;

use tokio::sync::{mpsc, oneshot};

use super::wire::ResultFrame;

pub type StreamWorker = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Which completion endpoint a stream belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StreamRoute {
    Conversation,
    HistoryGenerate,
}

impl StreamRoute {
    pub fn path(self) -> &'static str {
        match self {
            Self::Conversation => "/conversation",
            Self::HistoryGenerate => "/history/generate",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FrameEvent {
    Frame(ResultFrame),
    /// Non-success response before any frame was read.
    Rejected {
        status: u16,
        detail: Option<String>,
    },
    /// Transport or decode failure mid-stream; `remote_message` is set when the server
    /// itself reported the error.
    Failed {
        remote_message: Option<String>,
        reason: String,
    },
    Done,
}

/// Receiving side of a streamed completion; dropping it cancels the worker.
pub struct FrameEventStream {
    route: StreamRoute,
    events: mpsc::UnboundedReceiver<FrameEvent>,
    cancel_tx: Option<oneshot::Sender<()>>,
}

pub struct FrameStreamHandle {
    pub stream: FrameEventStream,
    pub worker: StreamWorker,
}

impl FrameEventStream {
    pub(crate) fn new(
        route: StreamRoute,
        events: mpsc::UnboundedReceiver<FrameEvent>,
        cancel_tx: oneshot::Sender<()>,
    ) -> Self {
        Self {
            route,
            events,
            cancel_tx: Some(cancel_tx),
        }
    }

    pub fn route(&self) -> StreamRoute {
        self.route
    }

    pub async fn recv(&mut self) -> Option<FrameEvent> {
        self.events.recv().await
    }

    pub fn try_recv(&mut self) -> Option<FrameEvent> {
        self.events.try_recv().ok()
    }

    /// Detaches the cancel signal so another task can stop the stream.
    pub fn take_canceller(&mut self) -> Option<StreamCanceller> {
        self.cancel_tx.take().map(|cancel_tx| StreamCanceller {
            route: self.route,
            cancel_tx,
        })
    }

    pub fn cancel(&mut self) -> bool {
        self.cancel_tx
            .take()
            .map(|tx| tx.send(()).is_ok())
            .unwrap_or(false)
    }
}

impl Drop for FrameEventStream {
    fn drop(&mut self) {
        if let Some(cancel_tx) = self.cancel_tx.take() {
            let _ = cancel_tx.send(());
        }
    }
}

/// Detached cancellation signal for one in-flight stream.
#[derive(Debug)]
pub struct StreamCanceller {
    route: StreamRoute,
    cancel_tx: oneshot::Sender<()>,
}

impl StreamCanceller {
    pub fn route(&self) -> StreamRoute {
        self.route
    }

    /// Returns false when the worker already finished.
    pub fn cancel(self) -> bool {
        self.cancel_tx.send(()).is_ok()
    }
}

/// Channel pair backing a [`FrameEventStream`], for collaborators that produce frames.
pub fn event_channel(
    route: StreamRoute,
) -> (
    mpsc::UnboundedSender<FrameEvent>,
    FrameEventStream,
    oneshot::Receiver<()>,
) {
    let (event_tx, event_rx) = mpsc::unbounded_channel();
    let (cancel_tx, cancel_rx) = oneshot::channel();
    (
        event_tx,
        FrameEventStream::new(route, event_rx, cancel_tx),
        cancel_rx,
    )
}
