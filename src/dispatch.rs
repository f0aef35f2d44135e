//! Asynchronous request/response boundary to the rendering service.
//!
//! Callers hand a [`ServiceCall`] to a [`Dispatch`] and get a [`Ticket`]
//! back immediately. Completed calls are collected later with
//! [`Dispatch::poll`], typically once per UI tick, so the caller's thread
//! never blocks on the service.
//!
//! Two implementations are provided:
//! - [`ThreadDispatcher`]: runs an in-process [`RenderService`] on a small pool
//!   of background threads.
//! - [`HostQueue`]: exposes submitted calls to a host that delivers them
//!   itself (an IPC bridge, or a test) and feeds results back.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::service::{RenderService, ServiceCall, ServiceError, ServiceReply};

/// Correlates a submitted call with its completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Ticket(u64);

impl Ticket {
    pub fn value(self) -> u64 {
        self.0
    }
}

/// Outcome of one submitted call.
#[derive(Debug)]
pub struct Completion {
    pub ticket: Ticket,
    pub result: Result<ServiceReply, ServiceError>,
}

/// Non-blocking submission of service calls.
///
/// Completions may arrive in any order. Each consumer owns its own
/// dispatcher; completions are never shared between consumers.
pub trait Dispatch {
    /// Queue a call. Never blocks.
    fn submit(&mut self, call: ServiceCall) -> Ticket;

    /// Take one completed call, or `None` if nothing has finished yet.
    fn poll(&mut self) -> Option<Completion>;
}

impl<D: Dispatch + ?Sized> Dispatch for Box<D> {
    fn submit(&mut self, call: ServiceCall) -> Ticket {
        (**self).submit(call)
    }

    fn poll(&mut self) -> Option<Completion> {
        (**self).poll()
    }
}

// ============================================================================
// Thread pool dispatcher
// ============================================================================

/// Message sent to a worker thread.
enum WorkerMessage {
    Call(Ticket, ServiceCall),
    Shutdown,
}

/// Runs an in-process [`RenderService`] on background threads.
///
/// Workers share one request queue, so independent calls (such as the two
/// passes of a progressive render) execute concurrently when more than one
/// worker is configured.
pub struct ThreadDispatcher {
    request_tx: Sender<WorkerMessage>,
    result_rx: Receiver<Completion>,
    workers: Vec<JoinHandle<()>>,
    next_ticket: u64,
    /// Completions produced locally when the workers are unreachable
    local: VecDeque<Completion>,
    pending: usize,
}

impl ThreadDispatcher {
    /// Spawn `worker_count` threads (at least one) serving `service`.
    pub fn spawn<S>(service: Arc<S>, worker_count: usize) -> Result<Self, ServiceError>
    where
        S: RenderService + ?Sized + 'static,
    {
        let (request_tx, request_rx) = mpsc::channel::<WorkerMessage>();
        let (result_tx, result_rx) = mpsc::channel::<Completion>();
        let request_rx = Arc::new(Mutex::new(request_rx));

        let mut dispatcher = Self {
            request_tx,
            result_rx,
            workers: Vec::new(),
            next_ticket: 0,
            local: VecDeque::new(),
            pending: 0,
        };

        for index in 0..worker_count.max(1) {
            let service = Arc::clone(&service);
            let request_rx = Arc::clone(&request_rx);
            let result_tx = result_tx.clone();
            let handle = thread::Builder::new()
                .name(format!("render-worker-{index}"))
                .spawn(move || {
                    log::debug!("Render worker {} started", index);
                    Self::worker_loop(service.as_ref(), &request_rx, &result_tx);
                    log::debug!("Render worker {} exiting", index);
                })?;
            dispatcher.workers.push(handle);
        }

        log::info!(
            "Render dispatcher spawned with {} worker(s)",
            dispatcher.workers.len()
        );
        Ok(dispatcher)
    }

    fn worker_loop<S: RenderService + ?Sized>(
        service: &S,
        request_rx: &Mutex<Receiver<WorkerMessage>>,
        result_tx: &Sender<Completion>,
    ) {
        loop {
            let message = {
                let rx = match request_rx.lock() {
                    Ok(rx) => rx,
                    Err(poisoned) => poisoned.into_inner(),
                };
                rx.recv()
            };

            match message {
                Ok(WorkerMessage::Call(ticket, call)) => {
                    log::trace!("Worker running {} ({:?})", call.name(), ticket);
                    let result = call.invoke(service);
                    if result_tx.send(Completion { ticket, result }).is_err() {
                        log::warn!("Result channel closed, render worker exiting");
                        break;
                    }
                }
                Ok(WorkerMessage::Shutdown) => break,
                // Channel closed
                Err(_) => break,
            }
        }
    }

    /// Number of calls submitted but not yet polled.
    pub fn pending_count(&self) -> usize {
        self.pending
    }
}

impl Dispatch for ThreadDispatcher {
    fn submit(&mut self, call: ServiceCall) -> Ticket {
        let ticket = Ticket(self.next_ticket);
        self.next_ticket += 1;
        self.pending += 1;

        let name = call.name();
        if self
            .request_tx
            .send(WorkerMessage::Call(ticket, call))
            .is_err()
        {
            log::error!("Failed to send {}: workers are gone", name);
            self.local.push_back(Completion {
                ticket,
                result: Err(ServiceError::Disconnected),
            });
        } else {
            log::trace!("Submitted {} as {:?}", name, ticket);
        }
        ticket
    }

    fn poll(&mut self) -> Option<Completion> {
        let completion = match self.local.pop_front() {
            Some(completion) => Some(completion),
            None => match self.result_rx.try_recv() {
                Ok(completion) => Some(completion),
                Err(TryRecvError::Empty) => None,
                Err(TryRecvError::Disconnected) => {
                    log::warn!("Render workers disconnected");
                    None
                }
            },
        };
        if completion.is_some() {
            self.pending = self.pending.saturating_sub(1);
        }
        completion
    }
}

impl Drop for ThreadDispatcher {
    fn drop(&mut self) {
        log::debug!("Shutting down {} render worker(s)", self.workers.len());

        for _ in &self.workers {
            let _ = self.request_tx.send(WorkerMessage::Shutdown);
        }
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.join() {
                log::warn!("Render worker panicked: {:?}", e);
            }
        }
    }
}

// ============================================================================
// Host-driven queue
// ============================================================================

#[derive(Debug, Default)]
struct HostQueueInner {
    next_ticket: u64,
    submitted: VecDeque<(Ticket, ServiceCall)>,
    completed: VecDeque<Completion>,
}

/// A dispatcher whose calls are carried out by the host.
///
/// Clones share the same queues: the consumer submits and polls through one
/// clone while the host drains [`take_submitted`](Self::take_submitted) and
/// answers with [`complete`](Self::complete), in whatever order replies
/// actually arrive.
#[derive(Debug, Clone, Default)]
pub struct HostQueue {
    inner: Rc<RefCell<HostQueueInner>>,
}

impl HostQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every call submitted since the last drain.
    pub fn take_submitted(&self) -> Vec<(Ticket, ServiceCall)> {
        self.inner.borrow_mut().submitted.drain(..).collect()
    }

    /// Calls submitted and not yet taken by the host.
    pub fn submitted_len(&self) -> usize {
        self.inner.borrow().submitted.len()
    }

    /// Deliver the result of a call.
    pub fn complete(&self, ticket: Ticket, result: Result<ServiceReply, ServiceError>) {
        self.inner
            .borrow_mut()
            .completed
            .push_back(Completion { ticket, result });
    }

    /// Run every submitted call against `service` synchronously, in
    /// submission order.
    pub fn serve<S: RenderService + ?Sized>(&self, service: &S) -> usize {
        let calls = self.take_submitted();
        let count = calls.len();
        for (ticket, call) in calls {
            self.complete(ticket, call.invoke(service));
        }
        count
    }
}

impl Dispatch for HostQueue {
    fn submit(&mut self, call: ServiceCall) -> Ticket {
        let mut inner = self.inner.borrow_mut();
        let ticket = Ticket(inner.next_ticket);
        inner.next_ticket += 1;
        inner.submitted.push_back((ticket, call));
        ticket
    }

    fn poll(&mut self) -> Option<Completion> {
        self.inner.borrow_mut().completed.pop_front()
    }
}
