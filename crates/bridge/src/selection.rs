//! Selection session: turns the host's asynchronous picker completion into a
//! single resolved result for the caller.
//!
//! The session owns the one pending-response slot. `begin` arms it and asks
//! the attached surface to present the picker; the host later calls
//! `deliver` from its own schedule, which fulfills the slot exactly once.
//!
//! Surfaces come and go with the host lifecycle. Detaching leaves the slot
//! alone, and attaching a new surface presents a request that was armed
//! while no surface was available.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use protocol::DocumentHandle;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::config::PickerConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::host::{PickerCompletion, PickerOutcome, PickerRequest, PickerSurface};

type Reply = oneshot::Sender<BridgeResult<Vec<DocumentHandle>>>;

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SelectionState {
    /// No picker request is outstanding.
    Idle,
    /// A picker request is waiting for the host's completion.
    AwaitingHostPicker,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Presentation {
    /// Armed while no surface was attached.
    Deferred,
    /// Handed to a surface; its answer is not back yet.
    InFlight,
    Presented,
}

struct Pending {
    id: u64,
    request: PickerRequest,
    presentation: Presentation,
    reply: Reply,
}

struct Inner {
    pending: Option<Pending>,
    surface: Option<Arc<dyn PickerSurface>>,
    next_id: u64,
}

/// Awaitable result of a picker request.
#[derive(Debug)]
pub struct PickTicket {
    rx: oneshot::Receiver<BridgeResult<Vec<DocumentHandle>>>,
}

impl PickTicket {
    /// Wait for the user's answer. There is no timeout.
    pub async fn wait(self) -> BridgeResult<Vec<DocumentHandle>> {
        self.rx
            .await
            .unwrap_or_else(|_| Err(BridgeError::PickerAbandoned))
    }
}

/// Drives the host's document picker.
pub struct SelectionSession {
    config: PickerConfig,
    inner: Mutex<Inner>,
}

impl SelectionSession {
    pub fn new(config: PickerConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                pending: None,
                surface: None,
                next_id: 1,
            }),
        }
    }

    /// Request code this session recognizes.
    pub fn request_code(&self) -> i32 {
        self.config.request_code
    }

    pub fn state(&self) -> SelectionState {
        if self.lock().pending.is_some() {
            SelectionState::AwaitingHostPicker
        } else {
            SelectionState::Idle
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Arm the pending slot and present the picker.
    ///
    /// `allow_multiple` overrides the configured multi-select default. Fails
    /// with [`BridgeError::AlreadyPending`] while another caller is waiting,
    /// and with [`BridgeError::PickerUnavailable`] when the surface refuses
    /// to present.
    ///
    /// A slot whose caller went away is taken over. If its picker is already
    /// showing, the new caller inherits that picker when the configuration
    /// matches and is told [`BridgeError::AlreadyPending`] otherwise.
    pub fn begin(&self, allow_multiple: Option<bool>) -> BridgeResult<PickTicket> {
        let request = PickerRequest {
            request_code: self.config.request_code,
            allow_multiple: allow_multiple.unwrap_or(self.config.allow_multiple),
            mime_filter: self.config.mime_filter.clone(),
        };
        let (tx, rx) = oneshot::channel();

        let (id, surface) = {
            let mut inner = self.lock();
            if let Some(pending) = inner.pending.as_mut() {
                if !pending.reply.is_closed() {
                    return Err(BridgeError::AlreadyPending);
                }
                // Completions carry only the request code, so a picker already
                // on screen answers whoever holds the slot.
                if pending.presentation != Presentation::Deferred {
                    if pending.request != request {
                        return Err(BridgeError::AlreadyPending);
                    }
                    warn!(id = pending.id, "Adopting picker request whose caller went away");
                    pending.reply = tx;
                    return Ok(PickTicket { rx });
                }
                warn!(id = pending.id, "Discarding picker request whose caller went away");
                inner.pending = None;
            }

            let id = inner.next_id;
            inner.next_id += 1;
            let surface = inner.surface.clone();
            inner.pending = Some(Pending {
                id,
                request: request.clone(),
                presentation: if surface.is_some() {
                    Presentation::InFlight
                } else {
                    Presentation::Deferred
                },
                reply: tx,
            });
            (id, surface)
        };

        match surface {
            Some(surface) => self.present(id, surface.as_ref(), &request)?,
            None => debug!(id, "No picker surface attached, deferring presentation"),
        }

        Ok(PickTicket { rx })
    }

    /// Ask `surface` to present the request armed as `id`. Must be called
    /// without the lock held.
    fn present(
        &self,
        id: u64,
        surface: &dyn PickerSurface,
        request: &PickerRequest,
    ) -> BridgeResult<()> {
        let result = surface.present(request);

        let mut inner = self.lock();
        match result {
            Ok(()) => {
                if let Some(pending) = inner.pending.as_mut().filter(|p| p.id == id) {
                    pending.presentation = Presentation::Presented;
                }
                debug!(id, allow_multiple = request.allow_multiple, "Picker presented");
                Ok(())
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(id, error = %reason, "Picker surface refused the request");
                if let Some(pending) = inner.pending.take_if(|p| p.id == id) {
                    let _ = pending
                        .reply
                        .send(Err(BridgeError::PickerUnavailable(reason.clone())));
                }
                Err(BridgeError::PickerUnavailable(reason))
            }
        }
    }

    /// Handle a completion from the host.
    ///
    /// Returns `false` when the request code is not ours, so the host can
    /// offer the completion to other listeners.
    pub fn deliver(&self, completion: PickerCompletion) -> bool {
        if completion.request_code != self.config.request_code {
            debug!(
                request_code = completion.request_code,
                "Ignoring completion for another request code"
            );
            return false;
        }

        let Some(pending) = self.lock().pending.take() else {
            warn!("Picker completion arrived with no pending request");
            return true;
        };

        let handles = match completion.outcome {
            PickerOutcome::Confirmed(data) => data.into_handles(),
            PickerOutcome::Cancelled => Vec::new(),
        };
        debug!(id = pending.id, count = handles.len(), "Picker completed");

        if pending.reply.send(Ok(handles)).is_err() {
            warn!(id = pending.id, "Picker caller went away before the result arrived");
        }
        true
    }

    /// Bind a (possibly recreated) surface. A request armed while no surface
    /// was attached is presented now.
    pub fn attach_surface(&self, surface: Arc<dyn PickerSurface>) {
        let deferred = {
            let mut inner = self.lock();
            inner.surface = Some(Arc::clone(&surface));
            match inner.pending.as_mut() {
                Some(pending) if pending.presentation == Presentation::Deferred => {
                    pending.presentation = Presentation::InFlight;
                    Some((pending.id, pending.request.clone()))
                }
                _ => None,
            }
        };
        info!(rebinding_pending = deferred.is_some(), "Picker surface attached");

        if let Some((id, request)) = deferred {
            // Failure has already been sent to the waiting caller.
            let _ = self.present(id, surface.as_ref(), &request);
        }
    }

    /// Unbind the current surface. The pending slot, if any, survives.
    pub fn detach_surface(&self) {
        let mut inner = self.lock();
        inner.surface = None;
        info!(pending = inner.pending.is_some(), "Picker surface detached");
    }

    /// Drop the pending slot; its caller sees [`BridgeError::PickerAbandoned`].
    /// Returns whether a request was pending.
    pub fn abandon(&self) -> bool {
        match self.lock().pending.take() {
            Some(pending) => {
                info!(id = pending.id, "Abandoning pending picker request");
                true
            }
            None => false,
        }
    }
}
