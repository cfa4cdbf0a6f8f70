use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam::channel::Receiver;

use crate::audio::DecodedAudio;
use crate::bands::Band;
use crate::engine::{ProcessedAudio, ProcessingRequest, ProcessingResponse, ProcessingService};
use crate::error::EqError;

/// Quiet period after the last band edit before a recompute is dispatched.
pub const DEBOUNCE_DELAY: Duration = Duration::from_millis(300);

pub enum SchedulerEvent {
    /// Freshest result landed; caller updates the output asset and charts.
    Applied(Box<ProcessedAudio>),
    /// The freshest request failed. Previous output stays valid.
    Failed(EqError),
}

/// Turns bursts of band edits into a single recompute and keeps results
/// consistent when responses race: only the response carrying the highest
/// dispatched token may touch state, everything older is dropped on the
/// floor. There is no real cancellation, superseded work just gets ignored.
pub struct ProcessingScheduler {
    service: Box<dyn ProcessingService>,
    responses: Receiver<ProcessingResponse>,
    deadline: Option<Instant>,
    next_token: u64,
    last_dispatched: Option<u64>,
    in_flight: bool,
}

impl ProcessingScheduler {
    pub fn new(service: Box<dyn ProcessingService>, responses: Receiver<ProcessingResponse>) -> Self {
        Self {
            service,
            responses,
            deadline: None,
            next_token: 0,
            last_dispatched: None,
            in_flight: false,
        }
    }

    /// Band list changed: (re)start the debounce window. Another change
    /// before the deadline pushes the deadline out instead of queueing.
    pub fn note_change(&mut self, now: Instant) {
        self.deadline = Some(now + DEBOUNCE_DELAY);
    }

    /// A recompute is either debouncing or waiting on the service.
    pub fn is_processing(&self) -> bool {
        self.in_flight || self.deadline.is_some()
    }

    /// Drive the debounce timer and drain any responses that arrived.
    /// Called from the UI tick with the current source asset and bands.
    pub fn tick(
        &mut self,
        now: Instant,
        source: Option<&Arc<DecodedAudio>>,
        bands: &[Band],
    ) -> Vec<SchedulerEvent> {
        if let Some(deadline) = self.deadline {
            if now >= deadline {
                self.deadline = None;
                match source {
                    Some(source) => self.dispatch(Arc::clone(source), bands.to_vec()),
                    // Nothing loaded yet, the edit will be picked up when
                    // an asset arrives
                    None => {}
                }
            }
        }

        let mut events = Vec::new();
        while let Ok(response) = self.responses.try_recv() {
            if Some(response.token) != self.last_dispatched {
                log::debug!(
                    "Discarding stale processing response (token {}, latest {:?})",
                    response.token,
                    self.last_dispatched
                );
                continue;
            }
            self.in_flight = false;
            match response.result {
                Ok(processed) => events.push(SchedulerEvent::Applied(Box::new(processed))),
                Err(err) => events.push(SchedulerEvent::Failed(err)),
            }
        }
        events
    }

    /// Recompute immediately (asset just loaded), skipping the debounce.
    pub fn dispatch_now(&mut self, source: Arc<DecodedAudio>, bands: Vec<Band>) {
        self.deadline = None;
        self.dispatch(source, bands);
    }

    fn dispatch(&mut self, source: Arc<DecodedAudio>, bands: Vec<Band>) {
        let token = self.next_token;
        self.next_token += 1;
        self.last_dispatched = Some(token);
        self.in_flight = true;
        log::debug!("Dispatching processing request, token {}", token);
        self.service.dispatch(ProcessingRequest {
            token,
            source,
            bands,
        });
    }
}
