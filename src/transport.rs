// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;
use std::time::Duration;

use tracing::{event, Level};

use crate::name::Name;

/// What a transport delivers to the engine, strictly one at a time.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A response to a request this endpoint expressed.
    Response { name: Name, payload: Vec<u8> },
    /// A request this endpoint expressed went unanswered.
    Timeout { name: Name },
    /// An inbound request matching one of this endpoint's registered
    /// prefixes.
    Request { name: Name },
}

/// The request/response network collaborator. Nothing here blocks: a
/// request is expressed and forgotten, and its eventual response or
/// timeout comes back through `poll`. The engine owns its transport
/// exclusively, so implementations need no internal synchronization.
pub trait Transport {
    /// Sends a request for `name` toward the forwarding route `route`.
    fn express(&mut self, name: &Name, route: &Name);

    /// Starts surfacing inbound requests under `prefix` as `Request`
    /// events.
    fn register_prefix(&mut self, prefix: &Name);

    /// Stops surfacing inbound requests entirely.
    fn unregister_all(&mut self);

    /// Answers an inbound request previously surfaced for `name`.
    fn put(&mut self, name: &Name, payload: Vec<u8>);

    /// Drains whatever is ready, waiting at most `timeout`; zero means
    /// "only what is already ready, do not block".
    fn poll(&mut self, timeout: Duration) -> Vec<TransportEvent>;
}

// --- In-process loopback ---------------------------------------------------

struct EndpointState {
    inbox: VecDeque<TransportEvent>,
    prefixes: Vec<Name>,
    generation: u64,
}

struct OutstandingRequest {
    name: Name,
    requester: usize,
    /// Requester poll generation after which silence becomes a timeout.
    deadline: u64,
}

#[derive(Default)]
struct HubState {
    endpoints: HashMap<usize, EndpointState>,
    /// Forwarding route -> the endpoint reachable through it.
    attachments: HashMap<Name, usize>,
    outstanding: Vec<OutstandingRequest>,
    next_id: usize,
}

/// An in-process hub connecting endpoints by forwarding-route name.
/// Requests toward a route with no attached endpoint, with no matching
/// registered prefix, or which the far side declines to answer all
/// surface as `Timeout` events after one full poll generation — enough
/// for an interleaved requester/responder drive loop to exchange an
/// answer first. Everything is single-threaded by construction; `poll`
/// never waits.
#[derive(Clone, Default)]
pub struct LoopbackHub {
    state: Rc<RefCell<HubState>>,
}

impl LoopbackHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// A new endpoint not reachable through any route (a pure requester).
    pub fn endpoint(&self) -> LoopbackTransport {
        let mut state = self.state.borrow_mut();
        let id = state.next_id;
        state.next_id += 1;
        state.endpoints.insert(
            id,
            EndpointState {
                inbox: VecDeque::new(),
                prefixes: Vec::new(),
                generation: 0,
            },
        );
        LoopbackTransport {
            state: Rc::clone(&self.state),
            id,
        }
    }

    /// A new endpoint reachable through the forwarding route `route`.
    pub fn attached(&self, route: &Name) -> LoopbackTransport {
        let transport = self.endpoint();
        self.state
            .borrow_mut()
            .attachments
            .insert(route.clone(), transport.id);
        transport
    }
}

pub struct LoopbackTransport {
    state: Rc<RefCell<HubState>>,
    id: usize,
}

#[allow(dead_code)]
impl LoopbackTransport {
    /// An endpoint on a private hub with nothing attached: every request
    /// times out. The default transport when the caller supplies none.
    pub fn detached() -> Self {
        LoopbackHub::new().endpoint()
    }

    /// Makes this endpoint additionally reachable through `route`.
    pub fn attach(&self, route: &Name) {
        self.state
            .borrow_mut()
            .attachments
            .insert(route.clone(), self.id);
    }
}

impl Transport for LoopbackTransport {
    fn express(&mut self, name: &Name, route: &Name) {
        let mut state = self.state.borrow_mut();
        let target = state.attachments.get(route).copied();
        let deadline = state.endpoints[&self.id].generation + 2;

        let reachable = match target {
            Some(target_id) if target_id != self.id => {
                let target_state = state.endpoints.get_mut(&target_id).expect("endpoint exists");
                if target_state.prefixes.iter().any(|p| p.is_prefix_of(name)) {
                    target_state.inbox.push_back(TransportEvent::Request {
                        name: name.clone(),
                    });
                    true
                } else {
                    false
                }
            }
            _ => false,
        };

        if reachable {
            state.outstanding.push(OutstandingRequest {
                name: name.clone(),
                requester: self.id,
                deadline,
            });
        } else {
            // Nothing will ever answer; fail fast on the next poll.
            let inbox = &mut state.endpoints.get_mut(&self.id).expect("endpoint exists").inbox;
            inbox.push_back(TransportEvent::Timeout { name: name.clone() });
            event!(Level::DEBUG, name = %name, route = %route, "request unroutable, queueing timeout");
        }
    }

    fn register_prefix(&mut self, prefix: &Name) {
        let mut state = self.state.borrow_mut();
        let prefixes = &mut state.endpoints.get_mut(&self.id).expect("endpoint exists").prefixes;
        if !prefixes.contains(prefix) {
            prefixes.push(prefix.clone());
        }
    }

    fn unregister_all(&mut self) {
        self.state
            .borrow_mut()
            .endpoints
            .get_mut(&self.id)
            .expect("endpoint exists")
            .prefixes
            .clear();
    }

    fn put(&mut self, name: &Name, payload: Vec<u8>) {
        let mut state = self.state.borrow_mut();
        let mut answered = Vec::new();
        state.outstanding.retain(|o| {
            if &o.name == name {
                answered.push(o.requester);
                false
            } else {
                true
            }
        });
        for requester in answered {
            if let Some(endpoint) = state.endpoints.get_mut(&requester) {
                endpoint.inbox.push_back(TransportEvent::Response {
                    name: name.clone(),
                    payload: payload.clone(),
                });
            }
        }
    }

    fn poll(&mut self, _timeout: Duration) -> Vec<TransportEvent> {
        // In-process delivery is always immediately ready, so the timeout
        // never has anything to wait for.
        let mut state = self.state.borrow_mut();
        let generation = {
            let endpoint = state.endpoints.get_mut(&self.id).expect("endpoint exists");
            endpoint.generation += 1;
            endpoint.generation
        };

        let mut expired = Vec::new();
        state.outstanding.retain(|o| {
            if o.requester == self.id && generation >= o.deadline {
                expired.push(o.name.clone());
                false
            } else {
                true
            }
        });

        let endpoint = state.endpoints.get_mut(&self.id).expect("endpoint exists");
        for name in expired {
            endpoint.inbox.push_back(TransportEvent::Timeout { name });
        }
        endpoint.inbox.drain(..).collect()
    }
}
