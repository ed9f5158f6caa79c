// SPDX-FileCopyrightText: 2026 The nametorrent Contributors
// SPDX-License-Identifier: GPL-3.0-or-later

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use tracing::{event, Level};

use crate::config::Settings;
use crate::errors::EngineError;
use crate::name::{ContentKind, Name};
use crate::storage::DataLayout;
use crate::swarm::completion::CompletionTracker;
use crate::swarm::request_queue::RequestQueue;
use crate::swarm::route_table::RouteTable;
use crate::swarm::SwarmEvent;
use crate::transport::{LoopbackTransport, Transport, TransportEvent};

/// One in-flight request. The kind is decided when the request is built
/// and rides along so the response path never re-infers it; retries count
/// against the route the request was last expressed on, and `exhausted`
/// collects routes that have burned through their retry budget for this
/// name.
#[derive(Debug)]
struct PendingRequest {
    kind: ContentKind,
    route: Name,
    retries: u32,
    exhausted: HashSet<Name>,
}

impl PendingRequest {
    fn new(kind: ContentKind) -> Self {
        Self {
            kind,
            route: Name::default(),
            retries: 0,
            exhausted: HashSet::new(),
        }
    }
}

/// The download/seed orchestration engine for one torrent.
///
/// Single-threaded and cooperative: the caller pumps `process_events`,
/// every handler runs to completion before the next event, and all state
/// is mutated synchronously inside those handlers. Requests flow
/// queue -> pending set -> (response | timeout), with the in-flight count
/// capped by the window and every dispatch aimed at the route table's
/// current best route. Terminal failures reach the caller exclusively as
/// `SwarmEvent::Failed`; the public entry points never propagate dispatch
/// errors.
pub struct SwarmManager {
    torrent_name: Name,
    tracker: CompletionTracker,
    routes: RouteTable,
    queue: RequestQueue,
    pending: HashMap<Name, PendingRequest>,
    transport: Box<dyn Transport>,
    settings: Settings,
    dispatch_counter: u64,
    shutting_down: bool,
    outbox: Vec<SwarmEvent>,
}

#[allow(dead_code)]
impl SwarmManager {
    /// `torrent_name` is the descriptor's base name; `data_path` the
    /// torrent's data directory. Supplying no transport yields a detached
    /// loopback, useful for inspecting local state without a network.
    pub fn new(
        torrent_name: Name,
        data_path: impl Into<PathBuf>,
        settings: Settings,
        transport: Option<Box<dyn Transport>>,
    ) -> Self {
        let tracker = CompletionTracker::new(torrent_name.clone(), DataLayout::new(data_path));
        let mut routes = RouteTable::new();
        for route in &settings.routes {
            routes.insert(Name::from_uri(route));
        }
        let transport = transport.unwrap_or_else(|| Box::new(LoopbackTransport::detached()));
        Self {
            torrent_name,
            tracker,
            routes,
            queue: RequestQueue::new(),
            pending: HashMap::new(),
            transport,
            settings,
            dispatch_counter: 0,
            shutting_down: false,
            outbox: Vec::new(),
        }
    }

    /// Rebuilds tracker state from everything already on disk and, when
    /// seeding, registers to answer requests under the torrent's name
    /// prefix and the known manifest bases. Must be called before any
    /// other method.
    pub fn initialize(&mut self) -> Result<(), EngineError> {
        self.tracker.initialize_from_disk()?;
        if self.settings.seed {
            self.transport.register_prefix(&self.torrent_name);
            for base in self.tracker.manifest_bases() {
                self.transport.register_prefix(base);
            }
        }
        event!(
            Level::INFO,
            torrent = %self.torrent_name,
            seed = self.settings.seed,
            "swarm manager initialized"
        );
        Ok(())
    }

    /// Starts (or resumes) downloading the whole torrent: the descriptor
    /// chain first, then every manifest and packet it discovers.
    pub fn download_torrent_file(&mut self) {
        match self.tracker.missing_torrent_segment() {
            Some(segment) => self.enqueue(segment, ContentKind::TorrentSegment),
            None => self.outbox.push(SwarmEvent::TorrentComplete {
                manifests: self.tracker.manifest_bases().to_vec(),
            }),
        }
        for segment in self.tracker.missing_manifests() {
            self.enqueue(segment, ContentKind::ManifestSegment);
        }
        for packet in self.tracker.missing_data_packets_all() {
            self.enqueue(packet, ContentKind::DataPacket);
        }
        self.fill_window();
    }

    /// Downloads one file manifest (addressed by base or any segment
    /// name) and the data packets it names.
    pub fn download_file_manifest(&mut self, name: &Name) {
        if let Some(segment) = self.tracker.missing_manifest_segment(name) {
            self.enqueue(segment, ContentKind::ManifestSegment);
        } else {
            self.outbox.push(SwarmEvent::ManifestComplete {
                name: self.tracker.manifest_base_of(name),
            });
        }
        for packet in self.tracker.missing_data_packets(name) {
            self.enqueue(packet, ContentKind::DataPacket);
        }
        self.fill_window();
    }

    /// Downloads a single data packet.
    pub fn download_data_packet(&mut self, name: &Name) {
        if self.tracker.has_data_packet(name) {
            self.outbox.push(SwarmEvent::PacketReceived { name: name.clone() });
            return;
        }
        self.enqueue(name.clone(), ContentKind::DataPacket);
        self.fill_window();
    }

    /// Pumps the transport once, handling every ready response, timeout,
    /// and inbound request, then refills the dispatch window. Returns the
    /// engine events produced since the last call.
    pub fn process_events(&mut self, timeout: Duration) -> Vec<SwarmEvent> {
        for transport_event in self.transport.poll(timeout) {
            match transport_event {
                TransportEvent::Response { name, payload } => self.handle_response(name, payload),
                TransportEvent::Timeout { name } => self.handle_timeout(name),
                TransportEvent::Request { name } => self.handle_inbound(name),
            }
        }
        self.fill_window();
        std::mem::take(&mut self.outbox)
    }

    /// Stops all network activity: deregisters responders, drops queued
    /// and in-flight requests. Late responses or timeouts for those
    /// requests are treated as no-ops.
    pub fn shutdown(&mut self) {
        self.shutting_down = true;
        self.transport.unregister_all();
        self.pending.clear();
        self.queue = RequestQueue::new();
        event!(Level::INFO, torrent = %self.torrent_name, "swarm manager shut down");
    }

    // --- Read-only views --------------------------------------------------

    pub fn has_all_torrent_segments(&self) -> bool {
        self.tracker.has_all_torrent_segments()
    }

    pub fn has_data_packet(&self, name: &Name) -> bool {
        self.tracker.has_data_packet(name)
    }

    pub fn missing_manifests(&self) -> Vec<Name> {
        self.tracker.missing_manifests()
    }

    pub fn missing_data_packets(&self) -> Vec<Name> {
        self.tracker.missing_data_packets_all()
    }

    /// Descriptor chain complete, every manifest complete, every packet
    /// on disk.
    pub fn is_complete(&self) -> bool {
        self.tracker.has_all_torrent_segments()
            && self.tracker.missing_manifests().is_empty()
            && self.tracker.missing_data_packets_all().is_empty()
    }

    pub fn in_flight(&self) -> usize {
        self.pending.len()
    }

    pub fn tracker(&self) -> &CompletionTracker {
        &self.tracker
    }

    // --- Dispatch ---------------------------------------------------------

    fn enqueue(&mut self, name: Name, kind: ContentKind) {
        if self.shutting_down || self.pending.contains_key(&name) {
            return;
        }
        self.queue.push(name, kind);
    }

    fn fill_window(&mut self) {
        if self.shutting_down {
            return;
        }
        while self.pending.len() < self.settings.window_size {
            let Some((name, kind)) = self.queue.pop() else {
                break;
            };
            self.express_now(name, PendingRequest::new(kind));
        }
    }

    fn express_now(&mut self, name: Name, mut request: PendingRequest) {
        let route = match self.routes.current() {
            Ok(route) => route.clone(),
            Err(error) => {
                self.fail(name, error);
                return;
            }
        };
        event!(Level::DEBUG, name = %name, route = %route, "expressing request");
        request.route = route.clone();
        self.transport.express(&name, &route);
        self.pending.insert(name, request);

        self.dispatch_counter += 1;
        if self.settings.sorting_interval > 0
            && self.dispatch_counter % self.settings.sorting_interval == 0
        {
            self.routes.resort();
        }
    }

    // --- Event handling ---------------------------------------------------

    fn handle_response(&mut self, name: Name, payload: Vec<u8>) {
        let Some(request) = self.pending.remove(&name) else {
            event!(Level::DEBUG, name = %name, "response for a name with no pending request, ignoring");
            return;
        };
        self.routes.record_outcome(&request.route, true);
        match request.kind {
            ContentKind::TorrentSegment => self.ingest_torrent_segment(name, &payload),
            ContentKind::ManifestSegment => self.ingest_manifest_segment(name, &payload),
            ContentKind::DataPacket => self.ingest_data_packet(name, &payload),
        }
    }

    fn ingest_torrent_segment(&mut self, name: Name, payload: &[u8]) {
        match self.tracker.record_torrent_segment(&name, payload) {
            Ok(manifests) => {
                if self.settings.seed {
                    for manifest in &manifests {
                        self.transport.register_prefix(manifest);
                    }
                }
                self.outbox.push(SwarmEvent::TorrentSegmentReceived {
                    name,
                    manifests: manifests.clone(),
                });
                match self.tracker.missing_torrent_segment() {
                    Some(next) => self.enqueue(next, ContentKind::TorrentSegment),
                    None => self.outbox.push(SwarmEvent::TorrentComplete {
                        manifests: self.tracker.manifest_bases().to_vec(),
                    }),
                }
                for manifest in &manifests {
                    if let Some(segment) = self.tracker.missing_manifest_segment(manifest) {
                        self.enqueue(segment, ContentKind::ManifestSegment);
                    }
                }
            }
            Err(error) => self.fail(name, error),
        }
    }

    fn ingest_manifest_segment(&mut self, name: Name, payload: &[u8]) {
        match self.tracker.record_manifest_segment(&name, payload) {
            Ok(packets) => {
                let base = self.tracker.manifest_base_of(&name);
                self.outbox.push(SwarmEvent::ManifestSegmentReceived {
                    name,
                    packets: packets.clone(),
                });
                match self.tracker.missing_manifest_segment(&base) {
                    Some(next) => self.enqueue(next, ContentKind::ManifestSegment),
                    None => self.outbox.push(SwarmEvent::ManifestComplete { name: base }),
                }
                for packet in packets {
                    if !self.tracker.has_data_packet(&packet) {
                        self.enqueue(packet, ContentKind::DataPacket);
                    }
                }
            }
            Err(error) => self.fail(name, error),
        }
    }

    fn ingest_data_packet(&mut self, name: Name, payload: &[u8]) {
        match self.tracker.record_data_packet(&name, payload) {
            Ok(()) => self.outbox.push(SwarmEvent::PacketReceived { name }),
            Err(error) => self.fail(name, error),
        }
    }

    fn handle_timeout(&mut self, name: Name) {
        let Some(mut request) = self.pending.remove(&name) else {
            event!(Level::DEBUG, name = %name, "timeout for a name with no pending request, ignoring");
            return;
        };
        self.routes.record_outcome(&request.route, false);
        request.retries += 1;

        if request.retries < self.settings.max_retries {
            event!(
                Level::DEBUG,
                name = %name,
                route = %request.route,
                retries = request.retries,
                "request timed out, retrying"
            );
            self.express_now(name, request);
            return;
        }

        // This route has burned its budget for this name; fail over. The
        // name only fails once every known route has done the same.
        request.exhausted.insert(request.route.clone());
        self.routes.advance();
        let untried_remain = self
            .routes
            .names()
            .iter()
            .any(|route| !request.exhausted.contains(route));
        if untried_remain {
            event!(Level::DEBUG, name = %name, route = %request.route, "route exhausted, failing over");
            request.retries = 0;
            self.express_now(name, request);
        } else {
            let reason = format!(
                "retries exhausted on {} route(s)",
                request.exhausted.len()
            );
            self.outbox.push(SwarmEvent::Failed { name, reason });
        }
    }

    fn handle_inbound(&mut self, name: Name) {
        if self.shutting_down {
            return;
        }
        match self.tracker.content_for(&name) {
            Some(payload) => {
                event!(Level::DEBUG, name = %name, bytes = payload.len(), "answering inbound request");
                self.transport.put(&name, payload);
            }
            None => {
                event!(Level::DEBUG, name = %name, "inbound request for content we do not hold");
            }
        }
    }

    fn fail(&mut self, name: Name, error: EngineError) {
        event!(Level::WARN, name = %name, error = %error, "download target failed");
        self.outbox.push(SwarmEvent::Failed {
            name,
            reason: error.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::{ManifestSegment, TorrentSegment};
    use crate::transport::LoopbackHub;
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;
    use std::rc::Rc;
    use tempfile::{tempdir, TempDir};

    fn name(uri: &str) -> Name {
        Name::from_uri(uri)
    }

    // A transport double that records everything the engine does and lets
    // the test script the events the engine will see.
    #[derive(Default)]
    struct RecorderState {
        expressed: Vec<(Name, Name)>,
        inbox: VecDeque<TransportEvent>,
        registered: Vec<Name>,
        puts: Vec<(Name, Vec<u8>)>,
    }

    #[derive(Clone, Default)]
    struct Recorder(Rc<RefCell<RecorderState>>);

    impl Recorder {
        fn push_response(&self, name: &Name, payload: Vec<u8>) {
            self.0
                .borrow_mut()
                .inbox
                .push_back(TransportEvent::Response {
                    name: name.clone(),
                    payload,
                });
        }

        fn push_timeout(&self, name: &Name) {
            self.0
                .borrow_mut()
                .inbox
                .push_back(TransportEvent::Timeout { name: name.clone() });
        }

        fn push_request(&self, name: &Name) {
            self.0
                .borrow_mut()
                .inbox
                .push_back(TransportEvent::Request { name: name.clone() });
        }

        fn expressed(&self) -> Vec<(Name, Name)> {
            self.0.borrow().expressed.clone()
        }

        fn puts(&self) -> Vec<(Name, Vec<u8>)> {
            self.0.borrow().puts.clone()
        }

        fn registered(&self) -> Vec<Name> {
            self.0.borrow().registered.clone()
        }
    }

    struct RecordingTransport(Recorder);

    impl Transport for RecordingTransport {
        fn express(&mut self, name: &Name, route: &Name) {
            self.0
                 .0
                .borrow_mut()
                .expressed
                .push((name.clone(), route.clone()));
        }

        fn register_prefix(&mut self, prefix: &Name) {
            self.0 .0.borrow_mut().registered.push(prefix.clone());
        }

        fn unregister_all(&mut self) {
            self.0 .0.borrow_mut().registered.clear();
        }

        fn put(&mut self, name: &Name, payload: Vec<u8>) {
            self.0 .0.borrow_mut().puts.push((name.clone(), payload));
        }

        fn poll(&mut self, _timeout: Duration) -> Vec<TransportEvent> {
            self.0 .0.borrow_mut().inbox.drain(..).collect()
        }
    }

    fn recorded_manager(settings: Settings) -> (TempDir, Recorder, SwarmManager) {
        let dir = tempdir().unwrap();
        let recorder = Recorder::default();
        let manager = SwarmManager::new(
            name("/demo/torrent"),
            dir.path(),
            settings,
            Some(Box::new(RecordingTransport(recorder.clone()))),
        );
        (dir, recorder, manager)
    }

    fn leech_settings(routes: &[&str]) -> Settings {
        Settings {
            seed: false,
            routes: routes.iter().map(|r| r.to_string()).collect(),
            ..Settings::default()
        }
    }

    fn packet_names(base: &Name, count: u64) -> Vec<Name> {
        (0..count).map(|i| base.child("packets").segment(i)).collect()
    }

    #[test]
    fn test_failover_exhausts_every_route_before_failing() {
        let (_dir, recorder, mut manager) = recorded_manager(leech_settings(&["/ucla", "/arizona"]));
        let target = name("/x/0");

        manager.download_file_manifest(&name("/x"));
        assert_eq!(manager.in_flight(), 1);

        let mut failed = Vec::new();
        for _ in 0..10 {
            assert!(failed.is_empty());
            recorder.push_timeout(&target);
            failed.extend(
                manager
                    .process_events(Duration::ZERO)
                    .into_iter()
                    .filter(|e| matches!(e, SwarmEvent::Failed { .. })),
            );
        }

        // 5 attempts against /ucla, then 5 against /arizona, then failure.
        let expressed = recorder.expressed();
        assert_eq!(expressed.len(), 10);
        assert!(expressed[..5]
            .iter()
            .all(|(n, r)| n == &target && r == &name("/ucla")));
        assert!(expressed[5..]
            .iter()
            .all(|(n, r)| n == &target && r == &name("/arizona")));
        assert_eq!(failed.len(), 1);
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn test_window_bound_and_fifo_dispatch() {
        let mut settings = leech_settings(&["/seed"]);
        settings.window_size = 2;
        let (_dir, recorder, mut manager) = recorded_manager(settings);

        let base = name("/demo/alpha.bin");
        let packets = packet_names(&base, 5);
        manager.download_file_manifest(&base);
        assert_eq!(recorder.expressed().len(), 1);

        let segment = ManifestSegment::new(0, false, 4, 20, &packets);
        recorder.push_response(&base.segment(0), segment.encode().unwrap());
        let events = manager.process_events(Duration::ZERO);
        assert!(events
            .iter()
            .any(|e| matches!(e, SwarmEvent::ManifestComplete { .. })));

        // 5 packets are wanted but only 2 may be in flight.
        assert_eq!(manager.in_flight(), 2);
        let expressed: Vec<Name> = recorder.expressed().into_iter().map(|(n, _)| n).collect();
        assert_eq!(expressed[1..], [packets[0].clone(), packets[1].clone()]);

        // Each completion frees one slot, preserving FIFO order.
        for i in 0..5 {
            recorder.push_response(&packets[i], b"aaaa".to_vec());
            let events = manager.process_events(Duration::ZERO);
            assert!(events
                .iter()
                .any(|e| matches!(e, SwarmEvent::PacketReceived { .. })));
            assert!(manager.in_flight() <= 2);
        }
        let expressed: Vec<Name> = recorder.expressed().into_iter().map(|(n, _)| n).collect();
        assert_eq!(expressed[1..], packets[..]);
        assert!(manager.missing_data_packets().is_empty());
    }

    #[test]
    fn test_name_never_queued_and_in_flight_at_once() {
        let mut settings = leech_settings(&["/seed"]);
        settings.window_size = 1;
        let (_dir, _recorder, mut manager) = recorded_manager(settings);

        let first = name("/demo/alpha.bin/packets/0");
        let second = name("/demo/alpha.bin/packets/1");

        manager.download_data_packet(&first);
        assert_eq!(manager.in_flight(), 1);
        assert!(!manager.queue.contains(&first));

        // Re-requesting an in-flight name is a no-op.
        manager.download_data_packet(&first);
        assert_eq!(manager.in_flight(), 1);
        assert!(!manager.queue.contains(&first));

        // A second name waits in the queue; re-requesting it is a no-op too.
        manager.download_data_packet(&second);
        manager.download_data_packet(&second);
        assert_eq!(manager.queue.len(), 1);
        assert!(manager.queue.contains(&second));
        assert!(!manager.pending.contains_key(&second));
    }

    #[test]
    fn test_no_routes_surfaces_as_failure_event() {
        let (_dir, _recorder, mut manager) = recorded_manager(leech_settings(&[]));
        manager.download_file_manifest(&name("/x"));
        let events = manager.process_events(Duration::ZERO);
        assert!(events.iter().any(|e| matches!(
            e,
            SwarmEvent::Failed { reason, .. } if reason.contains("no forwarding routes")
        )));
    }

    #[test]
    fn test_events_after_shutdown_are_noops() {
        let (_dir, recorder, mut manager) = recorded_manager(leech_settings(&["/seed"]));
        let target = name("/x/0");
        manager.download_file_manifest(&name("/x"));
        assert_eq!(manager.in_flight(), 1);

        manager.shutdown();
        assert_eq!(manager.in_flight(), 0);

        recorder.push_response(&target, b"late".to_vec());
        recorder.push_timeout(&target);
        let events = manager.process_events(Duration::ZERO);
        assert!(events.is_empty());
        assert_eq!(manager.in_flight(), 0);
        // No new dispatches after shutdown.
        assert_eq!(recorder.expressed().len(), 1);
    }

    #[test]
    fn test_seed_responder_answers_only_held_content() {
        let mut settings = leech_settings(&["/seed"]);
        settings.seed = true;
        let (_dir, recorder, mut manager) = recorded_manager(settings);
        manager.initialize().unwrap();
        assert_eq!(recorder.registered(), vec![name("/demo/torrent")]);

        let base = name("/demo/alpha.bin");
        let packets = packet_names(&base, 1);
        let torrent_segment = TorrentSegment::new(0, false, &[base.clone()]);
        manager
            .tracker
            .record_torrent_segment(
                &name("/demo/torrent/0"),
                &torrent_segment.encode().unwrap(),
            )
            .unwrap();
        let manifest_segment = ManifestSegment::new(0, false, 4, 4, &packets);
        manager
            .tracker
            .record_manifest_segment(&base.segment(0), &manifest_segment.encode().unwrap())
            .unwrap();
        manager
            .tracker
            .record_data_packet(&packets[0], b"data")
            .unwrap();

        recorder.push_request(&name("/demo/torrent/0"));
        recorder.push_request(&packets[0]);
        recorder.push_request(&name("/demo/torrent/9")); // not held
        manager.process_events(Duration::ZERO);

        let puts = recorder.puts();
        assert_eq!(puts.len(), 2);
        assert_eq!(puts[0].0, name("/demo/torrent/0"));
        assert_eq!(puts[1], (packets[0].clone(), b"data".to_vec()));
    }

    #[test]
    fn test_initialize_on_complete_dir_dispatches_nothing() {
        // Scenario: the data directory already holds the whole torrent.
        let dir = tempdir().unwrap();
        let torrent = name("/demo/torrent");
        let base = name("/demo/alpha.bin");
        let packets = packet_names(&base, 3);
        {
            let mut seeded = CompletionTracker::new(
                torrent.clone(),
                DataLayout::new(dir.path()),
            );
            let segment = TorrentSegment::new(0, false, &[base.clone()]);
            seeded
                .record_torrent_segment(&torrent.segment(0), &segment.encode().unwrap())
                .unwrap();
            let manifest = ManifestSegment::new(0, false, 4, 12, &packets);
            seeded
                .record_manifest_segment(&base.segment(0), &manifest.encode().unwrap())
                .unwrap();
            for packet in &packets {
                seeded.record_data_packet(packet, b"data").unwrap();
            }
        }

        let recorder = Recorder::default();
        let mut manager = SwarmManager::new(
            torrent,
            dir.path(),
            leech_settings(&["/seed"]),
            Some(Box::new(RecordingTransport(recorder.clone()))),
        );
        manager.initialize().unwrap();
        assert!(manager.has_all_torrent_segments());
        assert!(manager.missing_data_packets().is_empty());

        manager.download_torrent_file();
        let events = manager.process_events(Duration::ZERO);
        assert!(events
            .iter()
            .any(|e| matches!(e, SwarmEvent::TorrentComplete { .. })));
        assert!(recorder.expressed().is_empty());
        assert!(manager.is_complete());
    }

    #[test]
    fn test_malformed_segment_fails_without_retry() {
        let (_dir, recorder, mut manager) = recorded_manager(leech_settings(&["/seed"]));
        manager.download_torrent_file();

        recorder.push_response(&name("/demo/torrent/0"), b"definitely not bencode".to_vec());
        let events = manager.process_events(Duration::ZERO);
        assert!(events.iter().any(|e| matches!(
            e,
            SwarmEvent::Failed { reason, .. } if reason.contains("malformed descriptor")
        )));
        // The malformed name is not re-dispatched.
        assert_eq!(recorder.expressed().len(), 1);
        assert_eq!(manager.in_flight(), 0);
    }

    #[test]
    fn test_mirror_over_loopback_end_to_end() {
        let torrent = name("/demo/torrent");
        let alpha = name("/demo/alpha.bin");
        let beta = name("/demo/beta.bin");
        let alpha_packets = packet_names(&alpha, 3);
        let beta_packets = packet_names(&beta, 2);

        // Seed directory: two torrent segments, a two-segment manifest
        // with a short final packet, and a single-segment manifest.
        let seed_dir = tempdir().unwrap();
        {
            let mut seeded =
                CompletionTracker::new(torrent.clone(), DataLayout::new(seed_dir.path()));
            let seg0 = TorrentSegment::new(0, true, &[alpha.clone()]);
            let seg1 = TorrentSegment::new(1, false, &[beta.clone()]);
            seeded
                .record_torrent_segment(&torrent.segment(0), &seg0.encode().unwrap())
                .unwrap();
            seeded
                .record_torrent_segment(&torrent.segment(1), &seg1.encode().unwrap())
                .unwrap();

            // alpha: 10 bytes in 4-byte packets (final packet 2 bytes).
            let alpha0 = ManifestSegment::new(0, true, 4, 10, &alpha_packets[..2]);
            let alpha1 = ManifestSegment::new(1, false, 4, 10, &alpha_packets[2..]);
            seeded
                .record_manifest_segment(&alpha.segment(0), &alpha0.encode().unwrap())
                .unwrap();
            seeded
                .record_manifest_segment(&alpha.segment(1), &alpha1.encode().unwrap())
                .unwrap();
            seeded
                .record_data_packet(&alpha_packets[0], b"aaaa")
                .unwrap();
            seeded
                .record_data_packet(&alpha_packets[1], b"bbbb")
                .unwrap();
            seeded.record_data_packet(&alpha_packets[2], b"cc").unwrap();

            let beta0 = ManifestSegment::new(0, false, 4, 8, &beta_packets);
            seeded
                .record_manifest_segment(&beta.segment(0), &beta0.encode().unwrap())
                .unwrap();
            seeded
                .record_data_packet(&beta_packets[0], b"dddd")
                .unwrap();
            seeded
                .record_data_packet(&beta_packets[1], b"eeee")
                .unwrap();
        }

        let hub = LoopbackHub::new();
        let route = name("/seedbox");

        let mut seeder = SwarmManager::new(
            torrent.clone(),
            seed_dir.path(),
            Settings {
                routes: vec![],
                ..Settings::default()
            },
            Some(Box::new(hub.attached(&route))),
        );
        seeder.initialize().unwrap();
        assert!(seeder.is_complete());

        let fetch_dir = tempdir().unwrap();
        let mut fetcher = SwarmManager::new(
            torrent,
            fetch_dir.path(),
            leech_settings(&["/seedbox"]),
            Some(Box::new(hub.endpoint())),
        );
        fetcher.initialize().unwrap();
        fetcher.download_torrent_file();

        let mut events = Vec::new();
        for _ in 0..100 {
            events.extend(fetcher.process_events(Duration::ZERO));
            let _ = seeder.process_events(Duration::ZERO);
            assert!(fetcher.in_flight() <= 50);
            if fetcher.is_complete() {
                break;
            }
        }

        assert!(fetcher.is_complete(), "mirror did not converge: {:?}", events);
        assert!(!events
            .iter()
            .any(|e| matches!(e, SwarmEvent::Failed { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SwarmEvent::PacketReceived { .. }))
                .count(),
            5
        );
        assert!(events
            .iter()
            .any(|e| matches!(e, SwarmEvent::TorrentComplete { .. })));
        assert_eq!(
            events
                .iter()
                .filter(|e| matches!(e, SwarmEvent::ManifestComplete { .. }))
                .count(),
            2
        );

        // Byte-identical file contents on the fetcher side.
        let fetched_layout = DataLayout::new(fetch_dir.path());
        assert_eq!(
            fs::read(fetched_layout.file_path(&alpha)).unwrap(),
            b"aaaabbbbcc"
        );
        assert_eq!(
            fs::read(fetched_layout.file_path(&beta)).unwrap(),
            b"ddddeeee"
        );

        fetcher.shutdown();
        seeder.shutdown();
    }
}
