// SPDX-License-Identifier: Apache-2.0 OR MIT

//! End-to-end scenarios driving two [`UnicastLayer`]s against each other
//! over an in-memory loopback [`Transport`] double (§8 of the core spec):
//! happy path, mid-stream loss repaired by XMIT_REQ, an OOB message
//! jumping the queue, a sender restart resetting the receive window, a
//! cold-start receiver requesting SEND_FIRST_SEQNO, and idle reaping.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use reliable_unicast::{Header, LayerConfig, NoMembership, Result, Transport, UnicastLayer, UpLayer};

type Addr = u32;

const NODE_A: Addr = 1;
const NODE_B: Addr = 2;

/// Stands in for the network: a per-destination inbound queue.
/// `Transport::send` appends to it; a pump thread per node drains its own
/// queue and feeds the bytes into that node's `up()`.
#[derive(Default)]
struct Wire {
    queues: Mutex<HashMap<Addr, VecDeque<Vec<u8>>>>,
}

impl Wire {
    fn push(&self, dest: Addr, bytes: Vec<u8>) {
        self.queues.lock().unwrap().entry(dest).or_default().push_back(bytes);
    }

    fn drain(&self, addr: Addr) -> Vec<Vec<u8>> {
        self.queues
            .lock()
            .unwrap()
            .get_mut(&addr)
            .map(|q| q.drain(..).collect())
            .unwrap_or_default()
    }
}

struct WireTransport {
    wire: Arc<Wire>,
}

impl Transport<Addr> for WireTransport {
    fn send(&self, dest: &Addr, bytes: Vec<u8>) -> Result<()> {
        self.wire.push(*dest, bytes);
        Ok(())
    }
}

/// `UpLayer` double that just records what was delivered; cheaply
/// cloneable so the test can keep a handle after handing ownership of one
/// clone to the layer.
#[derive(Clone, Default)]
struct Recorder {
    delivered: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl UpLayer<Addr> for Recorder {
    fn deliver(&self, _src: &Addr, payload: Vec<u8>) {
        self.delivered.lock().unwrap().push(payload);
    }
}

impl Recorder {
    fn snapshot(&self) -> Vec<Vec<u8>> {
        self.delivered.lock().unwrap().clone()
    }

    fn len(&self) -> usize {
        self.delivered.lock().unwrap().len()
    }
}

type TestLayer = UnicastLayer<Addr, WireTransport, Recorder, NoMembership>;

fn fast_config() -> LayerConfig {
    LayerConfig::builder()
        .xmit_interval(Duration::from_millis(20))
        .build()
        .expect("valid config")
}

fn wait_until(timeout: Duration, mut predicate: impl FnMut() -> bool) -> bool {
    let deadline = std::time::Instant::now() + timeout;
    loop {
        if predicate() {
            return true;
        }
        if std::time::Instant::now() >= deadline {
            return predicate();
        }
        std::thread::sleep(Duration::from_millis(5));
    }
}

/// Two [`UnicastLayer`]s wired to each other through a shared [`Wire`],
/// each with a background pump thread draining its own inbound queue.
/// `drop_into_b`/`drop_into_a` name seqnos to eat exactly once on the way
/// into the respective node, simulating a lost message on the wire.
struct Harness {
    a: Arc<TestLayer>,
    b: Arc<TestLayer>,
    recorder_a: Recorder,
    recorder_b: Recorder,
    drop_into_a: Arc<Mutex<HashSet<u64>>>,
    drop_into_b: Arc<Mutex<HashSet<u64>>>,
    stop: Arc<AtomicBool>,
    pumps: Vec<std::thread::JoinHandle<()>>,
}

impl Harness {
    fn new(config: LayerConfig) -> Self {
        let _ = env_logger::try_init();
        let wire = Arc::new(Wire::default());
        let recorder_a = Recorder::default();
        let recorder_b = Recorder::default();

        let a = Arc::new(UnicastLayer::start(
            config.clone(),
            WireTransport { wire: Arc::clone(&wire) },
            recorder_a.clone(),
            NoMembership,
        ));
        let b = Arc::new(UnicastLayer::start(
            config,
            WireTransport { wire: Arc::clone(&wire) },
            recorder_b.clone(),
            NoMembership,
        ));

        let stop = Arc::new(AtomicBool::new(false));
        let drop_into_a = Arc::new(Mutex::new(HashSet::new()));
        let drop_into_b = Arc::new(Mutex::new(HashSet::new()));

        let pump_a = spawn_pump(Arc::clone(&wire), NODE_A, NODE_B, Arc::clone(&a), Arc::clone(&drop_into_a), Arc::clone(&stop));
        let pump_b = spawn_pump(Arc::clone(&wire), NODE_B, NODE_A, Arc::clone(&b), Arc::clone(&drop_into_b), Arc::clone(&stop));

        Self {
            a,
            b,
            recorder_a,
            recorder_b,
            drop_into_a,
            drop_into_b,
            stop,
            pumps: vec![pump_a, pump_b],
        }
    }
}

impl Drop for Harness {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Release);
        for p in self.pumps.drain(..) {
            let _ = p.join();
        }
    }
}

fn spawn_pump(
    wire: Arc<Wire>,
    addr: Addr,
    peer: Addr,
    layer: Arc<TestLayer>,
    drop_once: Arc<Mutex<HashSet<u64>>>,
    stop: Arc<AtomicBool>,
) -> std::thread::JoinHandle<()> {
    std::thread::spawn(move || {
        while !stop.load(Ordering::Acquire) {
            for bytes in wire.drain(addr) {
                if let Some((Header::Data(h), _)) = Header::decode(&bytes) {
                    if drop_once.lock().unwrap().remove(&h.seqno) {
                        continue;
                    }
                }
                layer.up(peer, &bytes);
            }
            std::thread::sleep(Duration::from_millis(5));
        }
    })
}

#[test]
fn happy_path_delivers_in_order() {
    let h = Harness::new(fast_config());

    for i in 1u8..=10 {
        h.a.down(NODE_B, vec![i]).expect("layer running");
    }

    assert!(
        wait_until(Duration::from_secs(2), || h.recorder_b.len() == 10),
        "all 10 messages should be delivered"
    );
    let got: Vec<u8> = h.recorder_b.snapshot().into_iter().map(|p| p[0]).collect();
    assert_eq!(got, (1..=10).collect::<Vec<u8>>(), "delivery must be in order");

    // The sender's window should drain once B's ACKs make it back.
    assert!(
        wait_until(Duration::from_secs(2), || h
            .a
            .peer_stats(&NODE_B)
            .send_window
            .map(|w| w.num_missing == 0 && w.low > w.highest_delivered)
            .unwrap_or(false)),
        "sender window should empty out once ACKed"
    );
}

#[test]
fn mid_stream_loss_is_repaired_by_xmit_req() {
    let h = Harness::new(fast_config());

    // Lose seqno 3 on the way into B; the hole should be repaired via
    // XMIT_REQ once the receiver's retransmit sweep notices the gap.
    h.drop_into_b.lock().unwrap().insert(3);

    for i in 1u8..=6 {
        h.a.down(NODE_B, vec![i]).expect("layer running");
    }

    assert!(
        wait_until(Duration::from_secs(3), || h.recorder_b.len() == 6),
        "all 6 messages should eventually arrive despite the mid-stream loss"
    );
    let got: Vec<u8> = h.recorder_b.snapshot().into_iter().map(|p| p[0]).collect();
    assert_eq!(got, vec![1, 2, 3, 4, 5, 6], "repaired stream must still be in order");

    let metrics = h.b.metrics();
    assert!(metrics.xmit_reqs_sent > 0, "B must have asked for the missing seqno");
}

#[test]
fn oob_message_is_delivered_ahead_of_a_gap() {
    let h = Harness::new(fast_config());

    // Seqno 2 never arrives; 3 is flagged OOB and should be pushed up
    // immediately instead of waiting behind the hole at 2. Seqno 1
    // delivers normally beforehand, establishing the connection.
    h.drop_into_b.lock().unwrap().insert(2);

    h.a.down(NODE_B, vec![1]).expect("layer running");
    h.a.down(NODE_B, vec![2]).expect("layer running");
    h.a.down_oob(NODE_B, vec![3]).expect("layer running");

    assert!(
        wait_until(Duration::from_secs(1), || h.recorder_b.len() >= 2),
        "1 delivers normally, 3 delivers via the OOB fast path despite the gap at 2"
    );
    let early = h.recorder_b.snapshot();
    assert_eq!(early[0], vec![1]);
    assert_eq!(early[1], vec![3], "the OOB message must not wait behind seqno 2");

    // Once the missing seqno 2 is repaired (XMIT_REQ), the batch catches
    // up through the window without re-delivering the OOB message.
    h.a.down(NODE_B, vec![4]).expect("layer running");
    assert!(
        wait_until(Duration::from_secs(3), || h.recorder_b.len() == 4),
        "2 and 4 should eventually be delivered once the gap is repaired"
    );
    let all: Vec<u8> = h.recorder_b.snapshot().into_iter().map(|p| p[0]).collect();
    assert_eq!(all, vec![1, 3, 2, 4], "3 is not re-delivered once the gap closes");
}

#[test]
fn sender_restart_resets_the_receive_window() {
    let h = Harness::new(fast_config());

    h.a.down(NODE_B, vec![1]).expect("layer running");
    h.a.down(NODE_B, vec![2]).expect("layer running");
    assert!(wait_until(Duration::from_secs(1), || h.recorder_b.len() == 2));

    // Simulate A restarting: drop its in-memory sender entry so the next
    // send allocates a fresh conn_id and starts back at FIRST_SEQNO.
    let before = h.a.connection_count().0;
    assert_eq!(before, 1);
    // There is no public API to force a restart directly; instead stand up
    // a second, independent layer at the same address sharing the wire,
    // which is exactly what a restarted process looks like to B.
    drop(h);

    let wire = Arc::new(Wire::default());
    let recorder_b = Recorder::default();
    let b = Arc::new(UnicastLayer::start(
        fast_config(),
        WireTransport { wire: Arc::clone(&wire) },
        recorder_b.clone(),
        NoMembership,
    ));
    let stop = Arc::new(AtomicBool::new(false));
    let pump_b = spawn_pump(Arc::clone(&wire), NODE_B, NODE_A, Arc::clone(&b), Arc::new(Mutex::new(HashSet::new())), Arc::clone(&stop));

    let recorder_a2 = Recorder::default();
    let a2 = Arc::new(UnicastLayer::start(
        fast_config(),
        WireTransport { wire: Arc::clone(&wire) },
        recorder_a2,
        NoMembership,
    ));
    let pump_a2 = spawn_pump(Arc::clone(&wire), NODE_A, NODE_B, Arc::clone(&a2), Arc::new(Mutex::new(HashSet::new())), Arc::clone(&stop));

    a2.down(NODE_B, vec![99]).expect("fresh layer running");
    assert!(
        wait_until(Duration::from_secs(1), || recorder_b.len() == 1),
        "B must accept DATA from the new incarnation"
    );
    assert_eq!(recorder_b.snapshot(), vec![vec![99]]);

    stop.store(true, Ordering::Release);
    let _ = pump_b.join();
    let _ = pump_a2.join();
}

#[test]
fn receiver_cold_start_requests_send_first_seqno() {
    let h = Harness::new(fast_config());

    // B never sees the very first message (conn_id it would have learned
    // the incarnation from); the next one to arrive has `first=false` and
    // no matching receiver entry, so B must ask A to replay from the start.
    h.drop_into_b.lock().unwrap().insert(1);

    h.a.down(NODE_B, vec![10]).expect("layer running"); // seqno 1, dropped
    h.a.down(NODE_B, vec![20]).expect("layer running"); // seqno 2, triggers cold start

    assert!(
        wait_until(Duration::from_secs(2), || h.recorder_b.len() == 2),
        "B should recover both messages once A replays from the start"
    );
    assert_eq!(h.recorder_b.snapshot(), vec![vec![10], vec![20]]);
    assert!(
        h.b.metrics().messages_sent > 0,
        "B must have issued a SEND_FIRST_SEQNO request"
    );
}

#[test]
fn idle_connection_is_reaped() {
    let config = LayerConfig::builder()
        .xmit_interval(Duration::from_millis(20))
        .conn_expiry_timeout(Duration::from_millis(50))
        .build()
        .expect("valid config");
    let h = Harness::new(config);

    h.a.down(NODE_B, vec![1]).expect("layer running");
    assert!(wait_until(Duration::from_secs(1), || h.recorder_b.len() == 1));
    assert_eq!(h.a.connection_count().0, 1);

    assert!(
        wait_until(Duration::from_secs(2), || h.a.connection_count().0 == 0),
        "idle sender entry should be reaped after conn_expiry_timeout"
    );
}

#[test]
fn non_member_destination_is_aged_out_automatically() {
    // NoMembership treats every destination as a non-member, so the very
    // first send to NODE_B registers it in the age-out cache (§3 "Age-out
    // cache", §4.4 step 2). With no manual `sweep_age_out()` call, the
    // background age-out task (spawned whenever `max_retransmit_time > 0`)
    // must tear down both windows on its own once the deadline passes.
    let config = LayerConfig::builder()
        .xmit_interval(Duration::from_millis(20))
        .max_retransmit_time(Duration::from_millis(50))
        .build()
        .expect("valid config");
    let h = Harness::new(config);

    h.a.down(NODE_B, vec![1]).expect("layer running");
    assert!(wait_until(Duration::from_secs(1), || h.recorder_b.len() == 1));
    assert_eq!(
        h.a.connection_count().0,
        1,
        "sender entry should exist right after the first send"
    );

    assert!(
        wait_until(Duration::from_secs(2), || h.a.connection_count().0 == 0),
        "non-member destination should be aged out automatically, with no manual sweep call"
    );
}
