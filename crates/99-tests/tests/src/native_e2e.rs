use std::sync::{Arc, Barrier};
use std::thread;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use ring_fabric::{Capabilities, Handle, MessageSubmission, Registry, RingInstance, SetupFlags};
use ring_scenarios::Verdict;
use runtime_native::{run, RunnerConfig};

const TOKEN_TAG: u64 = 0x70c3;
const STOP_TAG: u64 = 0x5709;

fn runner(caps: Option<&str>) -> RunnerConfig {
    RunnerConfig::from_vars(caps, None, None).unwrap()
}

#[test]
fn native_suite_passes() {
    let report = run(&runner(None));
    assert_eq!(report.verdict, Verdict::Pass, "{:?}", report.failure);
    assert!(report.passed > 0);
}

#[test]
fn native_suite_skips_without_msg_ring() {
    let report = run(&runner(Some("no-msg-ring")));
    assert_eq!(report.verdict, Verdict::Skip);
    assert_eq!(report.passed, 0);
    assert!(report.failure.is_none());
}

#[test]
fn native_suite_passes_on_a_degraded_platform() {
    let report = run(&runner(Some("no-sync-msg,no-defer-taskrun,no-disabled-rings")));
    assert_eq!(report.verdict, Verdict::Pass, "{:?}", report.failure);
    assert_eq!(report.skipped_configs, vec!["defer-taskrun"]);
    assert!(!report.skipped.is_empty());
}

/// Passes one token between `peers` ring-owning threads, each hop to a
/// randomly chosen peer, until it has been delivered `hops` times.
fn token_ring(flags: SetupFlags, peers: usize, hops: u32, seed: u64) {
    let registry = Registry::new(Capabilities::default());
    let directory = Arc::new(Mutex::new(vec![None::<Handle>; peers]));
    let ready = Arc::new(Barrier::new(peers + 1));

    let threads: Vec<_> = (0..peers)
        .map(|id| {
            let registry = Arc::clone(&registry);
            let directory = Arc::clone(&directory);
            let ready = Arc::clone(&ready);
            thread::spawn(move || {
                let mut ring = RingInstance::new(&registry, 8, flags).unwrap();
                directory.lock()[id] = Some(ring.handle());
                ready.wait();
                let me = ring.handle();
                let addresses: Vec<Handle> = directory.lock().iter().flatten().copied().collect();
                let mut rng = StdRng::seed_from_u64(seed ^ id as u64);
                let mut received = Vec::new();

                loop {
                    let cqe = ring.wait_one().unwrap();
                    match cqe.user_data {
                        STOP_TAG => break,
                        TOKEN_TAG => {
                            let hop = cqe.res as u32;
                            received.push(hop);
                            if hop == hops {
                                for peer in addresses.iter().filter(|&&peer| peer != me) {
                                    let stop = MessageSubmission::to_handle(*peer, 0, STOP_TAG)
                                        .skip_success_ack();
                                    ring.post_message(stop).unwrap();
                                }
                                break;
                            }
                            let next = addresses[rng.gen_range(0..addresses.len())];
                            let token = MessageSubmission::to_handle(next, hop + 1, TOKEN_TAG)
                                .skip_success_ack();
                            ring.post_message(token).unwrap();
                        }
                        other => panic!("unexpected completion {other:#x} res {}", cqe.res),
                    }
                }
                assert_eq!(ring.overflow_count(), 0);
                received
            })
        })
        .collect();

    ready.wait();
    let first = directory.lock()[0].unwrap();
    registry
        .post_message_sync(&MessageSubmission::to_handle(first, 1, TOKEN_TAG))
        .unwrap();

    let mut hops_seen: Vec<u32> = threads
        .into_iter()
        .flat_map(|thread| thread.join().unwrap())
        .collect();
    hops_seen.sort_unstable();
    assert_eq!(hops_seen, (1..=hops).collect::<Vec<_>>());
    assert_eq!(registry.ring_count(), 0);
}

#[test]
fn token_ring_default_rings() {
    token_ring(SetupFlags::default(), 4, 200, 0x5eed);
}

#[test]
fn token_ring_offload_rings() {
    token_ring(SetupFlags::offload(), 4, 200, 0xfeed);
}

#[test]
fn token_ring_defer_taskrun_rings() {
    token_ring(SetupFlags::defer_taskrun(), 3, 120, 0xbeef);
}

// Deep run; must be marked #[ignore] and prefixed with "slow_"
#[test]
#[ignore]
fn slow_token_ring_many_hops() {
    for seed in 0..8 {
        token_ring(SetupFlags::default(), 8, 20_000, seed);
        token_ring(SetupFlags::offload(), 8, 20_000, seed);
    }
}
