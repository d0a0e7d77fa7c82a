//! Delivery semantics integration tests.
//! Covers both delivery modes, both addressing modes, target validation,
//! the ring setup variants, and property checks for idempotent rejection.

use std::sync::Arc;
use std::thread;

use proptest::prelude::*;
use ring_fabric::{
    errno, Capabilities, Cqe, Handle, MessageSubmission, Posted, Registry, RingError,
    RingInstance, SetupFlags, Sqe, TargetRef,
};

fn registry() -> Arc<Registry> {
    Registry::new(Capabilities::default())
}

fn ring(registry: &Arc<Registry>, entries: u32) -> RingInstance {
    RingInstance::new(registry, entries, SetupFlags::default()).expect("create ring")
}

/// Collects `n` completions and sorts them by `user_data` so ack/event order doesn't matter.
fn wait_sorted(ring: &mut RingInstance, n: usize) -> Vec<Cqe> {
    let mut cqes: Vec<Cqe> = (0..n).map(|_| ring.wait_one().expect("wait")).collect();
    cqes.sort_by_key(|cqe| cqe.user_data);
    cqes
}

#[test]
fn loopback_deferred_posts_ack_and_event() {
    let registry = registry();
    let mut ring = ring(&registry, 8);
    let msg = MessageSubmission::to_handle(ring.handle(), 0x10, 0x1234).with_user_data(1);

    assert_eq!(
        ring.post_message(msg),
        Ok(Posted::Submitted { user_data: 1 })
    );
    assert_eq!(
        wait_sorted(&mut ring, 2),
        vec![Cqe::new(1, 0), Cqe::new(0x1234, 0x10)]
    );
    assert!(ring.try_cqe().is_none());
}

#[test]
fn loopback_sync_posts_only_the_event() {
    let registry = registry();
    let mut ring = ring(&registry, 8);
    let msg = MessageSubmission::to_handle(ring.handle(), 0x10, 0x1234)
        .with_user_data(1)
        .synchronous();

    assert_eq!(ring.post_message(msg), Ok(Posted::Delivered));
    assert_eq!(ring.wait_one().unwrap(), Cqe::new(0x1234, 0x10));
    assert!(ring.try_cqe().is_none(), "sync path must not post an ack");
}

#[test]
fn sync_remote_leaves_sender_queue_untouched() {
    let registry = registry();
    let mut sender = ring(&registry, 8);
    let mut target = ring(&registry, 4);
    let msg = MessageSubmission::to_handle(target.handle(), 0x20, 0x5aa5).synchronous();

    assert_eq!(sender.post_message(msg), Ok(Posted::Delivered));
    assert_eq!(sender.cq_len(), 0);
    assert_eq!(target.wait_one().unwrap(), Cqe::new(0x5aa5, 0x20));
}

#[test]
fn sourceless_sync_delivery() {
    let registry = registry();
    let mut target = ring(&registry, 4);
    let msg = MessageSubmission::to_handle(target.handle(), 0x20, 0x5aa5).synchronous();
    registry.post_message_sync(&msg).unwrap();
    assert_eq!(target.wait_one().unwrap(), Cqe::new(0x5aa5, 0x20));

    let fixed = MessageSubmission::to_fixed(0, 1, 2).synchronous();
    assert!(matches!(
        registry.post_message_sync(&fixed),
        Err(RingError::InvalidArgument(_))
    ));
}

#[test]
fn non_ring_handle_is_invalid_target() {
    let registry = registry();
    let mut ring = ring(&registry, 8);
    let msg = MessageSubmission::to_handle(Handle::STDOUT, 0, 0x8989).with_user_data(1);

    ring.post_message(msg).unwrap();
    let cqe = ring.wait_one().unwrap();
    assert_eq!(cqe, Cqe::new(1, -errno::EBADFD));
    assert!(ring.try_cqe().is_none());

    let sync = msg.synchronous();
    let err = ring.post_message(sync).unwrap_err();
    assert_eq!(err, RingError::InvalidTarget(TargetRef::Handle(Handle::STDOUT)));
    assert_eq!(err.errno(), -errno::EBADFD);
}

#[test]
fn fixed_index_to_non_ring_is_rejected_twice() {
    let registry = registry();
    let mut ring = ring(&registry, 8);

    for _ in 0..2 {
        ring.register_files(&[Handle::STDOUT]).unwrap();
        let before = ring.fixed_files().clone();
        let msg = MessageSubmission::to_fixed(0, 0, 0x8989).with_user_data(1);
        ring.post_message(msg).unwrap();
        assert_eq!(ring.wait_one().unwrap(), Cqe::new(1, -errno::EBADFD));
        assert_eq!(ring.fixed_files(), &before);
        ring.unregister_files().unwrap();
    }
}

#[test]
fn fixed_index_delivers_to_registered_ring() {
    let registry = registry();
    let mut sender = ring(&registry, 8);
    let mut target = ring(&registry, 4);
    sender.register_file(2, target.handle()).unwrap();
    let before = sender.fixed_files().clone();

    sender
        .post_message(MessageSubmission::to_fixed(2, 7, 0xabc).with_user_data(9))
        .unwrap();
    assert_eq!(sender.wait_one().unwrap(), Cqe::new(9, 0));
    assert_eq!(target.wait_one().unwrap(), Cqe::new(0xabc, 7));
    assert_eq!(sender.fixed_files(), &before);

    let unregistered = MessageSubmission::to_fixed(1, 7, 0xabc).synchronous();
    assert_eq!(
        sender.post_message(unregistered),
        Err(RingError::InvalidTarget(TargetRef::Fixed(1)))
    );
    let out_of_range = MessageSubmission::to_fixed(5_000, 7, 0xabc).synchronous();
    assert_eq!(
        sender.post_message(out_of_range),
        Err(RingError::InvalidTarget(TargetRef::Fixed(5_000)))
    );
    assert_eq!(target.cq_len(), 0);
}

#[test]
fn register_file_requires_open_handle() {
    let registry = registry();
    let mut ring = ring(&registry, 8);
    let stale = Handle::from_raw(9_999);
    assert_eq!(ring.register_file(0, stale), Err(RingError::BadHandle(stale)));
    assert_eq!(ring.unregister_files(), Err(RingError::NoFixedFiles));
}

#[test]
fn disabled_target_fails_immediately_every_time() {
    let registry = registry();
    let mut sender = ring(&registry, 8);

    for _ in 0..4 {
        let mut target =
            RingInstance::new(&registry, 8, SetupFlags::default().disabled()).unwrap();
        let msg = MessageSubmission::to_handle(target.handle(), 0x10, 0x1234).with_user_data(1);
        sender.post_message(msg).unwrap();
        assert_eq!(sender.wait_one().unwrap(), Cqe::new(1, -errno::EBADFD));

        target.enable().unwrap();
        assert!(target.try_cqe().is_none(), "no event may appear after enabling");

        assert_eq!(
            sender.post_message(msg.synchronous()),
            Ok(Posted::Delivered),
            "enabled target accepts deliveries"
        );
        assert_eq!(target.wait_one().unwrap(), Cqe::new(0x1234, 0x10));
    }
}

#[test]
fn sync_to_disabled_target_reports_target_disabled() {
    let registry = registry();
    let mut sender = ring(&registry, 8);
    let target = RingInstance::new(&registry, 8, SetupFlags::default().disabled()).unwrap();
    let msg = MessageSubmission::to_handle(target.handle(), 1, 2).synchronous();
    assert_eq!(
        sender.post_message(msg),
        Err(RingError::TargetDisabled(target.handle()))
    );
}

#[test]
fn destroyed_target_is_invalid_by_handle_and_fixed_index() {
    let registry = registry();
    let mut sender = ring(&registry, 8);
    let target = ring(&registry, 4);
    let handle = target.handle();
    sender.register_file(0, handle).unwrap();
    target.destroy();

    let by_handle = MessageSubmission::to_handle(handle, 1, 2).synchronous();
    assert_eq!(
        sender.post_message(by_handle),
        Err(RingError::InvalidTarget(TargetRef::Handle(handle)))
    );
    sender
        .post_message(MessageSubmission::to_fixed(0, 1, 2).with_user_data(5))
        .unwrap();
    assert_eq!(sender.wait_one().unwrap(), Cqe::new(5, -errno::EBADFD));
}

#[test]
fn destroy_drains_unconsumed_events() {
    let registry = registry();
    let mut sender = ring(&registry, 8);
    let target = ring(&registry, 4);
    for tag in 0..3 {
        sender
            .post_message(MessageSubmission::to_handle(target.handle(), 1, tag).synchronous())
            .unwrap();
    }
    assert_eq!(target.destroy(), 3);
}

#[test]
fn submission_queue_full_is_local_and_retryable() {
    let registry = registry();
    let mut sender = ring(&registry, 2);
    let mut target = ring(&registry, 4);
    let msg = MessageSubmission::to_handle(target.handle(), 3, 4);

    sender.queue(msg.with_user_data(1)).unwrap();
    sender.queue(msg.with_user_data(2)).unwrap();
    let err = sender.queue(msg.with_user_data(3)).unwrap_err();
    assert_eq!(err, RingError::SubmissionQueueFull { capacity: 2 });
    assert_eq!(err.errno(), -errno::EBUSY);
    assert_eq!(sender.pending_submissions(), 2);
    assert_eq!(target.cq_len(), 0);

    assert_eq!(sender.submit(), Ok(2));
    sender.queue(msg.with_user_data(3)).unwrap();
    assert_eq!(sender.submit(), Ok(1));
    assert_eq!(target.drain(8).len(), 3);
    let acks: Vec<u64> = sender.drain(8).iter().map(|cqe| cqe.user_data).collect();
    assert_eq!(acks, vec![1, 2, 3]);
}

#[test]
fn defer_taskrun_holds_acks_until_wait() {
    let registry = registry();
    let mut sender = RingInstance::new(&registry, 8, SetupFlags::defer_taskrun()).unwrap();
    let mut target = ring(&registry, 4);

    sender
        .post_message(MessageSubmission::to_handle(target.handle(), 0x20, 0x5aa5).with_user_data(1))
        .unwrap();
    assert_eq!(sender.pending_task_work(), 1);
    assert_eq!(sender.cq_len(), 0);
    assert_eq!(target.wait_one().unwrap(), Cqe::new(0x5aa5, 0x20));

    assert_eq!(sender.wait_one().unwrap(), Cqe::new(1, 0));
    assert_eq!(sender.pending_task_work(), 0);
}

#[test]
fn single_issuer_rejects_foreign_submitter() {
    let registry = registry();
    let mut ring = RingInstance::new(&registry, 8, SetupFlags::defer_taskrun()).unwrap();
    ring.queue(Sqe::Nop { user_data: 1 }).unwrap();
    let (ring, result) = thread::spawn(move || {
        let result = ring.submit();
        (ring, result)
    })
    .join()
    .unwrap();
    assert_eq!(result, Err(RingError::NotIssuer));
    assert_eq!(RingError::NotIssuer.errno(), -errno::EEXIST);
    drop(ring);
}

#[test]
fn rejected_post_on_disabled_source_is_not_delivered_later() {
    let registry = registry();
    let mut sender = RingInstance::new(&registry, 8, SetupFlags::default().disabled()).unwrap();
    let mut target = ring(&registry, 4);
    let msg = MessageSubmission::to_handle(target.handle(), 0x10, 0x1234).with_user_data(1);

    assert_eq!(
        sender.post_message(msg),
        Err(RingError::RingDisabled(sender.handle()))
    );
    assert_eq!(sender.pending_submissions(), 0);
    assert!(target.try_cqe().is_none());

    sender.enable().unwrap();
    assert_eq!(sender.post_message(msg), Ok(Posted::Submitted { user_data: 1 }));
    assert_eq!(sender.wait_one().unwrap(), Cqe::new(1, 0));
    assert_eq!(target.drain(16).as_slice(), &[Cqe::new(0x1234, 0x10)]);
}

#[test]
fn rejected_post_from_foreign_thread_is_not_delivered_later() {
    let registry = registry();
    let sender = RingInstance::new(&registry, 8, SetupFlags::defer_taskrun()).unwrap();
    let mut target = ring(&registry, 4);
    let msg = MessageSubmission::to_handle(target.handle(), 0x20, 0x5aa5).with_user_data(1);

    let (mut sender, result) = thread::spawn(move || {
        let mut sender = sender;
        let result = sender.post_message(msg);
        (sender, result)
    })
    .join()
    .unwrap();
    assert_eq!(result, Err(RingError::NotIssuer));
    assert_eq!(sender.pending_submissions(), 0);

    assert_eq!(sender.submit(), Ok(0));
    assert!(target.try_cqe().is_none());

    sender.post_message(msg).unwrap();
    assert_eq!(sender.wait_one().unwrap(), Cqe::new(1, 0));
    assert_eq!(target.drain(16).as_slice(), &[Cqe::new(0x5aa5, 0x20)]);
}

#[test]
fn offload_worker_delivers_and_acks() {
    let registry = registry();
    let mut sender = RingInstance::new(&registry, 8, SetupFlags::offload()).unwrap();
    let mut target = ring(&registry, 4);

    sender
        .post_message(MessageSubmission::to_handle(target.handle(), 0x20, 0x5aa5).with_user_data(1))
        .unwrap();
    sender
        .post_message(MessageSubmission::to_handle(Handle::STDERR, 0, 0).with_user_data(2))
        .unwrap();

    assert_eq!(target.wait_one().unwrap(), Cqe::new(0x5aa5, 0x20));
    assert_eq!(
        wait_sorted(&mut sender, 2),
        vec![Cqe::new(1, 0), Cqe::new(2, -errno::EBADFD)]
    );
}

#[test]
fn offload_destroy_lets_in_flight_messages_land() {
    let registry = registry();
    let mut sender = RingInstance::new(&registry, 64, SetupFlags::offload()).unwrap();
    let mut target = ring(&registry, 64);
    for tag in 0..32 {
        sender
            .queue(MessageSubmission::to_handle(target.handle(), 1, tag))
            .unwrap();
    }
    sender.submit().unwrap();
    sender.destroy();
    assert_eq!(target.drain(64).len(), 32);
}

#[test]
fn skip_success_ack_and_flag_passthrough() {
    let registry = registry();
    let mut sender = ring(&registry, 8);
    let mut target = ring(&registry, 4);
    let msg = MessageSubmission::to_handle(target.handle(), 5, 6)
        .with_user_data(1)
        .with_target_flags(0x8)
        .skip_success_ack();

    sender.post_message(msg).unwrap();
    assert_eq!(target.wait_one().unwrap(), Cqe::new(6, 5).with_flags(0x8));
    assert!(sender.try_cqe().is_none());

    let failing = MessageSubmission::to_handle(Handle::STDIN, 5, 6)
        .with_user_data(2)
        .skip_success_ack();
    sender.post_message(failing).unwrap();
    assert_eq!(sender.wait_one().unwrap(), Cqe::new(2, -errno::EBADFD));
}

#[test]
fn unsupported_platform_reports_distinct_result() {
    let registry = Registry::new(Capabilities {
        msg_ring: false,
        ..Capabilities::default()
    });
    let mut ring = ring(&registry, 8);
    let msg = MessageSubmission::to_handle(ring.handle(), 0x10, 0x1234).with_user_data(1);

    ring.post_message(msg).unwrap();
    let cqe = ring.wait_one().unwrap();
    assert_eq!(cqe, Cqe::new(1, -errno::EOPNOTSUPP));
    assert!(ring_fabric::is_unsupported_result(cqe.res));
    assert!(ring.try_cqe().is_none());

    assert!(ring
        .post_message(msg.synchronous())
        .unwrap_err()
        .is_unsupported());
}

#[test]
fn concurrent_senders_deliver_exactly_once() {
    const SENDERS: u64 = 4;
    const PER_SENDER: u64 = 500;

    let registry = registry();
    let mut target = ring(&registry, 16);
    let handle = target.handle();

    let senders: Vec<_> = (0..SENDERS)
        .map(|sender_id| {
            let registry = Arc::clone(&registry);
            thread::spawn(move || {
                let mut ring = RingInstance::new(&registry, 8, SetupFlags::default()).unwrap();
                for seq in 0..PER_SENDER {
                    let tag = (sender_id << 32) | seq;
                    let msg = MessageSubmission::to_handle(handle, seq as u32, tag);
                    let msg = if seq % 2 == 0 { msg.synchronous() } else { msg };
                    ring.post_message(msg).unwrap();
                }
                ring.drain(usize::MAX).len()
            })
        })
        .collect();

    let mut seen = std::collections::HashSet::new();
    for _ in 0..SENDERS * PER_SENDER {
        let cqe = target.wait_one().unwrap();
        assert_eq!(cqe.res as u64, cqe.user_data & 0xFFFF_FFFF);
        assert!(seen.insert(cqe.user_data), "duplicate delivery {cqe:?}");
    }
    for sender in senders {
        assert_eq!(sender.join().unwrap() as u64, PER_SENDER / 2);
    }
    assert!(target.try_cqe().is_none());
}

proptest! {
    /// Rejected fixed-index messages never touch the table and always classify the same way.
    #[test]
    fn fixed_rejection_is_idempotent(
        registered in proptest::collection::vec(0u32..64, 0..8),
        probe in 0u32..128,
        repeats in 1usize..4,
    ) {
        let registry = registry();
        let mut ring = ring(&registry, 8);
        for index in &registered {
            // Duplicate indices report Busy; either way the slot holds stdout.
            let _ = ring.register_file(*index, Handle::STDOUT);
        }
        let before = ring.fixed_files().clone();

        for attempt in 0..repeats {
            let msg = MessageSubmission::to_fixed(probe, 1, 2).synchronous();
            prop_assert_eq!(
                ring.post_message(msg),
                Err(RingError::InvalidTarget(TargetRef::Fixed(probe)))
            );
            let deferred = MessageSubmission::to_fixed(probe, 1, 2).with_user_data(attempt as u64);
            ring.post_message(deferred).unwrap();
            prop_assert_eq!(ring.wait_one().unwrap(), Cqe::new(attempt as u64, -errno::EBADFD));
            prop_assert_eq!(ring.fixed_files(), &before);
        }
        prop_assert!(ring.try_cqe().is_none());
    }
}
