//! The conformance scenarios.
//!
//! Each scenario builds its rings through the [`ScenarioContext`], so one body
//! covers every ring configuration in the matrix. Cross-thread scenarios
//! coordinate through a [`Rendezvous`]; none of them sleeps.
//!
//! A participant that fails after the action barrier has been passed cannot
//! release a peer already parked in `wait_one`; that peer thread is left
//! detached and the failure is reported.

use std::sync::Arc;
use std::thread::{self, JoinHandle};

use ring_fabric::{errno, Cqe, Handle, MessageSubmission, Posted, RingError, Sqe, TargetRef};
use tracing::debug;

use crate::checks::{expect_ack_and_event, expect_cqe, verify_exactly_once};
use crate::config::ScenarioKind;
use crate::context::ScenarioContext;
use crate::error::{Outcome, ScenarioError, ScenarioResult};
use crate::rendezvous::Rendezvous;

const LOOPBACK_PAYLOAD: u32 = 0x10;
const LOOPBACK_TAG: u64 = 0x1234;
const REMOTE_PAYLOAD: u32 = 0x20;
const REMOTE_TAG: u64 = 0x5aa5;
const ACK: u64 = 1;

const SENDERS: usize = 4;
const MESSAGES_PER_SENDER: usize = 32;

/// Runs one scenario under the context's ring configuration.
pub fn run_scenario(kind: ScenarioKind, ctx: &ScenarioContext) -> ScenarioResult {
    match kind {
        ScenarioKind::LoopbackDeferred => loopback_deferred(ctx),
        ScenarioKind::LoopbackSync => loopback_sync(ctx),
        ScenarioKind::RemoteDeferred => remote_deferred(ctx),
        ScenarioKind::RemoteSync => remote_sync(ctx),
        ScenarioKind::RemoteSubmit => remote_submit(ctx),
        ScenarioKind::InvalidHandle => invalid_handle(ctx),
        ScenarioKind::InvalidFixed => invalid_fixed(ctx),
        ScenarioKind::DisabledTarget => disabled_target(ctx),
        ScenarioKind::DestroyedTarget => destroyed_target(ctx),
        ScenarioKind::ConcurrentSenders => concurrent_senders(ctx),
        ScenarioKind::SubmissionQueueFull => submission_queue_full(ctx),
    }
}

fn loopback_deferred(ctx: &ScenarioContext) -> ScenarioResult {
    let mut ring = ctx.ring(8)?;
    let msg = MessageSubmission::to_handle(ring.handle(), LOOPBACK_PAYLOAD, LOOPBACK_TAG)
        .with_user_data(ACK);
    ring.post_message(msg)?;
    let cqes = [ring.wait_one()?, ring.wait_one()?];
    expect_ack_and_event(&cqes, ACK, LOOPBACK_TAG, LOOPBACK_PAYLOAD)?;
    expect_quiet(ring.try_cqe(), "loopback ring")?;
    Ok(Outcome::Passed)
}

fn loopback_sync(ctx: &ScenarioContext) -> ScenarioResult {
    if !ctx.probe.sync_msg {
        return Ok(Outcome::Skipped("synchronous messages unavailable"));
    }
    let mut ring = ctx.ring(8)?;
    let msg = MessageSubmission::to_handle(ring.handle(), LOOPBACK_PAYLOAD, LOOPBACK_TAG)
        .with_user_data(ACK)
        .synchronous();
    expect_delivered(ring.post_message(msg)?)?;
    expect_cqe(&ring.wait_one()?, LOOPBACK_TAG, LOOPBACK_PAYLOAD as i32)?;
    expect_quiet(ring.try_cqe(), "loopback ring")?;
    Ok(Outcome::Passed)
}

fn remote_deferred(ctx: &ScenarioContext) -> ScenarioResult {
    let rendezvous = Arc::new(Rendezvous::new(2));
    let target = spawn_target(ctx, &rendezvous, 1)?;
    let Some(handle) = rendezvous.await_published() else {
        return Err(target_failure(target));
    };

    let msg = MessageSubmission::to_handle(handle, REMOTE_PAYLOAD, REMOTE_TAG).with_user_data(ACK);
    let prepared = ctx.ring(8).and_then(|mut source| {
        source.queue(msg)?;
        Ok(source)
    });
    let mut source = match prepared {
        Ok(source) => source,
        Err(err) => {
            rendezvous.abort();
            rendezvous.act();
            let _ = join("target", target);
            return Err(err.into());
        }
    };
    if !rendezvous.act() {
        return Err(target_failure(target));
    }

    source.submit()?;
    expect_cqe(&source.wait_one()?, ACK, 0)?;
    let events = join("target", target)?;
    expect_single(&events, REMOTE_TAG, REMOTE_PAYLOAD)?;
    expect_quiet(source.try_cqe(), "source ring")?;
    Ok(Outcome::Passed)
}

fn remote_sync(ctx: &ScenarioContext) -> ScenarioResult {
    if !ctx.probe.sync_msg {
        return Ok(Outcome::Skipped("synchronous messages unavailable"));
    }
    let rendezvous = Arc::new(Rendezvous::new(2));
    let target = spawn_target(ctx, &rendezvous, 1)?;
    let Some(handle) = rendezvous.await_published() else {
        return Err(target_failure(target));
    };

    let mut source = match ctx.ring(8) {
        Ok(source) => source,
        Err(err) => {
            rendezvous.abort();
            rendezvous.act();
            let _ = join("target", target);
            return Err(err.into());
        }
    };
    let msg = MessageSubmission::to_handle(handle, REMOTE_PAYLOAD, REMOTE_TAG)
        .with_user_data(ACK)
        .synchronous();
    if !rendezvous.act() {
        return Err(target_failure(target));
    }

    expect_delivered(source.post_message(msg)?)?;
    let events = join("target", target)?;
    expect_single(&events, REMOTE_TAG, REMOTE_PAYLOAD)?;
    expect_quiet(source.try_cqe(), "source ring")?;
    Ok(Outcome::Passed)
}

/// The sender lives on a worker thread and the target on this one.
fn remote_submit(ctx: &ScenarioContext) -> ScenarioResult {
    let rendezvous = Arc::new(Rendezvous::<Handle>::new(2));
    let sender = {
        let ctx = ctx.clone();
        let rendezvous = Arc::clone(&rendezvous);
        thread::Builder::new()
            .name("scenario-sender".into())
            .spawn(move || -> Result<Cqe, ScenarioError> {
                let handle = rendezvous
                    .await_published()
                    .ok_or(ScenarioError::Aborted("target withdrew"))?;
                let msg = MessageSubmission::to_handle(handle, REMOTE_PAYLOAD, REMOTE_TAG)
                    .with_user_data(ACK);
                let prepared = ctx.ring(8).and_then(|mut source| {
                    source.queue(msg)?;
                    Ok(source)
                });
                let mut source = match prepared {
                    Ok(source) => source,
                    Err(err) => {
                        rendezvous.abort();
                        rendezvous.act();
                        return Err(err.into());
                    }
                };
                if !rendezvous.act() {
                    return Err(ScenarioError::Aborted("peer failed before submit"));
                }
                source.submit()?;
                Ok(source.wait_one()?)
            })?
    };

    let mut target = match ctx.ring(4) {
        Ok(target) => target,
        Err(err) => {
            rendezvous.withdraw();
            let _ = join("sender", sender);
            return Err(err.into());
        }
    };
    rendezvous.publish(target.handle());
    if !rendezvous.act() {
        return Err(sender_failure(sender));
    }

    // The ack is posted only after the target event, so joining first never
    // leaves this thread parked on a sender that gave up.
    let ack = join("sender", sender)?;
    expect_cqe(&ack, ACK, 0)?;
    expect_cqe(&target.wait_one()?, REMOTE_TAG, REMOTE_PAYLOAD as i32)?;
    expect_quiet(target.try_cqe(), "target ring")?;
    Ok(Outcome::Passed)
}

fn invalid_handle(ctx: &ScenarioContext) -> ScenarioResult {
    let registry = &ctx.registry;
    let mut ring = ctx.ring(8)?;
    let pipe = registry.open_resource("scenario-pipe");

    for (target, user_data) in [(pipe, 2), (Handle::STDOUT, 3), (Handle::from_raw(u32::MAX), 4)] {
        let msg = MessageSubmission::to_handle(target, LOOPBACK_PAYLOAD, LOOPBACK_TAG)
            .with_user_data(user_data);
        ring.post_message(msg)?;
        expect_cqe(&ring.wait_one()?, user_data, -errno::EBADFD)?;

        if ctx.probe.sync_msg {
            match ring.post_message(msg.synchronous()) {
                Err(RingError::InvalidTarget(TargetRef::Handle(h))) if h == target => {}
                other => {
                    return Err(format!("sync send to {target}: {other:?} (expected InvalidTarget)").into())
                }
            }
        }
    }
    expect_quiet(ring.try_cqe(), "source ring")?;
    registry.close_resource(pipe)?;
    Ok(Outcome::Passed)
}

fn invalid_fixed(ctx: &ScenarioContext) -> ScenarioResult {
    let mut ring = ctx.ring(8)?;
    let pipe = ctx.registry.open_resource("scenario-pipe");
    ring.register_file(0, pipe)?;
    let snapshot = ring.fixed_files().clone();

    // A registered slot naming something other than a ring, twice.
    for user_data in [10, 11] {
        let msg = MessageSubmission::to_fixed(0, LOOPBACK_PAYLOAD, LOOPBACK_TAG)
            .with_user_data(user_data);
        ring.post_message(msg)?;
        expect_cqe(&ring.wait_one()?, user_data, -errno::EBADFD)?;
        if ring.fixed_files() != &snapshot {
            return Err(ScenarioError::Check(
                "fixed-file table changed after a rejected send".into(),
            ));
        }
    }

    // Out of range, then a hole inside the table.
    ring.register_file(3, ring.handle())?;
    for (index, user_data) in [(64, 12), (2, 13)] {
        let msg = MessageSubmission::to_fixed(index, LOOPBACK_PAYLOAD, LOOPBACK_TAG)
            .with_user_data(user_data);
        ring.post_message(msg)?;
        expect_cqe(&ring.wait_one()?, user_data, -errno::EBADFD)?;
    }

    // The same table still routes a valid slot.
    let msg = MessageSubmission::to_fixed(3, LOOPBACK_PAYLOAD, LOOPBACK_TAG).with_user_data(ACK);
    ring.post_message(msg)?;
    let cqes = [ring.wait_one()?, ring.wait_one()?];
    expect_ack_and_event(&cqes, ACK, LOOPBACK_TAG, LOOPBACK_PAYLOAD)?;
    expect_quiet(ring.try_cqe(), "source ring")?;
    ctx.registry.close_resource(pipe)?;
    Ok(Outcome::Passed)
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DisabledBranch {
    Delivered,
    Rejected,
}

fn disabled_target(ctx: &ScenarioContext) -> ScenarioResult {
    if !ctx.probe.disabled_rings {
        return Ok(Outcome::Skipped("disabled rings unavailable"));
    }
    let mut first = None;
    for run in 0..3 {
        let branch = disabled_target_once(ctx)?;
        debug!(run, ?branch, "disabled target outcome");
        match first {
            None => first = Some(branch),
            Some(expected) if expected != branch => {
                return Err(format!("run {run} took {branch:?} after {expected:?}").into())
            }
            Some(_) => {}
        }
    }
    Ok(Outcome::Passed)
}

fn disabled_target_once(ctx: &ScenarioContext) -> Result<DisabledBranch, ScenarioError> {
    let mut target = ctx.disabled_ring(8)?;
    let mut source = ctx.ring(8)?;
    let msg = MessageSubmission::to_handle(target.handle(), LOOPBACK_PAYLOAD, LOOPBACK_TAG)
        .with_user_data(ACK);
    source.post_message(msg)?;
    let ack = source.wait_one()?;
    let branch = match ack.res {
        0 => DisabledBranch::Delivered,
        res if res == -errno::EBADFD => DisabledBranch::Rejected,
        res => return Err(format!("send to disabled target returned {res}").into()),
    };

    if ctx.probe.sync_msg {
        match source.post_message(msg.synchronous()) {
            Err(RingError::TargetDisabled(_)) if branch == DisabledBranch::Rejected => {}
            Ok(_) if branch == DisabledBranch::Delivered => {}
            other => {
                return Err(
                    format!("sync send to disabled target: {other:?} disagrees with {branch:?}")
                        .into(),
                )
            }
        }
    }

    target.enable()?;
    match branch {
        DisabledBranch::Delivered => {
            expect_cqe(&target.wait_one()?, LOOPBACK_TAG, LOOPBACK_PAYLOAD as i32)?;
        }
        DisabledBranch::Rejected => expect_quiet(target.try_cqe(), "enabled target")?,
    }
    Ok(branch)
}

fn destroyed_target(ctx: &ScenarioContext) -> ScenarioResult {
    let target = ctx.ring(4)?;
    let handle = target.handle();
    let mut source = ctx.ring(8)?;
    source.register_file(0, handle)?;
    target.destroy();

    for (msg, user_data) in [
        (MessageSubmission::to_handle(handle, REMOTE_PAYLOAD, REMOTE_TAG), 20),
        (MessageSubmission::to_fixed(0, REMOTE_PAYLOAD, REMOTE_TAG), 21),
    ] {
        let msg = msg.with_user_data(user_data);
        source.post_message(msg)?;
        expect_cqe(&source.wait_one()?, user_data, -errno::EBADFD)?;
        if ctx.probe.sync_msg {
            match source.post_message(msg.synchronous()) {
                Err(err) if err.is_invalid_target() => {}
                other => {
                    return Err(format!("sync send to destroyed ring: {other:?}").into());
                }
            }
        }
    }
    expect_quiet(source.try_cqe(), "source ring")?;
    Ok(Outcome::Passed)
}

fn concurrent_tag(sender: usize, seq: usize) -> u64 {
    ((sender as u64) << 32) | seq as u64
}

fn concurrent_payload(sender: usize, seq: usize) -> u32 {
    (sender * 1000 + seq) as u32
}

/// Several senders interleave messages into two targets owned by this thread.
///
/// If spawning a sender fails, the senders already started stay parked on the
/// startup barrier and are left detached; the spawn error is returned.
fn concurrent_senders(ctx: &ScenarioContext) -> ScenarioResult {
    let mut targets = [ctx.ring(64)?, ctx.ring(64)?];
    let handles = [targets[0].handle(), targets[1].handle()];
    let rendezvous = Arc::new(Rendezvous::<[Handle; 2]>::new(SENDERS + 1));

    let mut senders = Vec::with_capacity(SENDERS);
    for sender in 0..SENDERS {
        let ctx = ctx.clone();
        let shared = Arc::clone(&rendezvous);
        let spawned = thread::Builder::new()
            .name(format!("scenario-sender-{sender}"))
            .spawn(move || send_batch(&ctx, &shared, sender));
        match spawned {
            Ok(thread) => senders.push(thread),
            Err(err) => {
                // The startup barrier can no longer fill; senders already
                // parked on it stay detached.
                rendezvous.abort();
                return Err(err.into());
            }
        }
    }

    rendezvous.publish(handles);
    let proceed = rendezvous.act();
    // Every ack lands after its target event, so joined senders imply
    // complete target queues.
    let mut failure = None;
    for sender in senders {
        if let Err(err) = join("sender", sender) {
            failure.get_or_insert(err);
        }
    }
    if let Some(err) = failure {
        return Err(err);
    }
    if !proceed {
        return Err(ScenarioError::Aborted("sender failed before submit"));
    }

    for (slot, target) in targets.iter_mut().enumerate() {
        let expected: Vec<(u64, u32)> = (0..SENDERS)
            .flat_map(|sender| {
                (0..MESSAGES_PER_SENDER)
                    .filter(move |seq| seq % 2 == slot)
                    .map(move |seq| (concurrent_tag(sender, seq), concurrent_payload(sender, seq)))
            })
            .collect();
        let mut observed = Vec::with_capacity(expected.len());
        while let Some(cqe) = target.try_cqe() {
            observed.push(cqe);
        }
        verify_exactly_once(&observed, &expected)
            .map_err(|msg| format!("target {slot}: {msg}"))?;
    }
    Ok(Outcome::Passed)
}

fn send_batch(
    ctx: &ScenarioContext,
    rendezvous: &Rendezvous<[Handle; 2]>,
    sender: usize,
) -> Result<(), ScenarioError> {
    let handles = rendezvous
        .await_published()
        .ok_or(ScenarioError::Aborted("targets never published"))?;
    let prepared = ctx.ring(MESSAGES_PER_SENDER as u32).and_then(|mut source| {
        for seq in 0..MESSAGES_PER_SENDER {
            let msg = MessageSubmission::to_handle(
                handles[seq % 2],
                concurrent_payload(sender, seq),
                concurrent_tag(sender, seq),
            )
            .with_user_data(seq as u64);
            source.queue(msg)?;
        }
        Ok(source)
    });
    let mut source = match prepared {
        Ok(source) => source,
        Err(err) => {
            rendezvous.abort();
            rendezvous.act();
            return Err(err.into());
        }
    };
    if !rendezvous.act() {
        return Ok(());
    }

    source.submit()?;
    let mut acks = Vec::with_capacity(MESSAGES_PER_SENDER);
    for _ in 0..MESSAGES_PER_SENDER {
        acks.push(source.wait_one()?);
    }
    let expected: Vec<(u64, u32)> = (0..MESSAGES_PER_SENDER).map(|seq| (seq as u64, 0)).collect();
    verify_exactly_once(&acks, &expected).map_err(|msg| format!("sender {sender} acks: {msg}"))?;
    Ok(())
}

fn submission_queue_full(ctx: &ScenarioContext) -> ScenarioResult {
    let mut ring = ctx.ring(2)?;
    let capacity = ring.entries() as usize;
    for user_data in 0..capacity as u64 {
        ring.queue(Sqe::Nop { user_data })?;
    }
    match ring.queue(Sqe::Nop { user_data: 99 }) {
        Err(RingError::SubmissionQueueFull { capacity: reported }) if reported == capacity => {}
        other => return Err(format!("queue past capacity: {other:?}").into()),
    }
    if ring.pending_submissions() != capacity {
        return Err(format!(
            "{} pending after a rejected queue (expected {capacity})",
            ring.pending_submissions()
        )
        .into());
    }

    let issued = ring.submit()?;
    if issued != capacity {
        return Err(format!("submitted {issued} (expected {capacity})").into());
    }
    for user_data in 0..capacity as u64 {
        expect_cqe(&ring.wait_one()?, user_data, 0)?;
    }

    ring.queue(Sqe::Nop { user_data: 99 })?;
    ring.submit()?;
    expect_cqe(&ring.wait_one()?, 99, 0)?;
    Ok(Outcome::Passed)
}

/// Spawns a thread that owns the target ring, publishes its handle and
/// collects `expected` events after the action barrier.
fn spawn_target(
    ctx: &ScenarioContext,
    rendezvous: &Arc<Rendezvous<Handle>>,
    expected: usize,
) -> Result<JoinHandle<Result<Vec<Cqe>, ScenarioError>>, ScenarioError> {
    let ctx = ctx.clone();
    let rendezvous = Arc::clone(rendezvous);
    let thread = thread::Builder::new()
        .name("scenario-target".into())
        .spawn(move || -> Result<Vec<Cqe>, ScenarioError> {
            let mut target = match ctx.ring(4) {
                Ok(target) => target,
                Err(err) => {
                    rendezvous.withdraw();
                    return Err(err.into());
                }
            };
            rendezvous.publish(target.handle());
            if !rendezvous.act() {
                return Err(ScenarioError::Aborted("sender failed before submit"));
            }
            let mut events = Vec::with_capacity(expected);
            for _ in 0..expected {
                events.push(target.wait_one()?);
            }
            if let Some(extra) = target.try_cqe() {
                return Err(format!("unexpected extra event {extra:?}").into());
            }
            Ok(events)
        })?;
    Ok(thread)
}

fn join<T>(
    role: &'static str,
    thread: JoinHandle<Result<T, ScenarioError>>,
) -> Result<T, ScenarioError> {
    thread.join().map_err(|_| ScenarioError::Panicked(role))?
}

fn target_failure(target: JoinHandle<Result<Vec<Cqe>, ScenarioError>>) -> ScenarioError {
    match join("target", target) {
        Err(err) => err,
        Ok(_) => ScenarioError::Aborted("target withdrew"),
    }
}

fn sender_failure(sender: JoinHandle<Result<Cqe, ScenarioError>>) -> ScenarioError {
    match join("sender", sender) {
        Err(err) => err,
        Ok(_) => ScenarioError::Aborted("sender withdrew"),
    }
}

fn expect_single(events: &[Cqe], tag: u64, payload: u32) -> Result<(), ScenarioError> {
    match events {
        [event] => Ok(expect_cqe(event, tag, payload as i32)?),
        _ => Err(format!("target observed {} events (expected 1)", events.len()).into()),
    }
}

fn expect_delivered(posted: Posted) -> Result<(), ScenarioError> {
    match posted {
        Posted::Delivered => Ok(()),
        other => Err(format!("sync send reported {other:?}").into()),
    }
}

fn expect_quiet(extra: Option<Cqe>, ring: &str) -> Result<(), ScenarioError> {
    match extra {
        None => Ok(()),
        Some(cqe) => Err(format!("{ring} has unexpected completion {cqe:?}").into()),
    }
}
