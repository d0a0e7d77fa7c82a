use std::collections::HashSet;

use ring_fabric::Cqe;

pub type CheckResult = Result<(), String>;

/// The completion must carry exactly `user_data` and `res`.
pub fn expect_cqe(cqe: &Cqe, user_data: u64, res: i32) -> CheckResult {
    if cqe.user_data != user_data {
        return Err(format!(
            "user_data {:#x} (expected {:#x})",
            cqe.user_data, user_data
        ));
    }
    if cqe.res != res {
        return Err(format!(
            "res {} for user_data {:#x} (expected {})",
            cqe.res, cqe.user_data, res
        ));
    }
    Ok(())
}

/// Checks a loopback pair: one ack and one injected event, in either order.
pub fn expect_ack_and_event(
    cqes: &[Cqe],
    ack_user_data: u64,
    tag: u64,
    payload: u32,
) -> CheckResult {
    if cqes.len() != 2 {
        return Err(format!("observed {} completions (expected 2)", cqes.len()));
    }
    let mut saw_ack = false;
    let mut saw_event = false;
    for cqe in cqes {
        if cqe.user_data == ack_user_data && !saw_ack {
            expect_cqe(cqe, ack_user_data, 0)?;
            saw_ack = true;
        } else if cqe.user_data == tag && !saw_event {
            expect_cqe(cqe, tag, payload as i32)?;
            saw_event = true;
        } else {
            return Err(format!("unexpected completion {cqe:?}"));
        }
    }
    Ok(())
}

/// Every expected tag arrived exactly once, nothing else arrived, and each
/// event's result matches the payload recorded for its tag.
pub fn verify_exactly_once(observed: &[Cqe], expected: &[(u64, u32)]) -> CheckResult {
    if observed.len() != expected.len() {
        return Err(format!(
            "observed {} events (expected {})",
            observed.len(),
            expected.len()
        ));
    }
    let mut pending: std::collections::HashMap<u64, u32> = expected.iter().copied().collect();
    let mut seen = HashSet::with_capacity(observed.len());
    for cqe in observed {
        if !seen.insert(cqe.user_data) {
            return Err(format!("tag {:#x} delivered twice", cqe.user_data));
        }
        match pending.remove(&cqe.user_data) {
            Some(payload) => expect_cqe(cqe, cqe.user_data, payload as i32)?,
            None => return Err(format!("unexpected tag {:#x}", cqe.user_data)),
        }
    }
    if let Some(tag) = pending.keys().next() {
        return Err(format!("tag {tag:#x} never delivered"));
    }
    Ok(())
}
