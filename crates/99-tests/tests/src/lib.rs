//! End-to-end tests for the ring message stack.

#[cfg(test)]
mod native_e2e;
