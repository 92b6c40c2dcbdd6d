//! Custom assertions for the sync invariants

use crate::core_store::{queries, NoteSqlStore, StoreError, Usn, UserId};
use std::fmt::Debug;

/// Assert that a Result is Ok and return the value
pub fn assert_ok<T, E: Debug>(result: Result<T, E>) -> T {
    match result {
        Ok(value) => value,
        Err(e) => panic!("Expected Ok, got Err: {:?}", e),
    }
}

/// Assert that a Result is Err and return the error
pub fn assert_err<T: Debug, E>(result: Result<T, E>) -> E {
    match result {
        Ok(value) => panic!("Expected Err, got Ok: {:?}", value),
        Err(e) => e,
    }
}

fn stamped(store: &NoteSqlStore, user_id: UserId) -> Vec<Usn> {
    assert_ok(store.read(|conn| queries::stamped_usns(conn, user_id)))
}

/// No two rows of `user_id` carry the same USN
pub fn assert_unique_usns(store: &NoteSqlStore, user_id: UserId) {
    let usns = stamped(store, user_id);
    if let Some(pair) = usns.windows(2).find(|pair| pair[0] == pair[1]) {
        panic!("USN {} is stamped on more than one row of user {}: {:?}", pair[0], user_id, usns);
    }
}

/// Every stamped USN lies in `1..=max_usn`, and `max_usn` itself is stamped
pub fn assert_usns_within_high_water(store: &NoteSqlStore, user_id: UserId) {
    let max = assert_ok(store.get_user(user_id)).max_usn;
    let usns = stamped(store, user_id);

    if let Some(out) = usns.iter().find(|usn| **usn < 1 || **usn > max) {
        panic!("USN {} of user {} lies outside 1..={}", out, user_id, max);
    }
    if max > 0 && usns.last() != Some(&max) {
        panic!("max_usn {} of user {} is not stamped on any row: {:?}", max, user_id, usns);
    }
}

/// Allocations observed for `user_id` are exactly `1..=max_usn`
pub fn assert_dense_allocations(store: &NoteSqlStore, user_id: UserId, allocated: &[Usn]) {
    let max = assert_ok(store.get_user(user_id)).max_usn;
    let mut sorted = allocated.to_vec();
    sorted.sort_unstable();

    let expected: Vec<Usn> = (1..=max).collect();
    if sorted != expected {
        panic!(
            "Allocations for user {} are not dense: got {:?}, expected 1..={}",
            user_id, sorted, max
        );
    }
}

/// Check both row-level invariants at once
pub fn assert_usn_invariants(store: &NoteSqlStore, user_id: UserId) {
    assert_unique_usns(store, user_id);
    assert_usns_within_high_water(store, user_id);
}

/// Read the high-water mark, failing the test on error
pub fn max_usn_of(store: &NoteSqlStore, user_id: UserId) -> Usn {
    assert_ok::<_, StoreError>(store.get_user(user_id).map(|user| user.max_usn))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::TestEnv;

    #[test]
    fn test_invariants_hold_after_mutations() {
        let env = TestEnv::new();
        let user = env.user();
        let book = env.book(user.id, "js");
        let note = env.note(user.id, &book, "a");
        env.edit(user.id, &note, "b");

        assert_usn_invariants(&env.store, user.id);
        assert_eq!(max_usn_of(&env.store, user.id), 3);
    }

    #[test]
    #[should_panic(expected = "not dense")]
    fn test_dense_allocations_detects_gap() {
        let env = TestEnv::new();
        let user = env.user();
        env.book(user.id, "a");
        env.book(user.id, "b");

        assert_dense_allocations(&env.store, user.id, &[1]);
    }

    #[test]
    #[should_panic(expected = "Expected Ok, got Err")]
    fn test_assert_ok_panics_on_err() {
        let result: Result<i32, &str> = Err("error");
        let _ = assert_ok(result);
    }
}
