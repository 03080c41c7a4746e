//! End-to-end tests through the public tree API.
//!
//! Each test file covers a specific scenario, using deterministic inputs
//! and real or simulated object stores.

#![cfg(test)]

mod helpers;

mod test_corruption;
mod test_delete_only_key;
mod test_duplicate_keys;
mod test_families;
mod test_many_inserts;
mod test_split_scenario;
mod test_store_faults;
