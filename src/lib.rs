//! Tiny disk-backed key-value database.
//!
//! A fixed-schema table of `(id, username, email)` rows stored in a
//! persistent B-tree over 4096-byte pages, driven through a line-oriented
//! command interface (`insert`, `select`, and the `.exit` / `.btree` /
//! `.constants` meta-commands).

#[macro_use]
pub mod errors;

pub mod command;
pub mod repl;
pub mod storage;
