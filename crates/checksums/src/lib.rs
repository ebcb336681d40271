//! Checksums used by the rsync delta-transfer algorithm.
//!
//! Two hashes cooperate during block matching: the cheap [`RollingSum`] scans
//! every window position in O(1) per byte, and the seeded MD4 in [`strong`]
//! confirms candidate matches and protects whole files. MD4 is long obsolete
//! as a cryptographic primitive but is fixed by the wire protocol; do not
//! substitute it.

pub mod rolling;
pub mod strong;

pub use rolling::RollingSum;
pub use strong::SeededMd4;
