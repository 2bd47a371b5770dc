//! # parttab mender
//!
//! The GPT consistency engine. It reads both copies of a GUID Partition
//! Table, rewrites the selected copies with freshly computed header and
//! partition array checksums, and reads each written copy back to verify it.
//!
//! The caller never computes a checksum. Each copy is rewritten from its own
//! content unless a replacement model is supplied, and the result is a
//! [`RepairReport`] describing every copy.

pub mod mender;
pub mod report;

pub use mender::{GptMender, MenderConfig};
pub use report::{CopyReport, RepairReport};
