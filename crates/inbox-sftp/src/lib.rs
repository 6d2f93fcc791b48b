//! # XML inbox – SFTP
//!
//! Places one validated XML document into a fixed remote inbox:
//!   • Password-authenticated SSH sessions with a bounded connect timeout
//!   • Host-key policy (unverified trust-on-first-use or known_hosts)
//!   • Ensure-then-place directory handling that tolerates a concurrent mkdir
//!   • Whole-buffer SFTP writes with an overwrite / reject conflict policy
//!   • Per-session upload counter, verification state and attempt history
//!   • Async command boundary for an external front end

pub mod sftp;
