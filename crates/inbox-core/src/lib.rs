//! Shared building blocks for the XML inbox uploader.
//!
//! Nothing in this crate performs network or filesystem access:
//! [`xml`] checks that a byte buffer is a well-formed XML document and
//! [`target`] decides which remote file name an upload may use.

pub mod target;
pub mod xml;

pub use target::{resolve_target_name, validate_target_name, TargetNameError};
pub use xml::{preview, XmlValidation, XmlValidator};
