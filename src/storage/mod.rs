//! Metadata Storage Module
//!
//! Per-entry metadata lives in a hidden JSON sidecar next to the entry:
//!
//! - `record` - the string-to-string record and its well-known keys
//! - `metadata_store` - sidecar I/O, provenance merge and lifecycle mirroring
//!
//! ## Layout
//!
//! ```text
//! <dir>/
//! ├── README.md          # optional provenance document
//! ├── <name>             # entry (file or directory)
//! └── .<name>.meta       # sidecar, pretty-printed JSON object
//! ```

pub mod metadata_store;
pub mod record;

pub use metadata_store::{
    is_sidecar_name, sidecar_path, MetadataStore, RecalculationReport, SIDECAR_EXTENSION,
};
pub use record::{MetadataRecord, FILENAME_KEYS, RDS_PREFIX, UPLOADER_KEY, VERSION_KEY};
