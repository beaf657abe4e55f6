pub mod file_service;

pub use file_service::{format_readable_size, EntryInfo, FileService, UploadOutcome, UploadRequest};
