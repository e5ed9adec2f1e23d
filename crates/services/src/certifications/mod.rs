mod catalog;
mod counters;
mod service;

pub use service::{CertificationService, CertificationView, ProgressEntry, ProgressReport};
