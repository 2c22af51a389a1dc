//! Built-in job processors.

pub mod email;

pub use email::{EMAIL_JOB_TYPE, EmailJobProcessor, EmailKind, EmailSender, LogEmailSender};
