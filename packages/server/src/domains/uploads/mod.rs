pub mod actions;

pub use actions::{complete_multipart, initiate_upload, InitiateUpload, InitiatedUpload};
