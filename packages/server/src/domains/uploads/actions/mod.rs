mod complete;
mod initiate;

pub use complete::complete_multipart;
pub use initiate::{initiate_upload, InitiateUpload, InitiatedUpload};
