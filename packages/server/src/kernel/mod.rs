pub mod deps;
pub mod object_store;
pub mod processor;
pub mod test_dependencies;
pub mod traits;

pub use deps::{MailgunAdapter, ServerDeps};
pub use object_store::InMemoryObjectStore;
pub use processor::EchoProcessor;
pub use traits::{
    BaseDocumentProcessor, BaseMailer, BaseObjectStore, MultipartInit, ProcessorError,
    ProcessorInput, RenderedEmail, UploadPart,
};
