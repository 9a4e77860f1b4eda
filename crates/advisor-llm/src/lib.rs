pub mod backend;
pub mod router;

pub use backend::CompletionBackend;
pub use router::OpenAiRouter;
