pub mod embeddings;
pub mod vector_index;

pub use embeddings::EmbeddingClient;
pub use vector_index::{SimilarCourse, VectorIndex};
