use thiserror::Error;

#[derive(Debug, Error)]
pub enum CollectionError {
    #[error("{collection}: key '{key}' already exists")]
    DuplicateKey { collection: String, key: String },

    #[error("{collection}: no item with key '{key}'")]
    NotFound { collection: String, key: String },

    #[error("{collection}: update changed key '{from}' to '{to}'")]
    KeyChanged {
        collection: String,
        from: String,
        to: String,
    },
}

pub type Result<T> = std::result::Result<T, CollectionError>;
