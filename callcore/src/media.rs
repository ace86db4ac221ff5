use serde::Serialize;

/// Opaque handle to a media stream owned by the connectivity layer.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MediaStream {
    pub id: String,
}

impl MediaStream {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}
