use crate::model::Id;
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter};
use url::Url;

#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Debug, Default, Hash)]
pub struct FileMarker;

/// A file picked for upload.
#[derive(Clone, Eq, PartialEq, Hash)]
pub struct NewFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct StoredFile {
    pub id: Id<FileMarker>,
    pub name: String,
    pub mime_type: String,
    pub size: u64,
}

/// An image attached to a document: where to display it from and which stored
/// file backs it.
#[derive(Clone, Eq, PartialEq, Debug, Hash, Deserialize, Serialize)]
pub struct ImageRef {
    pub url: Url,
    pub file_id: Id<FileMarker>,
}

impl Debug for NewFile {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewFile")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}
