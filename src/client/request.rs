use bytes::Bytes;

use crate::storage::Metadata;

/// Input to `store` and `submit`.
///
/// `key` and `body` are reserved: setting them through `with_field` fills
/// their own slots instead of the metadata.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreRequest {
    /// Object key; a fresh unique key is generated when absent.
    pub key: Option<String>,
    /// Object body.
    pub body: Bytes,
    /// User metadata written with the object.
    pub metadata: Metadata,
}

impl StoreRequest {
    /// Creates a request for `body` with a generated key and no metadata.
    #[must_use]
    pub fn new(body: impl Into<Bytes>) -> Self {
        Self {
            key: None,
            body: body.into(),
            metadata: Metadata::new(),
        }
    }

    /// Sets an explicit key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Sets one field.
    ///
    /// Metadata names are lowercased when the object is stored, so
    /// `fileName` reads back as `filename`.
    #[must_use]
    pub fn with_field(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        let name = name.into();
        let value = value.into();
        match name.as_str() {
            "key" => self.key = Some(value),
            "body" => self.body = Bytes::from(value),
            _ => {
                self.metadata.insert(name, value);
            }
        }
        self
    }

    /// Sets every field of `fields`, routing reserved names like `with_field`.
    #[must_use]
    pub fn with_fields<I, K, V>(self, fields: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        fields
            .into_iter()
            .fold(self, |request, (name, value)| request.with_field(name, value))
    }
}

/// Location of an object to download.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    /// Bucket; the client's bucket when absent.
    pub bucket: Option<String>,
    /// Object key.
    pub key: String,
}

impl ObjectRef {
    /// Refers to `key` in the client's bucket.
    #[must_use]
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            bucket: None,
            key: key.into(),
        }
    }

    /// Refers to `key` in an explicit bucket.
    #[must_use]
    pub fn in_bucket(bucket: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            bucket: Some(bucket.into()),
            key: key.into(),
        }
    }
}

impl From<&str> for ObjectRef {
    fn from(key: &str) -> Self {
        Self::new(key)
    }
}
