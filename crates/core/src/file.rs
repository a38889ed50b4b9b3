//! File metadata documents.

use crate::document::{Document, Value};
use crate::error::{Error, Result};
use time::OffsetDateTime;

pub const ID_FIELD: &str = "_id";
pub const FILENAME_FIELD: &str = "filename";
pub const LENGTH_FIELD: &str = "length";
pub const CHUNK_SIZE_FIELD: &str = "chunkSize";
pub const UPLOAD_DATE_FIELD: &str = "uploadDate";
pub const MD5_FIELD: &str = "md5";

const SYSTEM_FIELDS: [&str; 6] = [
    ID_FIELD,
    FILENAME_FIELD,
    LENGTH_FIELD,
    CHUNK_SIZE_FIELD,
    UPLOAD_DATE_FIELD,
    MD5_FIELD,
];

/// Typed view of a document in the files collection.
#[derive(Clone, Debug, PartialEq)]
pub struct FileMetadata {
    /// Unique file id, caller- or system-assigned.
    pub id: Value,
    /// Optional file name; need not be unique.
    pub filename: Option<String>,
    /// Total length in bytes.
    pub length: u64,
    /// Size of every chunk but the last.
    pub chunk_size: u32,
    /// When the upload completed.
    pub upload_date: Option<OffsetDateTime>,
    /// Hex content digest, absent until computed.
    pub md5: Option<String>,
    /// Caller-defined fields.
    pub extra: Document,
}

impl FileMetadata {
    /// Parse a files-collection document.
    ///
    /// `_id`, `length` and `chunkSize` are required; every unknown field lands
    /// in `extra`.
    pub fn from_document(document: &Document) -> Result<Self> {
        let id = document
            .get(ID_FIELD)
            .cloned()
            .ok_or(Error::MissingField(ID_FIELD))?;

        let length = document
            .get(LENGTH_FIELD)
            .ok_or(Error::MissingField(LENGTH_FIELD))?;
        let length = length
            .as_i64()
            .and_then(|v| u64::try_from(v).ok())
            .ok_or_else(|| Error::InvalidField {
                field: LENGTH_FIELD,
                expected: "non-negative integer",
                found: length.to_string(),
            })?;

        let chunk_size = document
            .get(CHUNK_SIZE_FIELD)
            .ok_or(Error::MissingField(CHUNK_SIZE_FIELD))?;
        let chunk_size = chunk_size
            .as_i64()
            .and_then(|v| u32::try_from(v).ok())
            .filter(|v| *v > 0)
            .ok_or_else(|| Error::InvalidField {
                field: CHUNK_SIZE_FIELD,
                expected: "positive integer",
                found: chunk_size.to_string(),
            })?;

        let filename = match document.get(FILENAME_FIELD) {
            None | Some(Value::Null) => None,
            Some(Value::String(s)) => Some(s.clone()),
            Some(other) => {
                return Err(Error::InvalidField {
                    field: FILENAME_FIELD,
                    expected: "string",
                    found: other.type_name().to_string(),
                });
            }
        };

        let extra = document
            .iter()
            .filter(|(key, _)| !SYSTEM_FIELDS.contains(&key.as_str()))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect();

        Ok(Self {
            id,
            filename,
            length,
            chunk_size,
            upload_date: document.get(UPLOAD_DATE_FIELD).and_then(Value::as_datetime),
            md5: document.get_str(MD5_FIELD).map(str::to_string),
            extra,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc;

    #[test]
    fn test_from_document_collects_extra_fields() {
        let document = doc! {
            "_id" => "report",
            "filename" => "report.pdf",
            "length" => 600000i64,
            "chunkSize" => 262144,
            "md5" => "abc",
            "owner" => "alice",
        };

        let meta = FileMetadata::from_document(&document).unwrap();
        assert_eq!(meta.id, Value::from("report"));
        assert_eq!(meta.filename.as_deref(), Some("report.pdf"));
        assert_eq!(meta.length, 600000);
        assert_eq!(meta.chunk_size, 262144);
        assert_eq!(meta.md5.as_deref(), Some("abc"));
        assert_eq!(meta.extra.get_str("owner"), Some("alice"));
        assert!(!meta.extra.contains_key("length"));
    }

    #[test]
    fn test_from_document_accepts_double_length() {
        let document = doc! { "_id" => 1, "length" => 10.0, "chunkSize" => 4 };
        let meta = FileMetadata::from_document(&document).unwrap();
        assert_eq!(meta.length, 10);
    }

    #[test]
    fn test_from_document_rejects_missing_or_bad_fields() {
        let missing = doc! { "_id" => 1, "chunkSize" => 4 };
        assert!(matches!(
            FileMetadata::from_document(&missing),
            Err(Error::MissingField(LENGTH_FIELD))
        ));

        let negative = doc! { "_id" => 1, "length" => -1, "chunkSize" => 4 };
        assert!(matches!(
            FileMetadata::from_document(&negative),
            Err(Error::InvalidField { field: LENGTH_FIELD, .. })
        ));

        let zero_chunk = doc! { "_id" => 1, "length" => 1, "chunkSize" => 0 };
        assert!(FileMetadata::from_document(&zero_chunk).is_err());
    }
}
