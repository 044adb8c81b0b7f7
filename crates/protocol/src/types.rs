use std::fmt;

use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize};

/// A chunk the remote has recorded for an upload session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadedPart {
    /// 1-based chunk index. The remote sends it as a number or as a numeric string.
    #[serde(rename = "partNumber", deserialize_with = "part_number")]
    pub part_number: u32,
    #[serde(default)]
    pub size: u64,
    /// Server-computed MD5 of the received bytes (hex).
    #[serde(default)]
    pub etag: String,
}

/// An entry returned by the file listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    #[serde(rename = "fileId")]
    pub file_id: i64,
    pub filename: String,
    /// 0 = file, 1 = folder.
    #[serde(rename = "type", default)]
    pub file_type: i32,
    #[serde(default)]
    pub size: u64,
    #[serde(default)]
    pub etag: String,
    #[serde(rename = "parentFileId", default)]
    pub parent_file_id: i64,
}

fn part_number<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    struct PartNumberVisitor;

    impl Visitor<'_> for PartNumberVisitor {
        type Value = u32;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a part number as integer or numeric string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<u32, E> {
            u32::try_from(v).map_err(|_| E::custom(format!("part number out of range: {v}")))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<u32, E> {
            u32::try_from(v).map_err(|_| E::custom(format!("part number out of range: {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<u32, E> {
            v.trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid part number: {v:?}")))
        }
    }

    deserializer.deserialize_any(PartNumberVisitor)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_number_from_integer() {
        let part: UploadedPart =
            serde_json::from_str(r#"{"partNumber": 2, "size": 10, "etag": "abc"}"#).unwrap();
        assert_eq!(part.part_number, 2);
        assert_eq!(part.size, 10);
    }

    #[test]
    fn part_number_from_string() {
        let part: UploadedPart =
            serde_json::from_str(r#"{"partNumber": "3", "etag": "abc"}"#).unwrap();
        assert_eq!(part.part_number, 3);
        assert_eq!(part.size, 0);
    }

    #[test]
    fn part_number_rejects_garbage() {
        let result: Result<UploadedPart, _> =
            serde_json::from_str(r#"{"partNumber": "three", "etag": "abc"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn part_number_rejects_negative() {
        let result: Result<UploadedPart, _> =
            serde_json::from_str(r#"{"partNumber": -1, "etag": "abc"}"#);
        assert!(result.is_err());
    }

    #[test]
    fn file_info_defaults_missing_parent_to_root() {
        let file: FileInfo =
            serde_json::from_str(r#"{"fileId": 1, "filename": "a", "type": 0}"#).unwrap();
        assert_eq!(file.parent_file_id, 0);
        assert_eq!(file.size, 0);
    }
}
