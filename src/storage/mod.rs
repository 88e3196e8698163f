use std::collections::HashMap;

use anyhow::{anyhow, Result};
use opendal::services::Memory;
use opendal::{Operator, Scheme};
use url::Url;

/// Builds the document-store Operator from a URI string.
///
/// Supported schemes:
/// - `memory://` -> in-memory store (tests, local development)
/// - `file:///path/to/dir` -> local filesystem
/// - `s3://bucket/root` -> S3, credentials taken from the environment
pub fn create_operator_from_uri(uri: &str) -> Result<Operator> {
    if uri == "memory://" {
        let op = Operator::new(Memory::default())?.finish();
        return Ok(op);
    }

    let url = Url::parse(uri).map_err(|e| anyhow!("invalid storage uri {uri}: {e}"))?;

    let mut options = HashMap::new();
    let scheme = match url.scheme() {
        "file" => {
            options.insert("root".to_string(), url.path().to_string());
            Scheme::Fs
        }
        "s3" => {
            let bucket = url
                .host_str()
                .ok_or_else(|| anyhow!("s3 uri is missing a bucket: {uri}"))?;
            options.insert("bucket".to_string(), bucket.to_string());
            if !url.path().is_empty() && url.path() != "/" {
                options.insert("root".to_string(), url.path().to_string());
            }
            Scheme::S3
        }
        other => return Err(anyhow!("unsupported storage scheme: {other}")),
    };

    let op = Operator::via_iter(scheme, options)?;
    Ok(op)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_uri() {
        assert!(create_operator_from_uri("memory://").is_ok());
    }

    #[test]
    fn test_file_uri() {
        assert!(create_operator_from_uri("file:///tmp/jotter-notes").is_ok());
    }

    #[test]
    fn test_unsupported_scheme() {
        assert!(create_operator_from_uri("ftp://somewhere/notes").is_err());
    }

    #[test]
    fn test_garbage_uri() {
        assert!(create_operator_from_uri("not a uri").is_err());
    }
}
