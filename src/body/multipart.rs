//! Streaming `multipart/form-data` parser.
//!
//! # Responsibilities
//! - Extract the boundary from the request content type
//! - Skip the preamble, then parse sections one at a time
//! - Route plain fields into the `ArgMap` and file fields into streams
//!   supplied by a `FileStreamFactory`
//!
//! # Design Decisions
//! - Section bodies are never buffered whole; bytes flow through the
//!   boundary scanner straight into their destination
//! - Plain field values are decoded one byte per character
//! - A section without a parsable `name` ends the parse quietly

use std::collections::HashMap;
use std::io::SeekFrom;

use tokio::io::AsyncSeekExt;

use crate::body::file::{FileStreamFactory, HttpFile};
use crate::body::scanner::{copy_until_delimiter, BoundaryScanner};
use crate::http::error::{HttpError, HttpResult};
use crate::http::request::BodyReader;
use crate::routing::args::ArgMap;

pub const MULTIPART_FORM_DATA: &str = "multipart/form-data";

const UTF8_PREFIX: &str = "utf-8''";

/// What a section turned out to be.
#[derive(Debug)]
pub enum SectionValue {
    Field(String),
    File(HttpFile),
}

/// One parsed section.
#[derive(Debug)]
pub struct Section {
    pub name: String,
    pub value: SectionValue,
}

/// Result of parsing one section.
#[derive(Debug)]
pub enum SectionOutcome {
    More(Section),
    End,
}

/// Headers of one section.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SectionHeaders {
    pub name: Option<String>,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

/// Pull the boundary token out of a content type, removing quotes.
pub fn extract_boundary(content_type: &str) -> Option<String> {
    let start = content_type.find("boundary=")? + "boundary=".len();
    let rest = &content_type[start..];
    let token = match rest.strip_prefix('"') {
        Some(quoted) => quoted.split('"').next().unwrap_or(""),
        None => rest.split(';').next().unwrap_or("").trim(),
    };
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

/// Parse a multipart body, filling `args` with fields and returning files.
pub async fn parse_multipart(
    content_type: &str,
    body: &mut BodyReader,
    args: &mut ArgMap,
    factory: &dyn FileStreamFactory,
) -> HttpResult<HashMap<String, HttpFile>> {
    let boundary = extract_boundary(content_type)
        .ok_or_else(|| HttpError::MalformedMultipart("missing boundary in content type".to_string()))?;
    let parser = MultipartParser::new(&boundary);

    parser.skip_preamble(body).await?;

    let mut files = HashMap::new();
    loop {
        match parser.parse_section(body, factory).await? {
            SectionOutcome::End => break,
            SectionOutcome::More(Section {
                name,
                value: SectionValue::Field(value),
            }) => {
                args.insert(name, value)?;
            }
            SectionOutcome::More(Section {
                name,
                value: SectionValue::File(file),
            }) => {
                if files.contains_key(&name) {
                    return Err(HttpError::DuplicateKey(name));
                }
                files.insert(name, file);
            }
        }
    }

    tracing::debug!(
        fields = args.len(),
        files = files.len(),
        bytes = body.consumed(),
        "Multipart body parsed"
    );
    Ok(files)
}

/// Parser bound to one boundary token.
#[derive(Debug, Clone)]
pub struct MultipartParser {
    opening: Vec<u8>,
    delimiter: Vec<u8>,
}

impl MultipartParser {
    pub fn new(boundary: &str) -> Self {
        Self {
            opening: format!("--{}", boundary).into_bytes(),
            delimiter: format!("\r\n--{}", boundary).into_bytes(),
        }
    }

    /// Discard everything through the end of the first boundary line.
    pub async fn skip_preamble(&self, body: &mut BodyReader) -> HttpResult<()> {
        let mut scanner = BoundaryScanner::new(&self.opening);
        copy_until_delimiter(body, &mut scanner, &mut tokio::io::sink()).await?;
        Ok(())
    }

    /// Parse the next section. The body must be positioned just after a
    /// delimiter line.
    pub async fn parse_section(
        &self,
        body: &mut BodyReader,
        factory: &dyn FileStreamFactory,
    ) -> HttpResult<SectionOutcome> {
        let headers = read_section_headers(body).await?;
        let Some(name) = headers.name else {
            return Ok(SectionOutcome::End);
        };

        let mut scanner = BoundaryScanner::new(&self.delimiter);
        match headers.file_name {
            Some(file_name) => {
                let content_type = headers.content_type.unwrap_or_default();
                let mut stream = factory.create(&name, &file_name, &content_type)?;
                copy_until_delimiter(body, &mut scanner, &mut *stream).await?;
                stream.seek(SeekFrom::Start(0)).await?;
                Ok(SectionOutcome::More(Section {
                    value: SectionValue::File(HttpFile::new(name.clone(), file_name, content_type, stream)),
                    name,
                }))
            }
            None => {
                let mut raw = Vec::new();
                copy_until_delimiter(body, &mut scanner, &mut raw).await?;
                Ok(SectionOutcome::More(Section {
                    name,
                    value: SectionValue::Field(latin1(&raw)),
                }))
            }
        }
    }
}

/// Read header lines up to the blank line that ends them.
pub async fn read_section_headers(body: &mut BodyReader) -> HttpResult<SectionHeaders> {
    let mut headers = SectionHeaders::default();
    while let Some(line) = body.read_line().await? {
        if line.is_empty() {
            break;
        }
        let line = latin1(&line);
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "content-disposition" => {
                let (name, file_name) = parse_disposition(value.trim());
                headers.name = name;
                headers.file_name = file_name;
            }
            "content-type" => headers.content_type = Some(value.trim().to_string()),
            _ => {}
        }
    }
    Ok(headers)
}

/// Extract `name` and `filename` from a `Content-Disposition` value.
///
/// `filename*` wins over `filename`. An empty file name counts as absent.
pub fn parse_disposition(value: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut plain_file_name = None;
    let mut extended_file_name = None;

    for param in split_params(value) {
        let Some((key, raw)) = param.split_once('=') else {
            continue;
        };
        let unquoted = unquote(raw.trim());
        match key.trim().to_ascii_lowercase().as_str() {
            "name" => name = Some(unquoted.to_string()),
            "filename" => plain_file_name = Some(decode_file_name(unquoted)),
            "filename*" => extended_file_name = Some(decode_file_name(unquoted)),
            _ => {}
        }
    }

    let file_name = extended_file_name.or(plain_file_name).filter(|f| !f.is_empty());
    (name.filter(|n| !n.is_empty()), file_name)
}

fn decode_file_name(value: &str) -> String {
    let prefixed = value
        .get(..UTF8_PREFIX.len())
        .is_some_and(|p| p.eq_ignore_ascii_case(UTF8_PREFIX));
    let Some(encoded) = value.get(UTF8_PREFIX.len()..).filter(|_| prefixed) else {
        return value.to_string();
    };
    match urlencoding::decode(encoded) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => encoded.to_string(),
    }
}

/// Split on `;` outside double quotes.
fn split_params(value: &str) -> Vec<&str> {
    let mut params = Vec::new();
    let mut in_quotes = false;
    let mut start = 0;
    for (i, c) in value.char_indices() {
        match c {
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => {
                params.push(value[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    params.push(value[start..].trim());
    params
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

fn latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::body::file::InMemoryFiles;

    const BODY: &str = "preamble\r\n--B\r\n\
        Content-Disposition: form-data; name=\"a\"\r\n\r\n\
        1\r\n--B\r\n\
        Content-Disposition: form-data; name=\"f\"; filename=\"x.txt\"\r\n\
        Content-Type: text/plain\r\n\r\n\
        hello\r\n--B--\r\n";

    #[test]
    fn test_extract_boundary() {
        assert_eq!(extract_boundary("multipart/form-data; boundary=B").as_deref(), Some("B"));
        assert_eq!(
            extract_boundary("multipart/form-data; boundary=\"a;b\"; charset=x").as_deref(),
            Some("a;b")
        );
        assert_eq!(extract_boundary("multipart/form-data"), None);
        assert_eq!(extract_boundary("multipart/form-data; boundary="), None);
    }

    #[test]
    fn test_parse_disposition_variants() {
        assert_eq!(
            parse_disposition("form-data; name=\"f\"; filename=\"a;b.txt\""),
            (Some("f".to_string()), Some("a;b.txt".to_string()))
        );
        assert_eq!(
            parse_disposition("form-data; name=\"f\"; filename=\"x\"; filename*=UTF-8''na%C3%AFve.txt"),
            (Some("f".to_string()), Some("naïve.txt".to_string()))
        );
        assert_eq!(
            parse_disposition("form-data; name=\"f\"; filename=\"\""),
            (Some("f".to_string()), None)
        );
        assert_eq!(parse_disposition("form-data"), (None, None));
    }

    #[tokio::test]
    async fn test_parses_field_and_file() {
        let mut body = BodyReader::from_bytes(BODY);
        let mut args = ArgMap::new();
        let mut files = parse_multipart("multipart/form-data; boundary=B", &mut body, &mut args, &InMemoryFiles)
            .await
            .unwrap();

        assert_eq!(args.get("a"), Some("1"));
        let file = files.get_mut("f").unwrap();
        assert_eq!(file.file_name(), "x.txt");
        assert_eq!(file.content_type(), "text/plain");
        assert_eq!(file.read_all().await.unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_near_delimiter_inside_content_is_kept() {
        let body = "--B\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\r\n\
            x\r\n--A\r\n-B\r\n--\r\n--B--\r\n";
        let mut body = BodyReader::from_bytes(body);
        let mut args = ArgMap::new();
        parse_multipart("multipart/form-data; boundary=B", &mut body, &mut args, &InMemoryFiles)
            .await
            .unwrap();
        assert_eq!(args.get("a"), Some("x\r\n--A\r\n-B\r\n--"));
    }

    #[tokio::test]
    async fn test_duplicate_field_rejected() {
        let body = "--B\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\r\n2\r\n--B--\r\n";
        let mut body = BodyReader::from_bytes(body);
        let mut args = ArgMap::new();
        let err = parse_multipart("multipart/form-data; boundary=B", &mut body, &mut args, &InMemoryFiles)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::DuplicateKey(key) if key == "a"));
    }

    #[tokio::test]
    async fn test_nameless_section_ends_parse() {
        let body = "--B\r\n\
            Content-Disposition: form-data; name=\"a\"\r\n\r\n1\r\n--B\r\n\
            Content-Disposition: form-data\r\n\r\nignored\r\n--B\r\n\
            Content-Disposition: form-data; name=\"c\"\r\n\r\n3\r\n--B--\r\n";
        let mut body = BodyReader::from_bytes(body);
        let mut args = ArgMap::new();
        parse_multipart("multipart/form-data; boundary=B", &mut body, &mut args, &InMemoryFiles)
            .await
            .unwrap();
        assert_eq!(args.get("a"), Some("1"));
        assert!(!args.contains_key("c"));
    }

    #[tokio::test]
    async fn test_missing_boundary_is_malformed() {
        let mut body = BodyReader::from_bytes(BODY);
        let mut args = ArgMap::new();
        let err = parse_multipart("multipart/form-data", &mut body, &mut args, &InMemoryFiles)
            .await
            .unwrap_err();
        assert!(matches!(err, HttpError::MalformedMultipart(_)));
    }

    #[tokio::test]
    async fn test_plain_field_bytes_map_to_chars() {
        let mut body = BodyReader::from_bytes(&b"--B\r\nContent-Disposition: form-data; name=\"a\"\r\n\r\n\xe9\r\n--B--\r\n"[..]);
        let mut args = ArgMap::new();
        parse_multipart("multipart/form-data; boundary=B", &mut body, &mut args, &InMemoryFiles)
            .await
            .unwrap();
        assert_eq!(args.get("a"), Some("\u{e9}"));
    }
}
