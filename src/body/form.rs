//! `application/x-www-form-urlencoded` bodies.

use crate::http::error::HttpResult;
use crate::http::request::BodyReader;
use crate::routing::args::ArgMap;

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";

/// Read the whole body and add each `key=value` pair to `args`.
///
/// Pairs without exactly one `=` are skipped. Values are form-decoded.
pub async fn parse_form(body: &mut BodyReader, args: &mut ArgMap) -> HttpResult<()> {
    let raw = body.read_to_end().await?;
    let text = String::from_utf8_lossy(&raw);

    for pair in text.split('&') {
        let mut parts = pair.split('=');
        let (Some(key), Some(value), None) = (parts.next(), parts.next(), parts.next()) else {
            continue;
        };
        args.insert(key, decode_value(value))?;
    }
    Ok(())
}

fn decode_value(value: &str) -> String {
    let spaced = value.replace('+', " ");
    String::from_utf8_lossy(&urlencoding::decode_binary(spaced.as_bytes())).into_owned()
}
