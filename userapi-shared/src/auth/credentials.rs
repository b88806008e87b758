/// Credential extraction from HTTP requests
///
/// These functions only read what the request carries. They never touch a
/// store, and a malformed header reads as "no credential".

use axum::extract::Query;
use axum::http::{header, HeaderMap, Uri};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use std::collections::HashMap;

/// Value of the `Authorization` header after `scheme`, matched case-insensitively
fn authorization_param<'a>(headers: &'a HeaderMap, scheme: &str) -> Option<&'a str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (given, rest) = value.split_once(' ')?;

    if given.eq_ignore_ascii_case(scheme) {
        Some(rest.trim())
    } else {
        None
    }
}

/// Username and password from `Authorization: Basic base64(user:pass)`
///
/// The password may itself contain `:`; only the first one separates.
pub fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let encoded = authorization_param(headers, "Basic")?;
    let decoded = STANDARD.decode(encoded).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;

    let (username, password) = decoded.split_once(':')?;
    Some((username.to_string(), password.to_string()))
}

/// Token from `Authorization: Bearer <token>`
pub fn bearer_token(headers: &HeaderMap) -> Option<String> {
    authorization_param(headers, "Bearer").map(str::to_string)
}

/// Token from the query parameter `param`
pub fn query_token(uri: &Uri, param: &str) -> Option<String> {
    let Query(params) = Query::<HashMap<String, String>>::try_from_uri(uri).ok()?;
    params.get(param).cloned()
}
