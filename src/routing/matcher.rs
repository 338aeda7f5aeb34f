//! Route matching logic.
//!
//! # Responsibilities
//! - Compile `{name}` path patterns into case-insensitive expressions
//! - Extract placeholder bindings in left-to-right order
//! - Combine method and pattern checks into a route predicate
//!
//! # Design Decisions
//! - Patterns compile once, at registration time
//! - Literal text is escaped; only placeholders are variable
//! - Every placeholder is lazy except the last, which is greedy so a single
//!   pattern can capture trailing segments that contain `/`
//! - Anchored at the start of the path only, so a query string may follow
//! - A pattern without placeholders is a plain case-insensitive comparison

use axum::http::Method;
use regex::Regex;

use crate::http::error::{HttpError, HttpResult};
use crate::http::request::HttpRequest;
use crate::routing::args::ArgMap;

const LAZY_GROUP: &str = "(.+?)";
const GREEDY_GROUP: &str = "(.+)";

/// Result of matching a path against a pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// The path matched; bindings are in placeholder order.
    Found(Vec<(String, String)>),
    NotFound,
}

/// A compiled route pattern such as `/page-{pageNumber}/`.
#[derive(Debug, Clone)]
pub struct Pattern {
    source: String,
    names: Vec<String>,
    regex: Option<Regex>,
}

impl Pattern {
    /// Compile a pattern. Fails on duplicate placeholder names.
    pub fn new(pattern: &str) -> HttpResult<Self> {
        let invalid = |reason: String| HttpError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };

        let placeholder = Regex::new(r"\{(\w+)\}").map_err(|e| invalid(e.to_string()))?;

        let mut expr = String::from("(?i)^");
        let mut names: Vec<String> = Vec::new();
        let mut last_end = 0;
        let mut last_group_at = None;

        for caps in placeholder.captures_iter(pattern) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            if names.iter().any(|n| n == name.as_str()) {
                return Err(invalid(format!("placeholder '{}' appears twice", name.as_str())));
            }
            expr.push_str(&regex::escape(&pattern[last_end..whole.start()]));
            last_group_at = Some(expr.len());
            expr.push_str(LAZY_GROUP);
            names.push(name.as_str().to_string());
            last_end = whole.end();
        }
        expr.push_str(&regex::escape(&pattern[last_end..]));

        let Some(at) = last_group_at else {
            return Ok(Self {
                source: pattern.to_string(),
                names,
                regex: None,
            });
        };
        expr.replace_range(at..at + LAZY_GROUP.len(), GREEDY_GROUP);

        let regex = Regex::new(&expr).map_err(|e| invalid(e.to_string()))?;
        Ok(Self {
            source: pattern.to_string(),
            names,
            regex: Some(regex),
        })
    }

    /// The pattern text as registered.
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Placeholder names in order of appearance.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Match a path without touching any argument map.
    pub fn match_path(&self, path: &str) -> MatchOutcome {
        let Some(regex) = &self.regex else {
            return if path.to_lowercase() == self.source.to_lowercase() {
                MatchOutcome::Found(Vec::new())
            } else {
                MatchOutcome::NotFound
            };
        };

        let Some(caps) = regex.captures(path) else {
            return MatchOutcome::NotFound;
        };

        let bindings = self
            .names
            .iter()
            .enumerate()
            .filter_map(|(i, name)| caps.get(i + 1).map(|m| (name.clone(), m.as_str().to_string())))
            .collect();
        MatchOutcome::Found(bindings)
    }

    /// Match a path and bind placeholders into `args`.
    ///
    /// Returns `Ok(false)` on no match. A binding that collides with an
    /// existing key fails with `DuplicateKey`; bindings added before the
    /// collision stay in `args` and the caller is expected to clear them.
    pub fn try_match(&self, path: &str, args: &mut ArgMap) -> HttpResult<bool> {
        match self.match_path(path) {
            MatchOutcome::Found(bindings) => {
                for (name, value) in bindings {
                    args.insert(name, value)?;
                }
                Ok(true)
            }
            MatchOutcome::NotFound => Ok(false),
        }
    }
}

/// Decides whether a route applies to a request.
pub trait RoutePredicate: Send + Sync {
    /// Evaluate against the request, writing any extracted values into `args`.
    fn evaluate(&self, request: &HttpRequest, args: &mut ArgMap) -> HttpResult<bool>;
}

impl<F> RoutePredicate for F
where
    F: Fn(&HttpRequest, &mut ArgMap) -> HttpResult<bool> + Send + Sync,
{
    fn evaluate(&self, request: &HttpRequest, args: &mut ArgMap) -> HttpResult<bool> {
        self(request, args)
    }
}

/// Method equality AND pattern match against path+query.
#[derive(Debug, Clone)]
pub struct MethodPattern {
    method: Method,
    pattern: Pattern,
}

impl MethodPattern {
    pub fn new(method: Method, pattern: Pattern) -> Self {
        Self { method, pattern }
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn pattern(&self) -> &Pattern {
        &self.pattern
    }
}

impl RoutePredicate for MethodPattern {
    fn evaluate(&self, request: &HttpRequest, args: &mut ArgMap) -> HttpResult<bool> {
        if *request.method() != self.method {
            return Ok(false);
        }
        self.pattern.try_match(request.path_and_query(), args)
    }
}
