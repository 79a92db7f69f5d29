// Adapted from Kubernetes.
// See apimachinery/pkg/util/validation/validation.go and apimachinery/pkg/api/validation/generic.go
// in the Kubernetes source.
//
// These checks run before a request is sent so that an obviously malformed name is reported as
// such instead of being mistaken for "not found" by the API server.

use std::{fmt::Display, sync::LazyLock};

use const_format::concatcp;
use regex::Regex;
use snafu::Snafu;

/// Minimal length required by RFC 1123 is 63. Up to 255 allowed, unsupported by k8s.
const RFC_1123_LABEL_MAX_LENGTH: usize = 63;
const RFC_1123_LABEL_FMT: &str = "[a-z0-9]([-a-z0-9]*[a-z0-9])?";
const RFC_1123_LABEL_ERROR_MSG: &str = "a lowercase RFC 1123 label must consist of lower case alphanumeric characters or '-', and must start and end with an alphanumeric character";

/// This is a subdomain's max length in DNS (RFC 1123)
const RFC_1123_SUBDOMAIN_MAX_LENGTH: usize = 253;
const RFC_1123_SUBDOMAIN_FMT: &str =
    concatcp!(RFC_1123_LABEL_FMT, "(\\.", RFC_1123_LABEL_FMT, ")*");
const RFC_1123_SUBDOMAIN_ERROR_MSG: &str = "a lowercase RFC 1123 subdomain must consist of lower case alphanumeric characters, '-' or '.', and must start and end with an alphanumeric character";

const RFC_1035_LABEL_FMT: &str = "[a-z]([-a-z0-9]*[a-z0-9])?";
const RFC_1035_LABEL_ERROR_MSG: &str = "a DNS-1035 label must consist of lower case alphanumeric characters or '-', start with an alphabetic character, and end with an alphanumeric character";

// This is a label's max length in DNS (RFC 1035)
const RFC_1035_LABEL_MAX_LENGTH: usize = 63;

static RFC_1123_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1123_LABEL_FMT}$")).expect("failed to compile RFC 1123 label regex")
});

static RFC_1123_SUBDOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1123_SUBDOMAIN_FMT}$"))
        .expect("failed to compile RFC 1123 subdomain regex")
});

static RFC_1035_LABEL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!("^{RFC_1035_LABEL_FMT}$")).expect("failed to compile RFC 1035 label regex")
});

type Result<T = (), E = Errors> = std::result::Result<T, E>;

/// A collection of errors discovered during validation.
#[derive(Debug)]
pub struct Errors(Vec<Error>);

impl Errors {
    pub fn iter(&self) -> impl Iterator<Item = &Error> {
        self.0.iter()
    }
}

impl Display for Errors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, error) in self.0.iter().enumerate() {
            let prefix = match i {
                0 => "",
                _ => ", ",
            };
            write!(f, "{prefix}{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Errors {}

/// A single validation error.
#[derive(Debug, Snafu)]
pub enum Error {
    #[snafu(display("input must not be empty"))]
    Empty,

    #[snafu(display("{msg} (regex used for validation is {regex:?})"))]
    Regex {
        msg: &'static str,
        regex: &'static str,
    },

    #[snafu(display("input is {length} bytes long but must be no more than {max_length}"))]
    TooLong { length: usize, max_length: usize },
}

fn validate_str_not_empty(value: &str) -> Result<(), Error> {
    if value.is_empty() {
        EmptySnafu.fail()
    } else {
        Ok(())
    }
}

/// Returns [`Ok`] if `value`'s length fits within `max_length`.
fn validate_str_length(value: &str, max_length: usize) -> Result<(), Error> {
    if value.len() > max_length {
        TooLongSnafu {
            length: value.len(),
            max_length,
        }
        .fail()
    } else {
        Ok(())
    }
}

/// Returns [`Ok`] if `value` matches `regex`.
fn validate_str_regex(value: &str, regex: &'static Regex, msg: &'static str) -> Result<(), Error> {
    if regex.is_match(value) {
        Ok(())
    } else {
        RegexSnafu {
            msg,
            regex: regex
                .as_str()
                // Clean up start/end-of-line markers
                .trim_start_matches('^')
                .trim_end_matches('$'),
        }
        .fail()
    }
}

/// Returns [`Ok`] if *all* validations are [`Ok`], otherwise returns all errors.
///
/// An empty input short-circuits, the regex error on top of it adds nothing.
fn validate_all(value: &str, validations: impl IntoIterator<Item = Result<(), Error>>) -> Result {
    if let Err(empty) = validate_str_not_empty(value) {
        return Err(Errors(vec![empty]));
    }

    let errors = validations
        .into_iter()
        .filter_map(Result::err)
        .collect::<Vec<_>>();
    if errors.is_empty() {
        Ok(())
    } else {
        Err(Errors(errors))
    }
}

/// Tests for a string that conforms to the definition of a label in DNS (RFC 1123).
/// Maximum label length supported by k8s is 63 characters (minimum required).
pub fn is_rfc_1123_label(value: &str) -> Result {
    validate_all(
        value,
        [
            validate_str_length(value, RFC_1123_LABEL_MAX_LENGTH),
            validate_str_regex(value, &RFC_1123_LABEL_REGEX, RFC_1123_LABEL_ERROR_MSG),
        ],
    )
}

/// Tests for a string that conforms to the definition of a subdomain in DNS (RFC 1123).
pub fn is_rfc_1123_subdomain(value: &str) -> Result {
    validate_all(
        value,
        [
            validate_str_length(value, RFC_1123_SUBDOMAIN_MAX_LENGTH),
            validate_str_regex(
                value,
                &RFC_1123_SUBDOMAIN_REGEX,
                RFC_1123_SUBDOMAIN_ERROR_MSG,
            ),
        ],
    )
}

/// Tests for a string that conforms to the definition of a label in DNS (RFC 1035).
pub fn is_rfc_1035_label(value: &str) -> Result {
    validate_all(
        value,
        [
            validate_str_length(value, RFC_1035_LABEL_MAX_LENGTH),
            validate_str_regex(value, &RFC_1035_LABEL_REGEX, RFC_1035_LABEL_ERROR_MSG),
        ],
    )
}

/// Validates a namespace name, which must be a RFC 1123 label.
pub fn validate_namespace_name(name: &str) -> Result {
    is_rfc_1123_label(name)
}

/// Validates the name of a namespaced object of the given `kind`.
///
/// The name of a Service becomes a DNS label and must be a RFC 1035 label. All other kinds
/// (e.g. Deployments) accept any RFC 1123 subdomain.
pub fn validate_object_name(kind: &str, name: &str) -> Result {
    match kind {
        "Service" => is_rfc_1035_label(name),
        _ => is_rfc_1123_subdomain(name),
    }
}
