//! Plain-text renderings and value formatting for backend payloads.

use chrono::DateTime;

use crate::error::Error;
use crate::types::{Field, FieldValue, SubmissionValues};

/// Format accepted by the backend for timestamp fields.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Render submission values as Markdown bullet lines, in input order.
///
/// `email` is carried separately as the contact link and is left out, as are
/// values that are null.
pub fn submission_data(values: &SubmissionValues) -> String {
    let mut out = String::new();
    for (name, value) in values.iter() {
        if name == "email" {
            continue;
        }
        if let Some(value) = value {
            push_line(&mut out, name, value);
        }
    }
    out
}

/// Render site-user fields as Markdown bullet lines keyed by label.
/// Reference fields list the referenced ids separated by `, `.
pub fn website_user_data(fields: &[Field]) -> String {
    let mut out = String::new();
    for field in fields {
        match &field.value {
            Some(FieldValue::Scalar(value)) => push_line(&mut out, &field.label, value),
            Some(FieldValue::ReferenceList(ids)) => {
                push_line(&mut out, &field.label, &ids.join(", "))
            }
            None => {}
        }
    }
    out
}

fn push_line(out: &mut String, name: &str, value: &str) {
    out.push_str("- **");
    out.push_str(name);
    out.push_str("**: ");
    out.push_str(value);
    out.push('\n');
}

/// Format epoch seconds as a UTC backend timestamp.
pub fn timestamp(epoch: i64) -> Result<String, Error> {
    DateTime::from_timestamp(epoch, 0)
        .map(|dt| dt.format(TIMESTAMP_FORMAT).to_string())
        .ok_or(Error::InvalidTimestamp(epoch))
}

/// Like [`timestamp`], but absent and zero epochs map to `None`.
pub fn optional_timestamp(epoch: Option<i64>) -> Result<Option<String>, Error> {
    match epoch {
        None | Some(0) => Ok(None),
        Some(epoch) => timestamp(epoch).map(Some),
    }
}
