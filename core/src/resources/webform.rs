//! Webforms and their submissions.

use serde_json::{json, Map, Value};

use crate::backend::Backend;
use crate::envelope::Upsert;
use crate::error::Error;
use crate::render;
use crate::resources::contact::ContactApi;
use crate::types::SubmissionValues;

/// Result of ingesting a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubmissionOutcome {
    Recorded,
    /// The backend already held a submission with the same dedup key.
    AlreadyRecorded,
}

pub trait WebformApi: Backend {
    fn send_webform(
        &self,
        external_id: &str,
        name: &str,
        description: &str,
        website_id: &str,
    ) -> Result<String, Error> {
        let payload = json!({
            "external_id": external_id,
            "name": name,
            "description": description,
            "website_id": website_id,
            "dedup_key": format!("{website_id}|{external_id}"),
        });
        let upsert = self.create("/webforms", &payload)?;
        if let Upsert::AlreadyExists(id) = &upsert {
            self.note_conflict("webform", id);
        }
        upsert.into_id()
    }

    /// Record a submission. A non-empty `email` value links it to a contact,
    /// looked up or created on the way. Duplicates are not an error.
    fn send_webform_submission(
        &self,
        website_id: &str,
        webform_id: &str,
        submission_id: &str,
        values: &SubmissionValues,
    ) -> Result<SubmissionOutcome, Error> {
        let mut payload = Map::new();
        payload.insert("external_id".into(), submission_id.into());
        payload.insert("data".into(), render::submission_data(values).into());
        payload.insert(
            "dedup_key".into(),
            format!("{website_id}|{webform_id}|{submission_id}").into(),
        );

        if let Some(email) = values.get("email").filter(|e| !e.is_empty()) {
            let contact_id = self.get_or_create_contact_by_email(email)?;
            payload.insert("contact_id".into(), contact_id.into());
        }

        let path = format!("/webforms/{webform_id}/submissions");
        match self.post(&path, &Value::Object(payload)) {
            Ok(_) => Ok(SubmissionOutcome::Recorded),
            Err(Error::Backend(err)) if err.is_conflict() => {
                tracing::debug!(webform_id, submission_id, "submission already recorded");
                Ok(SubmissionOutcome::AlreadyRecorded)
            }
            Err(err) => Err(err),
        }
    }
}

impl<B: Backend + ?Sized> WebformApi for B {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::HttpMethod;
    use crate::test_support::client;

    #[test]
    fn send_webform_payload_and_id() {
        let c = client();
        c.executor().push(201, r#"{"id": "f1"}"#);
        let id = c.send_webform("contact", "Contact us", "Main form", "w1").unwrap();
        assert_eq!(id, "f1");
        assert_eq!(
            c.executor().body(0),
            json!({
                "external_id": "contact",
                "name": "Contact us",
                "description": "Main form",
                "website_id": "w1",
                "dedup_key": "w1|contact"
            })
        );
    }

    #[test]
    fn existing_webform_id_is_returned() {
        let c = client();
        c.executor().push(409, r#"{"id": 8, "name": "Contact us"}"#);
        assert_eq!(c.send_webform("contact", "Contact us", "", "w1").unwrap(), "8");
    }

    #[test]
    fn webform_server_error_is_not_recovered() {
        let c = client();
        c.executor().push(500, r#"{"id": "8"}"#);
        let err = c.send_webform("contact", "Contact us", "", "w1").unwrap_err();
        assert_eq!(err.status(), Some(500));
        assert_eq!(c.executor().requests().len(), 1);
    }

    #[test]
    fn submission_without_email_skips_contact() {
        let c = client();
        c.executor().push(201, r#"{"id": "s1"}"#);
        let values = SubmissionValues::new().with("message", "Hi");
        let outcome = c.send_webform_submission("w1", "f1", "17", &values).unwrap();
        assert_eq!(outcome, SubmissionOutcome::Recorded);

        let sent = c.executor().requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "http://crm.test/api/webforms/f1/submissions");
        assert_eq!(
            c.executor().body(0),
            json!({
                "external_id": "17",
                "data": "- **message**: Hi\n",
                "dedup_key": "w1|f1|17"
            })
        );
    }

    #[test]
    fn submission_with_email_links_contact() {
        let c = client();
        c.executor().push(200, r#"{"items": []}"#);
        c.executor().push(201, r#"{"id": "c1"}"#);
        c.executor().push(201, r#"{"id": "s1"}"#);
        let values = SubmissionValues::new()
            .with("name", "Alice")
            .with("email", "a@example.com")
            .with("age", "30");
        c.send_webform_submission("w1", "f1", "17", &values).unwrap();

        let sent = c.executor().requests();
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0].method, HttpMethod::Get);
        assert_eq!(sent[1].method, HttpMethod::Post);
        let body = c.executor().body(2);
        assert_eq!(body["contact_id"], "c1");
        assert_eq!(body["data"], "- **name**: Alice\n- **age**: 30\n");
    }

    #[test]
    fn empty_email_is_ignored() {
        let c = client();
        c.executor().push(201, r#"{"id": "s1"}"#);
        let values = SubmissionValues::new().with("email", "");
        c.send_webform_submission("w1", "f1", "1", &values).unwrap();
        assert_eq!(c.executor().requests().len(), 1);
        assert!(c.executor().body(0).get("contact_id").is_none());
    }

    #[test]
    fn duplicate_submission_is_swallowed() {
        let c = client();
        c.executor().push(409, "");
        let outcome = c
            .send_webform_submission("w1", "f1", "17", &SubmissionValues::new())
            .unwrap();
        assert_eq!(outcome, SubmissionOutcome::AlreadyRecorded);
    }

    #[test]
    fn submission_server_error_propagates() {
        let c = client();
        c.executor().push(500, r#"{"id": "s1"}"#);
        let err = c
            .send_webform_submission("w1", "f1", "17", &SubmissionValues::new())
            .unwrap_err();
        assert_eq!(err.status(), Some(500));
    }
}
