//! Contacts, keyed by email.

use serde::Serialize;
use serde_json::json;

use crate::backend::{require_id, Backend};
use crate::envelope::{Upsert, CONFLICT};
use crate::error::Error;
use crate::http::HttpMethod;
use crate::types::{Contact, ContactInput};

pub trait ContactApi: Backend {
    /// Create the contact. When the backend reports the email as taken, the
    /// existing contact is updated with the same values instead.
    fn send_contact(&self, values: &ContactInput) -> Result<Contact, Error> {
        let payload = serde_json::to_value(values)?;
        let envelope = self.send(HttpMethod::Post, "/contacts", Some(&payload), &[])?;
        if envelope.status == CONFLICT {
            if let Some(id) = envelope.body_id() {
                self.note_conflict("contact", &id);
                return self.update_contact(&id, values);
            }
        }
        Ok(serde_json::from_value(envelope.assert_success()?)?)
    }

    fn update_contact<V>(&self, contact_id: &str, values: &V) -> Result<Contact, Error>
    where
        V: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(values)?;
        let body = self.put(&format!("/contacts/{contact_id}"), &payload)?;
        Ok(serde_json::from_value(body)?)
    }

    fn find_contact_by_email(&self, email: &str) -> Result<Option<Contact>, Error> {
        match self.first_item("/contacts", &[("email", email)])? {
            Some(item) => Ok(Some(serde_json::from_value(item)?)),
            None => Ok(None),
        }
    }

    /// Id of the contact with this email, creating a minimal one if needed.
    /// An existing contact gets a minimal touch update.
    fn get_or_create_contact_by_email(&self, email: &str) -> Result<String, Error> {
        if let Some(item) = self.first_item("/contacts", &[("email", email)])? {
            let contact_id = require_id(&item, "contact lookup")?;
            self.put(
                &format!("/contacts/{contact_id}"),
                &json!({ "first_name": email }),
            )?;
            return Ok(contact_id);
        }

        let upsert = self.create("/contacts", &json!({ "first_name": email, "email": email }))?;
        if let Upsert::AlreadyExists(id) = &upsert {
            self.note_conflict("contact", id);
        }
        upsert.into_id()
    }
}

impl<B: Backend + ?Sized> ContactApi for B {}
