//! Target lists and their contact membership.

use serde::Serialize;
use serde_json::{json, Value};

use crate::backend::{require_id, Backend};
use crate::envelope::Upsert;
use crate::error::Error;
use crate::types::TargetList;

fn success_flag(body: &Value) -> bool {
    match body.get("success") {
        None | Some(Value::Null) => true,
        Some(Value::Bool(b)) => *b,
        Some(Value::Number(n)) => n.as_f64().is_some_and(|n| n != 0.0),
        Some(Value::String(s)) => !s.is_empty() && s != "0",
        Some(Value::Array(a)) => !a.is_empty(),
        Some(Value::Object(_)) => true,
    }
}

pub trait TargetListApi: Backend {
    fn send_list(&self, name: &str, mailjet_id: i64) -> Result<String, Error> {
        let upsert = self.create(
            "/target-lists",
            &json!({ "name": name, "mailjet_id": mailjet_id }),
        )?;
        if let Upsert::AlreadyExists(id) = &upsert {
            self.note_conflict("target_list", id);
        }
        upsert.into_id()
    }

    /// The list with this Mailjet id, or `None` when there is none.
    fn get_list(&self, mailjet_id: i64) -> Result<Option<TargetList>, Error> {
        let mailjet_id = mailjet_id.to_string();
        match self.first_item("/target-lists", &[("mailjet_id", mailjet_id.as_str())])? {
            Some(item) => Ok(Some(serde_json::from_value(item)?)),
            None => Ok(None),
        }
    }

    /// Update the list and return its id.
    fn update_list<V>(&self, list_id: &str, values: &V) -> Result<String, Error>
    where
        V: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(values)?;
        let body = self.put(&format!("/target-lists/{list_id}"), &payload)?;
        require_id(&body, "target list update")
    }

    /// Add contacts to the list. The backend may omit `success`, which
    /// counts as success.
    fn send_list_contacts(&self, list_id: &str, contact_ids: &[String]) -> Result<bool, Error> {
        let body = self.post(
            &format!("/target-lists/{list_id}/contacts"),
            &json!({ "contact_ids": contact_ids }),
        )?;
        Ok(success_flag(&body))
    }
}

impl<B: Backend + ?Sized> TargetListApi for B {}
