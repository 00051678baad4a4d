//! Newsletter campaigns, keyed by their Mailjet id.

use serde::Serialize;
use serde_json::json;

use crate::backend::Backend;
use crate::envelope::Upsert;
use crate::error::Error;
use crate::types::Campaign;

pub trait CampaignApi: Backend {
    fn send_campaign(
        &self,
        name: &str,
        mailjet_id: i64,
        website_id: &str,
        target_lists_ids: &[String],
    ) -> Result<String, Error> {
        let payload = json!({
            "name": name,
            "mailjet_id": mailjet_id,
            "website_id": website_id,
            "target_lists_ids": target_lists_ids,
        });
        let upsert = self.create("/campaigns", &payload)?;
        if let Upsert::AlreadyExists(id) = &upsert {
            self.note_conflict("campaign", id);
        }
        upsert.into_id()
    }

    /// The campaign with this Mailjet id, or `None` when there is none.
    fn get_campaign(&self, mailjet_id: i64) -> Result<Option<Campaign>, Error> {
        let mailjet_id = mailjet_id.to_string();
        match self.first_item("/campaigns", &[("mailjet_id", mailjet_id.as_str())])? {
            Some(item) => Ok(Some(serde_json::from_value(item)?)),
            None => Ok(None),
        }
    }

    fn update_campaign<V>(&self, campaign_id: &str, values: &V) -> Result<Campaign, Error>
    where
        V: Serialize + ?Sized,
    {
        let payload = serde_json::to_value(values)?;
        let body = self.put(&format!("/campaigns/{campaign_id}"), &payload)?;
        Ok(serde_json::from_value(body)?)
    }
}

impl<B: Backend + ?Sized> CampaignApi for B {}
