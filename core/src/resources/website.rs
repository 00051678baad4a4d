//! Websites and the users bound to them.

use serde::Serialize;
use serde_json::{json, Value};

use crate::backend::Backend;
use crate::envelope::Upsert;
use crate::error::Error;
use crate::render;
use crate::types::{Consents, Field, WebsiteUser};

/// A site user to bind to a website.
#[derive(Debug, Clone, Copy)]
pub struct NewWebsiteUser<'a> {
    pub website_id: &'a str,
    pub contact_id: &'a str,
    pub email: &'a str,
    pub consents: &'a Consents,
    /// Epoch seconds.
    pub created_at: i64,
    /// Epoch seconds.
    pub modified_at: i64,
    /// Epoch seconds; `None` or `0` when the user never logged in.
    pub last_login: Option<i64>,
    pub fields: &'a [Field],
}

#[derive(Debug, Serialize)]
struct WebsiteUserPayload<'a> {
    website_id: &'a str,
    contact_id: &'a str,
    email: &'a str,
    data: String,
    dedup_key: String,
    ppg_accepted: bool,
    ppg_updated_at: Option<String>,
    created_at: String,
    modified_at: String,
    last_login: Option<String>,
}

impl<'a> WebsiteUserPayload<'a> {
    fn build(user: &NewWebsiteUser<'a>) -> Result<Self, Error> {
        let consent = user.consents.get(user.email);
        Ok(Self {
            website_id: user.website_id,
            contact_id: user.contact_id,
            email: user.email,
            data: render::website_user_data(user.fields),
            dedup_key: format!("{}|{}", user.website_id, user.contact_id),
            ppg_accepted: consent.is_some_and(|c| c.is_accepted),
            ppg_updated_at: render::optional_timestamp(consent.and_then(|c| c.ppg_updated))?,
            created_at: render::timestamp(user.created_at)?,
            modified_at: render::timestamp(user.modified_at)?,
            last_login: render::optional_timestamp(user.last_login)?,
        })
    }
}

pub trait WebsiteApi: Backend {
    /// Create the website, or return the id of the one already registered.
    fn send_website(&self, name: &str, url: &str) -> Result<String, Error> {
        tracing::info!(name, url, "posting website");
        let upsert = self.create("websites", &json!({ "name": name, "url": url }))?;
        if let Upsert::AlreadyExists(id) = &upsert {
            self.note_conflict("website", id);
        }
        upsert.into_id()
    }

    /// Create the website user; an existing one is refreshed with the same
    /// payload.
    fn send_website_user(&self, user: &NewWebsiteUser<'_>) -> Result<WebsiteUser, Error> {
        let payload = serde_json::to_value(WebsiteUserPayload::build(user)?)?;
        let path = format!("websites/{}/users", user.website_id);
        let body = match self.create(&path, &payload)? {
            Upsert::Created(body) => body,
            Upsert::AlreadyExists(id) => {
                self.note_conflict("website_user", &id);
                self.put(&format!("website-users/{id}"), &payload)?
            }
        };
        Ok(serde_json::from_value(body)?)
    }

    fn update_website_user(&self, website_user_id: &str, values: &Value) -> Result<WebsiteUser, Error> {
        let body = self.put(&format!("website-users/{website_user_id}"), values)?;
        Ok(serde_json::from_value(body)?)
    }
}

impl<B: Backend + ?Sized> WebsiteApi for B {}
