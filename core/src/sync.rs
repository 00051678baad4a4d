//! The periodic synchronisation run.
//!
//! # Overview
//! `run_cron` pushes one site's state into the CRM: the website record, then
//! (when enabled) every site user as a contact plus website user, then every
//! enabled webform with its submissions. The site is read through
//! `SiteSource`, so the run does not care whether data comes from a live
//! framework or from a JSON export.
//!
//! # Design
//! Only the website upsert is fatal. Any later item that fails is logged,
//! recorded in the `SyncReport`, and skipped. Nothing is retried; the next run
//! converges because every write is an upsert.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::config::Settings;
use crate::error::Error;
use crate::resources::{
    ContactApi, NewWebsiteUser, SubmissionOutcome, WebformApi, WebsiteApi,
};
use crate::types::{Consents, ContactInput, Field, SubmissionValues};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteWebform {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Templates are never synchronised.
    #[serde(default)]
    pub template: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteSubmission {
    pub id: String,
    pub values: SubmissionValues,
    #[serde(default)]
    pub in_draft: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteUser {
    pub email: String,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    /// Epoch seconds.
    pub created: i64,
    /// Epoch seconds.
    pub changed: i64,
    #[serde(default)]
    pub login: Option<i64>,
    #[serde(default)]
    pub fields: Vec<Field>,
}

/// Read access to the site being synchronised.
pub trait SiteSource {
    /// Installed, non-template webforms.
    fn webforms(&self) -> Vec<SiteWebform>;
    /// Completed submissions of one webform, oldest first.
    fn submissions(&self, webform_id: &str) -> Vec<SiteSubmission>;
    fn users(&self) -> Vec<SiteUser>;
    fn consents(&self) -> Consents;
}

/// A JSON snapshot of a site.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct SiteExport {
    #[serde(default)]
    pub webforms: Vec<SiteWebform>,
    /// Submissions keyed by webform id.
    #[serde(default)]
    pub submissions: HashMap<String, Vec<SiteSubmission>>,
    #[serde(default)]
    pub users: Vec<SiteUser>,
    #[serde(default)]
    pub consents: Consents,
}

impl SiteExport {
    pub fn from_json_str(raw: &str) -> Result<Self, Error> {
        Ok(serde_json::from_str(raw)?)
    }
}

impl SiteSource for SiteExport {
    fn webforms(&self) -> Vec<SiteWebform> {
        self.webforms.iter().filter(|w| !w.template).cloned().collect()
    }

    fn submissions(&self, webform_id: &str) -> Vec<SiteSubmission> {
        self.submissions
            .get(webform_id)
            .map(|subs| subs.iter().filter(|s| !s.in_draft).cloned().collect())
            .unwrap_or_default()
    }

    fn users(&self) -> Vec<SiteUser> {
        self.users.clone()
    }

    fn consents(&self) -> Consents {
        self.consents.clone()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncFailure {
    /// What was being synchronised, e.g. `user:a@example.com`.
    pub item: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncReport {
    pub website_id: String,
    pub users_synced: usize,
    pub webforms_synced: usize,
    pub submissions_recorded: usize,
    pub submissions_duplicate: usize,
    pub failures: Vec<SyncFailure>,
}

impl SyncReport {
    fn fail(&mut self, item: String, error: Error) {
        tracing::warn!(%item, %error, "sync item failed");
        self.failures.push(SyncFailure {
            item,
            error: error.to_string(),
        });
    }
}

pub fn run_cron<B>(client: &B, settings: &Settings, source: &dyn SiteSource) -> Result<SyncReport, Error>
where
    B: Backend + ?Sized,
{
    let span = tracing::info_span!("cron", site_url = %settings.site_url);
    let _entered = span.enter();

    let website_id = client.send_website(settings.site_name(), &settings.site_url)?;
    let mut report = SyncReport {
        website_id,
        ..SyncReport::default()
    };

    if settings.synchronize {
        sync_users(client, source, &mut report);
    }
    sync_webforms(client, settings, source, &mut report);

    tracing::info!(
        users = report.users_synced,
        webforms = report.webforms_synced,
        recorded = report.submissions_recorded,
        duplicates = report.submissions_duplicate,
        failures = report.failures.len(),
        "cron run finished"
    );
    Ok(report)
}

fn sync_users<B: Backend + ?Sized>(client: &B, source: &dyn SiteSource, report: &mut SyncReport) {
    let consents = source.consents();
    for user in source.users() {
        if user.email.trim().is_empty() {
            tracing::debug!("skipping site user without email");
            continue;
        }
        match sync_user(client, &report.website_id, &user, &consents) {
            Ok(()) => report.users_synced += 1,
            Err(err) => report.fail(format!("user:{}", user.email), err),
        }
    }
}

fn sync_user<B: Backend + ?Sized>(
    client: &B,
    website_id: &str,
    user: &SiteUser,
    consents: &Consents,
) -> Result<(), Error> {
    let mut input = ContactInput::new(&user.email);
    input.first_name = user.first_name.clone();
    input.last_name = user.last_name.clone();
    let contact = client.send_contact(&input)?;

    client.send_website_user(&NewWebsiteUser {
        website_id,
        contact_id: &contact.id,
        email: &user.email,
        consents,
        created_at: user.created,
        modified_at: user.changed,
        last_login: user.login,
        fields: &user.fields,
    })?;
    Ok(())
}

fn sync_webforms<B: Backend + ?Sized>(
    client: &B,
    settings: &Settings,
    source: &dyn SiteSource,
    report: &mut SyncReport,
) {
    for webform in source.webforms() {
        if !settings.is_webform_enabled(&webform.id) {
            continue;
        }
        let webform_id = match client.send_webform(
            &webform.id,
            &webform.title,
            &webform.description,
            &report.website_id,
        ) {
            Ok(id) => id,
            Err(err) => {
                report.fail(format!("webform:{}", webform.id), err);
                continue;
            }
        };
        report.webforms_synced += 1;

        for submission in source.submissions(&webform.id) {
            let outcome = client.send_webform_submission(
                &report.website_id,
                &webform_id,
                &submission.id,
                &submission.values,
            );
            match outcome {
                Ok(SubmissionOutcome::Recorded) => report.submissions_recorded += 1,
                Ok(SubmissionOutcome::AlreadyRecorded) => report.submissions_duplicate += 1,
                Err(err) => {
                    report.fail(format!("submission:{}/{}", webform.id, submission.id), err)
                }
            }
        }
    }
}
