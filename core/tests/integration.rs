//! End-to-end tests against the live mock server.
//!
//! # Design
//! Each test starts its own mock server on a random port, then drives the
//! real `CrmClient` (ureq executor) against it. This checks the upsert
//! semantics over actual HTTP, including 409 recovery and auth headers.

use std::net::SocketAddr;

use serde_json::{json, Map};

use crm_core::{
    run_cron, AttachmentApi, AuthScheme, Backend, CampaignApi, ClientConfig, Consent, Consents,
    ContactApi, ContactInput, CrmClient, Field, NewWebsiteUser, Settings, SiteExport, SubmissionOutcome,
    SubmissionValues, TargetListApi, WebformApi, WebsiteApi,
};

const API_KEY: &str = "integration-key";

fn start_server(api_key: Option<&str>) -> SocketAddr {
    let std_listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = std_listener.local_addr().unwrap();
    std_listener.set_nonblocking(true).unwrap();
    let api_key = api_key.map(str::to_string);

    std::thread::spawn(move || {
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(async {
            let listener = tokio::net::TcpListener::from_std(std_listener).unwrap();
            mock_server::run_with_key(listener, api_key).await
        })
        .unwrap();
    });
    addr
}

fn config(addr: SocketAddr) -> ClientConfig {
    ClientConfig::new(format!("http://{addr}/api"))
        .api_key(API_KEY)
        .auth_scheme(AuthScheme::Token)
}

fn client() -> CrmClient {
    CrmClient::new(&config(start_server(Some(API_KEY))))
}

#[test]
fn website_upsert_is_idempotent() {
    let c = client();
    let first = c.send_website("Site", "https://site.test").unwrap();
    let second = c.send_website("Site", "https://site.test").unwrap();
    assert_eq!(first, second);

    let websites = c.get("websites", &[]).unwrap();
    assert_eq!(websites["items"].as_array().unwrap().len(), 1);
}

#[test]
fn duplicate_contact_updates_existing() {
    let c = client();
    let created = c
        .send_contact(&ContactInput::new("ann@example.com").first_name("Ann"))
        .unwrap();
    let updated = c
        .send_contact(&ContactInput::new("ann@example.com").first_name("Anne").field("country", "IT"))
        .unwrap();
    assert_eq!(created.id, updated.id);
    assert_eq!(updated.first_name.as_deref(), Some("Anne"));
    assert_eq!(updated.extra["country"], "IT");

    let found = c.find_contact_by_email("ann@example.com").unwrap().unwrap();
    assert_eq!(found.first_name.as_deref(), Some("Anne"));
}

#[test]
fn submission_twice_creates_one_contact() {
    let c = client();
    let website_id = c.send_website("Site", "https://forms.test").unwrap();
    let webform_id = c.send_webform("contact", "Contact", "Contact form", &website_id).unwrap();
    assert_eq!(
        c.send_webform("contact", "Contact", "Contact form", &website_id).unwrap(),
        webform_id
    );

    let values = SubmissionValues::new()
        .with("name", "Alice")
        .with("email", "alice@example.com")
        .with("age", "30");
    let first = c
        .send_webform_submission(&website_id, &webform_id, "17", &values)
        .unwrap();
    let second = c
        .send_webform_submission(&website_id, &webform_id, "17", &values)
        .unwrap();
    assert_eq!(first, SubmissionOutcome::Recorded);
    assert_eq!(second, SubmissionOutcome::AlreadyRecorded);

    let contacts = c.get("contacts", &[("email", "alice@example.com")]).unwrap();
    assert_eq!(contacts["items"].as_array().unwrap().len(), 1);

    let submissions = c
        .get(&format!("webforms/{webform_id}/submissions"), &[])
        .unwrap();
    let items = submissions["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["data"], "- **name**: Alice\n- **age**: 30\n");
    assert_eq!(items[0]["contact_id"], contacts["items"][0]["id"]);
}

#[test]
fn website_user_is_refreshed_on_conflict() {
    let c = client();
    let website_id = c.send_website("Site", "https://users.test").unwrap();
    let contact = c.send_contact(&ContactInput::new("u@example.com")).unwrap();
    let consents: Consents = [(
        "u@example.com".to_string(),
        Consent {
            is_accepted: true,
            ppg_updated: Some(1_700_000_000),
        },
    )]
    .into_iter()
    .collect();
    let fields = [Field::scalar("Job", "Engineer")];
    let mut user = NewWebsiteUser {
        website_id: &website_id,
        contact_id: &contact.id,
        email: "u@example.com",
        consents: &consents,
        created_at: 1_700_000_000,
        modified_at: 1_700_000_000,
        last_login: None,
        fields: &fields,
    };

    let created = c.send_website_user(&user).unwrap();
    assert!(created.ppg_accepted);
    assert_eq!(created.ppg_updated_at.as_deref(), Some("2023-11-14 22:13:20"));
    assert_eq!(created.data, "- **Job**: Engineer\n");
    assert!(created.last_login.is_none());

    user.last_login = Some(1_700_000_060);
    let refreshed = c.send_website_user(&user).unwrap();
    assert_eq!(refreshed.id, created.id);
    assert_eq!(refreshed.last_login.as_deref(), Some("2023-11-14 22:14:20"));
}

#[test]
fn campaigns_and_lists() {
    let c = client();
    assert!(c.get_list(404).unwrap().is_none());
    assert!(c.get_campaign(404).unwrap().is_none());

    let website_id = c.send_website("Site", "https://news.test").unwrap();
    let list_id = c.send_list("Newsletter", 5).unwrap();
    assert_eq!(c.send_list("Newsletter", 5).unwrap(), list_id);
    assert_eq!(c.get_list(5).unwrap().unwrap().id, list_id);
    assert_eq!(c.update_list(&list_id, &json!({"name": "Weekly"})).unwrap(), list_id);

    let lists = vec![list_id.clone()];
    let campaign_id = c.send_campaign("Spring", 1001, &website_id, &lists).unwrap();
    assert_eq!(c.send_campaign("Spring", 1001, &website_id, &lists).unwrap(), campaign_id);
    let campaign = c.get_campaign(1001).unwrap().unwrap();
    assert_eq!(campaign.target_lists_ids, lists);
    let renamed = c.update_campaign(&campaign_id, &json!({"name": "Summer"})).unwrap();
    assert_eq!(renamed.name, "Summer");

    let contact = c.send_contact(&ContactInput::new("n@example.com")).unwrap();
    assert!(c.send_list_contacts(&list_id, &[contact.id]).unwrap());
}

#[test]
fn attachment_upload() {
    let c = client();
    let mut metadata = Map::new();
    metadata.insert("contact_id".into(), "c1".into());
    let id = c
        .send_attachment("cv.txt", "text/plain", b"hello", &metadata)
        .unwrap();
    assert!(!id.is_empty());
}

#[test]
fn missing_key_is_rejected() {
    let addr = start_server(Some(API_KEY));
    let anonymous = CrmClient::new(&ClientConfig::new(format!("http://{addr}/api")));
    let err = anonymous.send_website("Site", "https://a.test").unwrap_err();
    assert_eq!(err.status(), Some(401));

    let bearer = CrmClient::new(
        &ClientConfig::new(format!("http://{addr}/api")).api_key(API_KEY),
    );
    assert!(bearer.send_website("Site", "https://a.test").is_ok());
}

#[test]
fn cron_run_converges() {
    let addr = start_server(Some(API_KEY));
    let settings = Settings::from_json_str(
        &json!({
            "site_url": "https://cron.test",
            "site_name": "Cron site",
            "crm_api_base_url": format!("http://{addr}/api"),
            "crm_api_key": API_KEY,
            "crm_auth_scheme": "token",
            "syncronize": true,
            "webform_contact": true
        })
        .to_string(),
    )
    .unwrap();
    let export = SiteExport::from_json_str(
        r#"{
            "webforms": [{"id": "contact", "title": "Contact"}],
            "submissions": {"contact": [
                {"id": "1", "values": [["email", "a@example.com"], ["message", "Hi"]]},
                {"id": "2", "values": [["message", "Anonymous"]]}
            ]},
            "users": [{"email": "a@example.com", "first_name": "Ann", "created": 1700000000, "changed": 1700000000}]
        }"#,
    )
    .unwrap();
    let c = CrmClient::new(&settings.client_config());

    let first = run_cron(&c, &settings, &export).unwrap();
    assert!(first.failures.is_empty(), "{:?}", first.failures);
    assert_eq!(first.users_synced, 1);
    assert_eq!(first.submissions_recorded, 2);

    let second = run_cron(&c, &settings, &export).unwrap();
    assert_eq!(second.website_id, first.website_id);
    assert_eq!(second.submissions_recorded, 0);
    assert_eq!(second.submissions_duplicate, 2);

    let contacts = c.get("contacts", &[]).unwrap();
    assert_eq!(contacts["items"].as_array().unwrap().len(), 1);
}

#[test]
fn unreachable_backend_is_a_transport_error() {
    let c = CrmClient::new(&ClientConfig::new("http://127.0.0.1:9/api"));
    let err = c.send_website("Site", "https://a.test").unwrap_err();
    assert!(matches!(err, crm_core::Error::Transport(_)));
    assert_eq!(err.status(), None);
}
